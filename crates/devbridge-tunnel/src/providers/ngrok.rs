use async_trait::async_trait;
use devbridge_proto::ProviderKind;
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::find_binary;
use crate::config::TunnelSettings;
use crate::error::TunnelError;
use crate::process::{launch, LaunchOutcome, ProcessSpec};
use crate::provider::{validate_port, ProviderTunnel, TunnelHandle, TunnelProvider};

const REMEDIATION: &str = "Run `ngrok config add-authtoken <token>` or set NGROK_AUTHTOKEN. \
Tokens are listed at https://dashboard.ngrok.com/get-started/your-authtoken";

/// Auth and billing failures
const AUTH_MARKERS: &[&str] = &[
    "ERR_NGROK_4018",
    "ERR_NGROK_105",
    "ERR_NGROK_107",
    "ERR_NGROK_120",
    "ERR_NGROK_313",
    "authentication failed",
];

const ALREADY_RUNNING_MARKERS: &[&str] = &["ERR_NGROK_108", "ERR_NGROK_334", "already online"];

fn extract_url(line: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"msg="started tunnel".*\burl=(https://[^\s"]+)"#).expect("valid regex")
    });
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Deserialize)]
struct AgentTunnels {
    #[serde(default)]
    tunnels: Vec<AgentTunnel>,
}

#[derive(Debug, Deserialize)]
struct AgentTunnel {
    name: String,
    public_url: String,
    config: AgentTunnelConfig,
}

#[derive(Debug, Deserialize)]
struct AgentTunnelConfig {
    addr: String,
}

/// ngrok via the `ngrok` agent binary
pub struct NgrokProvider {
    program: String,
    authtoken: Option<String>,
    region: Option<String>,
    agent_api: String,
    connect_timeout: Duration,
    client: reqwest::Client,
}

impl NgrokProvider {
    pub fn new(settings: &TunnelSettings) -> Self {
        Self {
            program: "ngrok".to_string(),
            authtoken: settings.ngrok_authtoken.clone(),
            region: settings.ngrok_region.clone(),
            agent_api: settings.ngrok_agent_api.trim_end_matches('/').to_string(),
            connect_timeout: settings.connect_timeout,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Use a different executable (e.g. an absolute path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn spec(&self, port: u16) -> ProcessSpec {
        let mut args = vec![
            "http".to_string(),
            port.to_string(),
            "--log".to_string(),
            "stdout".to_string(),
            "--log-format".to_string(),
            "logfmt".to_string(),
        ];
        if let Some(token) = &self.authtoken {
            args.push("--authtoken".to_string());
            args.push(token.clone());
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }

        ProcessSpec {
            provider: ProviderKind::Ngrok,
            program: self.program.clone(),
            args,
            extract_url,
            auth_markers: AUTH_MARKERS,
            already_running_markers: ALREADY_RUNNING_MARKERS,
            remediation: REMEDIATION,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Ask a running ngrok agent for a tunnel already forwarding to `port`
    async fn find_existing(&self, port: u16) -> Option<ProviderTunnel> {
        let url = format!("{}/api/tunnels", self.agent_api);
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("ngrok agent API returned {}", r.status());
                return None;
            }
            Err(e) => {
                debug!("No ngrok agent API at {}: {}", url, e);
                return None;
            }
        };

        let tunnels: AgentTunnels = response.json().await.ok()?;
        let suffix = format!(":{}", port);
        tunnels
            .tunnels
            .into_iter()
            .filter(|t| t.public_url.starts_with("https://"))
            .find(|t| t.config.addr.trim_end_matches('/').ends_with(&suffix))
            .map(|t| ProviderTunnel {
                url: t.public_url,
                tunnel_id: t.name,
                handle: TunnelHandle::Adopted,
            })
    }
}

#[async_trait]
impl TunnelProvider for NgrokProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ngrok
    }

    async fn probe(&self) -> Result<(), TunnelError> {
        find_binary(self.kind(), &self.program)
    }

    async fn connect(&self, port: u16) -> Result<ProviderTunnel, TunnelError> {
        validate_port(port.into())?;

        if let Some(existing) = self.find_existing(port).await {
            info!("Reusing ngrok tunnel {} for port {}", existing.url, port);
            return Ok(existing);
        }

        match launch(&self.spec(port)).await? {
            LaunchOutcome::Ready(tunnel) => Ok(tunnel),
            LaunchOutcome::AlreadyRunning => {
                self.find_existing(port)
                    .await
                    .ok_or_else(|| TunnelError::Provider {
                        provider: self.kind(),
                        message: format!(
                            "an endpoint for port {} is already online but the local agent API did not list it",
                            port
                        ),
                    })
            }
        }
    }
}
