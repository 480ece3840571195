use async_trait::async_trait;
use devbridge_proto::ProviderKind;
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use super::find_binary;
use crate::config::TunnelSettings;
use crate::error::TunnelError;
use crate::process::{launch, LaunchOutcome, ProcessSpec};
use crate::provider::{validate_port, ProviderTunnel, TunnelProvider};

fn extract_url(line: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)your url is:\s*(https?://\S+)").expect("valid regex")
    });
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// localtunnel via the `lt` command
pub struct LocaltunnelProvider {
    program: String,
    connect_timeout: Duration,
}

impl LocaltunnelProvider {
    pub fn new(settings: &TunnelSettings) -> Self {
        Self {
            program: "lt".to_string(),
            connect_timeout: settings.connect_timeout,
        }
    }

    /// Use a different executable (e.g. an absolute path)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn spec(&self, port: u16) -> ProcessSpec {
        ProcessSpec {
            provider: ProviderKind::Localtunnel,
            program: self.program.clone(),
            args: vec!["--port".to_string(), port.to_string()],
            extract_url,
            auth_markers: &[],
            already_running_markers: &[],
            remediation: "",
            connect_timeout: self.connect_timeout,
        }
    }
}

#[async_trait]
impl TunnelProvider for LocaltunnelProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Localtunnel
    }

    async fn probe(&self) -> Result<(), TunnelError> {
        find_binary(self.kind(), &self.program)
    }

    async fn connect(&self, port: u16) -> Result<ProviderTunnel, TunnelError> {
        validate_port(port.into())?;
        match launch(&self.spec(port)).await? {
            LaunchOutcome::Ready(tunnel) => Ok(tunnel),
            LaunchOutcome::AlreadyRunning => Err(TunnelError::Provider {
                provider: self.kind(),
                message: "reported an existing tunnel it cannot share".to_string(),
            }),
        }
    }
}
