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
        Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").expect("valid regex")
    });
    re.find_iter(line)
        .map(|m| m.as_str())
        // The quick-tunnel API host shows up in error messages.
        .find(|url| *url != "https://api.trycloudflare.com")
        .map(str::to_string)
}

/// Cloudflare quick tunnels via the `cloudflared` binary
pub struct CloudflaredProvider {
    program: String,
    connect_timeout: Duration,
}

impl CloudflaredProvider {
    pub fn new(settings: &TunnelSettings) -> Self {
        Self {
            program: "cloudflared".to_string(),
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
            provider: ProviderKind::Cloudflared,
            program: self.program.clone(),
            args: vec![
                "tunnel".to_string(),
                "--no-autoupdate".to_string(),
                "--url".to_string(),
                format!("http://localhost:{}", port),
            ],
            extract_url,
            auth_markers: &[],
            already_running_markers: &[],
            remediation: "",
            connect_timeout: self.connect_timeout,
        }
    }
}

#[async_trait]
impl TunnelProvider for CloudflaredProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloudflared
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_url() {
        let line = "2024-01-01T00:00:00Z INF |  https://quiet-fog-1234.trycloudflare.com  |";
        assert_eq!(
            extract_url(line).as_deref(),
            Some("https://quiet-fog-1234.trycloudflare.com")
        );
    }

    #[test]
    fn test_ignores_api_host() {
        let line = r#"ERR failed to request quick Tunnel: Post "https://api.trycloudflare.com/tunnel""#;
        assert_eq!(extract_url(line), None);
    }

    #[test]
    fn test_spec_args() {
        let provider = CloudflaredProvider::new(&TunnelSettings::default());
        let spec = provider.spec(4098);
        assert_eq!(spec.args.last().unwrap(), "http://localhost:4098");
    }

    #[tokio::test]
    async fn test_rejects_port_zero() {
        let provider = CloudflaredProvider::new(&TunnelSettings::default());
        assert!(matches!(
            provider.connect(0).await,
            Err(TunnelError::InvalidPort(0))
        ));
    }
}
