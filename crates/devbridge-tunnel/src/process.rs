//! Launch a provider process and capture its public URL
//!
//! Providers print the assigned URL somewhere in their log output. Both
//! stdout and stderr are read line by line; the first line that yields a
//! URL resolves the launch. The pipes keep being drained afterwards so the
//! child never blocks on a full buffer.

use devbridge_proto::ProviderKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::error::TunnelError;
use crate::provider::{ProviderTunnel, TunnelHandle};

/// How to run one provider binary
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub provider: ProviderKind,
    pub program: String,
    pub args: Vec<String>,
    /// Pull the public URL out of a log line
    pub extract_url: fn(&str) -> Option<String>,
    /// Substrings meaning the credentials or plan were rejected
    pub auth_markers: &'static [&'static str],
    /// Substrings meaning a tunnel for this port is already online
    pub already_running_markers: &'static [&'static str],
    /// Shown with auth failures
    pub remediation: &'static str,
    pub connect_timeout: Duration,
}

/// Result of a launch that did not fail
#[derive(Debug)]
pub enum LaunchOutcome {
    Ready(ProviderTunnel),
    /// The provider refused because this port is already tunneled
    AlreadyRunning,
}

impl ProcessSpec {
    fn matches_any(line: &str, markers: &[&str]) -> bool {
        let lower = line.to_lowercase();
        markers.iter().any(|m| lower.contains(&m.to_lowercase()))
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>, provider: ProviderKind)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "devbridge_tunnel::output", "[{}] {}", provider, line);
                // Receiver is gone once the URL is captured; keep draining anyway.
                let _ = tx.send(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("[{}] output stream error: {}", provider, e);
                break;
            }
        }
    }
}

async fn kill(mut child: Child) {
    let _ = child.kill().await;
}

/// Spawn the provider and wait for its public URL.
///
/// Resolves exactly once: with the first captured URL, with an auth or
/// already-running marker, when the process exits, or at the deadline.
pub async fn launch(spec: &ProcessSpec) -> Result<LaunchOutcome, TunnelError> {
    let provider = spec.provider;
    debug!("Launching {} {:?}", spec.program, spec.args);

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TunnelError::Unavailable {
                    provider,
                    reason: format!("'{}' not found", spec.program),
                }
            } else {
                TunnelError::Spawn {
                    provider,
                    source: e,
                }
            }
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone(), provider));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx.clone(), provider));
    }
    drop(tx);

    let deadline = Instant::now() + spec.connect_timeout;
    let timed_out = TunnelError::Timeout {
        provider,
        after: spec.connect_timeout,
    };

    loop {
        let line = match timeout_at(deadline, rx.recv()).await {
            Ok(line) => line,
            Err(_) => {
                kill(child).await;
                return Err(timed_out);
            }
        };

        let Some(line) = line else {
            // Both pipes closed: the process is exiting without a URL.
            let status = match timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => status.to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => {
                    kill(child).await;
                    return Err(timed_out);
                }
            };
            return Err(TunnelError::ExitedEarly { provider, status });
        };

        if let Some(url) = (spec.extract_url)(&line) {
            info!("{} reported public URL {}", provider, url);
            return Ok(LaunchOutcome::Ready(ProviderTunnel {
                url,
                tunnel_id: uuid::Uuid::new_v4().to_string(),
                handle: TunnelHandle::Process(child),
            }));
        }

        if ProcessSpec::matches_any(&line, spec.auth_markers) {
            kill(child).await;
            return Err(TunnelError::Auth {
                provider,
                reason: line.trim().to_string(),
                remediation: spec.remediation,
            });
        }

        if ProcessSpec::matches_any(&line, spec.already_running_markers) {
            kill(child).await;
            return Ok(LaunchOutcome::AlreadyRunning);
        }
    }
}
