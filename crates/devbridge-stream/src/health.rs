//! Health endpoint pre-check

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::SseError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// The `health` sibling of an event URL: `/global/event` → `/global/health`
pub fn health_url(event_url: &Url) -> Result<Url, SseError> {
    event_url.join("health").map_err(|e| SseError::InvalidUrl {
        url: event_url.to_string(),
        reason: e.to_string(),
    })
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<HealthStatus, SseError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SseError::Status {
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| SseError::InvalidHealth(e.to_string()))
}

/// Fetch the health document; anything but `{"healthy": true}` is an error
pub async fn check_health(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<HealthStatus, SseError> {
    debug!("Checking server health at {}", url);

    let health = tokio::time::timeout(timeout, fetch(client, url))
        .await
        .map_err(|_| SseError::Timeout {
            what: "Health check",
            after: timeout,
        })??;

    if health.healthy {
        Ok(health)
    } else {
        Err(SseError::Unhealthy {
            version: health.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url_is_sibling() {
        let url = Url::parse("https://abc.ngrok.app/global/event").unwrap();
        assert_eq!(
            health_url(&url).unwrap().as_str(),
            "https://abc.ngrok.app/global/health"
        );

        let url = Url::parse("http://127.0.0.1:4098/event?x=1").unwrap();
        assert_eq!(
            health_url(&url).unwrap().as_str(),
            "http://127.0.0.1:4098/health"
        );
    }

    #[test]
    fn test_health_document() {
        let status: HealthStatus =
            serde_json::from_str(r#"{"healthy":true,"version":"0.9.1"}"#).unwrap();
        assert!(status.healthy);
        assert_eq!(status.version.as_deref(), Some("0.9.1"));

        let status: HealthStatus = serde_json::from_str(r#"{"healthy":false}"#).unwrap();
        assert!(!status.healthy);
    }
}
