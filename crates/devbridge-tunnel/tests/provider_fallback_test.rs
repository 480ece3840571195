//! Fallback across real process adapters, with shell scripts standing in for
//! the provider binaries.

#![cfg(unix)]

use devbridge_tunnel::{
    CloudflaredProvider, LocaltunnelProvider, NgrokProvider, ProviderKind, TunnelManager,
    TunnelProvider, TunnelSettings,
};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn settings() -> TunnelSettings {
    TunnelSettings {
        // Nothing listens here, so no existing ngrok tunnel is found.
        ngrok_agent_api: "http://127.0.0.1:9".to_string(),
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_missing_primary_falls_back_to_secondary() {
    let dir = TempDir::new().unwrap();
    let cloudflared = write_script(
        &dir,
        "cloudflared",
        "echo 'INF Requesting new quick Tunnel on trycloudflare.com...' >&2\n\
         echo 'INF |  https://calm-river-42.trycloudflare.com  |' >&2\n\
         sleep 30",
    );

    let settings = settings();
    let providers: Vec<Arc<dyn TunnelProvider>> = vec![
        Arc::new(NgrokProvider::new(&settings).with_program("devbridge-missing-ngrok")),
        Arc::new(CloudflaredProvider::new(&settings).with_program(cloudflared.to_string_lossy())),
        Arc::new(LocaltunnelProvider::new(&settings).with_program("devbridge-missing-lt")),
    ];
    let manager = TunnelManager::new(providers);

    let info = manager.start(3000).await.unwrap();

    assert_eq!(info.provider, ProviderKind::Cloudflared);
    assert_eq!(info.url, "https://calm-river-42.trycloudflare.com");

    let again = manager.start(3000).await.unwrap();
    assert_eq!(again.tunnel_id, info.tunnel_id);

    assert!(manager.stop().await.is_some());
    assert!(manager.status().await.is_none());
}

#[tokio::test]
async fn test_auth_failure_then_clean_exit_then_success() {
    let dir = TempDir::new().unwrap();
    let ngrok = write_script(
        &dir,
        "ngrok",
        "echo 't=now lvl=eror msg=\"session closing\" err=\"authentication failed: ERR_NGROK_4018\"'\n\
         sleep 30",
    );
    let cloudflared = write_script(&dir, "cloudflared", "exit 0");
    let lt = write_script(&dir, "lt", "echo 'your url is: https://brave-owl.loca.lt'\nsleep 30");

    let settings = settings();
    let manager = TunnelManager::new(vec![
        Arc::new(NgrokProvider::new(&settings).with_program(ngrok.to_string_lossy())),
        Arc::new(CloudflaredProvider::new(&settings).with_program(cloudflared.to_string_lossy())),
        Arc::new(LocaltunnelProvider::new(&settings).with_program(lt.to_string_lossy())),
    ]);

    let info = manager.start(3000).await.unwrap();

    assert_eq!(info.provider, ProviderKind::Localtunnel);
    assert_eq!(info.url, "https://brave-owl.loca.lt");
    manager.stop().await;
}

#[tokio::test]
async fn test_every_provider_missing() {
    let settings = settings();
    let manager = TunnelManager::new(vec![
        Arc::new(NgrokProvider::new(&settings).with_program("devbridge-missing-ngrok")),
        Arc::new(CloudflaredProvider::new(&settings).with_program("devbridge-missing-cf")),
        Arc::new(LocaltunnelProvider::new(&settings).with_program("devbridge-missing-lt")),
    ]);

    let err = manager.start(3000).await.unwrap_err();

    assert_eq!(err.failures().len(), 3);
    let text = err.to_string();
    assert!(text.contains("ngrok"));
    assert!(text.contains("cloudflared"));
    assert!(text.contains("localtunnel"));
}
