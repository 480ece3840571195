//! Devbridge CLI - expose a local development server to a mobile device

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devbridge_lib::{
    Bridge, BridgeConfig, TunnelStatus, DEFAULT_API_PORT, DEFAULT_MAIN_PORT, DEFAULT_PROXY_PORT,
};
use devbridge_proto::ProviderKind;
use devbridge_push::{PushDispatcher, RelayClient, TokenStore, EXPO_PUSH_URL};
use devbridge_stream::{ConnectionState, SseConfig, SseConnectionManager};
use devbridge_tunnel::{TunnelManager, TunnelSettings};

/// Devbridge - reach your local dev server from your phone
#[derive(Parser, Debug)]
#[command(name = "devbridge")]
#[command(about = "Tunnel, proxy and push notifications for a local development server", long_about = None)]
#[command(version)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DEVBRIDGE_COMMIT"),
    ", built ",
    env!("DEVBRIDGE_BUILD_DATE"),
    ")"
))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Args, Debug, Clone)]
struct PushArgs {
    /// Push relay endpoint
    #[arg(long, env = "DEVBRIDGE_PUSH_RELAY", default_value = EXPO_PUSH_URL)]
    relay_url: String,

    /// Push token registry file (default: ~/.devbridge/push-tokens.json)
    #[arg(long, env = "DEVBRIDGE_TOKEN_STORE")]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge: tunnel, reverse proxy and token API
    Serve {
        /// Port of the development server
        #[arg(long, env = "DEVBRIDGE_MAIN_PORT", default_value_t = DEFAULT_MAIN_PORT)]
        main_port: u16,

        /// Port of the token API
        #[arg(long, env = "DEVBRIDGE_API_PORT", default_value_t = DEFAULT_API_PORT)]
        api_port: u16,

        /// Port of the reverse proxy the tunnel points at
        #[arg(long, env = "DEVBRIDGE_PROXY_PORT", default_value_t = DEFAULT_PROXY_PORT)]
        proxy_port: u16,

        /// Project path included in notifications (default: current directory)
        #[arg(long, env = "DEVBRIDGE_PROJECT")]
        project: Option<PathBuf>,

        /// Serve locally without opening a public tunnel
        #[arg(long)]
        no_tunnel: bool,

        /// Read newline-delimited JSON session events from stdin
        #[arg(long)]
        events_stdin: bool,

        #[command(flatten)]
        push: PushArgs,
    },

    /// Open a tunnel to a local port and keep it up until Ctrl+C
    Tunnel {
        #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT)]
        port: u16,

        /// Provider to try first (ngrok, cloudflared, localtunnel)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Send a test notification to every registered device
    PushTest {
        #[command(flatten)]
        push: PushArgs,
    },

    /// Follow a server-sent event stream with automatic reconnection
    Watch {
        /// Event stream URL, e.g. https://abc.ngrok.app/global/event
        url: String,

        /// For servers without a health endpoint: skip the check before
        /// connecting and the periodic heartbeat
        #[arg(long)]
        no_health_check: bool,
    },

    /// Show the tunnel and registered devices of a running bridge
    Status {
        #[arg(long, env = "DEVBRIDGE_API_PORT", default_value_t = DEFAULT_API_PORT)]
        api_port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            main_port,
            api_port,
            proxy_port,
            project,
            no_tunnel,
            events_stdin,
            push,
        } => {
            let project = match project {
                Some(path) => path,
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            let config = BridgeConfig {
                main_port,
                api_port,
                proxy_port,
                project_path: Some(project.display().to_string()),
                tunnel: !no_tunnel,
                relay_url: push.relay_url,
                store_path: push.store,
                ..BridgeConfig::from_env()
            };
            handle_serve(config, events_stdin).await
        }
        Commands::Tunnel { port, provider } => handle_tunnel(port, provider).await,
        Commands::PushTest { push } => handle_push_test(push).await,
        Commands::Watch {
            url,
            no_health_check,
        } => handle_watch(url, !no_health_check).await,
        Commands::Status { api_port } => handle_status(api_port).await,
    }
}

async fn handle_serve(config: BridgeConfig, events_stdin: bool) -> Result<()> {
    let bridge = Bridge::start(config).await?;

    if let Some(status) = bridge.context().tunnel().status().await {
        info!("📱 Connect your device to {}", status.url);
    } else if let Some(err) = bridge.tunnel_error() {
        warn!("No public tunnel ({}), devices must be on the local network", err.kind());
    }
    if let Some(addr) = bridge.proxy_addr() {
        info!("Local proxy: http://{}", addr);
    }

    let ingest = async {
        if events_stdin {
            info!("Reading session events from stdin");
            bridge
                .ingest_events(BufReader::new(tokio::io::stdin()))
                .await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Shutting down");
        }
        result = ingest => match result {
            Ok(count) => info!("Event input closed after {} event(s), shutting down", count),
            Err(e) => error!("Failed to read session events: {}", e),
        },
    }

    bridge.shutdown().await;
    Ok(())
}

async fn handle_tunnel(port: u16, provider: Option<String>) -> Result<()> {
    let preferred = match provider {
        Some(name) => Some(
            ProviderKind::parse(&name)
                .with_context(|| format!("Unknown provider '{}'", name))?,
        ),
        None => None,
    };

    let manager = TunnelManager::with_default_providers(&TunnelSettings::from_env());
    let info = manager.start_with(port, preferred).await?;
    println!("🌍 {} → http://localhost:{} ({})", info.url, info.port, info.provider);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    manager.stop().await;
    Ok(())
}

async fn handle_push_test(push: PushArgs) -> Result<()> {
    let store = push
        .store
        .or_else(TokenStore::default_path)
        .map(TokenStore::new)
        .context("Cannot locate a home directory for the push token store")?;
    let dispatcher = PushDispatcher::new(store, RelayClient::new(push.relay_url));

    let report = dispatcher
        .send_test()
        .await
        .context("Failed to send test notification")?;
    if report.attempted == 0 {
        println!("No devices registered");
    } else {
        println!(
            "Delivered to {}/{} device(s), {} invalid token(s) removed",
            report.delivered, report.attempted, report.pruned
        );
    }
    Ok(())
}

async fn handle_watch(url: String, health_check: bool) -> Result<()> {
    let config = SseConfig {
        health_check,
        heartbeat: health_check,
        ..Default::default()
    };
    let (manager, mut channels) = SseConnectionManager::spawn(config);
    let mut state = manager.subscribe_state();
    manager.connect(&url)?;

    loop {
        tokio::select! {
            Some(event) = channels.events.recv() => {
                println!("{} {}", event.event, event.data);
            }
            Some(err) = channels.errors.recv() => {
                eprintln!("❌ {}", err);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                let retry = manager.retry_state();
                match current {
                    ConnectionState::Reconnecting => eprintln!(
                        "… {} (retry {}, {} consecutive failure(s))",
                        current, retry.retry_count, retry.consecutive_failures
                    ),
                    _ => eprintln!("• {}", current),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

async fn handle_status(api_port: u16) -> Result<()> {
    let base = format!("http://127.0.0.1:{}", api_port);
    let client = reqwest::Client::new();

    let tunnel: TunnelStatus = client
        .get(format!("{}/tunnel", base))
        .send()
        .await
        .with_context(|| format!("No bridge answering on {}", base))?
        .json()
        .await
        .context("Unexpected /tunnel response")?;
    let devices: serde_json::Value = client
        .get(format!("{}/push-token", base))
        .send()
        .await?
        .json()
        .await
        .context("Unexpected /push-token response")?;

    match tunnel {
        TunnelStatus::Active(info) => println!(
            "Tunnel:  {} ({}, port {}, id {})",
            info.url, info.provider, info.port, info.tunnel_id
        ),
        TunnelStatus::None => println!("Tunnel:  none"),
    }
    println!("Devices: {}", devices["count"]);
    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
