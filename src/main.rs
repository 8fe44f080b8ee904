//! netlogin - log into captive-portal WiFi networks automatically
//!
//! Each known network has a request template. When we're associated with
//! one of them and have no internet access, the request is sent to satisfy
//! the captive portal.

mod error;
mod http;
mod login;
mod models;
mod monitor;
mod network;
mod networks;
mod placeholder;
mod settings;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use http::HttpClient;
use login::LoginExecutor;
use monitor::Monitor;
use network::{NetworkManagerClient, NetworkState};
use networks::NetworkTable;
use placeholder::SystemResolver;
use settings::Settings;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Size of the channel buffer for connection events
const EVENT_CHANNEL_SIZE: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "netlogin", version)]
#[command(about = "Log into WiFi networks automatically", long_about = None)]
struct Args {
    /// Listen for NetworkManager events and log in automatically when connecting
    #[arg(short, long, visible_alias = "daemon", conflicts_with = "network")]
    listen: bool,

    /// Log into the given network, without setting up an event listener
    #[arg(short, long, value_name = "NAME")]
    network: Option<String>,

    /// Verbosity level (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Settings file path (default: /etc/netlogin/config.{toml,json})
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref())?;

    init_logging(args.verbose, &settings.logging.level);

    let table = NetworkTable::load_sources(&settings.networks.dir, &settings.networks.file)
        .context("Failed to load network configuration")?;
    if table.is_empty() {
        tracing::warn!(
            "No networks configured! Add profiles to {} or {}",
            settings.networks.file.display(),
            settings.networks.dir.display()
        );
    } else {
        tracing::debug!(
            "Loaded {} network(s): {}",
            table.len(),
            table.names().join(", ")
        );
    }

    let transport = HttpClient::new(settings.http.timeout(), settings.http.connect_timeout())
        .context("Failed to build HTTP client")?;
    let resolver = SystemResolver::new(settings.interface.clone());
    let executor = LoginExecutor::new(
        Box::new(transport),
        Box::new(resolver),
        (&settings.reachability).into(),
    );
    let monitor = Monitor::new(table, executor);

    match args.network {
        Some(name) => run_network(&monitor, &name).await,
        None if args.listen => run_listener(&monitor).await,
        None => run_once(&monitor).await,
    }
}

/// `-v` raises our own log level; `RUST_LOG` overrides everything
fn init_logging(verbosity: u8, default_level: &str) {
    let filter = match verbosity {
        0 => default_level.to_string(),
        1 => "warn,netlogin=debug".to_string(),
        _ => "warn,netlogin=trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Log into one named network
async fn run_network(monitor: &Monitor, name: &str) -> Result<()> {
    if monitor.login_network(name).await? {
        tracing::info!("Logged into network {} successfully", name);
    } else {
        tracing::error!("Failure when logging into network {}", name);
    }
    Ok(())
}

/// Log into every configured network we're currently associated with
async fn run_once(monitor: &Monitor) -> Result<()> {
    let nm = NetworkManagerClient::new().await?;
    let summary = monitor.run_once(&nm).await?;

    tracing::info!(
        "Logged into {}/{} configured network(s), {} unconfigured",
        summary.succeeded,
        summary.attempted,
        summary.skipped.len()
    );
    Ok(())
}

/// Follow NetworkManager until we're told to stop
async fn run_listener(monitor: &Monitor) -> Result<()> {
    let nm = NetworkManagerClient::new().await?;
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    tracing::info!("Starting listener mode...");

    tokio::select! {
        res = nm.watch(tx) => {
            res.context("NetworkManager watch failed")?;
            tracing::warn!("NetworkManager signal stream ended");
        }
        _ = monitor.listen(rx) => {}
        _ = shutdown_signal() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
