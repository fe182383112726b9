//! duet-relay: WebSocket presence and signaling server.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use duet_relay::{coordinator_from_config, serve, spawn_reaper, ConnectionSettings};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "duet-relay", about = "Presence and signaling relay for duet voice sessions")]
struct Args {
    /// Port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds without activity before a participant is reaped.
    #[arg(long)]
    stale_after: Option<u32>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset, e.g. `debug`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config_result = duet_config::load_config(args.config.as_deref());
    let mut config = match &config_result {
        Ok(config) => config.clone(),
        Err(_) => duet_config::DuetConfig::default(),
    };

    let fallback_filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("duet_relay={}", config.logging.level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_filter.into()),
        )
        .init();

    if let Err(e) = &config_result {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
    }

    if let Some(port) = args.port {
        config.server.port = u32::from(port);
    }
    if let Some(stale_after) = args.stale_after {
        config.presence.stale_after_secs = stale_after;
    }

    let coordinator = coordinator_from_config(&config);
    let settings = ConnectionSettings::from_config(&config);

    let addr = config.server.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!("duet-relay listening on {}", addr);

    spawn_reaper(
        coordinator.clone(),
        Duration::from_secs(u64::from(config.presence.stale_after_secs)),
        Duration::from_secs(u64::from(config.presence.reap_interval_secs)),
    );

    serve(listener, coordinator, settings).await;
}
