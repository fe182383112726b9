//! Accept loop and background reaper.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};

use crate::connection::{handle_connection, ConnectionSettings};
use crate::pairing::PairingCoordinator;
use crate::store::ParticipantStore;

/// Accept WebSocket connections forever, one task per connection.
pub async fn serve<S: ParticipantStore>(
    listener: TcpListener,
    coordinator: PairingCoordinator<S>,
    settings: ConnectionSettings,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "duet-relay accepting connections");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let coordinator = coordinator.clone();
                let settings = settings.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, coordinator, settings).await,
                        Err(e) => {
                            warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Spawn the stale participant reaper. Every `interval`, participants idle
/// for longer than `stale_after` are treated as disconnected.
pub fn spawn_reaper<S: ParticipantStore>(
    coordinator: PairingCoordinator<S>,
    stale_after: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let reaped = coordinator.reap_stale(stale_after).await;
            let remaining = coordinator.relay().count().await;
            debug!(reaped = reaped.len(), participants = remaining, "Reaper tick");
        }
    })
}
