//! Per-connection handler: read the hello, register, then serve commands
//! and forward outbound frames until the socket closes.

use std::net::SocketAddr;
use std::time::Duration;

use duet_common::{ClientMessage, ServerMessage};
use duet_config::DuetConfig;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::pairing::PairingCoordinator;
use crate::store::ParticipantStore;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Per-connection tunables derived from the config.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub hello_timeout: Duration,
    pub channel_capacity: usize,
    /// Server-initiated pings keep idle but healthy clients from being reaped.
    pub ping_interval: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &DuetConfig) -> Self {
        let stale_after = u64::from(config.presence.stale_after_secs);
        Self {
            hello_timeout: Duration::from_secs(u64::from(config.server.hello_timeout_secs)),
            channel_capacity: config.server.channel_capacity as usize,
            ping_interval: Duration::from_secs((stale_after / 3).max(1)),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&DuetConfig::default())
    }
}

/// First frame a client must send.
enum Hello {
    Join { display_name: Option<String> },
    Rejoin { participant_id: String },
}

/// Handle a single WebSocket connection.
pub async fn handle_connection<S: ParticipantStore>(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    coordinator: PairingCoordinator<S>,
    settings: ConnectionSettings,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. Identify the client.
    let hello = match read_hello(&mut stream, addr, settings.hello_timeout).await {
        Ok(hello) => hello,
        Err(message) => {
            let _ = send_frame(&mut sink, &ServerMessage::Error { message }).await;
            return;
        }
    };

    // 2. Register the outbound channel. The coordinator queues `joined`
    //    and the presence list on it.
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(settings.channel_capacity);
    let admission = match hello {
        Hello::Join { display_name } => coordinator.join(display_name, tx).await,
        Hello::Rejoin { participant_id } => coordinator.rejoin(&participant_id, tx).await,
    };
    let participant_id = admission.participant.id.clone();

    info!(peer = %addr, participant = %participant_id, "Client registered");

    // 3. Serve until either side goes away.
    let mut ping = tokio::time::interval(settings.ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if send_frame(&mut sink, &message).await.is_err() {
                            break;
                        }
                    }
                    // Channel detached: superseded by a rejoin or reaped.
                    None => break,
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        coordinator.touch(&participant_id).await;
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => {
                                handle_client_message(&coordinator, &participant_id, message).await;
                            }
                            Err(e) => {
                                warn!(participant = %participant_id, error = %e, "Invalid client frame");
                                let reply = ServerMessage::Error {
                                    message: format!("invalid message: {e}"),
                                };
                                if send_frame(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        coordinator.touch(&participant_id).await;
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        coordinator.touch(&participant_id).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }

            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // 4. Cleanup.
    info!(peer = %addr, participant = %participant_id, "Client disconnected");
    coordinator
        .on_disconnect(&participant_id, admission.connection_id)
        .await;
}

/// Apply one command from an identified client.
async fn handle_client_message<S: ParticipantStore>(
    coordinator: &PairingCoordinator<S>,
    participant_id: &str,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join { .. } | ClientMessage::Rejoin { .. } => {
            debug!(participant = %participant_id, "Ignoring repeated hello");
        }
        ClientMessage::ToggleEngagement { target_id } => {
            if let Err(reason) = coordinator
                .toggle_engagement(participant_id, &target_id)
                .await
            {
                debug!(participant = %participant_id, target = %target_id, %reason, "Toggle rejected");
            }
        }
        ClientMessage::ReleaseEngagement => {
            if let Err(reason) = coordinator.release_engagement(participant_id).await {
                debug!(participant = %participant_id, %reason, "Release ignored");
            }
        }
        ClientMessage::MicState { mic_on } => {
            coordinator
                .relay()
                .broadcast(ServerMessage::MicState {
                    participant_id: participant_id.to_string(),
                    mic_on,
                })
                .await;
        }
        signal => {
            if let Some(signal) = signal.into_signal(participant_id) {
                coordinator
                    .relay()
                    .relay(signal.kind, &signal.from_id, &signal.to_id, signal.payload)
                    .await;
            }
        }
    }
}

/// Read and parse the first frame as a join or rejoin.
async fn read_hello(
    stream: &mut WsStream,
    addr: SocketAddr,
    timeout: Duration,
) -> Result<Hello, String> {
    let frame = tokio::time::timeout(timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => {
            match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Join { display_name }) => Ok(Hello::Join { display_name }),
                Ok(ClientMessage::Rejoin { participant_id }) => {
                    Ok(Hello::Rejoin { participant_id })
                }
                Ok(other) => {
                    warn!(peer = %addr, message = ?other, "Expected join or rejoin");
                    Err("expected join or rejoin".into())
                }
                Err(e) => {
                    warn!(peer = %addr, error = %e, "Invalid hello message");
                    Err(format!("invalid hello: {e}"))
                }
            }
        }
        Ok(Some(Ok(_))) => {
            warn!(peer = %addr, "Expected text hello, got non-text frame");
            Err("expected text hello".into())
        }
        Ok(Some(Err(e))) => {
            warn!(peer = %addr, error = %e, "WS error during hello");
            Err("connection error".into())
        }
        Ok(None) => {
            debug!(peer = %addr, "Connection closed before hello");
            Err("closed before hello".into())
        }
        Err(_) => {
            warn!(peer = %addr, timeout = ?timeout, "Hello timeout");
            Err("hello timeout".into())
        }
    }
}

/// Send a `ServerMessage` as a JSON text frame.
async fn send_frame(
    sink: &mut WsSink,
    message: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize server frame");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
