//! WebSocket connection from a participant runtime to the relay.
//!
//! Sends the hello frame, then runs a reader and a writer task. Frames to
//! send go through `sender()`; received frames arrive on the receiver
//! returned by `connect`. There is no automatic reconnect: when the
//! socket closes the receiver ends, and the caller reconnects with
//! `SignalingConfig::rejoin_id` set to keep its identity.

use std::time::Duration;

use duet_common::{ClientMessage, DuetError, ServerMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// e.g. `ws://127.0.0.1:3000`.
    pub url: String,
    pub display_name: Option<String>,
    /// Identity from an earlier connection to reclaim.
    pub rejoin_id: Option<String>,
    pub connect_timeout: Duration,
}

impl SignalingConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_name: None,
            rejoin_id: None,
            connect_timeout: Duration::from_secs(15),
        }
    }

    fn hello(&self) -> ClientMessage {
        match &self.rejoin_id {
            Some(participant_id) => ClientMessage::Rejoin {
                participant_id: participant_id.clone(),
            },
            None => ClientMessage::Join {
                display_name: self.display_name.clone(),
            },
        }
    }
}

/// Handle for sending frames to the relay.
#[derive(Clone)]
pub struct SignalingClient {
    command_tx: mpsc::Sender<ClientMessage>,
}

impl SignalingClient {
    /// Connect, send the hello, and start the background tasks.
    /// Returns `(client, server_frame_receiver)`.
    pub async fn connect(
        config: SignalingConfig,
    ) -> Result<(Self, mpsc::Receiver<ServerMessage>), DuetError> {
        info!(url = %config.url, "Connecting to relay");
        let (ws, _) = match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(DuetError::Network(format!("connection failed: {e}"))),
            Err(_) => return Err(DuetError::Network("connection timed out".into())),
        };

        let (mut sink, stream) = ws.split();
        send_frame(&mut sink, &config.hello())
            .await
            .map_err(|e| DuetError::Network(format!("failed to send hello: {e}")))?;

        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (pong_tx, pong_rx) = mpsc::channel(8);

        tokio::spawn(writer(sink, command_rx, pong_rx));
        tokio::spawn(reader(stream, event_tx, pong_tx));

        Ok((Self { command_tx }, event_rx))
    }

    /// Clone of the outbound channel, e.g. for `CallRuntime::new`.
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.command_tx.clone()
    }

    pub async fn send(&self, message: ClientMessage) -> Result<(), DuetError> {
        self.command_tx
            .send(message)
            .await
            .map_err(|_| DuetError::Network("signaling connection closed".into()))
    }

    pub fn is_connected(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

/// Forward outbound frames until every sender is dropped, then close.
async fn writer(
    mut sink: WsSink,
    mut command_rx: mpsc::Receiver<ClientMessage>,
    mut pong_rx: mpsc::Receiver<WsMessage>,
) {
    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(message) = command else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(e) = send_frame(&mut sink, &message).await {
                    debug!(error = %e, "Relay connection lost while sending");
                    break;
                }
            }
            Some(pong) = pong_rx.recv() => {
                if sink.send(pong).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn reader(
    mut stream: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    event_tx: mpsc::Sender<ServerMessage>,
    pong_tx: mpsc::Sender<WsMessage>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(message) => {
                    if event_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Unrecognized frame from relay"),
            },
            // Answered explicitly so an idle client still shows activity.
            Ok(WsMessage::Ping(payload)) => {
                let _ = pong_tx.try_send(WsMessage::Pong(payload));
            }
            Ok(WsMessage::Close(_)) => {
                info!("Relay closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Relay connection error");
                break;
            }
            _ => {}
        }
    }
}

async fn send_frame(
    sink: &mut WsSink,
    message: &ClientMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize client frame");
            return Ok(());
        }
    };
    sink.send(WsMessage::Text(json.into())).await
}
