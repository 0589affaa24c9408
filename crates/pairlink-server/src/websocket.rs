//! WebSocket handlers for the pairing handshake and the signalling relay

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pairlink_core::{Error, Metadata};
use pairlink_signalling::{parse_message, ConnectionSink, IncomingMessage};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

enum SinkCommand {
    Send(String),
    Close,
}

/// Bridges the sync [`ConnectionSink`] capability onto the socket's
/// writer task.
struct WsSink {
    tx: mpsc::UnboundedSender<SinkCommand>,
}

impl ConnectionSink for WsSink {
    fn send_message(&self, message: String) {
        // A send after the socket closed is dropped, by contract.
        let _ = self.tx.send(SinkCommand::Send(message));
    }

    fn disconnect(&self) {
        let _ = self.tx.send(SinkCommand::Close);
    }
}

/// WebSocket handler for signalling connections
pub async fn signalling_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_signalling_socket(socket, state))
}

async fn handle_signalling_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                SinkCommand::Send(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                SinkCommand::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut handler = state.signalling.on_connection(Arc::new(WsSink { tx: tx.clone() }));
    info!("signalling connection {} open", handler.connection_id());

    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("websocket receive error: {}", e);
                break;
            }
        };

        let result = match parse_message(&text) {
            Ok(IncomingMessage::Auth(auth)) => match auth.nonce {
                Some(nonce) => handler.on_auth_message(&auth.token, nonce).await,
                None => Err(Error::Validation("auth message missing nonce".to_string())),
            },
            Ok(IncomingMessage::Content(raw)) => handler.on_content_message(raw).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if e.is_terminal() {
                warn!("closing signalling connection: {}", e);
                let _ = tx.send(SinkCommand::Close);
                break;
            }
            // Malformed frames are logged and skipped; the connection
            // keeps its state.
            warn!("ignoring bad frame: {}", e);
        }
    }

    if let Err(e) = handler.on_disconnection().await {
        warn!("disconnect cleanup failed: {}", e);
    }
    writer.abort();
    info!("signalling connection {} closed", handler.connection_id());
}

/// First frame a responder sends on the pairing socket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairingHello {
    public_key: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// WebSocket handler for the push-based pairing handshake
pub async fn pairing_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_pairing_socket(socket, state))
}

/// One request per socket: the responder introduces itself, gets its
/// shortcode immediately, then the terminal outcome whenever the
/// handshake resolves. The server closes after pushing the outcome.
async fn handle_pairing_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let hello = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<PairingHello>(&text) {
                Ok(hello) => break hello,
                Err(e) => {
                    warn!("malformed pairing request: {}", e);
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("websocket receive error: {}", e);
                return;
            }
        }
    };

    let pending = match state
        .engine
        .create_pairing_request(&hello.public_key, hello.metadata)
        .await
    {
        Ok(pending) => pending,
        Err(e) => {
            warn!("failed to create pairing request: {}", e);
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    info!("pairing {} awaiting redemption", pending.pairing_id());

    let initial = match serde_json::to_string(pending.initial_data()) {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to encode pairing data: {}", e);
            return;
        }
    };
    if socket.send(Message::Text(initial)).await.is_err() {
        return;
    }

    let outcome = pending.redemption_result().await;
    if let Ok(json) = serde_json::to_string(&outcome) {
        let _ = socket.send(Message::Text(json)).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}
