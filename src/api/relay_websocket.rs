use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::{RelayError, Result};
use crate::relay::{ConnectionSink, Membership, Role, RoomRegistry, ServerEvent, SignalEnvelope, WsSink};

/// How long a finished session waits for its writer to flush the close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handshake parameters of a signaling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub room: String,
    pub role: Role,
    pub name: Option<String>,
}

impl JoinRequest {
    /// `room` and `role` are required and must be non-empty; `name` is optional.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let room = params
            .get("room")
            .filter(|room| !room.is_empty())
            .ok_or(RelayError::MissingJoinParameter("room"))?;
        let role = params
            .get("role")
            .filter(|role| !role.is_empty())
            .ok_or(RelayError::MissingJoinParameter("role"))?;
        let name = params.get("name").filter(|name| !name.is_empty()).cloned();

        Ok(Self {
            room: room.clone(),
            role: Role::parse(role),
            name,
        })
    }
}

/// Result of waiting for the next frame from the client.
enum Inbound {
    Text(String),
    /// Binary, ping and pong frames carry nothing to relay.
    Skipped,
    Closed,
    Failed(RelayError),
}

async fn next_inbound(receiver: &mut SplitStream<WebSocket>) -> Inbound {
    match receiver.next().await {
        None => Inbound::Closed,
        Some(Err(e)) => Inbound::Failed(e.into()),
        Some(Ok(message)) if message.is_close() => Inbound::Closed,
        Some(Ok(message)) => match message.to_str() {
            Ok(text) => Inbound::Text(text.to_string()),
            Err(()) => Inbound::Skipped,
        },
    }
}

pub async fn handle_relay_websocket(websocket: WebSocket, request: JoinRequest, registry: RoomRegistry) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let sink: Arc<dyn ConnectionSink> = Arc::new(WsSink::new(tx));
    tracing::info!(
        connection = %sink.id(),
        room = %request.room,
        role = %request.role,
        "New signaling connection established"
    );

    // Spawn task to send messages to client
    let mut sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let (membership, _) = registry.join(&request.room, request.role, sink, request.name.clone());
    acknowledge(&membership, &request);

    relay_messages(&membership, &mut ws_receiver).await;

    // Leaves the room, prunes it if empty and closes the sink.
    drop(membership);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }
    tracing::info!(room = %request.room, role = %request.role, "Signaling connection closed");
}

fn acknowledge(membership: &Membership, request: &JoinRequest) {
    let event = ServerEvent::Joined {
        room: request.room.clone(),
        role: request.role,
        name: request.name.clone(),
    };

    match event.to_json() {
        Ok(json) => {
            if let Err(e) = membership.sink().send(&json) {
                tracing::debug!(error = %e, "Could not acknowledge join");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize join acknowledgement"),
    }
}

async fn relay_messages(membership: &Membership, receiver: &mut SplitStream<WebSocket>) {
    loop {
        match next_inbound(receiver).await {
            Inbound::Text(text) => handle_text(membership, &text),
            Inbound::Skipped => {}
            Inbound::Closed => break,
            Inbound::Failed(e) => {
                tracing::warn!(
                    room = %membership.room_key(),
                    role = %membership.role(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        }
    }
}

fn handle_text(membership: &Membership, text: &str) {
    match SignalEnvelope::parse(text) {
        Ok(envelope) => {
            let outcome = membership.relay(envelope.kind, text);
            tracing::debug!(
                room = %membership.room_key(),
                role = %membership.role(),
                kind = ?envelope.kind,
                outcome = ?outcome,
                "Handled signaling message"
            );
        }
        Err(e) => {
            tracing::warn!(
                room = %membership.room_key(),
                error = %e,
                raw_message = %text,
                "Discarding unparseable signaling message"
            );
        }
    }
}
