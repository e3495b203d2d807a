use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::room::Role;
use crate::error::{RelayError, Result};

/// The `type` field of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Join,
    Offer,
    Answer,
    IceCandidate,
    Unknown,
}

impl MessageKind {
    pub fn from_type(value: &str) -> Self {
        match value {
            "join" => MessageKind::Join,
            "offer" => MessageKind::Offer,
            "answer" => MessageKind::Answer,
            "ice-candidate" => MessageKind::IceCandidate,
            _ => MessageKind::Unknown,
        }
    }

    /// Negotiation messages are relayed to the peer role.
    pub fn is_negotiation(self) -> bool {
        matches!(
            self,
            MessageKind::Offer | MessageKind::Answer | MessageKind::IceCandidate
        )
    }
}

/// Only the routing field of an inbound message is read; the rest of the
/// payload is forwarded verbatim.
#[derive(Debug)]
pub struct SignalEnvelope {
    pub kind: MessageKind,
}

impl SignalEnvelope {
    /// Accepts only a JSON object carrying a string `type`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::invalid_message(e.to_string()))?;

        let object = value
            .as_object()
            .ok_or_else(|| RelayError::invalid_message("envelope is not a JSON object"))?;

        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::invalid_message("missing string field 'type'"))?;

        Ok(Self {
            kind: MessageKind::from_type(kind),
        })
    }
}

/// Events the relay itself emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Joined {
        room: String,
        role: Role,
        name: Option<String>,
    },

    Info {
        text: String,
        room: String,
        from_role: Role,
    },
}

impl ServerEvent {
    pub fn presence(room: &str, role: Role, name: Option<&str>, connected: bool) -> Self {
        let state = if connected { "connected" } else { "disconnected" };
        let text = match name {
            Some(name) if !name.is_empty() => format!("{} {} {}", role, name, state),
            _ => format!("{} {}", role, state),
        };

        ServerEvent::Info {
            text,
            room: room.to_string(),
            from_role: role,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
