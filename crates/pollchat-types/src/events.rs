use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChatMessage, UserId};

/// Frames sent FROM client TO server over the WebSocket.
///
/// Every frame is a JSON object whose `type` field selects the variant.
/// The acting user is always the authenticated connection, so no variant
/// carries a sender or reader id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Send a direct message to another user
    SendMessage {
        recipient: UserId,
        #[serde(alias = "message")]
        body: String,
        /// Client-side placeholder id, echoed back in the confirmation
        #[serde(default)]
        temp_id: Option<String>,
    },

    /// Mark a message as read by this connection's user
    ReadReceipt { message_id: Uuid },

    /// Request the history between two participants
    FetchMessages { participants: [UserId; 2] },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// Not valid JSON, or not a JSON object
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Valid JSON that is not a well-formed event
    #[error("invalid event: {0}")]
    Invalid(String),
}

impl ClientEvent {
    /// Parse and validate one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| EventError::Malformed(e.to_string()))?;

        if !value.is_object() {
            return Err(EventError::Malformed("expected a JSON object".into()));
        }

        let event: ClientEvent =
            serde_json::from_value(value).map_err(|e| EventError::Invalid(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), EventError> {
        match self {
            Self::SendMessage { body, .. } if body.trim().is_empty() => {
                Err(EventError::Invalid("message body is empty".into()))
            }
            Self::FetchMessages { participants: [a, b] } if a == b => Err(EventError::Invalid(
                "participants must be two distinct users".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send-message",
            Self::ReadReceipt { .. } => "read-receipt",
            Self::FetchMessages { .. } => "fetch-messages",
        }
    }
}

/// Frames sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Connection accepted and registered
    Ready { user_id: UserId, username: String },

    /// A persisted message. Delivered to the recipient, and echoed to the
    /// sender with its `temp_id` so the sender can reconcile.
    SendMessage {
        message: ChatMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
    },

    /// `reader_id` has read `message_id`
    ReadReceipt { message_id: Uuid, reader_id: UserId },

    /// Reply to `fetch-messages`, oldest first
    FetchMessages {
        participants: [UserId; 2],
        messages: Vec<ChatMessage>,
    },

    /// The originating frame could not be handled
    Error { error: String },
}

impl ServerEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { error: msg.into() }
    }
}
