//! Wire envelopes.
//!
//! Every frame is a JSON object with a `type` tag. Inbound frames decode into
//! [`InboundEnvelope`]; unknown tags are not an error and decode to `None` so
//! newer clients can talk to older servers. Outbound envelopes are encoded
//! once into a [`Frame`] and shared by every recipient.

use crate::errors::SignalError;
use crate::store::models::{ChatMessage, PublicIdentity};
use chrono::{DateTime, Utc};
use common::types::{CallId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Tags the router understands.
pub const INBOUND_TYPES: &[&str] = &[
    "message",
    "call_initiate",
    "call_answer",
    "call_reject",
    "call_end",
    "ice_candidate",
    "offer",
    "answer",
];

/// Client-to-server envelopes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEnvelope {
    Message {
        message: String,
    },
    CallInitiate {
        receiver_id: UserId,
    },
    CallAnswer {
        call_id: CallId,
    },
    CallReject {
        call_id: CallId,
    },
    CallEnd {
        call_id: CallId,
    },
    IceCandidate {
        target_id: UserId,
        candidate: Value,
    },
    Offer {
        target_id: UserId,
        offer: Value,
        #[serde(default)]
        call_id: Option<CallId>,
    },
    Answer {
        target_id: UserId,
        answer: Value,
        #[serde(default)]
        call_id: Option<CallId>,
    },
}

impl InboundEnvelope {
    /// The envelope's tag, for logs and metrics.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            InboundEnvelope::Message { .. } => "message",
            InboundEnvelope::CallInitiate { .. } => "call_initiate",
            InboundEnvelope::CallAnswer { .. } => "call_answer",
            InboundEnvelope::CallReject { .. } => "call_reject",
            InboundEnvelope::CallEnd { .. } => "call_end",
            InboundEnvelope::IceCandidate { .. } => "ice_candidate",
            InboundEnvelope::Offer { .. } => "offer",
            InboundEnvelope::Answer { .. } => "answer",
        }
    }
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid JSON")]
    NotJson,

    #[error("frame is not a JSON object")]
    NotObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("invalid fields for `{tag}`: {reason}")]
    InvalidFields { tag: String, reason: String },
}

impl From<DecodeError> for SignalError {
    fn from(err: DecodeError) -> Self {
        SignalError::InvalidMessage(err.to_string())
    }
}

/// Decode one text frame.
///
/// Returns `Ok(None)` for well-formed frames with an unknown tag.
///
/// # Errors
///
/// Returns [`DecodeError`] when the frame is not a JSON object with a string
/// `type`, or when a known tag has missing or ill-typed fields.
pub fn decode(text: &str) -> Result<Option<InboundEnvelope>, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|_| DecodeError::NotJson)?;

    let tag = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(DecodeError::MissingType),
        },
        _ => return Err(DecodeError::NotObject),
    };

    if !INBOUND_TYPES.contains(&tag.as_str()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| DecodeError::InvalidFields {
            tag,
            reason: e.to_string(),
        })
}

/// Why a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEndReason {
    /// A participant hung up.
    Hangup,
    /// Nobody answered before the ring timeout.
    Missed,
}

/// Server-to-client envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    ChatMessage {
        id: MessageId,
        room: String,
        message: String,
        sender: PublicIdentity,
        timestamp: DateTime<Utc>,
    },
    MessageHistory {
        room: String,
        messages: Vec<ChatMessage>,
    },
    ConnectionEstablished {
        session_id: String,
        user: PublicIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },
    IncomingCall {
        call_id: CallId,
        caller: PublicIdentity,
    },
    CallInitiated {
        call_id: CallId,
        receiver: PublicIdentity,
    },
    CallAnswered {
        call_id: CallId,
    },
    CallRejected {
        call_id: CallId,
    },
    CallEnded {
        call_id: CallId,
        reason: CallEndReason,
        duration: i64,
    },
    IceCandidate {
        candidate: Value,
        from_user: UserId,
    },
    Offer {
        offer: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        from_user: UserId,
    },
    Answer {
        answer: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
        from_user: UserId,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

impl OutboundEnvelope {
    /// Client-facing rendering of an error.
    #[must_use]
    pub fn from_error(err: &SignalError) -> Self {
        OutboundEnvelope::Error {
            message: err.client_message(),
            error_code: Some(err.error_code().to_string()),
        }
    }

    /// Chat broadcast for a persisted message.
    #[must_use]
    pub fn chat_message(message: ChatMessage) -> Self {
        OutboundEnvelope::ChatMessage {
            id: message.id,
            room: message.room,
            message: message.content,
            sender: message.sender,
            timestamp: message.timestamp,
        }
    }

    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            OutboundEnvelope::ChatMessage { .. } => "chat_message",
            OutboundEnvelope::MessageHistory { .. } => "message_history",
            OutboundEnvelope::ConnectionEstablished { .. } => "connection_established",
            OutboundEnvelope::IncomingCall { .. } => "incoming_call",
            OutboundEnvelope::CallInitiated { .. } => "call_initiated",
            OutboundEnvelope::CallAnswered { .. } => "call_answered",
            OutboundEnvelope::CallRejected { .. } => "call_rejected",
            OutboundEnvelope::CallEnded { .. } => "call_ended",
            OutboundEnvelope::IceCandidate { .. } => "ice_candidate",
            OutboundEnvelope::Offer { .. } => "offer",
            OutboundEnvelope::Answer { .. } => "answer",
            OutboundEnvelope::Error { .. } => "error",
        }
    }

    /// Serialize once for delivery.
    ///
    /// # Errors
    ///
    /// Returns `SignalError::Internal` if serialization fails.
    pub fn encode(&self) -> Result<Frame, SignalError> {
        let text = serde_json::to_string(self)
            .map_err(|e| SignalError::Internal(format!("envelope encoding failed: {e}")))?;
        Ok(Frame {
            message_type: self.message_type(),
            text: Arc::from(text),
        })
    }
}

/// An encoded outbound envelope. Cloning shares the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    message_type: &'static str,
    text: Arc<str>,
}

impl Frame {
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}
