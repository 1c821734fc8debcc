//! Signal service error types.
//!
//! Each error maps to a machine-readable `error_code` carried in `error`
//! envelopes. Internal details are logged server-side but never sent to
//! clients.

use crate::store::models::CallStatus;
use crate::store::StoreError;
use common::types::CallId;
use thiserror::Error;

/// Signal service error type.
///
/// Client error codes:
/// - `InvalidMessage`: `INVALID_MESSAGE`
/// - `MessageTooLarge`: `MESSAGE_TOO_LARGE`
/// - `Unauthorized`: `UNAUTHORIZED`
/// - `NotInRoom`: `NOT_IN_ROOM`
/// - `MessageLimitExceeded`: `MESSAGE_LIMIT_EXCEEDED`
/// - `UserNotFound`: `USER_NOT_FOUND`
/// - `InvalidTarget`: `INVALID_TARGET`
/// - `CallNotFound`, `NotParticipant`, `InvalidTransition`: call errors, logged only
/// - Store, Channel, Config, Internal: `INTERNAL_ERROR`
#[derive(Debug, Error)]
pub enum SignalError {
    /// Persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Envelope could not be decoded or failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Inbound frame exceeds the configured size limit.
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Operation requires an authenticated principal.
    #[error("Unauthorized")]
    Unauthorized,

    /// Chat message sent on a session with no room.
    #[error("Session is not in a room")]
    NotInRoom,

    /// Daily message quota exhausted.
    #[error("Message limit exceeded")]
    MessageLimitExceeded,

    /// Target user does not exist.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Target user is not a valid call target (e.g. the sender).
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Call not found: {0}")]
    CallNotFound(CallId),

    /// Sender is not a party to the call.
    #[error("Not a participant of call {0}")]
    NotParticipant(CallId),

    /// Event not allowed from the call's current status.
    #[error("Invalid call transition: {event} from {from:?}")]
    InvalidTransition { from: CallStatus, event: &'static str },

    /// Internal channel closed or full.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Machine-readable code for `error` envelopes.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SignalError::InvalidMessage(_) => "INVALID_MESSAGE",
            SignalError::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            SignalError::Unauthorized => "UNAUTHORIZED",
            SignalError::NotInRoom => "NOT_IN_ROOM",
            SignalError::MessageLimitExceeded => "MESSAGE_LIMIT_EXCEEDED",
            SignalError::UserNotFound(_) => "USER_NOT_FOUND",
            SignalError::InvalidTarget(_) => "INVALID_TARGET",
            SignalError::CallNotFound(_) => "CALL_NOT_FOUND",
            SignalError::NotParticipant(_) => "FORBIDDEN",
            SignalError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SignalError::Store(_)
            | SignalError::Channel(_)
            | SignalError::Config(_)
            | SignalError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalError::InvalidMessage(_) => "Invalid message format".to_string(),
            SignalError::MessageTooLarge { max, .. } => {
                format!("Message too large (max {max} bytes)")
            }
            SignalError::Unauthorized => "Authentication required".to_string(),
            SignalError::NotInRoom => "Join a room before sending messages".to_string(),
            SignalError::MessageLimitExceeded => {
                "Message limit exceeded. Please upgrade to Pro plan.".to_string()
            }
            SignalError::UserNotFound(_) => "User not found".to_string(),
            SignalError::InvalidTarget(_) => "Invalid call target".to_string(),
            SignalError::CallNotFound(_) => "Call not found".to_string(),
            SignalError::NotParticipant(_) => "Not a participant of this call".to_string(),
            SignalError::InvalidTransition { .. } => "Invalid call state".to_string(),
            SignalError::Store(_)
            | SignalError::Channel(_)
            | SignalError::Config(_)
            | SignalError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether this error is a server-side fault rather than a client mistake.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.error_code() == "INTERNAL_ERROR"
    }
}
