//! Persistence collaborators.
//!
//! Durable storage lives outside this service. The router and gates reach it
//! only through the traits below, so a database-backed implementation can be
//! swapped in without touching the session core. [`memory::InMemoryStore`]
//! implements every trait for single-process deployments and tests.

pub mod memory;
pub mod models;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::types::{CallId, UserId};
use models::{
    CallRecord, CallStatus, ChatMessage, Identity, PublicIdentity, Subscription, UsageRecord,
};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a persistence collaborator.
///
/// Messages are for server-side logs only; clients see a generic error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("store internal error: {0}")]
    Internal(String),
}

/// Looks up users owned by the identity provider.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by id. `Ok(None)` if the user does not exist.
    async fn get_user(&self, id: &UserId) -> Result<Option<Identity>, StoreError>;
}

/// Chat message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its assigned id and timestamp.
    async fn create_message(
        &self,
        room: &str,
        sender: &PublicIdentity,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// The most recent `limit` messages of `room`, oldest first.
    async fn query_recent(&self, room: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;
}

/// Call record persistence.
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Create a call in the `initiated` status.
    async fn create_call(&self, caller: &UserId, receiver: &UserId)
        -> Result<CallRecord, StoreError>;

    async fn get_call(&self, id: CallId) -> Result<Option<CallRecord>, StoreError>;

    /// Replace the stored record with `updated` only if its current status is
    /// still `expected`.
    ///
    /// Returns `Ok(false)` when the status has moved on or the call is gone.
    async fn update_call_if_status(
        &self,
        expected: CallStatus,
        updated: &CallRecord,
    ) -> Result<bool, StoreError>;
}

/// Message usage and subscription persistence.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Load the user's usage record, creating a zeroed one dated `today` if
    /// none exists.
    async fn get_or_create_usage(
        &self,
        user: &UserId,
        today: NaiveDate,
    ) -> Result<UsageRecord, StoreError>;

    async fn save_usage(&self, record: &UsageRecord) -> Result<(), StoreError>;

    async fn get_subscription(&self, user: &UserId) -> Result<Option<Subscription>, StoreError>;
}

/// The full set of collaborators the service needs.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub calls: Arc<dyn CallStore>,
    pub usage: Arc<dyn UsageStore>,
}

impl Stores {
    /// Use one backend for every collaborator.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: UserDirectory + MessageStore + CallStore + UsageStore + 'static,
    {
        Self {
            users: Arc::clone(&backend) as Arc<dyn UserDirectory>,
            messages: Arc::clone(&backend) as Arc<dyn MessageStore>,
            calls: Arc::clone(&backend) as Arc<dyn CallStore>,
            usage: backend as Arc<dyn UsageStore>,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
