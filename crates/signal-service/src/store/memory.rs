//! In-memory implementation of every persistence collaborator.
//!
//! Used when the service runs standalone and as the default backend in
//! tests. Data lives for the lifetime of the process.
//!
//! # Example
//!
//! ```rust,ignore
//! use signal_service::store::memory::InMemoryStore;
//!
//! let store = InMemoryStore::new()
//!     .with_user(alice)
//!     .with_subscription(pro_subscription);
//! ```

use super::models::{
    CallRecord, CallStatus, ChatMessage, Identity, PublicIdentity, Subscription, UsageRecord,
};
use super::{CallStore, MessageStore, StoreError, UsageStore, UserDirectory};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use common::types::{CallId, MessageId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-local store backed by hash maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InMemoryInner>>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    users: HashMap<UserId, Identity>,
    /// Messages per room in insertion order.
    messages: HashMap<String, Vec<ChatMessage>>,
    calls: HashMap<CallId, CallRecord>,
    usage: HashMap<UserId, UsageRecord>,
    subscriptions: HashMap<UserId, Subscription>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the directory.
    #[must_use]
    pub fn with_user(self, identity: Identity) -> Self {
        self.insert_user(identity);
        self
    }

    /// Attach a subscription to its user.
    #[must_use]
    pub fn with_subscription(self, subscription: Subscription) -> Self {
        if let Ok(mut inner) = self.lock() {
            inner
                .subscriptions
                .insert(subscription.user.clone(), subscription);
        }
        self
    }

    /// Seed a usage record.
    #[must_use]
    pub fn with_usage(self, record: UsageRecord) -> Self {
        if let Ok(mut inner) = self.lock() {
            inner.usage.insert(record.user.clone(), record);
        }
        self
    }

    /// Add or replace a user after construction.
    pub fn insert_user(&self, identity: Identity) {
        if let Ok(mut inner) = self.lock() {
            inner.users.insert(identity.id.clone(), identity);
        }
    }

    /// Number of persisted messages in `room`.
    #[must_use]
    pub fn message_count(&self, room: &str) -> usize {
        self.lock()
            .map(|inner| inner.messages.get(room).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.users.get(id).cloned())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create_message(
        &self,
        room: &str,
        sender: &PublicIdentity,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: MessageId::new(),
            room: room.to_string(),
            sender: sender.clone(),
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.lock()?
            .messages
            .entry(room.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn query_recent(&self, room: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.lock()?;
        let Some(messages) = inner.messages.get(room) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl CallStore for InMemoryStore {
    async fn create_call(
        &self,
        caller: &UserId,
        receiver: &UserId,
    ) -> Result<CallRecord, StoreError> {
        let record = CallRecord::new(caller.clone(), receiver.clone(), Utc::now());
        self.lock()?.calls.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_call(&self, id: CallId) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.lock()?.calls.get(&id).cloned())
    }

    async fn update_call_if_status(
        &self,
        expected: CallStatus,
        updated: &CallRecord,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.calls.get_mut(&updated.id) {
            Some(current) if current.status == expected => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UsageStore for InMemoryStore {
    async fn get_or_create_usage(
        &self,
        user: &UserId,
        today: NaiveDate,
    ) -> Result<UsageRecord, StoreError> {
        Ok(self
            .lock()?
            .usage
            .entry(user.clone())
            .or_insert_with(|| UsageRecord::new(user.clone(), today))
            .clone())
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.lock()?.usage.insert(record.user.clone(), record.clone());
        Ok(())
    }

    async fn get_subscription(&self, user: &UserId) -> Result<Option<Subscription>, StoreError> {
        Ok(self.lock()?.subscriptions.get(user).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            id: UserId::from(id),
            email: format!("{id}@example.com"),
            first_name: id.to_string(),
            last_name: "Tester".to_string(),
            is_verified: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_get_user_known_and_unknown() {
        let store = InMemoryStore::new().with_user(identity("alice"));

        let found = store.get_user(&UserId::from("alice")).await.unwrap();
        assert_eq!(found.map(|u| u.email), Some("alice@example.com".to_string()));
        assert!(store.get_user(&UserId::from("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_recent_returns_tail_oldest_first() {
        let store = InMemoryStore::new();
        let sender = identity("alice").public();

        for i in 0..5 {
            store
                .create_message("lobby", &sender, &format!("m{i}"))
                .await
                .unwrap();
        }

        let recent = store.query_recent("lobby", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        assert!(store.query_recent("empty", 10).await.unwrap().is_empty());
        assert_eq!(store.message_count("lobby"), 5);
    }

    #[tokio::test]
    async fn test_update_call_if_status_compares_status() {
        let store = InMemoryStore::new();
        let call = store
            .create_call(&UserId::from("a"), &UserId::from("b"))
            .await
            .unwrap();

        let mut ringing = call.clone();
        ringing.status = CallStatus::Ringing;
        assert!(store
            .update_call_if_status(CallStatus::Initiated, &ringing)
            .await
            .unwrap());

        // Stale expectation loses
        let mut rejected = call.clone();
        rejected.status = CallStatus::Rejected;
        assert!(!store
            .update_call_if_status(CallStatus::Initiated, &rejected)
            .await
            .unwrap());

        let stored = store.get_call(call.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Ringing);
    }

    #[tokio::test]
    async fn test_update_unknown_call_returns_false() {
        let store = InMemoryStore::new();
        let ghost = CallRecord::new(UserId::from("a"), UserId::from("b"), Utc::now());
        assert!(!store
            .update_call_if_status(CallStatus::Initiated, &ghost)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_usage_created_once_and_saved() {
        let store = InMemoryStore::new();
        let user = UserId::from("u");
        let today = Utc::now().date_naive();

        let mut record = store.get_or_create_usage(&user, today).await.unwrap();
        assert_eq!(record.daily_count, 0);

        record.daily_count = 7;
        store.save_usage(&record).await.unwrap();

        let again = store.get_or_create_usage(&user, today).await.unwrap();
        assert_eq!(again.daily_count, 7);
    }
}
