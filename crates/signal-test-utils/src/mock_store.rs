//! Store mock with fault injection.
//!
//! `MockStore` delegates to an [`InMemoryStore`] and can be switched to fail
//! individual collaborators, so tests can drive the router's error paths
//! without a database.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::types::{CallId, UserId};
use signal_service::store::memory::InMemoryStore;
use signal_service::store::models::{
    CallRecord, CallStatus, ChatMessage, Identity, PublicIdentity, Subscription, UsageRecord,
};
use signal_service::store::{
    CallStore, MessageStore, StoreError, Stores, UsageStore, UserDirectory,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Which collaborator a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Users,
    Messages,
    Calls,
    Usage,
}

/// In-memory store with switchable faults and call counters.
///
/// # Example
/// ```rust,ignore
/// let store = Arc::new(MockStore::new().with_user(alice.identity()));
/// store.fail(Fault::Messages);
/// // chat messages now answer with INTERNAL_ERROR
/// ```
#[derive(Debug, Default)]
pub struct MockStore {
    inner: InMemoryStore,
    fail_users: AtomicBool,
    fail_messages: AtomicBool,
    fail_calls: AtomicBool,
    fail_usage: AtomicBool,
    user_delay: Option<Duration>,
    create_message_calls: AtomicUsize,
    usage_checks: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every collaborator fails.
    pub fn failing() -> Self {
        let store = Self::new();
        for fault in [Fault::Users, Fault::Messages, Fault::Calls, Fault::Usage] {
            store.fail(fault);
        }
        store
    }

    pub fn with_user(self, identity: Identity) -> Self {
        self.inner.insert_user(identity);
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.inner = self.inner.with_subscription(subscription);
        self
    }

    pub fn with_usage(mut self, record: UsageRecord) -> Self {
        self.inner = self.inner.with_usage(record);
        self
    }

    /// Delay every user lookup, to exercise the auth timeout.
    pub fn with_user_delay(mut self, delay: Duration) -> Self {
        self.user_delay = Some(delay);
        self
    }

    pub fn fail(&self, fault: Fault) {
        self.flag(fault).store(true, Ordering::SeqCst);
    }

    pub fn recover(&self, fault: Fault) {
        self.flag(fault).store(false, Ordering::SeqCst);
    }

    /// Number of `create_message` calls, including failed ones.
    pub fn create_message_calls(&self) -> usize {
        self.create_message_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_or_create_usage` calls, including failed ones.
    pub fn usage_checks(&self) -> usize {
        self.usage_checks.load(Ordering::SeqCst)
    }

    /// Persisted message count for `room`.
    pub fn message_count(&self, room: &str) -> usize {
        self.inner.message_count(room)
    }

    /// Collaborator set backed by this mock.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores::from_backend(Arc::clone(self))
    }

    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::Users => &self.fail_users,
            Fault::Messages => &self.fail_messages,
            Fault::Calls => &self.fail_calls,
            Fault::Usage => &self.fail_usage,
        }
    }

    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.flag(fault).load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{fault:?} store offline")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserDirectory for MockStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<Identity>, StoreError> {
        if let Some(delay) = self.user_delay {
            tokio::time::sleep(delay).await;
        }
        self.check(Fault::Users)?;
        self.inner.get_user(id).await
    }
}

#[async_trait]
impl MessageStore for MockStore {
    async fn create_message(
        &self,
        room: &str,
        sender: &PublicIdentity,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        self.create_message_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Fault::Messages)?;
        self.inner.create_message(room, sender, content).await
    }

    async fn query_recent(&self, room: &str, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        self.check(Fault::Messages)?;
        self.inner.query_recent(room, limit).await
    }
}

#[async_trait]
impl CallStore for MockStore {
    async fn create_call(
        &self,
        caller: &UserId,
        receiver: &UserId,
    ) -> Result<CallRecord, StoreError> {
        self.check(Fault::Calls)?;
        self.inner.create_call(caller, receiver).await
    }

    async fn get_call(&self, id: CallId) -> Result<Option<CallRecord>, StoreError> {
        self.check(Fault::Calls)?;
        self.inner.get_call(id).await
    }

    async fn update_call_if_status(
        &self,
        expected: CallStatus,
        updated: &CallRecord,
    ) -> Result<bool, StoreError> {
        self.check(Fault::Calls)?;
        self.inner.update_call_if_status(expected, updated).await
    }
}

#[async_trait]
impl UsageStore for MockStore {
    async fn get_or_create_usage(
        &self,
        user: &UserId,
        today: NaiveDate,
    ) -> Result<UsageRecord, StoreError> {
        self.usage_checks.fetch_add(1, Ordering::SeqCst);
        self.check(Fault::Usage)?;
        self.inner.get_or_create_usage(user, today).await
    }

    async fn save_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.check(Fault::Usage)?;
        self.inner.save_usage(record).await
    }

    async fn get_subscription(&self, user: &UserId) -> Result<Option<Subscription>, StoreError> {
        self.check(Fault::Usage)?;
        self.inner.get_subscription(user).await
    }
}
