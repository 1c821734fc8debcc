//! Channel registry.
//!
//! Maps logical channels to the live sessions subscribed to them:
//! - `room:{name}` - every session connected to a chat room
//! - `user:{id}` - every live session of one user, so a user with several
//!   tabs or devices receives calls on all of them
//!
//! Both maps are sharded (`DashMap`), so publishers on different channels do
//! not contend. A reverse index from session to channels makes
//! [`ChannelRegistry::drop_session`] proportional to the session's own
//! memberships.
//!
//! # Fan-out
//!
//! [`ChannelRegistry::publish`] snapshots the subscriber set, releases the
//! shard lock, then enqueues with `try_send`. It never awaits socket I/O. A
//! subscriber whose queue is full or closed is cancelled; its transport loop
//! notices, and the session's drop guard removes it from every channel.

use super::session::{DeliveryError, SessionHandle};
use crate::observability::metrics;
use crate::signaling::envelope::{Frame, OutboundEnvelope};
use common::types::{SessionId, UserId};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// A logical fan-out destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Room(String),
    User(UserId),
}

impl Channel {
    #[must_use]
    pub fn room(name: &str) -> Self {
        Channel::Room(name.to_string())
    }

    #[must_use]
    pub fn user(id: &UserId) -> Self {
        Channel::User(id.clone())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Room(name) => write!(f, "room:{name}"),
            Channel::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Concurrent channel → sessions map.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<Channel, HashMap<SessionId, SessionHandle>>,
    memberships: DashMap<SessionId, HashSet<Channel>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` to `channel`. Subscribing twice is a no-op.
    pub fn subscribe(&self, channel: Channel, session: &SessionHandle) {
        let session_id = session.id();

        // Shard guards are scoped so the two maps are never locked together
        {
            let mut subscribers = self.channels.entry(channel.clone()).or_default();
            subscribers
                .entry(session_id)
                .or_insert_with(|| session.clone());
        }
        self.memberships
            .entry(session_id)
            .or_default()
            .insert(channel.clone());

        debug!(
            target: "signal.registry",
            session_id = %session_id,
            channel = %channel,
            "Session subscribed"
        );
        metrics::set_channels_active(self.channels.len());
    }

    /// Remove `session_id` from `channel`. Missing entries are ignored.
    pub fn unsubscribe(&self, channel: &Channel, session_id: SessionId) {
        self.remove_from_channel(channel, session_id);

        if let Some(mut joined) = self.memberships.get_mut(&session_id) {
            joined.remove(channel);
        }
        self.memberships
            .remove_if(&session_id, |_, joined| joined.is_empty());

        metrics::set_channels_active(self.channels.len());
    }

    /// Encode `envelope` once and enqueue it for every subscriber.
    ///
    /// Returns the number of sessions the frame was enqueued for. Missing
    /// channels deliver to nobody.
    pub fn publish(&self, channel: &Channel, envelope: &OutboundEnvelope) -> usize {
        match envelope.encode() {
            Ok(frame) => self.publish_frame(channel, &frame),
            Err(e) => {
                warn!(target: "signal.registry", channel = %channel, error = %e, "Publish skipped");
                0
            }
        }
    }

    /// Enqueue an already encoded frame for every subscriber of `channel`.
    pub fn publish_frame(&self, channel: &Channel, frame: &Frame) -> usize {
        let subscribers: Vec<SessionHandle> = match self.channels.get(channel) {
            Some(entry) => entry.values().cloned().collect(),
            None => {
                debug!(
                    target: "signal.registry",
                    channel = %channel,
                    message_type = frame.message_type(),
                    "Publish to empty channel"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for session in subscribers {
            match session.try_deliver(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(
                        target: "signal.registry",
                        session_id = %session.id(),
                        channel = %channel,
                        "Session queue full, evicting lagging session"
                    );
                    metrics::record_dropped_delivery("full");
                    session.cancel();
                }
                Err(DeliveryError::Closed) => {
                    debug!(
                        target: "signal.registry",
                        session_id = %session.id(),
                        channel = %channel,
                        "Session already closed"
                    );
                    metrics::record_dropped_delivery("closed");
                    session.cancel();
                }
            }
        }

        metrics::record_deliveries(delivered);
        delivered
    }

    /// Remove a session from every channel it joined. Idempotent.
    ///
    /// Returns the number of channels the session was removed from.
    pub fn drop_session(&self, session_id: SessionId) -> usize {
        let Some((_, joined)) = self.memberships.remove(&session_id) else {
            return 0;
        };

        for channel in &joined {
            self.remove_from_channel(channel, session_id);
        }

        debug!(
            target: "signal.registry",
            session_id = %session_id,
            channels = joined.len(),
            "Session dropped from registry"
        );
        metrics::set_channels_active(self.channels.len());
        joined.len()
    }

    #[must_use]
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.channels.get(channel).map_or(0, |entry| entry.len())
    }

    /// Number of non-empty channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sessions with at least one membership.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.memberships.len()
    }

    #[must_use]
    pub fn channels_of(&self, session_id: SessionId) -> Vec<Channel> {
        self.memberships
            .get(&session_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_from_channel(&self, channel: &Channel, session_id: SessionId) {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.remove(&session_id);
        }
        self.channels
            .remove_if(channel, |_, subscribers| subscribers.is_empty());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::session::SessionMessage;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn session(capacity: usize) -> (SessionHandle, mpsc::Receiver<SessionMessage>) {
        SessionHandle::new(SessionId::new(), capacity, CancellationToken::new())
    }

    fn ping() -> OutboundEnvelope {
        OutboundEnvelope::Error {
            message: "ping".to_string(),
            error_code: None,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<SessionMessage>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::room("lobby").to_string(), "room:lobby");
        assert_eq!(Channel::user(&UserId::from("42")).to_string(), "user:42");
    }

    #[tokio::test]
    async fn test_publish_one_copy_per_session() {
        let registry = ChannelRegistry::new();
        let room = Channel::room("lobby");
        let (a, mut rx_a) = session(8);
        let (b, mut rx_b) = session(8);

        registry.subscribe(room.clone(), &a);
        registry.subscribe(room.clone(), &a);
        registry.subscribe(room.clone(), &b);

        assert_eq!(registry.subscriber_count(&room), 2);
        assert_eq!(registry.publish(&room, &ping()), 2);
        assert_eq!(drain(&mut rx_a), 1);
        assert_eq!(drain(&mut rx_b), 1);
    }

    #[tokio::test]
    async fn test_publish_to_missing_channel_is_noop() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.publish(&Channel::room("nowhere"), &ping()), 0);
    }

    #[tokio::test]
    async fn test_drop_session_is_idempotent_and_clears_memberships() {
        let registry = ChannelRegistry::new();
        let room = Channel::room("lobby");
        let user = Channel::user(&UserId::from("u1"));
        let (a, _rx_a) = session(8);

        registry.subscribe(room.clone(), &a);
        registry.subscribe(user.clone(), &a);
        assert_eq!(registry.channels_of(a.id()).len(), 2);

        assert_eq!(registry.drop_session(a.id()), 2);
        assert_eq!(registry.drop_session(a.id()), 0);

        assert!(registry.channels_of(a.id()).is_empty());
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.publish(&room, &ping()), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_other_memberships() {
        let registry = ChannelRegistry::new();
        let room = Channel::room("lobby");
        let user = Channel::user(&UserId::from("u1"));
        let (a, _rx_a) = session(8);
        let (b, _rx_b) = session(8);

        registry.subscribe(room.clone(), &a);
        registry.subscribe(room.clone(), &b);
        registry.subscribe(user.clone(), &a);

        registry.unsubscribe(&room, a.id());
        assert_eq!(registry.subscriber_count(&room), 1);
        assert_eq!(registry.channels_of(a.id()), vec![user.clone()]);

        // Unknown pairs are ignored
        registry.unsubscribe(&Channel::room("other"), a.id());
        registry.unsubscribe(&room, SessionId::new());
        assert_eq!(registry.subscriber_count(&room), 1);

        registry.unsubscribe(&room, b.id());
        assert_eq!(registry.subscriber_count(&room), 0);
        assert_eq!(registry.channel_count(), 1, "empty room channel removed");
    }

    #[tokio::test]
    async fn test_user_channel_reaches_every_device() {
        let registry = ChannelRegistry::new();
        let user = Channel::user(&UserId::from("u1"));
        let (phone, mut rx_phone) = session(8);
        let (laptop, mut rx_laptop) = session(8);

        registry.subscribe(user.clone(), &phone);
        registry.subscribe(user.clone(), &laptop);

        assert_eq!(registry.publish(&user, &ping()), 2);
        assert_eq!(drain(&mut rx_phone), 1);
        assert_eq!(drain(&mut rx_laptop), 1);
    }

    #[tokio::test]
    async fn test_full_queue_evicts_lagging_session() {
        let registry = ChannelRegistry::new();
        let room = Channel::room("busy");
        let (slow, _rx_slow) = session(1);
        let (fast, mut rx_fast) = session(8);

        registry.subscribe(room.clone(), &slow);
        registry.subscribe(room.clone(), &fast);

        assert_eq!(registry.publish(&room, &ping()), 2);
        assert_eq!(registry.publish(&room, &ping()), 1);

        assert!(slow.is_cancelled(), "lagging session cancelled");
        assert!(!fast.is_cancelled());
        assert_eq!(drain(&mut rx_fast), 2);
    }

    #[tokio::test]
    async fn test_closed_session_not_counted() {
        let registry = ChannelRegistry::new();
        let room = Channel::room("lobby");
        let (gone, rx_gone) = session(8);
        drop(rx_gone);

        registry.subscribe(room.clone(), &gone);
        assert_eq!(registry.publish(&room, &ping()), 0);
        assert!(gone.is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_and_drop() {
        let registry = std::sync::Arc::new(ChannelRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = std::sync::Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = session(4);
                let room = Channel::room(&format!("r{}", i % 4));
                registry.subscribe(room.clone(), &handle);
                registry.subscribe(Channel::user(&UserId::from("shared")), &handle);
                registry.publish(&room, &ping());
                registry.drop_session(handle.id());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.session_count(), 0);
    }
}
