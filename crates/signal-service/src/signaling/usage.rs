//! Daily message quota.
//!
//! Every check first rolls the user's counters over to today (persisting the
//! reset), then picks the cap:
//! - current subscription with an unlimited plan: no cap
//! - current subscription with a capped plan: the plan's cap
//! - otherwise: the free-tier limit
//!
//! Check and increment are separate store round trips, so two concurrent
//! sends may both pass at the boundary. The quota is soft.

use crate::errors::SignalError;
use crate::store::models::UsageRecord;
use crate::store::UsageStore;
use chrono::{DateTime, Utc};
use common::types::UserId;
use std::sync::Arc;
use tracing::debug;

/// Default free-tier daily message limit.
pub const DEFAULT_FREE_TIER_DAILY_LIMIT: u32 = 50;

/// Decides whether a user may send another chat message.
#[derive(Clone)]
pub struct UsageGate {
    store: Arc<dyn UsageStore>,
    free_tier_limit: u32,
}

impl UsageGate {
    pub fn new(store: Arc<dyn UsageStore>, free_tier_limit: u32) -> Self {
        Self {
            store,
            free_tier_limit,
        }
    }

    pub async fn can_send(&self, user: &UserId) -> Result<bool, SignalError> {
        self.can_send_at(user, Utc::now()).await
    }

    /// [`UsageGate::can_send`] against an explicit clock.
    pub async fn can_send_at(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, SignalError> {
        let record = self.load_current(user, now).await?;

        let cap = match self.store.get_subscription(user).await? {
            Some(subscription) if subscription.is_current(now) => subscription.plan.message_limit,
            _ => Some(self.free_tier_limit),
        };

        let allowed = cap.map_or(true, |cap| record.daily_count < cap);
        debug!(
            target: "signal.usage",
            user_id = %user,
            daily_count = record.daily_count,
            cap = ?cap,
            allowed = allowed,
            "Usage checked"
        );
        Ok(allowed)
    }

    pub async fn record_send(&self, user: &UserId) -> Result<(), SignalError> {
        self.record_send_at(user, Utc::now()).await
    }

    /// Count one sent message against both counters.
    pub async fn record_send_at(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), SignalError> {
        let mut record = self.load_current(user, now).await?;
        record.daily_count = record.daily_count.saturating_add(1);
        record.total_count = record.total_count.saturating_add(1);
        self.store.save_usage(&record).await?;
        Ok(())
    }

    /// Load the record, resetting and persisting it if it is from an earlier day.
    async fn load_current(
        &self,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, SignalError> {
        let today = now.date_naive();
        let mut record = self.store.get_or_create_usage(user, today).await?;
        if record.reset_if_stale(today) {
            debug!(target: "signal.usage", user_id = %user, "Daily count reset");
            self.store.save_usage(&record).await?;
        }
        Ok(record)
    }
}
