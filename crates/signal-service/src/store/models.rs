//! Records exchanged with the persistence collaborators.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use common::types::{CallId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// A user known to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub is_active: bool,
}

impl Identity {
    /// Fields that may be shown to other users.
    #[must_use]
    pub fn public(&self) -> PublicIdentity {
        PublicIdentity {
            id: self.id.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Identity snapshot embedded in envelopes sent to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Lifecycle status of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    Ended,
    Missed,
    Rejected,
}

impl CallStatus {
    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Missed | Self::Rejected)
    }

    /// Wire and metrics label for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::Ended => "ended",
            Self::Missed => "missed",
            Self::Rejected => "rejected",
        }
    }
}

/// Persisted state of a single call between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub caller: UserId,
    pub receiver: UserId,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Whole seconds between answer and end; 0 for unanswered calls.
    pub duration: i64,
}

impl CallRecord {
    /// A freshly initiated call.
    #[must_use]
    pub fn new(caller: UserId, receiver: UserId, started_at: DateTime<Utc>) -> Self {
        Self {
            id: CallId::new(),
            caller,
            receiver,
            status: CallStatus::Initiated,
            started_at,
            answered_at: None,
            ended_at: None,
            duration: 0,
        }
    }

    #[must_use]
    pub fn is_participant(&self, user: &UserId) -> bool {
        &self.caller == user || &self.receiver == user
    }

    /// The participant who is not `user`, or `None` if `user` is not part of
    /// the call.
    #[must_use]
    pub fn other_party(&self, user: &UserId) -> Option<&UserId> {
        if &self.caller == user {
            Some(&self.receiver)
        } else if &self.receiver == user {
            Some(&self.caller)
        } else {
            None
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room: String,
    pub sender: PublicIdentity,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-user message counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub user: UserId,
    pub daily_count: u32,
    pub total_count: u64,
    pub last_reset_date: NaiveDate,
}

impl UsageRecord {
    #[must_use]
    pub fn new(user: UserId, today: NaiveDate) -> Self {
        Self {
            user,
            daily_count: 0,
            total_count: 0,
            last_reset_date: today,
        }
    }

    /// Zero the daily counter when the record belongs to an earlier day.
    ///
    /// Returns `true` if the record changed and must be persisted.
    pub fn reset_if_stale(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date < today {
            self.daily_count = 0;
            self.last_reset_date = today;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Basic,
    Pro,
}

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub name: String,
    pub plan_type: PlanType,
    /// Daily message cap; `None` means unlimited.
    pub message_limit: Option<u32>,
    /// Subscription length; `None` means it never lapses.
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

/// A user's plan subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user: UserId,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Subscription {
    /// An active subscription starting at `start_date`, ending after the
    /// plan's duration if it has one.
    #[must_use]
    pub fn activate(user: UserId, plan: Plan, start_date: DateTime<Utc>) -> Self {
        let end_date = plan
            .duration_days
            .map(|days| start_date + ChronoDuration::days(i64::from(days)));
        Self {
            user,
            plan,
            status: SubscriptionStatus::Active,
            start_date,
            end_date,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| now > end)
    }

    /// Active and not past its end date.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && !self.is_expired(now)
    }

    /// Whole days left, or `None` for open-ended subscriptions.
    #[must_use]
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.end_date
            .map(|end| (end - now).num_days().max(0))
    }
}
