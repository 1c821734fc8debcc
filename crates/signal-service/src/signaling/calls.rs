//! Call state machine.
//!
//! | event  | valid from          | result   | side effect                               |
//! |--------|---------------------|----------|-------------------------------------------|
//! | ring   | initiated           | ringing  |                                           |
//! | answer | initiated, ringing  | answered | `answered_at = now`                       |
//! | reject | initiated, ringing  | rejected |                                           |
//! | miss   | initiated, ringing  | missed   | `ended_at = now`                          |
//! | end    | answered            | ended    | `ended_at = now`, duration from answer    |
//! | end    | initiated, ringing  | ended    | `ended_at = now`, duration 0              |
//!
//! `ended`, `rejected` and `missed` are terminal.
//!
//! Transitions are written with a compare-and-swap on the stored status. A
//! writer that loses the race re-reads the record and re-evaluates, so a
//! stale writer can never overwrite a newer status.

use crate::errors::SignalError;
use crate::observability::metrics;
use crate::store::models::{CallRecord, CallStatus};
use crate::store::CallStore;
use chrono::{DateTime, Utc};
use common::types::{CallId, UserId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Attempts before giving up on a contended call record.
pub const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Ring,
    Answer,
    Reject,
    Miss,
    End,
}

impl CallEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallEvent::Ring => "ring",
            CallEvent::Answer => "answer",
            CallEvent::Reject => "reject",
            CallEvent::Miss => "miss",
            CallEvent::End => "end",
        }
    }
}

/// Compute the record that results from applying `event` at `now`.
///
/// # Errors
///
/// Returns `SignalError::InvalidTransition` if `event` is not allowed from
/// the record's current status.
pub fn apply_event(
    record: &CallRecord,
    event: CallEvent,
    now: DateTime<Utc>,
) -> Result<CallRecord, SignalError> {
    use CallStatus::{Answered, Ended, Initiated, Missed, Rejected, Ringing};

    let mut next = record.clone();
    match (record.status, event) {
        (Initiated, CallEvent::Ring) => next.status = Ringing,
        (Initiated | Ringing, CallEvent::Answer) => {
            next.status = Answered;
            next.answered_at = Some(now);
        }
        (Initiated | Ringing, CallEvent::Reject) => next.status = Rejected,
        (Initiated | Ringing, CallEvent::Miss) => {
            next.status = Missed;
            next.ended_at = Some(now);
        }
        (Answered, CallEvent::End) => {
            next.status = Ended;
            next.ended_at = Some(now);
            next.duration = record
                .answered_at
                .map_or(0, |answered| (now - answered).num_seconds().max(0));
        }
        (Initiated | Ringing, CallEvent::End) => {
            next.status = Ended;
            next.ended_at = Some(now);
            next.duration = 0;
        }
        (from, event) => {
            return Err(SignalError::InvalidTransition {
                from,
                event: event.as_str(),
            })
        }
    }
    Ok(next)
}

/// A successfully applied transition.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Record as read immediately before the write.
    pub before: CallRecord,
    pub after: CallRecord,
}

/// Whether `user` may apply `event` to `record`.
fn may_apply(record: &CallRecord, event: CallEvent, user: &UserId) -> bool {
    match event {
        CallEvent::Answer | CallEvent::Reject => &record.receiver == user,
        _ => record.is_participant(user),
    }
}

/// Applies call events against the call store.
#[derive(Clone)]
pub struct CallStateMachine {
    calls: Arc<dyn CallStore>,
}

impl CallStateMachine {
    pub fn new(calls: Arc<dyn CallStore>) -> Self {
        Self { calls }
    }

    /// Create a call in the `initiated` status.
    pub async fn create(
        &self,
        caller: &UserId,
        receiver: &UserId,
    ) -> Result<CallRecord, SignalError> {
        let record = self.calls.create_call(caller, receiver).await?;
        debug!(target: "signal.calls", call_id = %record.id, "Call created");
        Ok(record)
    }

    /// Apply `event` to a call.
    ///
    /// `actor` is the user requesting the change; `None` for server-driven
    /// events such as the ring timeout. Only the receiver may answer or reject;
    /// either participant may end.
    ///
    /// # Errors
    ///
    /// - `CallNotFound` if the call does not exist
    /// - `NotParticipant` if `actor` may not apply `event` to this call
    /// - `InvalidTransition` if the event is not allowed from the current status
    /// - `Store` for collaborator failures
    /// - `Internal` if the record kept changing underneath every attempt
    #[instrument(
        skip_all,
        name = "signal.calls.transition",
        fields(call_id = %call_id, event = event.as_str())
    )]
    pub async fn transition(
        &self,
        call_id: CallId,
        event: CallEvent,
        actor: Option<&UserId>,
    ) -> Result<Transition, SignalError> {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self
                .calls
                .get_call(call_id)
                .await?
                .ok_or(SignalError::CallNotFound(call_id))?;

            if let Some(user) = actor {
                if !may_apply(&current, event, user) {
                    return Err(SignalError::NotParticipant(call_id));
                }
            }

            let updated = apply_event(&current, event, Utc::now())?;

            if self
                .calls
                .update_call_if_status(current.status, &updated)
                .await?
            {
                debug!(
                    target: "signal.calls",
                    call_id = %call_id,
                    from = current.status.as_str(),
                    to = updated.status.as_str(),
                    "Call transitioned"
                );
                metrics::record_call_transition(current.status.as_str(), updated.status.as_str());
                return Ok(Transition {
                    before: current,
                    after: updated,
                });
            }

            debug!(
                target: "signal.calls",
                call_id = %call_id,
                attempt = attempt,
                "Call status changed concurrently, retrying"
            );
        }

        Err(SignalError::Internal(format!(
            "call {call_id} transition contended after {MAX_TRANSITION_ATTEMPTS} attempts"
        )))
    }

    pub async fn get(&self, call_id: CallId) -> Result<Option<CallRecord>, SignalError> {
        Ok(self.calls.get_call(call_id).await?)
    }
}
