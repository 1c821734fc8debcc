//! Inbound envelope routing.
//!
//! Every text frame from a session goes through [`SignalRouter::handle_text`]:
//! size check, decode, authorize, then dispatch by tag. Validation and
//! policy failures are answered with an `error` envelope on the sender's own
//! queue and the session stays open. Collaborator faults are logged and
//! answered generically.

use super::calls::{CallEvent, CallStateMachine};
use super::envelope::{decode, CallEndReason, InboundEnvelope, OutboundEnvelope};
use super::usage::{UsageGate, DEFAULT_FREE_TIER_DAILY_LIMIT};
use crate::actors::{Channel, ChannelRegistry, SessionHandle};
use crate::auth::Principal;
use crate::errors::SignalError;
use crate::observability::metrics;
use crate::store::models::Identity;
use crate::store::Stores;
use common::types::{CallId, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// Default maximum inbound frame size in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Default time a call may ring before it is marked missed.
pub const DEFAULT_RING_TIMEOUT: Duration = Duration::from_secs(45);

/// Default number of messages replayed to a session joining a room.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Tunables for [`SignalRouter`].
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub max_message_bytes: usize,
    pub ring_timeout: Duration,
    pub history_limit: usize,
    pub free_tier_daily_limit: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            ring_timeout: DEFAULT_RING_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            free_tier_daily_limit: DEFAULT_FREE_TIER_DAILY_LIMIT,
        }
    }
}

/// Per-session routing context.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: SessionHandle,
    pub principal: Principal,
    /// Chat room this session joined, if any.
    pub room: Option<String>,
}

/// Routes inbound envelopes to the registry and collaborators.
pub struct SignalRouter {
    registry: Arc<ChannelRegistry>,
    stores: Stores,
    calls: CallStateMachine,
    usage: UsageGate,
    settings: RouterSettings,
    shutdown: CancellationToken,
}

impl SignalRouter {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        stores: Stores,
        settings: RouterSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let calls = CallStateMachine::new(Arc::clone(&stores.calls));
        let usage = UsageGate::new(Arc::clone(&stores.usage), settings.free_tier_daily_limit);
        Self {
            registry,
            stores,
            calls,
            usage,
            settings,
            shutdown,
        }
    }

    /// Greet a new session, then join it to its channels.
    ///
    /// The session receives `connection_established` and, for chat, the
    /// room's recent history before it is subscribed to `user:{id}` and
    /// `room:{name}`, so no live frame precedes the greeting or repeats a
    /// history entry.
    pub async fn on_connect(&self, ctx: &SessionContext) -> Result<(), SignalError> {
        let identity = ctx.principal.identity().ok_or(SignalError::Unauthorized)?;

        ctx.session
            .reply(&OutboundEnvelope::ConnectionEstablished {
                session_id: ctx.session.id().to_string(),
                user: identity.public(),
                room: ctx.room.clone(),
            })
            .await?;

        if let Some(room) = &ctx.room {
            let history = match self
                .stores
                .messages
                .query_recent(room, self.settings.history_limit)
                .await
            {
                Ok(messages) => OutboundEnvelope::MessageHistory {
                    room: room.clone(),
                    messages,
                },
                Err(e) => {
                    let err = SignalError::from(e);
                    error!(target: "signal.router", room = %room, error = %err, "History query failed");
                    OutboundEnvelope::from_error(&err)
                }
            };
            ctx.session.reply(&history).await?;
        }

        self.registry.subscribe(Channel::user(&identity.id), &ctx.session);
        if let Some(room) = &ctx.room {
            self.registry.subscribe(Channel::room(room), &ctx.session);
        }
        Ok(())
    }

    /// Handle one inbound text frame.
    #[instrument(skip_all, name = "signal.router.handle", fields(session_id = %ctx.session.id()))]
    pub async fn handle_text(&self, ctx: &SessionContext, text: &str) {
        let started = Instant::now();

        if text.len() > self.settings.max_message_bytes {
            let err = SignalError::MessageTooLarge {
                size: text.len(),
                max: self.settings.max_message_bytes,
            };
            self.report(ctx, "oversized", &err).await;
            metrics::record_envelope("oversized", "rejected");
            return;
        }

        let envelope = match decode(text) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(target: "signal.router", "Ignoring envelope with unknown type");
                metrics::record_envelope("unknown", "ignored");
                return;
            }
            Err(e) => {
                self.report(ctx, "invalid", &SignalError::from(e)).await;
                metrics::record_envelope("invalid", "rejected");
                return;
            }
        };

        let message_type = envelope.message_type();
        let outcome = match self.dispatch(ctx, envelope).await {
            Ok(()) => "ok",
            Err(err) => {
                self.report(ctx, message_type, &err).await;
                if err.is_internal() {
                    "error"
                } else {
                    "rejected"
                }
            }
        };

        metrics::record_envelope(message_type, outcome);
        metrics::record_envelope_duration(message_type, started.elapsed());
    }

    async fn dispatch(
        &self,
        ctx: &SessionContext,
        envelope: InboundEnvelope,
    ) -> Result<(), SignalError> {
        let Principal::Authenticated(identity) = &ctx.principal else {
            return Err(SignalError::Unauthorized);
        };

        match envelope {
            InboundEnvelope::Message { message } => self.handle_chat(ctx, identity, &message).await,
            InboundEnvelope::CallInitiate { receiver_id } => {
                self.handle_call_initiate(ctx, identity, receiver_id).await
            }
            InboundEnvelope::CallAnswer { call_id } => {
                self.handle_call_event(identity, call_id, CallEvent::Answer)
                    .await
            }
            InboundEnvelope::CallReject { call_id } => {
                self.handle_call_event(identity, call_id, CallEvent::Reject)
                    .await
            }
            InboundEnvelope::CallEnd { call_id } => {
                self.handle_call_event(identity, call_id, CallEvent::End)
                    .await
            }
            InboundEnvelope::IceCandidate {
                target_id,
                candidate,
            } => {
                self.relay(
                    &target_id,
                    OutboundEnvelope::IceCandidate {
                        candidate,
                        from_user: identity.id.clone(),
                    },
                );
                Ok(())
            }
            InboundEnvelope::Offer {
                target_id,
                offer,
                call_id,
            } => {
                self.relay(
                    &target_id,
                    OutboundEnvelope::Offer {
                        offer,
                        call_id,
                        from_user: identity.id.clone(),
                    },
                );
                Ok(())
            }
            InboundEnvelope::Answer {
                target_id,
                answer,
                call_id,
            } => {
                self.relay(
                    &target_id,
                    OutboundEnvelope::Answer {
                        answer,
                        call_id,
                        from_user: identity.id.clone(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn handle_chat(
        &self,
        ctx: &SessionContext,
        identity: &Identity,
        message: &str,
    ) -> Result<(), SignalError> {
        let room = ctx.room.as_deref().ok_or(SignalError::NotInRoom)?;

        if message.trim().is_empty() {
            return Err(SignalError::InvalidMessage("blank message content".to_string()));
        }

        if !self.usage.can_send(&identity.id).await? {
            metrics::record_quota_denied();
            debug!(target: "signal.router", user_id = %identity.id, "Message limit reached");
            return Err(SignalError::MessageLimitExceeded);
        }

        let stored = self
            .stores
            .messages
            .create_message(room, &identity.public(), message)
            .await?;

        if let Err(e) = self.usage.record_send(&identity.id).await {
            // Message is already persisted; publish it and accept the missed count
            warn!(target: "signal.router", user_id = %identity.id, error = %e, "Usage increment failed");
        }

        let delivered = self
            .registry
            .publish(&Channel::room(room), &OutboundEnvelope::chat_message(stored));
        debug!(target: "signal.router", room = %room, delivered = delivered, "Chat message published");
        Ok(())
    }

    async fn handle_call_initiate(
        &self,
        ctx: &SessionContext,
        identity: &Identity,
        receiver_id: UserId,
    ) -> Result<(), SignalError> {
        if receiver_id == identity.id {
            return Err(SignalError::InvalidTarget(receiver_id.to_string()));
        }

        let receiver = self
            .stores
            .users
            .get_user(&receiver_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| SignalError::UserNotFound(receiver_id.to_string()))?;

        let call = self.calls.create(&identity.id, &receiver.id).await?;

        let reached = self.registry.publish(
            &Channel::user(&receiver.id),
            &OutboundEnvelope::IncomingCall {
                call_id: call.id,
                caller: identity.public(),
            },
        );

        ctx.session
            .reply(&OutboundEnvelope::CallInitiated {
                call_id: call.id,
                receiver: receiver.public(),
            })
            .await?;

        if reached > 0 {
            if let Err(e) = self.calls.transition(call.id, CallEvent::Ring, None).await {
                debug!(target: "signal.router", call_id = %call.id, error = %e, "Ring transition skipped");
            }
        }

        self.spawn_ring_timer(call.id);
        Ok(())
    }

    /// Answer, reject or end a call and notify the other party.
    ///
    /// Unknown calls, non-participants and invalid transitions are logged
    /// and otherwise ignored.
    async fn handle_call_event(
        &self,
        identity: &Identity,
        call_id: CallId,
        event: CallEvent,
    ) -> Result<(), SignalError> {
        let transition = match self
            .calls
            .transition(call_id, event, Some(&identity.id))
            .await
        {
            Ok(transition) => transition,
            Err(
                e @ (SignalError::CallNotFound(_)
                | SignalError::NotParticipant(_)
                | SignalError::InvalidTransition { .. }),
            ) => {
                debug!(
                    target: "signal.router",
                    call_id = %call_id,
                    user_id = %identity.id,
                    error = %e,
                    "Call event ignored"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let Some(other) = transition.before.other_party(&identity.id) else {
            return Ok(());
        };

        let notification = match event {
            CallEvent::Answer => OutboundEnvelope::CallAnswered { call_id },
            CallEvent::Reject => OutboundEnvelope::CallRejected { call_id },
            CallEvent::End | CallEvent::Miss => OutboundEnvelope::CallEnded {
                call_id,
                reason: CallEndReason::Hangup,
                duration: transition.after.duration,
            },
            CallEvent::Ring => return Ok(()),
        };

        self.registry.publish(&Channel::user(other), &notification);
        Ok(())
    }

    /// Mark the call missed if it is still unanswered after the ring timeout.
    fn spawn_ring_timer(&self, call_id: CallId) {
        let calls = self.calls.clone();
        let registry = Arc::clone(&self.registry);
        let shutdown = self.shutdown.clone();
        let ring_timeout = self.settings.ring_timeout;

        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(ring_timeout) => {
                    match calls.transition(call_id, CallEvent::Miss, None).await {
                        Ok(transition) => {
                            debug!(target: "signal.router", call_id = %call_id, "Call missed");
                            let ended = OutboundEnvelope::CallEnded {
                                call_id,
                                reason: CallEndReason::Missed,
                                duration: 0,
                            };
                            registry.publish(&Channel::user(&transition.after.caller), &ended);
                            registry.publish(&Channel::user(&transition.after.receiver), &ended);
                        }
                        Err(SignalError::InvalidTransition { .. }) => {
                            // Answered, rejected or ended in time
                        }
                        Err(e) => {
                            warn!(target: "signal.router", call_id = %call_id, error = %e, "Ring timeout handling failed");
                        }
                    }
                }
            }
        });
    }

    fn relay(&self, target: &UserId, envelope: OutboundEnvelope) {
        let delivered = self.registry.publish(&Channel::user(target), &envelope);
        if delivered == 0 {
            debug!(
                target: "signal.router",
                target_id = %target,
                message_type = envelope.message_type(),
                "Relay target offline, dropped"
            );
        }
    }

    /// Send an `error` envelope to the session that caused `err`.
    async fn report(&self, ctx: &SessionContext, message_type: &str, err: &SignalError) {
        if err.is_internal() {
            error!(
                target: "signal.router",
                message_type = message_type,
                error = %err,
                "Envelope handling failed"
            );
        } else {
            debug!(
                target: "signal.router",
                message_type = message_type,
                error = %err,
                "Envelope rejected"
            );
        }

        if let Err(e) = ctx.session.reply(&OutboundEnvelope::from_error(err)).await {
            debug!(target: "signal.router", error = %e, "Error reply not delivered");
        }
    }
}
