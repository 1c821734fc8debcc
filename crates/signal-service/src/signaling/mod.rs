//! Envelope codec, routing, call lifecycle and message quota.

pub mod calls;
pub mod envelope;
pub mod router;
pub mod usage;

pub use calls::{CallEvent, CallStateMachine, Transition};
pub use envelope::{CallEndReason, Frame, InboundEnvelope, OutboundEnvelope};
pub use router::{RouterSettings, SessionContext, SignalRouter};
pub use usage::UsageGate;
