//! Session actors and the channel registry they are published through.

pub mod registry;
pub mod session;

pub use registry::{Channel, ChannelRegistry};
pub use session::{DeliveryError, SessionActor, SessionHandle, SessionMessage};
