//! Websocket transport.

pub mod ws;

pub use ws::{is_valid_room, CLOSE_AUTHENTICATION_FAILED, CLOSE_INVALID_ROOM};
