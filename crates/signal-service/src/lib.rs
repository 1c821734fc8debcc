//! Signal Service Library
//!
//! Real-time chat and call signaling over websockets. Authenticated users
//! exchange messages in named rooms and negotiate peer-to-peer calls through
//! relayed offer/answer/ICE envelopes.
//!
//! # Architecture
//!
//! ```text
//! transport/ws.rs -> signaling/router.rs -> actors/registry.rs -> actors/session.rs
//!                          |
//!                          +-> signaling/{calls,usage}.rs -> store (traits)
//! ```
//!
//! # Modules
//!
//! - `actors` - Per-connection writer actors and the channel registry
//! - `auth` - Handshake credential resolution
//! - `config` - Service configuration from environment
//! - `errors` - Error types with client error codes
//! - `observability` - Health endpoints and Prometheus metrics
//! - `routes` - Axum router setup and application state
//! - `signaling` - Envelope codec, routing, call state machine, usage gate
//! - `store` - Persistence collaborator traits and the in-memory backend
//! - `transport` - Websocket handlers

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod routes;
pub mod signaling;
pub mod store;
pub mod transport;
