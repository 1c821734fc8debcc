//! Common types and helpers shared by the signaling service crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, iat validation, user claims)
pub mod jwt;
