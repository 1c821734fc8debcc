//! # Signal Test Utilities
//!
//! Shared test utilities for the signal service.
//!
//! This crate provides:
//! - `fixtures` - test users and the shared signing secret
//! - `token_builders` - `TestTokenBuilder` for signed HS256 access tokens
//! - `mock_store` - `MockStore`, an in-memory store with fault injection
//! - `server_harness` - `TestSignalServer` for end-to-end tests
//! - `ws_client` - `TestWsClient`, a JSON websocket client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signal_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let alice = TestUser::new("1", "alice");
//!     let server = TestSignalServer::builder().with_user(&alice).spawn().await?;
//!
//!     let mut client = TestWsClient::connect(&server.chat_url("lobby", &alice.token())).await?;
//!     let greeting = client.recv_json().await?;
//!     assert_eq!(greeting["type"], "connection_established");
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod mock_store;
pub mod server_harness;
pub mod token_builders;
pub mod ws_client;

pub use fixtures::*;
pub use mock_store::*;
pub use server_harness::*;
pub use token_builders::*;
pub use ws_client::*;
