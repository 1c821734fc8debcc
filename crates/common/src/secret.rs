//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with project-specific
//! guidance. Use these types for all sensitive values like passwords, tokens,
//! API keys, and cryptographic material.
//!
//! # Compile-Time Safety
//!
//! The key insight is that `SecretBox<T>` and `SecretString` implement `Debug`
//! with redaction, so any code that derives `Debug` on a struct containing secrets
//! will automatically get safe logging behavior. This makes it **impossible** to
//! accidentally log secrets via `{:?}` or tracing.
//!
//! # Memory Safety
//!
//! Secrets are automatically zeroized when dropped, preventing sensitive
//! data from lingering in memory after use.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct HandshakeCredential {
//!     source: &'static str,
//!     token: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let cred = HandshakeCredential {
//!     source: "query",
//!     token: SecretString::from("eyJhbGciOi.payload.sig"),
//! };
//!
//! // This is safe - token is redacted
//! println!("{:?}", cred);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let token: &str = cred.token.expose_secret();
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - JWT signing secrets
//! - Bearer tokens taken from query strings or headers
//!
//! Use `SecretBox<T>` for:
//! - Binary key material (e.g., `SecretBox<[u8]>`)
//!
//! # Serde Integration
//!
//! With the `serde` feature enabled, secrets can be deserialized from JSON:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct SigningSettings {
//!     algorithm: String,
//!     secret: SecretString,
//! }
//!
//! let json = r#"{"algorithm": "HS256", "secret": "0123456789abcdef0123456789abcdef"}"#;
//! let settings: SigningSettings = serde_json::from_str(json).unwrap();
//!
//! // Debug output is safe
//! println!("{:?}", settings);
//! // algorithm is visible, secret is redacted
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_bearer_token_debug_is_redacted() {
        let token = SecretString::from("eyJhbGciOiJIUzI1NiJ9.e30.sig");
        let debug_str = format!("{token:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("eyJhbGciOiJIUzI1NiJ9"));
        assert_eq!(token.expose_secret(), "eyJhbGciOiJIUzI1NiJ9.e30.sig");
    }

    #[test]
    fn test_signing_settings_deserialize_and_redact() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct SigningSettings {
            algorithm: String,
            secret: SecretString,
        }

        let json = r#"{"algorithm": "HS256", "secret": "a-very-long-signing-secret-value"}"#;
        let settings: SigningSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(
            settings.secret.expose_secret(),
            "a-very-long-signing-secret-value"
        );

        let debug = format!("{settings:?}");
        assert!(debug.contains("HS256"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("a-very-long-signing-secret-value"));
    }

    #[test]
    fn test_cloned_secret_keeps_value() {
        let secret = SecretString::from("shared-secret");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), secret.expose_secret());
    }
}
