//! JWT utilities shared by the signaling service and its test tooling.
//!
//! This module provides common JWT validation utilities including:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - iat validation logic
//! - The access-token claims shape issued by the identity provider
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Generic error messages prevent information leakage
//! - The `user_id` and `jti` fields in claims are redacted in Debug output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{check_token_size, validate_iat, DEFAULT_CLOCK_SKEW, UserClaims};
//!
//! check_token_size(token)?;
//! // ... verify signature, decode `UserClaims` ...
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! claims.validate_token_type()?;
//! ```

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical access tokens are 200-400 bytes. Anything larger than this is
/// rejected before base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` (issued-at) timestamps more than this amount in the
/// future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The only `token_type` accepted for websocket authentication.
pub const ACCESS_TOKEN_TYPE: &str = "access";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT validation.
///
/// Error messages are intentionally generic. Detailed information is logged
/// at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// Token is not an access token (e.g. a refresh token).
    #[error("The access token is invalid or expired")]
    WrongTokenType,

    /// Signature, expiry or claim decoding failed.
    #[error("The access token is invalid or expired")]
    Rejected,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Access token claims issued by the identity provider.
///
/// `user_id` identifies the authenticated user; it is redacted in Debug
/// output along with `jti`.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject user id (string or integer on the wire).
    pub user_id: UserId,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Token kind; only `access` tokens authenticate connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Unique token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl fmt::Debug for UserClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserClaims")
            .field("user_id", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("token_type", &self.token_type)
            .field("jti", &self.jti.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl UserClaims {
    /// Creates access-token claims for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, exp: i64, iat: i64) -> Self {
        Self {
            user_id,
            exp,
            iat,
            token_type: Some(ACCESS_TOKEN_TYPE.to_string()),
            jti: None,
        }
    }

    /// Reject tokens that declare a type other than `access`.
    ///
    /// Tokens without a `token_type` claim are accepted.
    ///
    /// # Errors
    ///
    /// Returns `JwtValidationError::WrongTokenType` for non-access tokens.
    pub fn validate_token_type(&self) -> Result<(), JwtValidationError> {
        match self.token_type.as_deref() {
            None | Some(ACCESS_TOKEN_TYPE) => Ok(()),
            Some(other) => {
                tracing::debug!(
                    target: "common.jwt",
                    token_type = %other,
                    "Token rejected: not an access token"
                );
                Err(JwtValidationError::WrongTokenType)
            }
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`] or without the
/// three-part `header.payload.signature` shape.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds the size limit
/// - `MalformedToken` if the token does not have exactly three parts
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts = token.split('.').count();
    if parts != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts,
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(())
}

/// Clamp a configured clock skew to [`MAX_CLOCK_SKEW`].
#[must_use]
pub fn clamp_clock_skew(clock_skew: Duration) -> Duration {
    clock_skew.min(MAX_CLOCK_SKEW)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is
/// more than `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is clamped to MAX_CLOCK_SKEW, well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clamp_clock_skew(clock_skew).as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_constants() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // check_token_size Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_check_token_size_accepts_three_parts() {
        assert!(check_token_size("header.payload.signature").is_ok());
    }

    #[test]
    fn test_check_token_size_rejects_wrong_shape() {
        assert_eq!(
            check_token_size("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            check_token_size("a.b.c.d"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(check_token_size(""), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_check_token_size_rejects_oversized() {
        let big = format!("{}.payload.signature", "a".repeat(MAX_JWT_SIZE_BYTES));
        assert_eq!(
            check_token_size(&big),
            Err(JwtValidationError::TokenTooLarge)
        );
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_current_time() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_iat(now, DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        let now = 1_700_000_000;
        assert!(validate_iat_at(now + 300, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert_eq!(
            validate_iat_at(now + 301, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_validate_iat_skew_is_clamped() {
        let now = 1_700_000_000;
        // A 1-hour configured skew still only tolerates MAX_CLOCK_SKEW
        let result = validate_iat_at(now + 601, Duration::from_secs(3600), now);
        assert_eq!(result, Err(JwtValidationError::IatTooFarInFuture));
    }

    // -------------------------------------------------------------------------
    // UserClaims Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_user_claims_debug_redacts_identifiers() {
        let mut claims = UserClaims::new(UserId::from("secret-user-42"), 2_000, 1_000);
        claims.jti = Some("jti-very-secret".to_string());

        let debug = format!("{claims:?}");
        assert!(!debug.contains("secret-user-42"));
        assert!(!debug.contains("jti-very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_user_claims_accepts_integer_user_id() {
        let json = r#"{"user_id": 17, "exp": 2000, "iat": 1000, "token_type": "access"}"#;
        let claims: UserClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.user_id.as_str(), "17");
        assert!(claims.validate_token_type().is_ok());
    }

    #[test]
    fn test_user_claims_rejects_refresh_token() {
        let json = r#"{"user_id": "u1", "exp": 2000, "iat": 1000, "token_type": "refresh"}"#;
        let claims: UserClaims = serde_json::from_str(json).unwrap();
        assert_eq!(
            claims.validate_token_type(),
            Err(JwtValidationError::WrongTokenType)
        );
    }

    #[test]
    fn test_user_claims_without_token_type_is_accepted() {
        let json = r#"{"user_id": "u1", "exp": 2000, "iat": 1000}"#;
        let claims: UserClaims = serde_json::from_str(json).unwrap();
        assert!(claims.token_type.is_none());
        assert!(claims.validate_token_type().is_ok());
    }
}
