//! HS256 access-token verification.
//!
//! Tokens are issued by the identity provider and signed with a shared
//! secret. Verification steps:
//! 1. Size and shape check before any decoding
//! 2. Signature and `exp` via `jsonwebtoken`
//! 3. `iat` against the configured clock skew
//! 4. `token_type` must be `access` when present
//!
//! All failures collapse into a generic error. Details go to debug logs.

use async_trait::async_trait;
use common::jwt::{
    check_token_size, clamp_clock_skew, validate_iat, JwtValidationError, UserClaims,
};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

/// Verifies bearer credentials and returns their claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserClaims, JwtValidationError>;
}

/// Shared-secret JWT verifier.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock_skew: clamp_clock_skew(clock_skew),
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("decoding_key", &"[REDACTED]")
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    #[instrument(skip_all, name = "signal.auth.jwt")]
    async fn verify(&self, token: &str) -> Result<UserClaims, JwtValidationError> {
        check_token_size(token)?;

        let token_data =
            decode::<UserClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(target: "signal.auth.jwt", error = %e, "Token verification failed");
                JwtValidationError::Rejected
            })?;
        let claims = token_data.claims;

        validate_iat(claims.iat, self.clock_skew)?;
        claims.validate_token_type()?;

        tracing::debug!(target: "signal.auth.jwt", "Token validated successfully");
        Ok(claims)
    }
}
