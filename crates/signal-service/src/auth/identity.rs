//! Handshake identity resolution.
//!
//! A connection presents at most one bearer credential, either as the
//! `token` query parameter or in an `Authorization: Bearer` header. The
//! resolver turns it into a [`Principal`]. Resolution never fails: every
//! problem (bad token, unknown or inactive user, directory fault, timeout)
//! yields [`Principal::Anonymous`].

use super::jwt::TokenVerifier;
use crate::observability::metrics;
use crate::store::models::Identity;
use crate::store::UserDirectory;
use axum::http::{header, HeaderMap};
use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Authenticated(Identity),
    Anonymous,
}

impl Principal {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Authenticated(identity) => Some(identity),
            Principal::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::Authenticated(_))
    }
}

/// Pick the handshake credential: query parameter first, then bearer header.
#[must_use]
pub fn extract_credential(
    query_token: Option<String>,
    headers: &HeaderMap,
) -> Option<SecretString> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Some(SecretString::from(token));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::from(t.to_string()))
}

/// Resolves credentials to principals.
pub struct IdentityResolver {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        users: Arc<dyn UserDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            users,
            timeout,
        }
    }

    /// Resolve a credential, bounded by the configured timeout.
    #[instrument(skip_all, name = "signal.auth.resolve")]
    pub async fn resolve(&self, credential: Option<&SecretString>) -> Principal {
        let Some(credential) = credential else {
            tracing::debug!(target: "signal.auth", "No credential presented");
            metrics::record_auth_outcome("missing");
            return Principal::Anonymous;
        };

        match tokio::time::timeout(self.timeout, self.lookup(credential.expose_secret())).await {
            Ok(Ok(identity)) => {
                tracing::debug!(
                    target: "signal.auth",
                    user_id = %identity.id,
                    "Connection authenticated"
                );
                metrics::record_auth_outcome("authenticated");
                Principal::Authenticated(identity)
            }
            Ok(Err(outcome)) => {
                metrics::record_auth_outcome(outcome);
                Principal::Anonymous
            }
            Err(_) => {
                tracing::warn!(
                    target: "signal.auth",
                    timeout_ms = millis(self.timeout),
                    "Identity resolution timed out"
                );
                metrics::record_auth_outcome("timeout");
                Principal::Anonymous
            }
        }
    }

    /// Verify the token and load the user. Errors carry the metrics label.
    async fn lookup(&self, token: &str) -> Result<Identity, &'static str> {
        let claims = self.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(target: "signal.auth", error = ?e, "Credential rejected");
            "invalid_token"
        })?;

        let user = self.users.get_user(&claims.user_id).await.map_err(|e| {
            tracing::warn!(target: "signal.auth", error = %e, "User directory lookup failed");
            "directory_error"
        })?;

        match user {
            Some(identity) if identity.is_active => Ok(identity),
            Some(_) => {
                tracing::debug!(target: "signal.auth", "User is inactive");
                Err("inactive_user")
            }
            None => {
                tracing::debug!(target: "signal.auth", "Token subject not found");
                Err("unknown_user")
            }
        }
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
