//! Builder for signed test access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

/// Builder for HS256 access tokens in the identity provider's claim shape.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("42")
///     .expires_in(60)
///     .sign(TEST_JWT_SECRET);
/// ```
pub struct TestTokenBuilder {
    user_id: Value,
    exp: i64,
    iat: i64,
    token_type: Option<String>,
}

impl TestTokenBuilder {
    /// Defaults: user "test-user", valid for an hour, `token_type` "access".
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            user_id: json!("test-user"),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            token_type: Some("access".to_string()),
        }
    }

    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = json!(user_id);
        self
    }

    /// Use a numeric `user_id` claim.
    pub fn for_numeric_user(mut self, user_id: i64) -> Self {
        self.user_id = json!(user_id);
        self
    }

    /// Set expiration in seconds from now (negative for an expired token).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set `token_type`, or omit it with `None`.
    pub fn token_type(mut self, token_type: Option<&str>) -> Self {
        self.token_type = token_type.map(str::to_string);
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(self) -> Value {
        let mut claims = json!({
            "user_id": self.user_id,
            "exp": self.exp,
            "iat": self.iat,
        });
        if let Some(token_type) = self.token_type {
            claims["token_type"] = json!(token_type);
        }
        claims
    }

    /// Sign the claims with `secret`.
    pub fn sign(self, secret: &str) -> String {
        encode(
            &Header::default(),
            &self.build(),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing with a static secret cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
