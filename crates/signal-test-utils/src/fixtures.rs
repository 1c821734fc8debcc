//! Pre-configured test data.

use crate::token_builders::TestTokenBuilder;
use common::types::UserId;
use signal_service::store::models::{Identity, PublicIdentity};

/// HS256 secret shared by test servers and test tokens.
pub const TEST_JWT_SECRET: &str = "signal-test-secret-0123456789abcdef";

/// Test user fixture.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub first_name: String,
    pub active: bool,
}

impl TestUser {
    /// Create an active user; `name` doubles as first name and email local part.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: name.into(),
            active: true,
        }
    }

    /// Mark the user inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::new(self.id.clone())
    }

    #[must_use]
    pub fn email(&self) -> String {
        format!("{}@example.com", self.first_name.to_lowercase())
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user_id(),
            email: self.email(),
            first_name: self.first_name.clone(),
            last_name: "Tester".to_string(),
            is_verified: true,
            is_active: self.active,
        }
    }

    #[must_use]
    pub fn public(&self) -> PublicIdentity {
        self.identity().public()
    }

    /// A valid access token for this user signed with [`TEST_JWT_SECRET`].
    #[must_use]
    pub fn token(&self) -> String {
        TestTokenBuilder::new().for_user(&self.id).sign(TEST_JWT_SECRET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_identity() {
        let alice = TestUser::new("7", "Alice");
        let identity = alice.identity();
        assert_eq!(identity.id, UserId::from("7"));
        assert_eq!(identity.email, "alice@example.com");
        assert!(identity.is_active);
        assert!(!alice.inactive().identity().is_active);
    }
}
