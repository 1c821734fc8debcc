//! Connection authentication.

pub mod identity;
pub mod jwt;

pub use identity::{extract_credential, IdentityResolver, Principal};
pub use jwt::{JwtVerifier, TokenVerifier};
