//! Signal service configuration.
//!
//! Configuration is loaded from environment variables. The JWT secret is
//! held as a `SecretString` and redacted in Debug output.

use crate::actors::session::DEFAULT_SESSION_QUEUE_CAPACITY;
use crate::signaling::router::{
    RouterSettings, DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_RING_TIMEOUT,
};
use crate::signaling::usage::DEFAULT_FREE_TIER_DAILY_LIMIT;
use crate::store::models::Identity;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use common::types::UserId;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default bound on identity resolution per connection.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum HS256 secret length in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// A user seeded into the in-memory directory at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub id: UserId,
    pub email: String,
}

impl SeedUser {
    #[must_use]
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            first_name: String::new(),
            last_name: String::new(),
            is_verified: true,
            is_active: true,
        }
    }
}

/// Signal service configuration.
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// HS256 secret shared with the token issuer.
    pub jwt_secret: SecretString,

    pub jwt_clock_skew: Duration,

    /// Upper bound on token verification plus directory lookup.
    pub auth_timeout: Duration,

    /// Messages replayed to a session joining a room.
    pub history_limit: usize,

    pub free_tier_daily_limit: u32,

    /// Outbound queue capacity per session.
    pub session_queue_capacity: usize,

    pub ring_timeout: Duration,

    pub max_message_bytes: usize,

    pub log_format: LogFormat,

    /// Users inserted into the in-memory directory at startup.
    pub seed_users: Vec<SeedUser>,
}

/// Custom Debug implementation that redacts the JWT secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("auth_timeout", &self.auth_timeout)
            .field("history_limit", &self.history_limit)
            .field("free_tier_daily_limit", &self.free_tier_daily_limit)
            .field("session_queue_capacity", &self.session_queue_capacity)
            .field("ring_timeout", &self.ring_timeout)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("log_format", &self.log_format)
            .field("seed_users", &self.seed_users.len())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIGNAL_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_secret = vars
            .get("SIGNAL_JWT_SECRET")
            .ok_or_else(|| ConfigError::MissingEnvVar("SIGNAL_JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ConfigError::invalid(
                "SIGNAL_JWT_SECRET",
                format!("must be at least {MIN_JWT_SECRET_BYTES} bytes"),
            ));
        }
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let clock_skew_seconds: u64 = parse_positive(
            vars,
            "SIGNAL_JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
        )?;
        if clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::invalid(
                "SIGNAL_JWT_CLOCK_SKEW_SECONDS",
                format!(
                    "must not exceed {} seconds, got {clock_skew_seconds}",
                    MAX_CLOCK_SKEW.as_secs()
                ),
            ));
        }

        let auth_timeout = Duration::from_secs(parse_positive(
            vars,
            "SIGNAL_AUTH_TIMEOUT_SECONDS",
            DEFAULT_AUTH_TIMEOUT.as_secs(),
        )?);

        let history_limit = parse_or(vars, "SIGNAL_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;

        let free_tier_daily_limit = parse_or(
            vars,
            "SIGNAL_FREE_TIER_DAILY_LIMIT",
            DEFAULT_FREE_TIER_DAILY_LIMIT,
        )?;

        let session_queue_capacity = parse_positive(
            vars,
            "SIGNAL_SESSION_QUEUE_CAPACITY",
            DEFAULT_SESSION_QUEUE_CAPACITY,
        )?;

        let ring_timeout = Duration::from_secs(parse_positive(
            vars,
            "SIGNAL_RING_TIMEOUT_SECONDS",
            DEFAULT_RING_TIMEOUT.as_secs(),
        )?);

        let max_message_bytes =
            parse_positive(vars, "SIGNAL_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?;

        let log_format = match vars.get("SIGNAL_LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "SIGNAL_LOG_FORMAT",
                    format!("expected 'text' or 'json', got '{other}'"),
                ))
            }
        };

        let seed_users = match vars.get("SIGNAL_SEED_USERS") {
            Some(value) => parse_seed_users(value)?,
            None => Vec::new(),
        };

        Ok(Config {
            bind_address,
            jwt_secret,
            jwt_clock_skew: Duration::from_secs(clock_skew_seconds),
            auth_timeout,
            history_limit,
            free_tier_daily_limit,
            session_queue_capacity,
            ring_timeout,
            max_message_bytes,
            log_format,
            seed_users,
        })
    }

    /// Router tunables derived from this configuration.
    #[must_use]
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            max_message_bytes: self.max_message_bytes,
            ring_timeout: self.ring_timeout,
            history_limit: self.history_limit,
            free_tier_daily_limit: self.free_tier_daily_limit,
        }
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(value) => value.trim().parse().map_err(|e| {
            ConfigError::invalid(name, format!("must be a valid integer, got '{value}': {e}"))
        }),
        None => Ok(default),
    }
}

fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let value = parse_or(vars, name, default)?;
    if value == T::default() {
        return Err(ConfigError::invalid(name, "must be greater than 0"));
    }
    Ok(value)
}

/// Parse `id:email` pairs separated by commas.
fn parse_seed_users(value: &str) -> Result<Vec<SeedUser>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, email) = entry.split_once(':').ok_or_else(|| {
                ConfigError::invalid("SIGNAL_SEED_USERS", format!("expected id:email, got '{entry}'"))
            })?;
            let (id, email) = (id.trim(), email.trim());
            if id.is_empty() || email.is_empty() {
                return Err(ConfigError::invalid(
                    "SIGNAL_SEED_USERS",
                    format!("empty id or email in '{entry}'"),
                ));
            }
            Ok(SeedUser {
                id: UserId::new(id),
                email: email.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("SIGNAL_JWT_SECRET".to_string(), SECRET.to_string())])
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.jwt_clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(config.auth_timeout, Duration::from_secs(10));
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.free_tier_daily_limit, 50);
        assert_eq!(config.session_queue_capacity, 256);
        assert_eq!(config.ring_timeout, Duration::from_secs(45));
        assert_eq!(config.max_message_bytes, 65536);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.seed_users.is_empty());
    }

    #[test]
    fn test_missing_secret() {
        let err = Config::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref name) if name == "SIGNAL_JWT_SECRET"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let vars = HashMap::from([("SIGNAL_JWT_SECRET".to_string(), "short".to_string())]);
        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("SIGNAL_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("SIGNAL_JWT_CLOCK_SKEW_SECONDS".to_string(), "60".to_string());
        vars.insert("SIGNAL_RING_TIMEOUT_SECONDS".to_string(), "5".to_string());
        vars.insert("SIGNAL_FREE_TIER_DAILY_LIMIT".to_string(), "0".to_string());
        vars.insert("SIGNAL_LOG_FORMAT".to_string(), "json".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwt_clock_skew, Duration::from_secs(60));
        assert_eq!(config.ring_timeout, Duration::from_secs(5));
        assert_eq!(config.free_tier_daily_limit, 0);
        assert_eq!(config.log_format, LogFormat::Json);

        let settings = config.router_settings();
        assert_eq!(settings.ring_timeout, Duration::from_secs(5));
        assert_eq!(settings.free_tier_daily_limit, 0);
    }

    #[test]
    fn test_clock_skew_bounds() {
        let mut vars = base_vars();
        vars.insert("SIGNAL_JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert("SIGNAL_JWT_CLOCK_SKEW_SECONDS".to_string(), "0".to_string());
        assert!(Config::from_vars(&vars).is_err());

        vars.insert("SIGNAL_JWT_CLOCK_SKEW_SECONDS".to_string(), "abc".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("SIGNAL_SESSION_QUEUE_CAPACITY".to_string(), "0".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut vars = base_vars();
        vars.insert("SIGNAL_LOG_FORMAT".to_string(), "yaml".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_seed_users() {
        let mut vars = base_vars();
        vars.insert(
            "SIGNAL_SEED_USERS".to_string(),
            "1:alice@example.com, 2:bob@example.com,".to_string(),
        );
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.seed_users.len(), 2);
        assert_eq!(config.seed_users.last().unwrap().id, UserId::from("2"));

        let identity = config.seed_users.first().cloned().unwrap().into_identity();
        assert_eq!(identity.email, "alice@example.com");
        assert!(identity.is_active);

        vars.insert("SIGNAL_SEED_USERS".to_string(), "no-separator".to_string());
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SECRET));
    }
}
