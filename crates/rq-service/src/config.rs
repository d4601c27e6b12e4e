//! ReadQueue service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8001";

/// Default maximum number of participants per group.
pub const DEFAULT_MAX_PARTICIPANTS_PER_GROUP: usize = 20;

/// Default reaper sweep interval in seconds.
pub const DEFAULT_REAPER_INTERVAL_SECONDS: u64 = 60;

/// Default per-recipient signal mailbox capacity.
pub const DEFAULT_SIGNAL_MAILBOX_CAPACITY: usize = 256;

/// Default graceful shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// ReadQueue service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8001").
    pub bind_address: String,

    /// PostgreSQL connection URL. When absent, state lives in process memory.
    pub database_url: Option<SecretString>,

    /// Maximum participants enqueued in a single group at any time.
    pub max_participants_per_group: usize,

    /// Seconds between group reaper sweeps.
    pub reaper_interval_seconds: u64,

    /// Maximum buffered envelopes per signal mailbox before the oldest is dropped.
    pub signal_mailbox_capacity: usize,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "max_participants_per_group",
                &self.max_participants_per_group,
            )
            .field("reaper_interval_seconds", &self.reaper_interval_seconds)
            .field("signal_mailbox_capacity", &self.signal_mailbox_capacity)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid participant limit configuration: {0}")]
    InvalidParticipantLimit(String),

    #[error("Invalid reaper interval configuration: {0}")]
    InvalidReaperInterval(String),

    #[error("Invalid signal mailbox capacity configuration: {0}")]
    InvalidMailboxCapacity(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_url = vars
            .get("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.clone()));

        let max_participants_per_group = parse_positive(
            vars,
            "MAX_PARTICIPANTS_PER_GROUP",
            DEFAULT_MAX_PARTICIPANTS_PER_GROUP,
        )
        .map_err(ConfigError::InvalidParticipantLimit)?;

        let reaper_interval_seconds = parse_positive(
            vars,
            "REAPER_INTERVAL_SECONDS",
            DEFAULT_REAPER_INTERVAL_SECONDS,
        )
        .map_err(ConfigError::InvalidReaperInterval)?;

        let signal_mailbox_capacity = parse_positive(
            vars,
            "SIGNAL_MAILBOX_CAPACITY",
            DEFAULT_SIGNAL_MAILBOX_CAPACITY,
        )
        .map_err(ConfigError::InvalidMailboxCapacity)?;

        // Zero is valid here: it skips the drain period entirely
        let drain_seconds = match vars.get("RQ_DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "RQ_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Config {
            bind_address,
            database_url,
            max_participants_per_group,
            reaper_interval_seconds,
            signal_mailbox_capacity,
            drain_seconds,
        })
    }
}

/// Parse an optional strictly-positive integer variable.
///
/// Returns the default when the variable is unset, and a human-readable
/// message when it is set but not a positive integer.
fn parse_positive<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e| {
        format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        )
    })?;

    if value == T::default() {
        return Err(format!("{} must be greater than 0", key));
    }

    Ok(value)
}
