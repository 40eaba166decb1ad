//! Configuration management for the sync client.

use std::env;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://fitsync.db?mode=rwc";
const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Settings that shape a session's background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Pause between session start and the first reconciliation, giving
    /// authentication time to finish
    pub settle_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }
}

impl SessionSettings {
    /// No settle delay; used by tests and on-demand tools.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL of the Local Store
    pub database_url: String,
    pub session: SessionSettings,
    /// Signed-in user id (agent only)
    pub user_id: Option<String>,
    /// Signed-in user email, used to namespace storage keys (agent only)
    pub user_email: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("FITSYNC_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let settle_delay_ms = match env::var("FITSYNC_SETTLE_DELAY_MS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidSettleDelay(raw))?,
            Err(_) => DEFAULT_SETTLE_DELAY_MS,
        };

        Ok(Self {
            database_url,
            session: SessionSettings {
                settle_delay: Duration::from_millis(settle_delay_ms),
            },
            user_id: env::var("FITSYNC_USER_ID").ok(),
            user_email: env::var("FITSYNC_USER_EMAIL").ok(),
        })
    }

    /// The configured user, required by the agent binary.
    pub fn identity(&self) -> Result<(String, String), ConfigError> {
        let uid = self.user_id.clone().ok_or(ConfigError::MissingUserId)?;
        let email = self.user_email.clone().ok_or(ConfigError::MissingUserEmail)?;
        Ok((uid, email))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FITSYNC_USER_ID environment variable is required")]
    MissingUserId,

    #[error("FITSYNC_USER_EMAIL environment variable is required")]
    MissingUserEmail,

    #[error("Invalid FITSYNC_SETTLE_DELAY_MS value: {0}")]
    InvalidSettleDelay(String),
}
