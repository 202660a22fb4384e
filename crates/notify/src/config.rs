//! Sync engine configuration

use std::env;
use std::time::Duration;

use quill_shared::Credential;

use crate::backoff::{BackoffPolicy, DEFAULT_MAX_ATTEMPTS};

/// Snapshot size requested on every (re)connect
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 20;

const DEFAULT_WS_URL: &str = "ws://localhost:3000/ws/notifications";

/// Notification client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct SyncConfig {
    // Channel
    pub ws_url: String,
    pub access_token: Option<String>,

    // Reconnect
    pub backoff: BackoffPolicy,

    // Feed
    pub initial_snapshot_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            access_token: None,
            backoff: BackoffPolicy::default(),
            initial_snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_url = env::var("NOTIFY_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_string());
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(ws_url));
        }

        let base_delay = Duration::from_millis(
            env::var("NOTIFY_RECONNECT_BASE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        );
        if base_delay.is_zero() {
            return Err(ConfigError::Invalid(
                "NOTIFY_RECONNECT_BASE_MS must be greater than zero",
            ));
        }

        let max_delay = Duration::from_millis(
            env::var("NOTIFY_RECONNECT_MAX_DELAY_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
        );
        if max_delay < base_delay {
            return Err(ConfigError::Invalid(
                "NOTIFY_RECONNECT_MAX_DELAY_MS must not be below NOTIFY_RECONNECT_BASE_MS",
            ));
        }

        Ok(Self {
            ws_url,
            access_token: env::var("NOTIFY_ACCESS_TOKEN").ok(),
            backoff: BackoffPolicy {
                base_delay,
                max_delay,
                max_attempts: env::var("NOTIFY_RECONNECT_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            },
            initial_snapshot_limit: env::var("NOTIFY_SNAPSHOT_LIMIT")
                .unwrap_or_else(|_| DEFAULT_SNAPSHOT_LIMIT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SNAPSHOT_LIMIT),
        })
    }

    /// Credential from `NOTIFY_ACCESS_TOKEN`, if one is set and not blank
    pub fn credential(&self) -> Option<Credential> {
        self.access_token.clone().and_then(Credential::bearer)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("NOTIFY_WS_URL must be a ws:// or wss:// URL, got '{0}'")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
