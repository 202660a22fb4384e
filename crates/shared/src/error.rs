//! Error taxonomy for the notification sync engine

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("No credential available for the notification channel")]
    MissingCredential,

    /// Terminal: the channel is never retried after this
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// A malformed inbound frame; dropped, the channel stays up
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The service refused a request (e.g. marking an unknown id as read)
    #[error("Application error: {0}")]
    Application(String),

    #[error("Notification session is closed")]
    SessionClosed,
}

impl SyncError {
    /// Returns true if this error should drive a reconnect attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

/// Result type for sync engine operations
pub type SyncResult<T> = Result<T, SyncError>;
