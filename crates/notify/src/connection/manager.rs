//! Connection state machine
//!
//! ```text
//! Disconnected --connect--> Connecting --opened--> Connected
//! Connected --lost--> Reconnecting --timer--> Connecting
//! Connecting --transport error--> Reconnecting | Disconnected (stale)
//! Connecting --auth rejected--> AuthFailed
//! ```
//!
//! Every `connect()` and `disconnect()` bumps the generation id. Results and
//! timers carry the generation they were created under and are ignored once
//! it has moved on.

use std::time::Duration;

use quill_shared::{Credential, SyncError, SyncResult};

use super::state::{ConnectionState, ConnectionStatus};
use crate::backoff::BackoffPolicy;

/// Callback invoked on every connection status change
pub type ConnectionListener = Box<dyn Fn(&ConnectionStatus) + Send + Sync>;

/// Side effects for the session runtime to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Open a channel authenticated with `credential`
    Open {
        generation: u64,
        credential: Credential,
    },
    /// Drop the live channel and any open still in flight
    Close,
    /// Fire `ConnectionManager::handle_retry_elapsed(generation)` after `delay`
    ScheduleRetry {
        generation: u64,
        attempt: u32,
        delay: Duration,
    },
    /// Abort the pending reconnect timer
    CancelRetry,
}

pub struct ConnectionManager {
    state: ConnectionState,
    attempt: u32,
    generation: u64,
    stale: bool,
    retry_pending: bool,
    credential: Option<Credential>,
    policy: BackoffPolicy,
    listeners: Vec<ConnectionListener>,
}

impl ConnectionManager {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            generation: 0,
            stale: false,
            retry_pending: false,
            credential: None,
            policy,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempt: self.attempt,
            generation: self.generation,
            stale: self.stale,
        }
    }

    /// Register a listener for status changes
    pub fn on<F>(&mut self, listener: F)
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Start a new channel. A no-op while already connecting or connected.
    pub fn connect(
        &mut self,
        credential: Option<Credential>,
    ) -> SyncResult<Vec<ConnectionCommand>> {
        let Some(credential) = credential else {
            tracing::warn!("No credential available, not opening notification channel");
            return Err(SyncError::MissingCredential);
        };

        if self.state.is_live() {
            tracing::debug!(state = %self.state, "connect() ignored, channel already live");
            return Ok(Vec::new());
        }

        let before = self.status();
        let mut commands = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            commands.push(ConnectionCommand::CancelRetry);
        }

        self.generation += 1;
        self.attempt = 0;
        self.stale = false;
        self.credential = Some(credential.clone());
        self.state = ConnectionState::Connecting;
        commands.push(ConnectionCommand::Open {
            generation: self.generation,
            credential,
        });

        self.publish(before);
        Ok(commands)
    }

    /// Tear the channel down and invalidate everything scheduled so far
    pub fn disconnect(&mut self) -> Vec<ConnectionCommand> {
        let before = self.status();
        let mut commands = Vec::new();
        if self.retry_pending {
            self.retry_pending = false;
            commands.push(ConnectionCommand::CancelRetry);
        }
        commands.push(ConnectionCommand::Close);

        self.generation += 1;
        self.attempt = 0;
        self.stale = false;
        self.credential = None;
        self.state = ConnectionState::Disconnected;

        self.publish(before);
        commands
    }

    /// The channel opened for `generation` is up. Returns false when the
    /// result belongs to a superseded generation and must be discarded.
    pub fn handle_opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation, ConnectionState::Connecting) {
            tracing::debug!(
                generation,
                live_generation = self.generation,
                "Discarding channel opened for a superseded generation"
            );
            return false;
        }

        let before = self.status();
        self.attempt = 0;
        self.stale = false;
        self.state = ConnectionState::Connected;
        self.publish(before);
        true
    }

    /// Opening the channel for `generation` failed
    pub fn handle_open_failed(
        &mut self,
        generation: u64,
        error: &SyncError,
    ) -> Vec<ConnectionCommand> {
        if !self.is_current(generation, ConnectionState::Connecting) {
            tracing::debug!(generation, error = %error, "Ignoring failure from a superseded open");
            return Vec::new();
        }

        let before = self.status();
        let commands = match error {
            SyncError::Authentication(reason) => {
                tracing::warn!(generation, reason = %reason, "Notification channel rejected credential");
                self.credential = None;
                self.attempt = 0;
                self.state = ConnectionState::AuthFailed;
                Vec::new()
            }
            _ => {
                tracing::warn!(
                    generation,
                    attempt = self.attempt,
                    error = %error,
                    "Failed to open notification channel"
                );
                self.schedule_retry()
            }
        };
        self.publish(before);
        commands
    }

    /// The live channel for `generation` dropped
    pub fn handle_channel_lost(&mut self, generation: u64) -> Vec<ConnectionCommand> {
        if !self.is_current(generation, ConnectionState::Connected) {
            tracing::debug!(generation, "Ignoring loss of a superseded channel");
            return Vec::new();
        }

        tracing::warn!(generation, "Notification channel lost");
        let before = self.status();
        let commands = self.schedule_retry();
        self.publish(before);
        commands
    }

    /// A reconnect timer scheduled under `generation` fired
    pub fn handle_retry_elapsed(&mut self, generation: u64) -> Vec<ConnectionCommand> {
        if !self.retry_pending || !self.is_current(generation, ConnectionState::Reconnecting) {
            tracing::debug!(
                generation,
                live_generation = self.generation,
                "Discarding stale reconnect timer"
            );
            return Vec::new();
        }
        self.retry_pending = false;

        let before = self.status();
        let commands = match self.credential.clone() {
            Some(credential) => {
                self.state = ConnectionState::Connecting;
                vec![ConnectionCommand::Open {
                    generation: self.generation,
                    credential,
                }]
            }
            None => {
                self.stale = true;
                self.state = ConnectionState::Disconnected;
                Vec::new()
            }
        };
        self.publish(before);
        commands
    }

    fn is_current(&self, generation: u64, expected: ConnectionState) -> bool {
        generation == self.generation && self.state == expected
    }

    fn schedule_retry(&mut self) -> Vec<ConnectionCommand> {
        self.attempt += 1;

        match self.policy.delay_for(self.attempt) {
            Some(delay) => {
                tracing::warn!(
                    generation = self.generation,
                    attempt = self.attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling notification channel reconnect"
                );
                self.retry_pending = true;
                self.state = ConnectionState::Reconnecting;
                vec![ConnectionCommand::ScheduleRetry {
                    generation: self.generation,
                    attempt: self.attempt,
                    delay,
                }]
            }
            None => {
                tracing::warn!(
                    generation = self.generation,
                    attempts = self.policy.max_attempts,
                    "Giving up on notification channel, feed is stale"
                );
                self.attempt = 0;
                self.retry_pending = false;
                self.stale = true;
                self.state = ConnectionState::Disconnected;
                Vec::new()
            }
        }
    }

    fn publish(&self, before: ConnectionStatus) {
        let now = self.status();
        if now == before {
            return;
        }

        tracing::info!(
            from = %before.state,
            to = %now.state,
            generation = now.generation,
            attempt = now.attempt,
            stale = now.stale,
            "Notification channel state changed"
        );
        for listener in &self.listeners {
            listener(&now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn credential() -> Option<Credential> {
        Credential::bearer("token-1")
    }

    fn connected() -> ConnectionManager {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        manager.connect(credential()).unwrap();
        assert!(manager.handle_opened(manager.generation()));
        manager
    }

    fn scheduled_delay(commands: &[ConnectionCommand]) -> Option<Duration> {
        commands.iter().find_map(|c| match c {
            ConnectionCommand::ScheduleRetry { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn test_connect_without_credential_fails() {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        let result = manager.connect(None);
        assert_eq!(result, Err(SyncError::MissingCredential));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_connect_opens_channel() {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        let commands = manager.connect(credential()).unwrap();

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.generation(), 1);
        assert!(matches!(
            commands.as_slice(),
            [ConnectionCommand::Open { generation: 1, .. }]
        ));
    }

    #[test]
    fn test_connect_is_idempotent_while_live() {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        manager.connect(credential()).unwrap();

        assert!(manager.connect(credential()).unwrap().is_empty());
        assert_eq!(manager.generation(), 1);

        manager.handle_opened(1);
        assert!(manager.connect(credential()).unwrap().is_empty());
        assert_eq!(manager.generation(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_backoff_schedule_then_stale() {
        let mut manager = connected();
        let generation = manager.generation();
        let mut delays = Vec::new();

        let mut commands = manager.handle_channel_lost(generation);
        while let Some(delay) = scheduled_delay(&commands) {
            delays.push(delay.as_secs());
            assert_eq!(manager.state(), ConnectionState::Reconnecting);

            let reopen = manager.handle_retry_elapsed(generation);
            assert!(matches!(reopen.as_slice(), [ConnectionCommand::Open { .. }]));
            commands = manager
                .handle_open_failed(generation, &SyncError::Transport("refused".into()));
        }

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert!(commands.is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.status().stale);
    }

    #[test]
    fn test_successful_reconnect_resets_attempts() {
        let mut manager = connected();
        let generation = manager.generation();

        manager.handle_channel_lost(generation);
        manager.handle_retry_elapsed(generation);
        manager.handle_open_failed(generation, &SyncError::Transport("refused".into()));
        assert_eq!(manager.status().attempt, 2);

        manager.handle_retry_elapsed(generation);
        assert!(manager.handle_opened(generation));
        assert_eq!(manager.status().attempt, 0);

        let commands = manager.handle_channel_lost(generation);
        assert_eq!(scheduled_delay(&commands), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_auth_failure_is_terminal() {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        manager.connect(credential()).unwrap();

        let commands =
            manager.handle_open_failed(1, &SyncError::Authentication("expired".into()));
        assert!(commands.is_empty());
        assert_eq!(manager.state(), ConnectionState::AuthFailed);

        // A fresh credential is required to leave AuthFailed
        let commands = manager.connect(Credential::bearer("token-2")).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(matches!(
            commands.as_slice(),
            [ConnectionCommand::Open { generation: 2, .. }]
        ));
    }

    #[test]
    fn test_retry_after_disconnect_is_noop() {
        let mut manager = connected();
        let generation = manager.generation();

        let commands = manager.handle_channel_lost(generation);
        assert!(scheduled_delay(&commands).is_some());

        let commands = manager.disconnect();
        assert_eq!(
            commands,
            vec![ConnectionCommand::CancelRetry, ConnectionCommand::Close]
        );

        // The timer from the torn-down generation fires anyway
        assert!(manager.handle_retry_elapsed(generation).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.status().stale);
    }

    #[test]
    fn test_stale_open_result_discarded() {
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        manager.connect(credential()).unwrap();
        manager.disconnect();
        manager.connect(credential()).unwrap();

        assert!(!manager.handle_opened(1));
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.handle_opened(3));
    }

    #[test]
    fn test_connect_while_reconnecting_cancels_timer() {
        let mut manager = connected();
        manager.handle_channel_lost(manager.generation());

        let commands = manager.connect(credential()).unwrap();
        assert_eq!(commands.first(), Some(&ConnectionCommand::CancelRetry));
        assert_eq!(manager.generation(), 2);
        assert!(manager.handle_retry_elapsed(1).is_empty());
    }

    #[test]
    fn test_listeners_see_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ConnectionManager::new(BackoffPolicy::default());
        let sink = Arc::clone(&seen);
        manager.on(move |status| sink.lock().unwrap().push(status.state));

        manager.connect(credential()).unwrap();
        manager.handle_opened(1);
        manager.handle_channel_lost(1);
        manager.disconnect();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Reconnecting,
                ConnectionState::Disconnected,
            ]
        );
    }
}
