//! Quill Notification Sync
//!
//! Keeps a bounded, deduplicated notification feed in step with the Quill
//! notification service over a persistent, authenticated channel.
//!
//! # Architecture
//!
//! - **Connection**: connect/reconnect/disconnect state machine with
//!   generation-guarded backoff timers
//! - **Store**: the bounded feed and its unread counter
//! - **Protocol**: typed inbound/outbound frames
//! - **Router**: validates frames into feed mutations and toasts
//! - **Transport**: WebSocket and in-memory channel implementations
//! - **Client**: the session task and the handle UI layers consume

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod router;
pub mod store;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use client::{FeedView, NotificationClient, NotificationClientBuilder};
pub use config::{ConfigError, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use protocol::{InboundMessage, OutboundRequest};
pub use router::{EventRouter, Toast, ToastAction};
pub use store::{FeedStore, FEED_CAPACITY};
pub use transport::{Channel, Transport, WebSocketTransport};

#[cfg(any(test, feature = "test-util"))]
pub use transport::MemoryTransport;

pub use quill_shared::{
    Credential, NotificationId, NotificationKind, NotificationRecord, SyncError, SyncResult,
};
