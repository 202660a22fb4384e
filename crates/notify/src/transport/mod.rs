//! Channel transports
//!
//! The sync engine only needs an authenticated, bidirectional stream of
//! frames. [`Transport`] hides how that stream is produced:
//!
//! - **WebSocket**: tokio-tungstenite client for the live service
//! - **Memory**: in-process loopback whose server end is driven by the caller
//!   (`test-util` feature)

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;

use quill_shared::{Credential, SyncResult};

use crate::protocol::OutboundRequest;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryServer, MemoryTransport, ServerEnd};
pub use websocket::WebSocketTransport;

/// Opens authenticated notification channels
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a channel. Rejected credentials must surface as
    /// `SyncError::Authentication`; everything else is a `SyncError::Transport`.
    async fn open(&self, credential: &Credential) -> SyncResult<Channel>;
}

/// An open channel. The inbound stream ending means the transport dropped.
#[derive(Debug)]
pub struct Channel {
    pub outbound: mpsc::UnboundedSender<OutboundRequest>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl Channel {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundRequest>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outbound, inbound }
    }
}
