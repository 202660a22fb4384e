//! In-process loopback transport
//!
//! Each successful `open` hands a [`ServerEnd`] to the paired
//! [`MemoryServer`], which plays the notification service: it pushes frames
//! to the client and reads the requests the client sends. Opens can be
//! scripted to fail.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use quill_shared::{Credential, SyncError, SyncResult};

use super::{Channel, Transport};
use crate::protocol::OutboundRequest;

#[derive(Default)]
struct MemoryState {
    scripted_failures: VecDeque<SyncError>,
    open_count: usize,
}

#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

/// Receives the server end of every channel the client opens
pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

/// Service side of one open channel. Dropping it drops the channel.
pub struct ServerEnd {
    pub credential: Credential,
    frames: mpsc::UnboundedSender<String>,
    requests: mpsc::UnboundedReceiver<OutboundRequest>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            accepted: accepted_tx,
        };
        (
            transport,
            MemoryServer {
                accepted: accepted_rx,
            },
        )
    }

    /// Make the next `open` fail with `error`. Calls queue up.
    pub fn fail_next(&self, error: SyncError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Opens attempted so far, failed ones included
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, credential: &Credential) -> SyncResult<Channel> {
        let failure = {
            let mut state = self.lock();
            state.open_count += 1;
            state.scripted_failures.pop_front()
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let server_end = ServerEnd {
            credential: credential.clone(),
            frames: inbound_tx,
            requests: outbound_rx,
        };
        self.accepted
            .send(server_end)
            .map_err(|_| SyncError::Transport("memory server is gone".to_string()))?;

        Ok(Channel::new(outbound_tx, inbound_rx))
    }
}

impl MemoryServer {
    /// Wait for the client to open the next channel
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accepted.recv().await
    }
}

impl ServerEnd {
    /// Push a raw text frame. Returns false once the client dropped the channel.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.frames.send(frame.into()).is_ok()
    }

    /// Push a `{"event": ..., "data": ...}` frame
    pub fn push_event(&self, event: &str, data: serde_json::Value) -> bool {
        self.push(serde_json::json!({ "event": event, "data": data }).to_string())
    }

    /// Next request the client sent, waiting if none is queued
    pub async fn next_request(&mut self) -> Option<OutboundRequest> {
        self.requests.recv().await
    }

    /// Drop the channel as a transport failure would
    pub fn disconnect(self) {
        drop(self);
    }
}
