//! Session task
//!
//! Owns the connection state machine, the router and the feed. Client
//! commands and runtime inputs (open results, frames, channel loss, timer
//! expiries) are handled one at a time to completion, so every feed
//! mutation is atomic with respect to the next message.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use quill_shared::{NotificationId, SyncResult};

use super::{ClientCommand, FeedView};
use crate::config::SyncConfig;
use crate::connection::{ConnectionCommand, ConnectionManager};
use crate::protocol::OutboundRequest;
use crate::router::{EventRouter, RouteOutcome, ToastHandler};
use crate::store::FeedStore;
use crate::transport::{Channel, Transport};

/// Inputs produced by tasks the session spawned, tagged with the
/// generation that spawned them
enum SessionInput {
    Opened {
        generation: u64,
        result: SyncResult<Channel>,
    },
    Frame {
        generation: u64,
        frame: String,
    },
    ChannelClosed {
        generation: u64,
    },
    RetryElapsed {
        generation: u64,
    },
}

/// The live channel and the task forwarding its frames
struct ActiveLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<OutboundRequest>,
    reader: JoinHandle<()>,
}

impl Drop for ActiveLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(super) struct Session {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    connection: ConnectionManager,
    router: EventRouter,
    store: FeedStore,
    refreshing: bool,
    link: Option<ActiveLink>,
    pending_open: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    inputs_tx: mpsc::UnboundedSender<SessionInput>,
    inputs_rx: mpsc::UnboundedReceiver<SessionInput>,
    feed: watch::Sender<FeedView>,
}

impl Session {
    pub(super) fn new(
        transport: Arc<dyn Transport>,
        config: SyncConfig,
        toast: Option<ToastHandler>,
        feed: watch::Sender<FeedView>,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let router = match toast {
            Some(handler) => EventRouter::with_toast_handler(handler),
            None => EventRouter::new(),
        };

        Self {
            transport,
            connection: ConnectionManager::new(config.backoff),
            config,
            router,
            store: FeedStore::new(),
            refreshing: false,
            link: None,
            pending_open: None,
            retry_timer: None,
            inputs_tx,
            inputs_rx,
            feed,
        }
    }

    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ClientCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(input) = self.inputs_rx.recv() => self.handle_input(input),
            }
            self.publish();
        }

        // Every client handle is gone
        tracing::debug!("Notification client dropped, closing session");
        let commands = self.connection.disconnect();
        self.execute(commands);
    }

    fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Subscribe { credential, reply } => {
                let result = self.connection.connect(credential).map(|commands| {
                    self.execute(commands);
                });
                self.reply(reply, result);
            }
            ClientCommand::MarkAsRead { id, reply } => {
                self.mark_as_read(id);
                self.reply(reply, ());
            }
            ClientCommand::MarkAllAsRead { reply } => {
                self.store.mark_all_read();
                self.store.set_unread_count(0);
                self.send(OutboundRequest::MarkAllRead {});
                self.reply(reply, ());
            }
            ClientCommand::Refresh { limit, reply } => {
                // Nothing will answer a request that never left
                if self.send(OutboundRequest::RequestSnapshot { limit }) {
                    self.refreshing = true;
                }
                self.reply(reply, ());
            }
            ClientCommand::Teardown { reply } => {
                self.teardown();
                self.reply(reply, ());
            }
            ClientCommand::Listen { listener } => {
                self.connection.on(listener);
            }
        }
    }

    /// Publish before acknowledging so callers observe their own mutation
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    /// The counter tracks the service total, not held records, so it drops
    /// even when `id` is absent or already read
    fn mark_as_read(&mut self, id: NotificationId) {
        self.store.mark_read(&id);
        self.store.decrement_unread();
        self.send(OutboundRequest::MarkRead {
            notification_id: id,
        });
    }

    fn teardown(&mut self) {
        let commands = self.connection.disconnect();
        self.execute(commands);
        self.store.clear();
        self.refreshing = false;
        tracing::info!("Notification session torn down");
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Opened { generation, result } => {
                if generation == self.connection.generation() {
                    self.pending_open = None;
                }
                match result {
                    Ok(channel) => self.attach(generation, channel),
                    Err(error) => {
                        let commands = self.connection.handle_open_failed(generation, &error);
                        self.execute(commands);
                    }
                }
            }
            SessionInput::Frame { generation, frame } => {
                if !self.is_live_link(generation) {
                    tracing::debug!(generation, "Dropping frame from a superseded channel");
                    return;
                }
                if let RouteOutcome::Snapshot { .. } =
                    self.router.route_frame(&mut self.store, &frame)
                {
                    self.refreshing = false;
                }
            }
            SessionInput::ChannelClosed { generation } => {
                if !self.is_live_link(generation) {
                    return;
                }
                self.link = None;
                let commands = self.connection.handle_channel_lost(generation);
                self.execute(commands);
            }
            SessionInput::RetryElapsed { generation } => {
                if generation == self.connection.generation() {
                    self.retry_timer = None;
                }
                let commands = self.connection.handle_retry_elapsed(generation);
                self.execute(commands);
            }
        }
    }

    /// Adopt a freshly opened channel, or drop it if its generation is gone
    fn attach(&mut self, generation: u64, channel: Channel) {
        if !self.connection.handle_opened(generation) {
            return;
        }

        let Channel {
            outbound,
            mut inbound,
        } = channel;
        let inputs = self.inputs_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if inputs.send(SessionInput::Frame { generation, frame }).is_err() {
                    return;
                }
            }
            let _ = inputs.send(SessionInput::ChannelClosed { generation });
        });

        self.link = Some(ActiveLink {
            generation,
            outbound,
            reader,
        });

        // Every (re)connect starts from a fresh snapshot
        self.refreshing = self.send(OutboundRequest::RequestSnapshot {
            limit: self.config.initial_snapshot_limit,
        });
    }

    fn execute(&mut self, commands: Vec<ConnectionCommand>) {
        for command in commands {
            match command {
                ConnectionCommand::Open {
                    generation,
                    credential,
                } => {
                    let transport = Arc::clone(&self.transport);
                    let inputs = self.inputs_tx.clone();
                    self.pending_open = Some(tokio::spawn(async move {
                        let result = transport.open(&credential).await;
                        let _ = inputs.send(SessionInput::Opened { generation, result });
                    }));
                }
                ConnectionCommand::Close => {
                    if let Some(open) = self.pending_open.take() {
                        open.abort();
                    }
                    self.link = None;
                }
                ConnectionCommand::ScheduleRetry {
                    generation,
                    attempt,
                    delay,
                } => {
                    self.cancel_retry();
                    let inputs = self.inputs_tx.clone();
                    tracing::debug!(
                        generation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnect timer armed"
                    );
                    self.retry_timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = inputs.send(SessionInput::RetryElapsed { generation });
                    }));
                }
                ConnectionCommand::CancelRetry => self.cancel_retry(),
            }
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn is_live_link(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
            && generation == self.connection.generation()
    }

    /// Fire-and-forget; the reconnect snapshot reconciles anything dropped here.
    /// Returns whether the request reached a live channel.
    fn send(&self, request: OutboundRequest) -> bool {
        let Some(link) = &self.link else {
            tracing::debug!(request = ?request, "No live notification channel, dropping request");
            return false;
        };
        if link.outbound.send(request).is_err() {
            tracing::debug!("Notification channel writer is gone, dropping request");
            return false;
        }
        true
    }

    fn publish(&self) {
        let next = FeedView {
            notifications: self.store.snapshot().to_vec(),
            unread_count: self.store.unread_count(),
            connection: self.connection.status(),
            refreshing: self.refreshing,
        };
        self.feed.send_if_modified(|view| {
            if *view == next {
                false
            } else {
                *view = next;
                true
            }
        });
    }
}
