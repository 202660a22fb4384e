//! Notification client
//!
//! [`NotificationClient`] is the surface UI layers consume. Each client owns
//! exactly one session task, which is the single writer for the connection
//! and the feed. Handles are cheap to clone; UI code reads the derived
//! [`FeedView`] and issues mutations through the handle only.
//!
//! Read-state mutations are optimistic and never rolled back. The next
//! `unread_count` or `notifications` push from the service overwrites
//! whatever the client assumed in the meantime.

mod session;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use quill_shared::{Credential, NotificationId, NotificationRecord, SyncError, SyncResult};

use crate::config::SyncConfig;
use crate::connection::{ConnectionListener, ConnectionState, ConnectionStatus};
use crate::router::{Toast, ToastHandler};
use crate::transport::Transport;

use session::Session;

/// Read-only state derived from the feed and the connection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedView {
    /// Newest first, at most `FEED_CAPACITY` entries
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: u32,
    pub connection: ConnectionStatus,
    /// A snapshot was requested and has not arrived yet
    pub refreshing: bool,
}

impl FeedView {
    /// Badge should render as degraded
    pub fn is_stale(&self) -> bool {
        self.connection.stale || self.connection.state == ConnectionState::AuthFailed
    }
}

pub(crate) enum ClientCommand {
    Subscribe {
        credential: Option<Credential>,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    MarkAsRead {
        id: NotificationId,
        reply: oneshot::Sender<()>,
    },
    MarkAllAsRead {
        reply: oneshot::Sender<()>,
    },
    Refresh {
        limit: usize,
        reply: oneshot::Sender<()>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
    Listen {
        listener: ConnectionListener,
    },
}

/// Handle onto a notification session
#[derive(Clone)]
pub struct NotificationClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    feed: watch::Receiver<FeedView>,
}

pub struct NotificationClientBuilder {
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    toast: Option<ToastHandler>,
}

impl NotificationClientBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Side-channel invoked once per newly arrived notification
    pub fn on_toast<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Toast) + Send + Sync + 'static,
    {
        self.toast = Some(Arc::new(handler));
        self
    }

    /// Spawn the session task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> NotificationClient {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = watch::channel(FeedView::default());

        let session = Session::new(self.transport, self.config, self.toast, feed_tx);
        tokio::spawn(session.run(commands_rx));

        NotificationClient {
            commands: commands_tx,
            feed: feed_rx,
        }
    }
}

impl NotificationClient {
    pub fn builder<T: Transport>(transport: T) -> NotificationClientBuilder {
        NotificationClientBuilder {
            transport: Arc::new(transport),
            config: SyncConfig::default(),
            toast: None,
        }
    }

    /// Connect with `credential` and request the initial snapshot once the
    /// channel is up. Fails immediately when no credential is available.
    pub async fn subscribe(&self, credential: Option<Credential>) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(ClientCommand::Subscribe { credential, reply })?;
        rx.await.map_err(|_| SyncError::SessionClosed)?
    }

    /// Optimistically mark `id` as read, then tell the service
    pub async fn mark_as_read(&self, id: impl Into<NotificationId>) -> SyncResult<()> {
        let id = id.into();
        self.request(|reply| ClientCommand::MarkAsRead { id, reply })
            .await
    }

    /// Optimistically mark everything as read, then tell the service
    pub async fn mark_all_as_read(&self) -> SyncResult<()> {
        self.request(|reply| ClientCommand::MarkAllAsRead { reply })
            .await
    }

    /// Ask for a fresh snapshot of `limit` records. The view reports
    /// `refreshing` until it arrives.
    pub async fn refresh(&self, limit: usize) -> SyncResult<()> {
        self.request(|reply| ClientCommand::Refresh { limit, reply })
            .await
    }

    /// Disconnect and drop the cached feed
    pub async fn teardown(&self) -> SyncResult<()> {
        self.request(|reply| ClientCommand::Teardown { reply })
            .await
    }

    /// Register a listener for connection status changes
    pub fn on<F>(&self, listener: F) -> SyncResult<()>
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.dispatch(ClientCommand::Listen {
            listener: Box::new(listener),
        })
    }

    /// Current derived state
    pub fn feed(&self) -> FeedView {
        self.feed.borrow().clone()
    }

    /// Receiver that observes every published [`FeedView`]
    pub fn watch_feed(&self) -> watch::Receiver<FeedView> {
        self.feed.clone()
    }

    pub fn unread_count(&self) -> u32 {
        self.feed.borrow().unread_count
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.feed.borrow().connection
    }

    async fn request<F>(&self, build: F) -> SyncResult<()>
    where
        F: FnOnce(oneshot::Sender<()>) -> ClientCommand,
    {
        let (reply, rx) = oneshot::channel();
        self.dispatch(build(reply))?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    fn dispatch(&self, command: ClientCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::SessionClosed)
    }
}
