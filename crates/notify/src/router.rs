//! Inbound frame routing
//!
//! Classifies validated frames into feed mutations and fires the toast
//! side-channel for notifications the feed has not seen before.

use std::sync::Arc;

use quill_shared::{NotificationId, NotificationRecord, SyncError};

use crate::protocol::InboundMessage;
use crate::store::FeedStore;

/// Label on the action attached to toasts for linked notifications
const TOAST_ACTION_LABEL: &str = "View";

/// Callback receiving one toast per newly inserted notification
pub type ToastHandler = Arc<dyn Fn(&Toast) + Send + Sync>;

/// Transient alert for a newly arrived notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub notification_id: NotificationId,
    pub title: String,
    pub message: String,
    pub action: Option<ToastAction>,
}

/// Navigation offered alongside a toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastAction {
    pub label: String,
    pub link: String,
}

impl Toast {
    pub fn for_record(record: &NotificationRecord) -> Self {
        Self {
            notification_id: record.id.clone(),
            title: record.title.clone(),
            message: record.message.clone(),
            action: record.link.as_ref().map(|link| ToastAction {
                label: TOAST_ACTION_LABEL.to_string(),
                link: link.clone(),
            }),
        }
    }
}

/// What routing a frame did to the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Inserted(NotificationId),
    /// Redelivery of an id already held
    Duplicate(NotificationId),
    UnreadCount(u32),
    Snapshot { held: usize, rejected: usize },
    /// The service rejected a request; nothing changed
    ServiceError(SyncError),
    /// Malformed frame, nothing changed
    Dropped,
}

#[derive(Default)]
pub struct EventRouter {
    toast: Option<ToastHandler>,
    dropped_frames: u64,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_toast_handler(toast: ToastHandler) -> Self {
        Self {
            toast: Some(toast),
            dropped_frames: 0,
        }
    }

    /// Malformed frames dropped so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Decode a raw text frame and apply it. Malformed frames are logged and dropped.
    pub fn route_frame(&mut self, store: &mut FeedStore, frame: &str) -> RouteOutcome {
        match InboundMessage::decode(frame) {
            Ok(message) => self.route(store, message),
            Err(e) => {
                self.dropped_frames += 1;
                tracing::warn!(
                    error = %e,
                    dropped_frames = self.dropped_frames,
                    "Dropping malformed notification frame"
                );
                RouteOutcome::Dropped
            }
        }
    }

    pub fn route(&mut self, store: &mut FeedStore, message: InboundMessage) -> RouteOutcome {
        match message {
            InboundMessage::NewNotification(record) => {
                let id = record.id.clone();
                let toast = Toast::for_record(&record);
                if !store.insert(record) {
                    tracing::debug!(notification_id = %id, "Ignoring redelivered notification");
                    return RouteOutcome::Duplicate(id);
                }

                tracing::debug!(notification_id = %id, "New notification");
                if let Some(handler) = &self.toast {
                    handler(&toast);
                }
                RouteOutcome::Inserted(id)
            }
            InboundMessage::UnreadCountUpdate(count) => {
                store.set_unread_count(count);
                RouteOutcome::UnreadCount(count)
            }
            InboundMessage::FeedSnapshot { records, rejected } => {
                store.replace_all(records);
                store.set_unread_count(store.held_unread());
                tracing::debug!(held = store.len(), rejected, "Applied notification snapshot");
                RouteOutcome::Snapshot {
                    held: store.len(),
                    rejected,
                }
            }
            InboundMessage::ServiceError(message) => {
                // Optimistic state is reconciled by the next authoritative push
                let error = SyncError::Application(message);
                tracing::debug!(error = %error, "Notification service rejected a request");
                RouteOutcome::ServiceError(error)
            }
        }
    }
}
