//! Notification channel frames
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quill_shared::{NotificationId, NotificationRecord, SyncError, SyncResult};

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Validated frames received from the notification service
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `new_notification`: a single freshly created record
    NewNotification(NotificationRecord),

    /// `unread_count`: the server-side unread total
    UnreadCountUpdate(u32),

    /// `notifications`: the answer to a snapshot request
    FeedSnapshot {
        records: Vec<NotificationRecord>,
        /// Entries dropped because they failed validation
        rejected: usize,
    },

    /// `error`: the service refused a request
    ServiceError(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct UnreadCountData {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct SnapshotData {
    notifications: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    message: String,
}

impl InboundMessage {
    /// Parse and validate a text frame
    pub fn decode(frame: &str) -> SyncResult<Self> {
        let raw: RawFrame = serde_json::from_str(frame)?;

        match raw.event.as_str() {
            "new_notification" => Ok(InboundMessage::NewNotification(decode_record(raw.data)?)),
            "unread_count" => {
                let data: UnreadCountData = serde_json::from_value(raw.data)?;
                Ok(InboundMessage::UnreadCountUpdate(data.count))
            }
            "notifications" => {
                let data: SnapshotData = serde_json::from_value(raw.data)?;
                let mut records = Vec::with_capacity(data.notifications.len());
                let mut rejected = 0;
                for entry in data.notifications {
                    match decode_record(entry) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping malformed snapshot entry");
                            rejected += 1;
                        }
                    }
                }
                Ok(InboundMessage::FeedSnapshot { records, rejected })
            }
            "error" => {
                let data: ErrorData = serde_json::from_value(raw.data)?;
                Ok(InboundMessage::ServiceError(data.message))
            }
            other => Err(SyncError::Protocol(format!("unknown event '{}'", other))),
        }
    }
}

/// Deserialize a record and check the fields serde cannot
fn decode_record(data: Value) -> SyncResult<NotificationRecord> {
    let record: NotificationRecord = serde_json::from_value(data)?;
    if record.id.as_str().trim().is_empty() {
        return Err(SyncError::Protocol("notification id is empty".to_string()));
    }
    Ok(record)
}

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Requests sent to the notification service. All are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundRequest {
    #[serde(rename = "get_notifications")]
    RequestSnapshot { limit: usize },

    #[serde(rename = "mark_as_read")]
    MarkRead {
        #[serde(rename = "notificationId")]
        notification_id: NotificationId,
    },

    #[serde(rename = "mark_all_as_read")]
    MarkAllRead {},
}

impl OutboundRequest {
    pub fn encode(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
