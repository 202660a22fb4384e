//! Notification types shared by the sync engine and its consumers

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Server-assigned notification identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Notification Records
// =============================================================================

/// Closed set of notification categories the service emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ArticlePublished,
    CommentAdded,
    CommentReply,
    LikeReceived,
    Follow,
    Mention,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ArticlePublished => "article_published",
            NotificationKind::CommentAdded => "comment_added",
            NotificationKind::CommentReply => "comment_reply",
            NotificationKind::LikeReceived => "like_received",
            NotificationKind::Follow => "follow",
            NotificationKind::Mention => "mention",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification as pushed by the notification service.
///
/// The server owns these records; the client only ever flips `is_read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(alias = "_id")]
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Opaque to the client
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Credentials
// =============================================================================

/// Bearer credential supplied by the auth subsystem
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token; blank tokens are treated as no credential at all
    pub fn bearer(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_deserialization() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "_id": "n1",
            "type": "comment_added",
            "title": "New comment",
            "message": "Ada commented on your article",
            "link": "/articles/rust-ownership#comment-7",
            "payload": {"articleId": "a1"},
            "isRead": false,
            "createdAt": "2024-03-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.id, NotificationId::from("n1"));
        assert_eq!(record.kind, NotificationKind::CommentAdded);
        assert_eq!(record.link.as_deref(), Some("/articles/rust-ownership#comment-7"));
        assert!(!record.is_read);
        assert_eq!(record.created_at.year(), 2024);
    }

    #[test]
    fn test_record_defaults() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "n2",
            "type": "follow",
            "title": "New follower",
            "message": "Grace followed you",
            "createdAt": "2024-03-01T12:00:00Z"
        }))
        .unwrap();

        assert!(record.link.is_none());
        assert!(record.payload.is_null());
        assert!(!record.is_read);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = serde_json::from_value::<NotificationRecord>(json!({
            "id": "n3",
            "type": "newsletter",
            "title": "t",
            "message": "m",
            "createdAt": "2024-03-01T12:00:00Z"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&NotificationKind::LikeReceived).unwrap();
        assert_eq!(json, r#""like_received""#);
        assert_eq!(NotificationKind::ArticlePublished.to_string(), "article_published");
    }

    #[test]
    fn test_blank_credential_is_absent() {
        assert!(Credential::bearer("").is_none());
        assert!(Credential::bearer("   ").is_none());

        let credential = Credential::bearer("abc").unwrap();
        assert_eq!(credential.authorization_header(), "Bearer abc");
        assert_eq!(format!("{:?}", credential), "Credential(<redacted>)");
    }
}
