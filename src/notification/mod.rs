//! In-app notification feed.
//!
//! Producers (the job tracker and the proactive engine) hand a
//! `NewNotification` to a `NotificationSink`; the `NotificationStore` is the
//! default sink and the read/write surface for UI and delivery channels.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use store::NotificationStore;

/// What produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobSucceeded,
    JobFailed,
    AlertRaised,
    Informational,
}

/// A user-facing record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Opaque payload for downstream consumers.
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
}

/// A notification as built by a producer, before the store stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub context: Value,
    pub action_label: Option<String>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: None,
            kind,
            title: title.into(),
            message: message.into(),
            context: Value::Null,
            action_label: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_action_label(mut self, label: impl Into<String>) -> Self {
        self.action_label = Some(label.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Anything that accepts notifications from producers.
///
/// Insertion always succeeds and returns the stored id.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: NewNotification) -> String;
}

/// Generate a unique notification id.
pub fn new_notification_id() -> String {
    format!("ntf-{}", uuid::Uuid::new_v4())
}
