//! DailyOS alerts: background job tracking and proactive expiry alerts,
//! delivered through one in-app notification feed.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod migrations;
pub mod notification;
pub mod proactive;
pub mod state;

pub use config::AlertsConfig;
pub use notification::{Notification, NotificationKind, NotificationStore};
pub use state::AppState;
