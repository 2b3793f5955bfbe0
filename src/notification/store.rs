//! Ordered notification registry with read-state bookkeeping.
//!
//! Entries are kept most-recent-first. Every mutation runs under one lock so
//! the unread count can never be observed out of step with the entries.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{new_notification_id, NewNotification, Notification, NotificationSink};
use crate::error::SnapshotError;

/// Buffer size for the new-notification broadcast channel
const BROADCAST_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    items: VecDeque<Notification>,
    unread: usize,
}

impl Inner {
    fn trim_to(&mut self, capacity: usize) {
        while self.items.len() > capacity {
            if let Some(dropped) = self.items.pop_back() {
                if !dropped.read {
                    self.unread = self.unread.saturating_sub(1);
                }
            }
        }
    }
}

pub struct NotificationStore {
    inner: Mutex<Inner>,
    capacity: usize,
    added: broadcast::Sender<Notification>,
}

impl NotificationStore {
    /// Create an empty store that keeps at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let (added, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            added,
        }
    }

    /// Insert at the head, stamping id and timestamp if absent.
    ///
    /// A caller-supplied id that is already present replaces that entry.
    pub fn add(&self, draft: NewNotification) -> String {
        let notification = Notification {
            id: draft.id.unwrap_or_else(new_notification_id),
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            read: false,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            context: draft.context,
            action_label: draft.action_label,
        };
        let id = notification.id.clone();

        {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.items.iter().position(|n| n.id == id) {
                if let Some(replaced) = inner.items.remove(pos) {
                    if !replaced.read {
                        inner.unread = inner.unread.saturating_sub(1);
                    }
                }
            }
            inner.items.push_front(notification.clone());
            inner.unread += 1;
            inner.trim_to(self.capacity);
        }

        log::debug!("Notification added: {} ({:?})", id, notification.kind);
        // No subscribers is fine
        let _ = self.added.send(notification);
        id
    }

    /// Mark one entry read. Returns true if it was unread.
    pub fn mark_read(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if entry.read {
            return false;
        }
        entry.read = true;
        inner.unread = inner.unread.saturating_sub(1);
        true
    }

    /// Mark every entry read. Returns how many flipped.
    pub fn mark_all_read(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut flipped = 0;
        for entry in inner.items.iter_mut().filter(|n| !n.read) {
            entry.read = true;
            flipped += 1;
        }
        inner.unread = 0;
        flipped
    }

    /// Delete an entry, returning it if present.
    pub fn remove(&self, id: &str) -> Option<Notification> {
        let mut inner = self.inner.lock();
        let idx = inner.items.iter().position(|n| n.id == id)?;
        let removed = inner.items.remove(idx)?;
        if !removed.read {
            inner.unread = inner.unread.saturating_sub(1);
        }
        Some(removed)
    }

    /// Most recent unread entry.
    pub fn latest_unread(&self) -> Option<Notification> {
        self.inner.lock().items.iter().find(|n| !n.read).cloned()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.unread = 0;
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().unread
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.inner.lock().items.iter().find(|n| n.id == id).cloned()
    }

    /// Up to `limit` entries, most recent first.
    pub fn list(&self, limit: usize) -> Vec<Notification> {
        self.inner.lock().items.iter().take(limit).cloned().collect()
    }

    /// Receive every notification inserted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.added.subscribe()
    }

    /// Write the feed to `path` as a JSON array, most recent first.
    pub fn save_to(&self, path: &Path) -> Result<(), SnapshotError> {
        let items: Vec<Notification> = self.inner.lock().items.iter().cloned().collect();
        let content = serde_json::to_string_pretty(&items)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Rebuild a store from a snapshot. A missing file yields an empty store.
    pub fn load_from(path: &Path, capacity: usize) -> Result<Self, SnapshotError> {
        let store = Self::new(capacity);
        if !path.exists() {
            return Ok(store);
        }

        let content = fs::read_to_string(path)?;
        let items: Vec<Notification> = serde_json::from_str(&content)?;
        {
            let mut inner = store.inner.lock();
            inner.unread = items.iter().filter(|n| !n.read).count();
            inner.items = items.into();
            inner.trim_to(store.capacity);
        }
        Ok(store)
    }
}

impl NotificationSink for NotificationStore {
    fn deliver(&self, notification: NewNotification) -> String {
        self.add(notification)
    }
}
