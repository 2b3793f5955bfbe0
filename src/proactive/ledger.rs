//! Dedup ledger: which tier each (subject, attribute kind) was last notified for.
//!
//! At most one tier is active per key. Activating a different tier replaces
//! the old one, so only exact repeats are suppressed and every tier change
//! notifies. Clearing (on renewal) lets a future expiry notify again.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::tier::Tier;
use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub subject_id: String,
    pub attribute_kind: String,
    pub tier: Tier,
    pub notified_at: DateTime<Utc>,
}

pub trait DedupLedger: Send + Sync {
    /// True if `tier` is the active tier for this key.
    fn has_active(&self, subject_id: &str, attribute_kind: &str, tier: Tier)
        -> Result<bool, LedgerError>;

    /// Make `tier` the active tier for this key. `Tier::None` clears it.
    fn set_active(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Drop the entry for this key. Returns true if one existed.
    fn clear(&self, subject_id: &str, attribute_kind: &str) -> Result<bool, LedgerError>;

    fn active_tier(&self, subject_id: &str, attribute_kind: &str)
        -> Result<Option<Tier>, LedgerError>;

    /// Atomically activate `tier` unless it is already active.
    ///
    /// Returns true if this call activated it, i.e. the caller owns the one
    /// notification for this tier-occupancy.
    fn try_activate(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;
}

type LedgerKey = (String, String);

fn key(subject_id: &str, attribute_kind: &str) -> LedgerKey {
    (subject_id.to_string(), attribute_kind.to_string())
}

/// Process-local ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<LedgerKey, LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().values().cloned().collect()
    }
}

impl DedupLedger for InMemoryLedger {
    fn has_active(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .entries
            .lock()
            .get(&key(subject_id, attribute_kind))
            .is_some_and(|e| e.tier == tier))
    }

    fn set_active(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !tier.is_alert() {
            self.clear(subject_id, attribute_kind)?;
            return Ok(());
        }
        self.entries.lock().insert(
            key(subject_id, attribute_kind),
            LedgerEntry {
                subject_id: subject_id.to_string(),
                attribute_kind: attribute_kind.to_string(),
                tier,
                notified_at,
            },
        );
        Ok(())
    }

    fn clear(&self, subject_id: &str, attribute_kind: &str) -> Result<bool, LedgerError> {
        Ok(self
            .entries
            .lock()
            .remove(&key(subject_id, attribute_kind))
            .is_some())
    }

    fn active_tier(
        &self,
        subject_id: &str,
        attribute_kind: &str,
    ) -> Result<Option<Tier>, LedgerError> {
        Ok(self
            .entries
            .lock()
            .get(&key(subject_id, attribute_kind))
            .map(|e| e.tier))
    }

    fn try_activate(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if !tier.is_alert() {
            self.clear(subject_id, attribute_kind)?;
            return Ok(false);
        }
        let mut entries = self.entries.lock();
        let k = key(subject_id, attribute_kind);
        if entries.get(&k).is_some_and(|e| e.tier == tier) {
            return Ok(false);
        }
        entries.insert(
            k,
            LedgerEntry {
                subject_id: subject_id.to_string(),
                attribute_kind: attribute_kind.to_string(),
                tier,
                notified_at,
            },
        );
        Ok(true)
    }
}

/// Ledger persisted in the `alert_ledger` SQLite table.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Ok(Self::from_connection(crate::db::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Ok(Self::from_connection(crate::db::open_in_memory()?))
    }

    /// Wrap a connection whose schema is already migrated.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT subject_id, attribute_kind, tier, notified_at FROM alert_ledger
             ORDER BY subject_id, attribute_kind",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (subject_id, attribute_kind, tier, notified_at) = row?;
            let tier = Tier::parse(&tier).ok_or(LedgerError::UnknownTier(tier))?;
            let notified_at = DateTime::parse_from_rfc3339(&notified_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| LedgerError::BadTimestamp(notified_at))?;
            entries.push(LedgerEntry {
                subject_id,
                attribute_kind,
                tier,
                notified_at,
            });
        }
        Ok(entries)
    }
}

impl DedupLedger for SqliteLedger {
    fn has_active(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn.lock();
        let exists = conn
            .prepare(
                "SELECT 1 FROM alert_ledger
                 WHERE subject_id = ?1 AND attribute_kind = ?2 AND tier = ?3",
            )?
            .exists(params![subject_id, attribute_kind, tier.as_str()])?;
        Ok(exists)
    }

    fn set_active(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !tier.is_alert() {
            self.clear(subject_id, attribute_kind)?;
            return Ok(());
        }
        self.conn.lock().execute(
            "INSERT INTO alert_ledger (subject_id, attribute_kind, tier, notified_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(subject_id, attribute_kind) DO UPDATE SET
                 tier = excluded.tier,
                 notified_at = excluded.notified_at",
            params![
                subject_id,
                attribute_kind,
                tier.as_str(),
                notified_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn clear(&self, subject_id: &str, attribute_kind: &str) -> Result<bool, LedgerError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM alert_ledger WHERE subject_id = ?1 AND attribute_kind = ?2",
            params![subject_id, attribute_kind],
        )?;
        Ok(removed > 0)
    }

    fn active_tier(
        &self,
        subject_id: &str,
        attribute_kind: &str,
    ) -> Result<Option<Tier>, LedgerError> {
        let tier: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT tier FROM alert_ledger WHERE subject_id = ?1 AND attribute_kind = ?2",
                params![subject_id, attribute_kind],
                |row| row.get(0),
            )
            .optional()?;
        match tier {
            None => Ok(None),
            Some(t) => Tier::parse(&t).map(Some).ok_or(LedgerError::UnknownTier(t)),
        }
    }

    fn try_activate(
        &self,
        subject_id: &str,
        attribute_kind: &str,
        tier: Tier,
        notified_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        if !tier.is_alert() {
            self.clear(subject_id, attribute_kind)?;
            return Ok(false);
        }
        // Upsert that only writes when the tier actually changes
        let changed = self.conn.lock().execute(
            "INSERT INTO alert_ledger (subject_id, attribute_kind, tier, notified_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(subject_id, attribute_kind) DO UPDATE SET
                 tier = excluded.tier,
                 notified_at = excluded.notified_at
             WHERE alert_ledger.tier != excluded.tier",
            params![
                subject_id,
                attribute_kind,
                tier.as_str(),
                notified_at.to_rfc3339()
            ],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_conn;
    use std::sync::Arc;

    fn ledgers() -> Vec<(&'static str, Box<dyn DedupLedger>)> {
        vec![
            ("memory", Box::new(InMemoryLedger::new())),
            ("sqlite", Box::new(SqliteLedger::from_connection(test_conn()))),
        ]
    }

    #[test]
    fn test_try_activate_suppresses_exact_repeat() {
        for (name, ledger) in ledgers() {
            let now = Utc::now();
            assert!(ledger.try_activate("s1", "cert", Tier::Warning, now).unwrap(), "{name}");
            assert!(!ledger.try_activate("s1", "cert", Tier::Warning, now).unwrap(), "{name}");
            assert!(ledger.has_active("s1", "cert", Tier::Warning).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_tier_change_replaces_active_entry() {
        for (name, ledger) in ledgers() {
            let now = Utc::now();
            ledger.try_activate("s1", "cert", Tier::Warning, now).unwrap();
            assert!(ledger.try_activate("s1", "cert", Tier::Urgent, now).unwrap(), "{name}");
            assert!(!ledger.has_active("s1", "cert", Tier::Warning).unwrap(), "{name}");
            assert_eq!(ledger.active_tier("s1", "cert").unwrap(), Some(Tier::Urgent), "{name}");

            // Improving back to warning is a tier change too
            assert!(ledger.try_activate("s1", "cert", Tier::Warning, now).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_keys_are_independent() {
        for (name, ledger) in ledgers() {
            let now = Utc::now();
            ledger.try_activate("s1", "cert", Tier::Urgent, now).unwrap();
            assert!(ledger.try_activate("s1", "insurance", Tier::Urgent, now).unwrap(), "{name}");
            assert!(ledger.try_activate("s2", "cert", Tier::Urgent, now).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_clear_allows_renotify() {
        for (name, ledger) in ledgers() {
            let now = Utc::now();
            ledger.set_active("s1", "cert", Tier::Expired, now).unwrap();
            assert!(ledger.clear("s1", "cert").unwrap(), "{name}");
            assert!(!ledger.clear("s1", "cert").unwrap(), "{name}");
            assert_eq!(ledger.active_tier("s1", "cert").unwrap(), None, "{name}");
            assert!(ledger.try_activate("s1", "cert", Tier::Expired, now).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_none_tier_clears() {
        for (name, ledger) in ledgers() {
            let now = Utc::now();
            ledger.set_active("s1", "cert", Tier::Urgent, now).unwrap();
            ledger.set_active("s1", "cert", Tier::None, now).unwrap();
            assert_eq!(ledger.active_tier("s1", "cert").unwrap(), None, "{name}");
            assert!(!ledger.try_activate("s1", "cert", Tier::None, now).unwrap(), "{name}");
        }
    }

    #[test]
    fn test_sqlite_ledger_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("alerts.db");
        {
            let ledger = SqliteLedger::open(&path).expect("open");
            ledger
                .try_activate("s1", "cert", Tier::Urgent, Utc::now())
                .unwrap();
        }
        let ledger = SqliteLedger::open(&path).expect("reopen");
        assert!(ledger.has_active("s1", "cert", Tier::Urgent).unwrap());
        assert!(!ledger.try_activate("s1", "cert", Tier::Urgent, Utc::now()).unwrap());
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tier, Tier::Urgent);
    }

    #[test]
    fn test_entries_reject_corrupt_rows() {
        let ledger = SqliteLedger::from_connection(test_conn());
        ledger
            .conn
            .lock()
            .execute(
                "INSERT INTO alert_ledger (subject_id, attribute_kind, tier, notified_at)
                 VALUES ('s1', 'cert', 'urgent', 'yesterday-ish')",
                [],
            )
            .unwrap();
        match ledger.entries() {
            Err(LedgerError::BadTimestamp(raw)) => assert_eq!(raw, "yesterday-ish"),
            other => panic!("expected BadTimestamp, got {:?}", other),
        }

        // Lookups that do not read the timestamp still work
        assert_eq!(ledger.active_tier("s1", "cert").unwrap(), Some(Tier::Urgent));
    }

    #[test]
    fn test_concurrent_try_activate_has_one_winner() {
        let ledger: Arc<dyn DedupLedger> = Arc::new(SqliteLedger::from_connection(test_conn()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .try_activate("s1", "cert", Tier::Expired, Utc::now())
                        .unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
