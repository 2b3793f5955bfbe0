//! Proactive check engine.
//!
//! One sweep walks every enabled subject, evaluates each tracked attribute's
//! expiry tier, and emits at most one notification per tier-occupancy. The
//! dedup ledger is the only memory between sweeps.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::ledger::DedupLedger;
use super::subject::{AlertSubject, SubjectRepository};
use super::tier::{build_alert_title, days_remaining, kind_label, Tier, TierThresholds};
use crate::error::{CheckError, LedgerError, SubjectError};
use crate::notification::{NewNotification, NotificationKind, NotificationSink};

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    /// Subjects evaluated without error.
    pub processed_count: usize,
    pub notifications_emitted_count: usize,
    /// Subjects skipped because their data or ledger access failed.
    pub skipped_count: usize,
    /// Ledger entries cleared because the attribute left every alert tier.
    pub cleared_count: usize,
}

#[derive(Debug, Error)]
enum SubjectEvalError {
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct ProactiveCheckEngine {
    repository: Arc<dyn SubjectRepository>,
    ledger: Arc<dyn DedupLedger>,
    sink: Arc<dyn NotificationSink>,
    thresholds: TierThresholds,
    sweep_lock: Mutex<()>,
}

impl ProactiveCheckEngine {
    pub fn new(
        repository: Arc<dyn SubjectRepository>,
        ledger: Arc<dyn DedupLedger>,
        sink: Arc<dyn NotificationSink>,
        thresholds: TierThresholds,
    ) -> Self {
        Self {
            repository,
            ledger,
            sink,
            thresholds,
            sweep_lock: Mutex::new(()),
        }
    }

    /// True while a sweep holds the engine.
    pub fn is_running(&self) -> bool {
        self.sweep_lock.is_locked()
    }

    pub fn run_check(&self) -> Result<CheckSummary, CheckError> {
        self.run_check_at(Utc::now())
    }

    /// Run one sweep as of `now`.
    ///
    /// Fails only when the sweep as a whole cannot run: the repository is
    /// unreachable or another sweep is already in progress. Bad data on one
    /// subject is logged and counted in `skipped_count`.
    pub fn run_check_at(&self, now: DateTime<Utc>) -> Result<CheckSummary, CheckError> {
        let _guard = self
            .sweep_lock
            .try_lock()
            .ok_or(CheckError::SweepInProgress)?;

        let subjects = self.repository.list_enabled_subjects()?;
        log::info!("Proactive sweep: checking {} subjects", subjects.len());

        let mut summary = CheckSummary::default();
        for subject in &subjects {
            if !subject.settings.proactive_enabled {
                continue;
            }
            match self.check_subject(subject, now, &mut summary) {
                Ok(()) => summary.processed_count += 1,
                Err(e) => {
                    log::warn!(
                        "Proactive sweep: skipping subject '{}': {}",
                        subject.subject_id,
                        e
                    );
                    summary.skipped_count += 1;
                }
            }
        }

        log::info!(
            "Proactive sweep: {} processed, {} notified, {} skipped, {} cleared",
            summary.processed_count,
            summary.notifications_emitted_count,
            summary.skipped_count,
            summary.cleared_count
        );
        Ok(summary)
    }

    fn check_subject(
        &self,
        subject: &AlertSubject,
        now: DateTime<Utc>,
        summary: &mut CheckSummary,
    ) -> Result<(), SubjectEvalError> {
        if subject.subject_id.trim().is_empty() {
            return Err(SubjectError::MissingField {
                subject_id: String::new(),
                field: "subjectId",
            }
            .into());
        }

        // Validate every tracked attribute before touching the ledger.
        // Kinds must be unique: the ledger holds one tier per kind.
        let mut tracked = Vec::new();
        let mut kinds = HashSet::new();
        for attribute in subject.attributes.iter().filter(|a| a.notify_enabled) {
            if attribute.kind.trim().is_empty() {
                return Err(SubjectError::MissingField {
                    subject_id: subject.subject_id.clone(),
                    field: "kind",
                }
                .into());
            }
            if !kinds.insert(attribute.kind.as_str()) {
                return Err(SubjectError::DuplicateAttribute {
                    subject_id: subject.subject_id.clone(),
                    attribute_kind: attribute.kind.clone(),
                }
                .into());
            }
            if let Some(expires_at) = attribute.parsed_expiry(&subject.subject_id)? {
                tracked.push((attribute.kind.as_str(), expires_at));
            }
        }

        for (kind, expires_at) in tracked {
            let tier = self.thresholds.evaluate(Some(expires_at), now);
            if tier == Tier::None {
                if self.ledger.clear(&subject.subject_id, kind)? {
                    log::debug!(
                        "Proactive sweep: cleared {} for '{}' after renewal",
                        kind,
                        subject.subject_id
                    );
                    summary.cleared_count += 1;
                }
                continue;
            }

            if !self
                .ledger
                .try_activate(&subject.subject_id, kind, tier, now)?
            {
                continue;
            }

            let days = days_remaining(expires_at, now);
            if let Some(draft) = alert_notification(subject, kind, tier, days, expires_at, now) {
                self.sink.deliver(draft);
                summary.notifications_emitted_count += 1;
            }
        }
        Ok(())
    }
}

fn alert_notification(
    subject: &AlertSubject,
    kind: &str,
    tier: Tier,
    days: i64,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<NewNotification> {
    let title = build_alert_title(kind, tier, days)?;
    let date = expires_at.format("%b %-d, %Y");
    let what = kind_label(kind).to_lowercase();
    let message = if tier == Tier::Expired {
        format!("{}'s {} expired on {}.", subject.display_label(), what, date)
    } else {
        format!("{}'s {} expires on {}.", subject.display_label(), what, date)
    };

    Some(
        NewNotification::new(NotificationKind::AlertRaised, title, message)
            .with_context(json!({
                "subjectId": subject.subject_id,
                "attributeKind": kind,
                "tier": tier.as_str(),
                "daysRemaining": days,
                "expiresAt": expires_at.to_rfc3339(),
            }))
            .with_action_label("Review")
            .at(now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::notification::NotificationStore;
    use crate::proactive::ledger::{InMemoryLedger, SqliteLedger};
    use crate::proactive::subject::InMemorySubjectRepository;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn in_days(days: i64) -> Option<String> {
        Some((now() + Duration::days(days)).to_rfc3339())
    }

    struct Harness {
        repo: Arc<InMemorySubjectRepository>,
        ledger: Arc<InMemoryLedger>,
        store: Arc<NotificationStore>,
        engine: ProactiveCheckEngine,
    }

    fn harness(subjects: Vec<AlertSubject>) -> Harness {
        let repo = Arc::new(InMemorySubjectRepository::new(subjects));
        let ledger = Arc::new(InMemoryLedger::new());
        let store = Arc::new(NotificationStore::new(100));
        let engine = ProactiveCheckEngine::new(
            repo.clone(),
            ledger.clone(),
            store.clone(),
            TierThresholds::default(),
        );
        Harness {
            repo,
            ledger,
            store,
            engine,
        }
    }

    #[test]
    fn test_urgent_then_dedup_then_expired() {
        let h = harness(vec![AlertSubject::new("s1")
            .with_label("Dana")
            .with_attribute("certification", in_days(5))]);

        let first = h.engine.run_check_at(now()).unwrap();
        assert_eq!(first.processed_count, 1);
        assert_eq!(first.notifications_emitted_count, 1);
        let n = h.store.latest_unread().expect("alert");
        assert!(n.title.contains("5 days"));
        assert!(n.title.starts_with("⚠️"));
        assert_eq!(n.kind, NotificationKind::AlertRaised);
        assert_eq!(n.context["tier"], "urgent");
        assert_eq!(n.context["subjectId"], "s1");
        assert_eq!(n.context["attributeKind"], "certification");
        assert_eq!(n.message, "Dana's certification expires on Mar 6, 2026.");

        let second = h.engine.run_check_at(now() + Duration::hours(1)).unwrap();
        assert_eq!(second.notifications_emitted_count, 0);
        assert_eq!(h.store.len(), 1);

        let later = h.engine.run_check_at(now() + Duration::days(6)).unwrap();
        assert_eq!(later.notifications_emitted_count, 1);
        let n = h.store.latest_unread().expect("expired alert");
        assert!(n.title.contains("expired"));
        assert_eq!(n.context["tier"], "expired");
        assert_eq!(h.ledger.active_tier("s1", "certification").unwrap(), Some(Tier::Expired));
    }

    #[test]
    fn test_warning_to_urgent_notifies_again() {
        let h = harness(vec![AlertSubject::new("s1").with_attribute("insurance", in_days(10))]);

        let first = h.engine.run_check_at(now()).unwrap();
        assert_eq!(first.notifications_emitted_count, 1);
        assert_eq!(h.store.latest_unread().unwrap().context["tier"], "warning");

        let second = h.engine.run_check_at(now() + Duration::days(4)).unwrap();
        assert_eq!(second.notifications_emitted_count, 1);
        assert_eq!(h.store.latest_unread().unwrap().context["tier"], "urgent");
        assert_eq!(h.store.len(), 2);
    }

    #[test]
    fn test_renewal_clears_and_allows_future_alerts() {
        let h = harness(vec![AlertSubject::new("s1").with_attribute("cert", in_days(3))]);
        assert_eq!(h.engine.run_check_at(now()).unwrap().notifications_emitted_count, 1);

        // Renewed a year out
        h.repo
            .replace(vec![AlertSubject::new("s1").with_attribute("cert", in_days(365))]);
        let renewed = h.engine.run_check_at(now()).unwrap();
        assert_eq!(renewed.notifications_emitted_count, 0);
        assert_eq!(renewed.cleared_count, 1);
        assert_eq!(h.ledger.active_tier("s1", "cert").unwrap(), None);

        // And it lapses again
        h.repo
            .replace(vec![AlertSubject::new("s1").with_attribute("cert", in_days(3))]);
        assert_eq!(h.engine.run_check_at(now()).unwrap().notifications_emitted_count, 1);
    }

    #[test]
    fn test_malformed_subject_is_skipped() {
        let mut blank = AlertSubject::new("");
        blank.attributes.push(crate::proactive::subject::SubjectAttribute {
            kind: "cert".into(),
            expires_at: in_days(1),
            notify_enabled: true,
        });
        let h = harness(vec![
            AlertSubject::new("bad").with_attribute("cert", Some("next tuesday".into())),
            blank,
            AlertSubject::new("good").with_attribute("cert", in_days(2)),
        ]);

        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.skipped_count, 2);
        assert_eq!(summary.notifications_emitted_count, 1);
        assert_eq!(h.store.latest_unread().unwrap().context["subjectId"], "good");
    }

    #[test]
    fn test_malformed_attribute_blocks_whole_subject_before_side_effects() {
        let h = harness(vec![AlertSubject::new("s1")
            .with_attribute("cert", in_days(2))
            .with_attribute("visa", Some("not-a-date".into()))]);

        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.notifications_emitted_count, 0);
        assert_eq!(h.ledger.active_tier("s1", "cert").unwrap(), None);
    }

    #[test]
    fn test_duplicate_kind_is_rejected_and_stays_quiet() {
        let h = harness(vec![
            AlertSubject::new("s1")
                .with_attribute("cert", in_days(5))
                .with_attribute("cert", in_days(20)),
            AlertSubject::new("s2").with_attribute("cert", in_days(5)),
        ]);

        let emitted: Vec<usize> = (0..3)
            .map(|_| h.engine.run_check_at(now()).unwrap())
            .inspect(|summary| assert_eq!(summary.skipped_count, 1))
            .map(|summary| summary.notifications_emitted_count)
            .collect();
        assert_eq!(emitted, vec![1, 0, 0]);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.ledger.active_tier("s1", "cert").unwrap(), None);

        // A muted duplicate does not count
        let mut muted = AlertSubject::new("s1")
            .with_attribute("cert", in_days(5))
            .with_attribute("cert", in_days(20));
        muted.attributes[1].notify_enabled = false;
        h.repo.replace(vec![muted]);
        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.skipped_count, 0);
        assert_eq!(summary.notifications_emitted_count, 1);
        assert_eq!(h.engine.run_check_at(now()).unwrap().notifications_emitted_count, 0);
    }

    #[test]
    fn test_disabled_subject_and_attribute_are_ignored() {
        let mut opted_out = AlertSubject::new("s1").with_attribute("cert", in_days(2));
        opted_out.settings.proactive_enabled = false;
        let mut muted = AlertSubject::new("s2").with_attribute("cert", in_days(2));
        muted.attributes[0].notify_enabled = false;
        let untracked = AlertSubject::new("s3").with_attribute("cert", None);

        let h = harness(vec![opted_out, muted, untracked]);
        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.notifications_emitted_count, 0);
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_muting_keeps_existing_ledger_entry() {
        let h = harness(vec![AlertSubject::new("s1").with_attribute("cert", in_days(2))]);
        h.engine.run_check_at(now()).unwrap();

        let mut muted = AlertSubject::new("s1").with_attribute("cert", in_days(2));
        muted.attributes[0].notify_enabled = false;
        h.repo.replace(vec![muted]);
        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.cleared_count, 0);
        assert_eq!(h.ledger.active_tier("s1", "cert").unwrap(), Some(Tier::Urgent));

        // Unmuting in the same tier does not repeat the alert
        h.repo
            .replace(vec![AlertSubject::new("s1").with_attribute("cert", in_days(2))]);
        assert_eq!(h.engine.run_check_at(now()).unwrap().notifications_emitted_count, 0);
    }

    #[test]
    fn test_far_expiry_produces_nothing() {
        let h = harness(vec![AlertSubject::new("s1").with_attribute("cert", in_days(31))]);
        let summary = h.engine.run_check_at(now()).unwrap();
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.notifications_emitted_count, 0);
        assert_eq!(summary.cleared_count, 0);
    }

    #[test]
    fn test_compressed_thresholds() {
        let repo = Arc::new(InMemorySubjectRepository::new(vec![
            AlertSubject::new("s1").with_attribute("cert", in_days(2)),
        ]));
        let store = Arc::new(NotificationStore::new(10));
        let engine = ProactiveCheckEngine::new(
            repo,
            Arc::new(InMemoryLedger::new()),
            store.clone(),
            TierThresholds {
                warning_days: 3,
                urgent_days: 1,
                expired_days: 0,
            },
        );
        engine.run_check_at(now()).unwrap();
        assert_eq!(store.latest_unread().unwrap().context["tier"], "warning");
    }

    struct DownRepository;

    impl SubjectRepository for DownRepository {
        fn list_enabled_subjects(&self) -> Result<Vec<AlertSubject>, RepositoryError> {
            Err(RepositoryError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_repository_failure_fails_sweep() {
        let store = Arc::new(NotificationStore::new(10));
        let engine = ProactiveCheckEngine::new(
            Arc::new(DownRepository),
            Arc::new(InMemoryLedger::new()),
            store.clone(),
            TierThresholds::default(),
        );
        let err = engine.run_check_at(now()).unwrap_err();
        assert!(matches!(err, CheckError::Repository(_)));
        assert!(err.is_retryable());
        assert!(!engine.is_running());
        assert!(store.is_empty());
    }

    /// Blocks inside `list_enabled_subjects` until released.
    struct GatedRepository {
        entered: std::sync::mpsc::SyncSender<()>,
        release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SubjectRepository for GatedRepository {
        fn list_enabled_subjects(&self) -> Result<Vec<AlertSubject>, RepositoryError> {
            self.entered.send(()).ok();
            self.release.lock().unwrap().recv().ok();
            Ok(vec![AlertSubject::new("s1").with_attribute("cert", in_days(1))])
        }
    }

    #[test]
    fn test_concurrent_sweep_is_rejected() {
        let (entered_tx, entered_rx) = std::sync::mpsc::sync_channel(1);
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let engine = Arc::new(ProactiveCheckEngine::new(
            Arc::new(GatedRepository {
                entered: entered_tx,
                release: std::sync::Mutex::new(release_rx),
            }),
            Arc::new(InMemoryLedger::new()),
            Arc::new(NotificationStore::new(10)),
            TierThresholds::default(),
        ));

        let background = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.run_check_at(now()))
        };
        entered_rx.recv().unwrap();
        assert!(engine.is_running());
        assert!(matches!(
            engine.run_check_at(now()),
            Err(CheckError::SweepInProgress)
        ));

        release_tx.send(()).unwrap();
        let summary = background.join().unwrap().unwrap();
        assert_eq!(summary.notifications_emitted_count, 1);
    }

    #[test]
    fn test_sqlite_ledger_dedups_across_engines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.db");
        let subjects = vec![AlertSubject::new("s1").with_attribute("cert", in_days(20))];

        for expected in [1, 0] {
            let store = Arc::new(NotificationStore::new(10));
            let engine = ProactiveCheckEngine::new(
                Arc::new(InMemorySubjectRepository::new(subjects.clone())),
                Arc::new(SqliteLedger::open(&path).unwrap()),
                store,
                TierThresholds::default(),
            );
            let summary = engine.run_check_at(now()).unwrap();
            assert_eq!(summary.notifications_emitted_count, expected);
        }
    }
}
