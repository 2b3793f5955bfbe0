//! Proactive expiry alerts.
//!
//! Subjects carry expirable attributes. Each sweep maps every expiry to a
//! severity tier and notifies once per tier change, using a dedup ledger
//! that survives restarts.

pub mod engine;
pub mod ledger;
pub mod scanner;
pub mod subject;
pub mod tier;

pub use engine::{CheckSummary, ProactiveCheckEngine};
pub use ledger::{DedupLedger, InMemoryLedger, LedgerEntry, SqliteLedger};
pub use scanner::{SweepHandle, SweepScheduler};
pub use subject::{
    AlertSubject, InMemorySubjectRepository, JsonSubjectRepository, SubjectAttribute,
    SubjectRepository, SubjectSettings,
};
pub use tier::{Tier, TierThresholds};
