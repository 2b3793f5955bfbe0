//! Background job tracking.
//!
//! A job is registered once, polled by its own supervised task until the
//! status provider reports a terminal state, and resolved into exactly one
//! notification. The tracker outlives whatever UI surface started the job.

pub mod message;
pub mod provider;
pub mod tracker;
pub mod types;

pub use provider::JobStatusProvider;
pub use tracker::{CompletionCallback, JobTracker, TrackerConfig};
pub use types::{Job, JobDescriptor, JobMode, JobProgress, JobStatus, JobStatusSnapshot};
