//! Job tracker: one supervised poll loop per tracked job.
//!
//! Each loop sleeps `poll_interval`, asks the provider for a snapshot, and
//! either updates progress or resolves the job. Resolution removes the job
//! from the active set and inserts its notification in one critical section,
//! so a job produces exactly one terminal notification. Shutdown closes the
//! registry under the same lock before cancelling, so nothing is emitted
//! after it returns, even for a poll that was already in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::message;
use super::provider::JobStatusProvider;
use super::types::{Job, JobDescriptor, JobProgress, JobStatus, JobStatusSnapshot};
use crate::config::AlertsConfig;
use crate::error::ProviderError;
use crate::notification::NotificationSink;

/// Longest a single status call may take before it counts as a transient error.
const MAX_STATUS_CALL: Duration = Duration::from_secs(60);

/// Invoked once with the raw result payload when a job completes.
pub type CompletionCallback = Box<dyn FnOnce(Value) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Total lifetime before the job is resolved as failed. `None` polls forever.
    pub job_timeout: Option<Duration>,
    /// Consecutive provider errors before giving up. `None` retries forever.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&AlertsConfig::default())
    }
}

impl From<&AlertsConfig> for TrackerConfig {
    fn from(config: &AlertsConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            max_consecutive_errors: config.max_consecutive_poll_errors,
        }
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    closed: bool,
}

struct Shared {
    registry: Mutex<Registry>,
    provider: Arc<dyn JobStatusProvider>,
    sink: Arc<dyn NotificationSink>,
    config: TrackerConfig,
    cancel: CancellationToken,
}

/// Registry of in-flight jobs. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct JobTracker {
    shared: Arc<Shared>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobTracker {
    pub fn new(
        provider: Arc<dyn JobStatusProvider>,
        sink: Arc<dyn NotificationSink>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                provider,
                sink,
                config,
                cancel: CancellationToken::new(),
            }),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a job and start polling it. Returns immediately.
    ///
    /// An empty `job_id` is assigned one. Tracking an id that is already
    /// active is a no-op returning that id; the extra callback is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn track(&self, descriptor: JobDescriptor, on_complete: Option<CompletionCallback>) -> String {
        let job_id = if descriptor.job_id.trim().is_empty() {
            format!("job-{}", uuid::Uuid::new_v4())
        } else {
            descriptor.job_id.clone()
        };

        {
            let mut registry = self.shared.registry.lock();
            if registry.closed {
                log::warn!("JobTracker: ignoring track({}) after shutdown", job_id);
                return job_id;
            }
            if registry.jobs.contains_key(&job_id) {
                log::info!("JobTracker: {} already tracked, not polling twice", job_id);
                return job_id;
            }
            registry
                .jobs
                .insert(job_id.clone(), Job::start(descriptor, job_id.clone()));
        }

        log::info!("JobTracker: tracking {}", job_id);

        let shared = Arc::clone(&self.shared);
        let loop_id = job_id.clone();
        let handle = tokio::spawn(async move {
            poll_job(shared, loop_id, on_complete).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        job_id
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.shared.registry.lock().jobs.contains_key(job_id)
    }

    /// Current status and progress of an active job.
    pub fn status(&self, job_id: &str) -> Option<JobStatusSnapshot> {
        self.shared
            .registry
            .lock()
            .jobs
            .get(job_id)
            .map(Job::snapshot)
    }

    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.shared.registry.lock().jobs.get(job_id).cloned()
    }

    /// Active jobs, oldest first.
    pub fn active_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.shared.registry.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.registry.lock().closed
    }

    /// Cancel every poll loop and wait for them to exit.
    ///
    /// No status call or notification happens after this returns.
    pub async fn shutdown(&self) {
        let dropped = {
            let mut registry = self.shared.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            let n = registry.jobs.len();
            registry.jobs.clear();
            n
        };
        self.shared.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("JobTracker: poll task ended abnormally: {}", e);
            }
        }

        log::info!("JobTracker: shut down, {} job(s) abandoned", dropped);
    }
}

impl Shared {
    fn update_progress(&self, job_id: &str, progress: Option<JobProgress>) {
        let mut registry = self.registry.lock();
        if let Some(job) = registry.jobs.get_mut(job_id) {
            job.status = JobStatus::Pending;
            if progress.is_some() {
                job.progress = progress;
            }
        }
    }

    /// Returns true if the callback should run.
    fn resolve_completed(&self, job_id: &str, payload: &Value) -> bool {
        let mut registry = self.registry.lock();
        if registry.closed {
            return false;
        }
        let Some(mut job) = registry.jobs.remove(job_id) else {
            return false;
        };
        job.status = JobStatus::Completed;
        let id = self.sink.deliver(message::success_notification(&job, payload));
        log::info!("JobTracker: {} completed, notification {}", job_id, id);
        true
    }

    fn resolve_failed(&self, job_id: &str, error_message: Option<&str>) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        let Some(mut job) = registry.jobs.remove(job_id) else {
            return;
        };
        job.status = JobStatus::Failed;
        let id = self
            .sink
            .deliver(message::failure_notification(&job, error_message));
        log::info!(
            "JobTracker: {} failed ({}), notification {}",
            job_id,
            error_message.unwrap_or("no message"),
            id
        );
    }
}

async fn poll_job(shared: Arc<Shared>, job_id: String, on_complete: Option<CompletionCallback>) {
    let started = Instant::now();
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => return,
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
        }

        if let Some(timeout) = shared.config.job_timeout {
            if started.elapsed() >= timeout {
                log::warn!("JobTracker: {} timed out after {:?}", job_id, timeout);
                shared.resolve_failed(
                    &job_id,
                    Some("Generation timed out before finishing. Please try again."),
                );
                return;
            }
        }

        // A hung call must not outlive the job's own deadline
        let call_budget = match shared.config.job_timeout {
            Some(timeout) => timeout.saturating_sub(started.elapsed()).min(MAX_STATUS_CALL),
            None => MAX_STATUS_CALL,
        };
        let outcome = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            res = tokio::time::timeout(call_budget, shared.provider.get_status(&job_id)) => {
                res.unwrap_or_else(|_| {
                    Err(ProviderError::Transient(format!(
                        "status call gave no answer within {}s",
                        call_budget.as_secs()
                    )))
                })
            }
        };

        match outcome {
            Ok(snapshot) => {
                consecutive_errors = 0;
                match snapshot.status {
                    JobStatus::Pending => shared.update_progress(&job_id, snapshot.progress),
                    JobStatus::Completed => {
                        let payload = snapshot.result.unwrap_or(Value::Null);
                        if shared.resolve_completed(&job_id, &payload) {
                            if let Some(callback) = on_complete {
                                callback(payload);
                            }
                        }
                        return;
                    }
                    JobStatus::Failed => {
                        shared.resolve_failed(&job_id, snapshot.error_message.as_deref());
                        return;
                    }
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                log::warn!(
                    "JobTracker: status poll for {} failed ({} in a row): {}",
                    job_id,
                    consecutive_errors,
                    e
                );
                if let Some(max) = shared.config.max_consecutive_errors {
                    if consecutive_errors >= max {
                        shared.resolve_failed(
                            &job_id,
                            Some("Lost contact with the generation service. Please try again."),
                        );
                        return;
                    }
                }
            }
        }
    }
}
