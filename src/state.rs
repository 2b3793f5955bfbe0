use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::AlertsConfig;
use crate::error::{CheckError, StartupError};
use crate::jobs::{CompletionCallback, JobDescriptor, JobStatusProvider, JobTracker, TrackerConfig};
use crate::notification::NotificationStore;
use crate::proactive::{
    CheckSummary, DedupLedger, ProactiveCheckEngine, SqliteLedger, SubjectRepository, SweepHandle,
    SweepScheduler,
};

/// Process-wide alerts service: one feed shared by the job tracker and the
/// proactive engine, plus the background sweep scheduler.
pub struct AppState {
    pub config: AlertsConfig,
    pub notifications: Arc<NotificationStore>,
    pub tracker: JobTracker,
    pub engine: Arc<ProactiveCheckEngine>,
    sweep: Mutex<Option<(SweepHandle, JoinHandle<()>)>>,
}

impl AppState {
    pub fn new(
        config: AlertsConfig,
        ledger: Arc<dyn DedupLedger>,
        repository: Arc<dyn SubjectRepository>,
        provider: Arc<dyn JobStatusProvider>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let notifications = Arc::new(NotificationStore::new(config.notification_capacity));
        let tracker = JobTracker::new(
            provider,
            notifications.clone(),
            TrackerConfig::from(&config),
        );
        let engine = Arc::new(ProactiveCheckEngine::new(
            repository,
            ledger,
            notifications.clone(),
            config.thresholds,
        ));

        Ok(Self {
            config,
            notifications,
            tracker,
            engine,
            sweep: Mutex::new(None),
        })
    }

    /// Like `new`, with the SQLite ledger at the configured path.
    pub fn open(
        config: AlertsConfig,
        repository: Arc<dyn SubjectRepository>,
        provider: Arc<dyn JobStatusProvider>,
    ) -> Result<Self, StartupError> {
        let path = config.resolved_ledger_path()?;
        let ledger = SqliteLedger::open(&path)?;
        log::info!("Dedup ledger opened at {}", path.display());
        Self::new(config, Arc::new(ledger), repository, provider)
    }

    /// Spawn the sweep scheduler. Calling again returns the running handle.
    pub fn start(&self) -> SweepHandle {
        let mut sweep = self.sweep.lock();
        if let Some((handle, _)) = sweep.as_ref() {
            return handle.clone();
        }
        let (handle, task) =
            SweepScheduler::from_config(Arc::clone(&self.engine), &self.config).spawn();
        *sweep = Some((handle.clone(), task));
        handle
    }

    /// Wake the scheduler for an early sweep. False if it is not running.
    pub fn request_sweep(&self) -> bool {
        match self.sweep.lock().as_ref() {
            Some((handle, _)) => {
                handle.request_sweep();
                true
            }
            None => false,
        }
    }

    /// Run one sweep on the calling thread, outside the schedule.
    pub fn run_sweep_now(&self) -> Result<CheckSummary, CheckError> {
        self.engine.run_check()
    }

    pub fn track_job(
        &self,
        descriptor: JobDescriptor,
        on_complete: Option<CompletionCallback>,
    ) -> String {
        self.tracker.track(descriptor, on_complete)
    }

    /// Stop the scheduler and every job poll loop.
    pub async fn shutdown(&self) {
        let sweep = self.sweep.lock().take();
        if let Some((handle, task)) = sweep {
            handle.stop();
            if let Err(e) = task.await {
                log::warn!("Sweep scheduler task ended abnormally: {}", e);
            }
        }
        self.tracker.shutdown().await;
    }
}
