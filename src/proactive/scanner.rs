//! Background sweep scheduler.
//!
//! Runs a proactive sweep on start, then every `interval`. A manual wake
//! (`SweepHandle::request_sweep`) runs one early, but never sooner than
//! `min_gap` after the previous sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::engine::ProactiveCheckEngine;
use crate::config::AlertsConfig;
use crate::error::CheckError;

pub struct SweepScheduler {
    engine: Arc<ProactiveCheckEngine>,
    interval: Duration,
    min_gap: Duration,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

/// Control handle for a spawned scheduler.
#[derive(Clone)]
pub struct SweepHandle {
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl SweepHandle {
    /// Ask for a sweep ahead of schedule.
    pub fn request_sweep(&self) {
        self.wake.notify_one();
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl SweepScheduler {
    pub fn new(engine: Arc<ProactiveCheckEngine>, interval: Duration, min_gap: Duration) -> Self {
        Self {
            engine,
            interval,
            min_gap,
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(engine: Arc<ProactiveCheckEngine>, config: &AlertsConfig) -> Self {
        Self::new(engine, config.sweep_interval(), config.min_sweep_gap())
    }

    /// Stop this scheduler when `parent` is cancelled.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn handle(&self) -> SweepHandle {
        SweepHandle {
            wake: Arc::clone(&self.wake),
            cancel: self.cancel.clone(),
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> (SweepHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    async fn run(self) {
        log::info!(
            "Sweep scheduler: started (interval {}s, min gap {}s)",
            self.interval.as_secs(),
            self.min_gap.as_secs()
        );

        let mut last_run: Option<Instant> = None;
        loop {
            if let Some(last) = last_run {
                let since = last.elapsed();
                if since < self.min_gap {
                    log::debug!("Sweep scheduler: holding early sweep for min gap");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.min_gap - since) => {}
                    }
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }

            last_run = Some(Instant::now());
            // Sweeps hit SQLite and the subject source, keep them off the async workers
            let engine = Arc::clone(&self.engine);
            match tokio::task::spawn_blocking(move || engine.run_check()).await {
                Ok(Ok(_)) => {}
                Ok(Err(CheckError::SweepInProgress)) => {
                    log::info!("Sweep scheduler: previous sweep still running, skipped");
                }
                Ok(Err(e)) => log::warn!("Sweep scheduler: sweep failed: {}", e),
                Err(e) => log::error!("Sweep scheduler: sweep task panicked: {}", e),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.notified() => {
                    log::info!("Sweep scheduler: woken by sweep request");
                }
            }
        }

        log::info!("Sweep scheduler: stopped");
    }
}
