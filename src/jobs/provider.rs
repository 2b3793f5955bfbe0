use async_trait::async_trait;

use super::types::JobStatusSnapshot;
use crate::error::ProviderError;

/// Source of truth for a background job's status.
///
/// Any transport fits behind this: REST polling, a push channel adapted to
/// pull, RPC. An `Err` means the *call* failed and is retried; a job that
/// genuinely failed is reported as `Ok` with `JobStatus::Failed`.
#[async_trait]
pub trait JobStatusProvider: Send + Sync {
    async fn get_status(&self, job_id: &str) -> Result<JobStatusSnapshot, ProviderError>;
}
