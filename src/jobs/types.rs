use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shape of the generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Regenerate everything for the subject.
    FullBatch,
    /// Only generate the empty slots.
    FillGaps,
    /// Generate one named slot.
    SingleItem,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::FullBatch => "full_batch",
            JobMode::FillGaps => "fill_gaps",
            JobMode::SingleItem => "single_item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub completed: u32,
    pub requested: u32,
}

/// What a caller hands to `JobTracker::track`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    /// Empty means "assign one".
    #[serde(default)]
    pub job_id: String,
    pub subject_id: String,
    pub subject_label: String,
    pub mode: JobMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_slot: Option<String>,
}

impl JobDescriptor {
    pub fn new(
        job_id: impl Into<String>,
        subject_id: impl Into<String>,
        subject_label: impl Into<String>,
        mode: JobMode,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            subject_id: subject_id.into(),
            subject_label: subject_label.into(),
            mode,
            target_slot: None,
        }
    }

    pub fn with_target_slot(mut self, slot: impl Into<String>) -> Self {
        self.target_slot = Some(slot.into());
        self
    }
}

/// One in-flight background task, owned by the tracker while it polls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub subject_id: String,
    pub subject_label: String,
    pub mode: JobMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_slot: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl Job {
    /// Start tracking a descriptor. The slot is only kept for single-item jobs.
    pub fn start(descriptor: JobDescriptor, job_id: String) -> Self {
        let target_slot = match descriptor.mode {
            JobMode::SingleItem => descriptor.target_slot,
            _ => None,
        };
        Self {
            job_id,
            subject_id: descriptor.subject_id,
            subject_label: descriptor.subject_label,
            mode: descriptor.mode,
            target_slot,
            status: JobStatus::Pending,
            started_at: Utc::now(),
            progress: None,
        }
    }

    pub fn snapshot(&self) -> JobStatusSnapshot {
        JobStatusSnapshot {
            status: self.status,
            progress: self.progress,
            result: None,
            error_message: None,
        }
    }
}

/// One answer from a `JobStatusProvider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobStatusSnapshot {
    pub fn pending(progress: Option<JobProgress>) -> Self {
        Self {
            status: JobStatus::Pending,
            progress,
            result: None,
            error_message: None,
        }
    }

    pub fn completed(result: Value) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: None,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn failed(error_message: Option<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            result: None,
            error_message,
        }
    }
}
