//! Monitored subjects and the repositories that list them.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, SubjectError};

/// One expirable attribute on a subject (a certification, an insurance policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttribute {
    pub kind: String,
    /// RFC 3339 or `YYYY-MM-DD`. Absent means "not tracked".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default = "default_true")]
    pub notify_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSettings {
    /// Subjects opt in to proactive checks.
    #[serde(default)]
    pub proactive_enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSubject {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub attributes: Vec<SubjectAttribute>,
    #[serde(default)]
    pub settings: SubjectSettings,
}

impl AlertSubject {
    /// An opted-in subject with no attributes yet.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            label: None,
            attributes: Vec::new(),
            settings: SubjectSettings {
                proactive_enabled: true,
            },
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_attribute(mut self, kind: impl Into<String>, expires_at: Option<String>) -> Self {
        self.attributes.push(SubjectAttribute {
            kind: kind.into(),
            expires_at,
            notify_enabled: true,
        });
        self
    }

    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.subject_id)
    }
}

/// Parse an expiry value. Blank means untracked.
///
/// Accepts RFC 3339, a bare `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a date
/// (midnight UTC).
pub fn parse_expiry(raw: &str) -> Option<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Some(naive.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Some(naive.and_utc()));
    }
    None
}

impl SubjectAttribute {
    /// Parsed expiry for this attribute on `subject_id`.
    pub fn parsed_expiry(&self, subject_id: &str) -> Result<Option<DateTime<Utc>>, SubjectError> {
        match &self.expires_at {
            None => Ok(None),
            Some(raw) => parse_expiry(raw).ok_or_else(|| SubjectError::MalformedExpiry {
                subject_id: subject_id.to_string(),
                attribute_kind: self.kind.clone(),
                value: raw.clone(),
            }),
        }
    }
}

/// Source of subjects for a proactive sweep.
pub trait SubjectRepository: Send + Sync {
    /// Subjects that opted in. An error here fails the whole sweep.
    fn list_enabled_subjects(&self) -> Result<Vec<AlertSubject>, RepositoryError>;
}

/// Subjects held in memory; replaceable between sweeps.
#[derive(Default)]
pub struct InMemorySubjectRepository {
    subjects: RwLock<Vec<AlertSubject>>,
}

impl InMemorySubjectRepository {
    pub fn new(subjects: Vec<AlertSubject>) -> Self {
        Self {
            subjects: RwLock::new(subjects),
        }
    }

    pub fn replace(&self, subjects: Vec<AlertSubject>) {
        *self.subjects.write() = subjects;
    }

    /// Insert or replace by `subject_id`.
    pub fn upsert(&self, subject: AlertSubject) {
        let mut subjects = self.subjects.write();
        match subjects.iter_mut().find(|s| s.subject_id == subject.subject_id) {
            Some(existing) => *existing = subject,
            None => subjects.push(subject),
        }
    }
}

impl SubjectRepository for InMemorySubjectRepository {
    fn list_enabled_subjects(&self) -> Result<Vec<AlertSubject>, RepositoryError> {
        Ok(self
            .subjects
            .read()
            .iter()
            .filter(|s| s.settings.proactive_enabled)
            .cloned()
            .collect())
    }
}

/// Subjects read from a JSON array file on every sweep.
pub struct JsonSubjectRepository {
    path: PathBuf,
}

impl JsonSubjectRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SubjectRepository for JsonSubjectRepository {
    fn list_enabled_subjects(&self) -> Result<Vec<AlertSubject>, RepositoryError> {
        if !self.path.exists() {
            return Err(RepositoryError::Unavailable(format!(
                "subjects file not found at {}",
                self.path.display()
            )));
        }
        let content = fs::read_to_string(&self.path)?;
        let subjects: Vec<AlertSubject> = serde_json::from_str(&content)?;
        Ok(subjects
            .into_iter()
            .filter(|s| s.settings.proactive_enabled)
            .collect())
    }
}
