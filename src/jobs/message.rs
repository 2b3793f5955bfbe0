//! Notification text for resolved jobs.
//!
//! The success message depends on the job mode: single-item names its slot
//! and previews the first item, fill-gaps reports counts per day, full-batch
//! samples up to five item names.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{Job, JobMode};
use crate::notification::{NewNotification, NotificationKind};

/// Failure text when the provider gives no error message.
pub const FALLBACK_FAILURE_MESSAGE: &str = "Generation failed. Please try again.";

/// Item names shown in a full-batch summary before truncating.
const MAX_SAMPLE_NAMES: usize = 5;

/// One generated item, read leniently out of a result payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultItem {
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Grouping the item belongs to (a day, in meal plans).
    #[serde(default, alias = "date", alias = "group")]
    pub day: Option<String>,
}

/// Extract items from a payload that is either an array or `{ "items": [...] }`.
///
/// Entries that don't look like items are skipped.
pub fn result_items(payload: &Value) -> Vec<ResultItem> {
    let array = match payload {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    array
        .iter()
        .filter_map(|v| ResultItem::deserialize(v).ok())
        .collect()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Build the success message body for a completed job.
pub fn success_message(job: &Job, items: &[ResultItem]) -> String {
    match job.mode {
        JobMode::SingleItem => {
            let slot = job.target_slot.as_deref().unwrap_or("Item");
            let mut message = format!("{} has been generated.", slot);
            if let Some(first) = items.first() {
                message.push('\n');
                message.push_str(&first.name);
                if !first.tags.is_empty() {
                    message.push_str(" · ");
                    message.push_str(&first.tags.join(", "));
                }
            }
            message
        }
        JobMode::FillGaps => {
            let days: HashSet<&str> = items.iter().filter_map(|i| i.day.as_deref()).collect();
            format!(
                "Filled {} across {}.",
                plural(items.len(), "item", "items"),
                plural(days.len(), "day", "days")
            )
        }
        JobMode::FullBatch => {
            let mut seen = HashSet::new();
            let names: Vec<&str> = items
                .iter()
                .map(|i| i.name.as_str())
                .filter(|n| !n.is_empty() && seen.insert(*n))
                .collect();

            let header = format!("Generated {}", plural(items.len(), "item", "items"));
            if names.is_empty() {
                return format!("{}.", header);
            }

            let mut sample = names
                .iter()
                .take(MAX_SAMPLE_NAMES)
                .copied()
                .collect::<Vec<_>>()
                .join(", ");
            if names.len() > MAX_SAMPLE_NAMES {
                sample.push_str(", …");
            }
            format!("{}: {}", header, sample)
        }
    }
}

/// Notification for a job the provider reported as completed.
pub fn success_notification(job: &Job, payload: &Value) -> NewNotification {
    let items = result_items(payload);
    let message = success_message(job, &items);

    NewNotification::new(
        NotificationKind::JobSucceeded,
        format!("{} is ready", job.subject_label),
        message,
    )
    .with_context(json!({
        "jobId": job.job_id,
        "subjectId": job.subject_id,
        "mode": job.mode.as_str(),
        "targetSlot": job.target_slot,
        "itemCount": items.len(),
        "result": payload,
    }))
    .with_action_label("View")
}

/// Notification for a job that failed, timed out, or lost its provider.
pub fn failure_notification(job: &Job, error_message: Option<&str>) -> NewNotification {
    let message = error_message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(FALLBACK_FAILURE_MESSAGE);

    NewNotification::new(
        NotificationKind::JobFailed,
        format!("{} failed", job.subject_label),
        message,
    )
    .with_context(json!({
        "jobId": job.job_id,
        "subjectId": job.subject_id,
        "mode": job.mode.as_str(),
        "targetSlot": job.target_slot,
        "error": message,
    }))
    .with_action_label("Try again")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobDescriptor;

    fn job(mode: JobMode, slot: Option<&str>) -> Job {
        let mut desc = JobDescriptor::new("j1", "plan-1", "Week 12 plan", mode);
        if let Some(s) = slot {
            desc = desc.with_target_slot(s);
        }
        Job::start(desc, "j1".to_string())
    }

    #[test]
    fn test_single_item_previews_first_item_with_tags() {
        let payload = json!({"items": [
            {"name": "Seared Salmon", "tags": ["gluten-free", "quick"]},
            {"name": "Rice"}
        ]});
        let job = job(JobMode::SingleItem, Some("Monday dinner"));
        let msg = success_message(&job, &result_items(&payload));
        assert_eq!(
            msg,
            "Monday dinner has been generated.\nSeared Salmon · gluten-free, quick"
        );
    }

    #[test]
    fn test_single_item_without_items_names_slot_only() {
        let job = job(JobMode::SingleItem, Some("Tuesday lunch"));
        let msg = success_message(&job, &[]);
        assert_eq!(msg, "Tuesday lunch has been generated.");
    }

    #[test]
    fn test_fill_gaps_counts_items_and_distinct_days() {
        let payload = json!([
            {"name": "A", "day": "mon"},
            {"name": "B", "day": "mon"},
            {"name": "C", "day": "wed"}
        ]);
        let job = job(JobMode::FillGaps, None);
        let msg = success_message(&job, &result_items(&payload));
        assert_eq!(msg, "Filled 3 items across 2 days.");
    }

    #[test]
    fn test_fill_gaps_singular() {
        let payload = json!([{"name": "A", "date": "2026-03-02"}]);
        let job = job(JobMode::FillGaps, None);
        assert_eq!(
            success_message(&job, &result_items(&payload)),
            "Filled 1 item across 1 day."
        );
    }

    #[test]
    fn test_full_batch_samples_five_distinct_names_with_ellipsis() {
        let payload = json!([
            {"name": "A"}, {"name": "B"}, {"name": "A"}, {"name": "C"},
            {"name": "D"}, {"name": "E"}, {"name": "F"}
        ]);
        let job = job(JobMode::FullBatch, None);
        let msg = success_message(&job, &result_items(&payload));
        assert_eq!(msg, "Generated 7 items: A, B, C, D, E, …");
    }

    #[test]
    fn test_full_batch_no_ellipsis_when_five_or_fewer() {
        let payload = json!([{"name": "A"}, {"name": "B"}, {"name": "B"}]);
        let job = job(JobMode::FullBatch, None);
        assert_eq!(
            success_message(&job, &result_items(&payload)),
            "Generated 3 items: A, B"
        );
    }

    #[test]
    fn test_result_items_tolerates_junk() {
        assert!(result_items(&Value::Null).is_empty());
        assert!(result_items(&json!({"other": 1})).is_empty());
        let items = result_items(&json!([{"title": "Soup"}, 42, {"name": "Bread"}]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Soup");
    }

    #[test]
    fn test_success_context_carries_payload() {
        let payload = json!({"items": [{"name": "X"}], "extra": {"k": [1, 2]}});
        let n = success_notification(&job(JobMode::FullBatch, None), &payload);
        assert_eq!(n.kind, NotificationKind::JobSucceeded);
        assert_eq!(n.title, "Week 12 plan is ready");
        assert_eq!(n.context["result"], payload);
        assert_eq!(n.context["itemCount"], 1);
        assert_eq!(n.context["mode"], "full_batch");
    }

    #[test]
    fn test_failure_uses_fallback_for_blank_message() {
        let j = job(JobMode::FullBatch, None);
        assert_eq!(failure_notification(&j, None).message, FALLBACK_FAILURE_MESSAGE);
        assert_eq!(failure_notification(&j, Some("  ")).message, FALLBACK_FAILURE_MESSAGE);
        let n = failure_notification(&j, Some("Model quota exceeded"));
        assert_eq!(n.kind, NotificationKind::JobFailed);
        assert_eq!(n.message, "Model quota exceeded");
        assert_eq!(n.context["error"], "Model quota exceeded");
    }
}
