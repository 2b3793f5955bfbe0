//! Severity tiers derived from time-to-expiry.
//!
//! `days_remaining` rounds up, so anything expiring later today still counts
//! as one day left and only `expires_at <= now` reaches zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Ordered by severity: `None < Warning < Urgent < Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    None,
    Warning,
    Urgent,
    Expired,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::None => "none",
            Tier::Warning => "warning",
            Tier::Urgent => "urgent",
            Tier::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "none" => Some(Tier::None),
            "warning" => Some(Tier::Warning),
            "urgent" => Some(Tier::Urgent),
            "expired" => Some(Tier::Expired),
            _ => None,
        }
    }

    /// True for every tier that produces a notification.
    pub fn is_alert(&self) -> bool {
        !matches!(self, Tier::None)
    }
}

/// Day boundaries between tiers. Upper bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierThresholds {
    #[serde(default = "default_warning_days")]
    pub warning_days: i64,
    #[serde(default = "default_urgent_days")]
    pub urgent_days: i64,
    #[serde(default = "default_expired_days")]
    pub expired_days: i64,
}

fn default_warning_days() -> i64 {
    30
}
fn default_urgent_days() -> i64 {
    7
}
fn default_expired_days() -> i64 {
    0
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            warning_days: default_warning_days(),
            urgent_days: default_urgent_days(),
            expired_days: default_expired_days(),
        }
    }
}

impl TierThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if self.warning_days > self.urgent_days && self.urgent_days > self.expired_days {
            Ok(())
        } else {
            Err(format!(
                "thresholds must descend: warningDays ({}) > urgentDays ({}) > expiredDays ({})",
                self.warning_days, self.urgent_days, self.expired_days
            ))
        }
    }

    /// Tier for an expiry as seen at `now`. An untracked expiry is `Tier::None`.
    pub fn evaluate(&self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Tier {
        let Some(expires_at) = expires_at else {
            return Tier::None;
        };
        self.tier_for_days(days_remaining(expires_at, now))
    }

    pub fn tier_for_days(&self, days: i64) -> Tier {
        if days <= self.expired_days {
            Tier::Expired
        } else if days <= self.urgent_days {
            Tier::Urgent
        } else if days <= self.warning_days {
            Tier::Warning
        } else {
            Tier::None
        }
    }
}

/// `ceil((expires_at - now) / 1 day)`.
pub fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expires_at - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        days
    } else {
        days + 1
    }
}

/// Evaluate with the default 30/7/0 thresholds.
pub fn evaluate(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Tier {
    TierThresholds::default().evaluate(expires_at, now)
}

/// "certification" -> "Certification", "work_permit" -> "Work permit".
pub fn kind_label(attribute_kind: &str) -> String {
    let spaced = attribute_kind.trim().replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Notification title for a tier. `Tier::None` produces no notification.
pub fn build_alert_title(attribute_kind: &str, tier: Tier, days: i64) -> Option<String> {
    let label = kind_label(attribute_kind);
    let unit = if days == 1 { "day" } else { "days" };
    match tier {
        Tier::None => None,
        Tier::Warning => Some(format!("{} expires in {} {}", label, days, unit)),
        Tier::Urgent => Some(format!("⚠️ {} expires in {} {}", label, days, unit)),
        Tier::Expired => Some(format!("🚨 {} expired", label)),
    }
}
