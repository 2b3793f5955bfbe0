//! `dailyos-alerts`: run one proactive sweep from the command line.
//!
//! Subjects are read from a JSON array file; the dedup ledger is the SQLite
//! database from the config, so repeated runs only print new alerts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;

use dailyos_alerts::config::{load_config, load_default_config, CONFIG_PATH_ENV};
use dailyos_alerts::notification::NotificationStore;
use dailyos_alerts::proactive::{JsonSubjectRepository, ProactiveCheckEngine, SqliteLedger};

#[derive(Parser)]
#[command(name = "dailyos-alerts")]
#[command(about = "Background job tracking and proactive expiry alerts for DailyOS")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one proactive sweep and print the emitted notifications as JSON
    Sweep {
        /// JSON array of subjects to check
        #[arg(long)]
        subjects: PathBuf,

        /// Alerts config file (defaults to ~/.dailyos/alerts.json)
        #[arg(long, env = CONFIG_PATH_ENV)]
        config: Option<PathBuf>,

        /// Evaluate expiries as of this RFC 3339 instant instead of now
        #[arg(long, value_parser = parse_instant)]
        now: Option<DateTime<Utc>>,
    },
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn run_sweep(
    subjects: PathBuf,
    config: Option<PathBuf>,
    now: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let config = match &config {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };

    let ledger_path = config.resolved_ledger_path()?;
    let ledger = SqliteLedger::open(&ledger_path)
        .with_context(|| format!("Failed to open ledger at {}", ledger_path.display()))?;
    let store = Arc::new(NotificationStore::new(config.notification_capacity));
    let engine = ProactiveCheckEngine::new(
        Arc::new(JsonSubjectRepository::new(subjects)),
        Arc::new(ledger),
        store.clone(),
        config.thresholds,
    );

    let summary = engine.run_check_at(now.unwrap_or_else(Utc::now))?;
    let output = json!({
        "summary": summary,
        "notifications": store.list(config.notification_capacity),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dailyos_alerts::logging::init();

    match Cli::parse().command {
        Command::Sweep {
            subjects,
            config,
            now,
        } => run_sweep(subjects, config, now),
    }
}
