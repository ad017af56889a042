//! Stuck command implementation.

use docsync_store::{now_millis, StateStore, INTENT_STEPS_TOTAL};
use serde::Serialize;
use std::path::Path;

/// One stuck document, for diagnostics.
#[derive(Debug, Serialize)]
pub struct StuckEntry {
    /// Document id.
    pub id: String,
    /// Pending protocol kind.
    pub intent: String,
    /// Remote steps already completed.
    pub steps_completed: u8,
    /// How long the intent has been pending, in milliseconds.
    pub age_ms: u64,
}

/// Runs the stuck command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open(path)?;
    let now = now_millis();

    let entries: Vec<StuckEntry> = store
        .pending_intents()
        .into_iter()
        .filter_map(|record| {
            record.intent.as_ref().map(|intent| StuckEntry {
                id: record.id.to_string(),
                intent: intent.kind.to_string(),
                steps_completed: intent.steps_completed,
                age_ms: intent.age_millis(now),
            })
        })
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No documents stuck mid-protocol.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  intent={} steps={}/{} age={}s",
            entry.id,
            entry.intent,
            entry.steps_completed,
            INTENT_STEPS_TOTAL,
            entry.age_ms / 1000,
        );
    }
    Ok(())
}
