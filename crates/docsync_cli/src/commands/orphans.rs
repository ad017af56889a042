//! Orphans command implementation.

use docsync_store::StateStore;
use serde::Serialize;
use std::path::Path;

/// One orphaned remote version.
#[derive(Debug, Serialize)]
pub struct OrphanEntry {
    /// Document whose replacement or failure produced the orphan.
    pub doc_id: String,
    /// Old remote file id.
    pub remote_file_id: String,
    /// Old remote index-document id, if one existed.
    pub remote_store_doc_id: Option<String>,
    /// When the orphan was recorded (unix millis).
    pub recorded_at: u64,
}

/// Runs the orphans command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open(path)?;

    let entries: Vec<OrphanEntry> = store
        .orphans()
        .into_iter()
        .map(|orphan| OrphanEntry {
            doc_id: orphan.doc_id.to_string(),
            remote_file_id: orphan.remote_file_id,
            remote_store_doc_id: orphan.remote_store_doc_id,
            recorded_at: orphan.recorded_at,
        })
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No orphaned remote versions.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  file={} doc={}",
            entry.doc_id,
            entry.remote_file_id,
            entry.remote_store_doc_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
