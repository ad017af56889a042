//! Status command implementation.

use docsync_fsm::DocumentState;
use docsync_store::{DocumentRecord, StateStore};
use serde::Serialize;
use std::path::Path;

/// Store status summary.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Store directory path.
    pub path: String,
    /// Total tracked documents.
    pub documents: usize,
    /// Documents per lifecycle state.
    pub untracked: usize,
    /// See `untracked`.
    pub uploading: usize,
    /// See `untracked`.
    pub processing: usize,
    /// See `untracked`.
    pub indexed: usize,
    /// See `untracked`.
    pub failed: usize,
    /// Documents currently marked missing locally.
    pub missing: usize,
    /// Documents with a pending intent.
    pub pending_intents: usize,
    /// Full records (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<DocumentRecord>>,
}

/// Runs the status command.
pub fn run(path: &Path, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open(path)?;
    let records = store.list();

    let count_state =
        |state: DocumentState| records.iter().filter(|record| record.state == state).count();

    let result = StatusResult {
        path: path.display().to_string(),
        documents: records.len(),
        untracked: count_state(DocumentState::Untracked),
        uploading: count_state(DocumentState::Uploading),
        processing: count_state(DocumentState::Processing),
        indexed: count_state(DocumentState::Indexed),
        failed: count_state(DocumentState::Failed),
        missing: records
            .iter()
            .filter(|record| record.missing_since.is_some())
            .count(),
        pending_intents: records
            .iter()
            .filter(|record| record.intent.is_some())
            .count(),
        records: all.then_some(records),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Store:           {}", result.path);
    println!("Documents:       {}", result.documents);
    println!("  untracked:     {}", result.untracked);
    println!("  uploading:     {}", result.uploading);
    println!("  processing:    {}", result.processing);
    println!("  indexed:       {}", result.indexed);
    println!("  failed:        {}", result.failed);
    println!("Missing locally: {}", result.missing);
    println!("Pending intents: {}", result.pending_intents);

    if let Some(records) = &result.records {
        println!();
        for record in records {
            println!(
                "{}  state={} version={} file={} doc={}{}",
                record.id,
                record.state,
                record.version,
                record.remote_file_id.as_deref().unwrap_or("-"),
                record.remote_store_doc_id.as_deref().unwrap_or("-"),
                if record.missing_since.is_some() {
                    " [missing]"
                } else {
                    ""
                },
            );
        }
    }

    Ok(())
}
