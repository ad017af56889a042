//! Init command implementation.

use docsync_store::StateStore;
use std::path::Path;

/// Runs the init command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = StateStore::open(path)?;
    println!(
        "Initialized state store at {} ({} documents)",
        path.display(),
        store.len()
    );
    Ok(())
}
