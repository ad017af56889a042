//! Persisted record types.

use docsync_fsm::DocumentState;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Total number of remote steps in the one multi-step protocol (reset).
///
/// `steps_completed` is a count rather than a per-step set; that is
/// correct only while the remote calls are strictly ordered and each is
/// individually idempotent.
pub const INTENT_STEPS_TOTAL: u8 = 2;

/// Returns the current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Stable identifier of a tracked document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The kind of a multi-step transition protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    /// Tear down remote resources and return to `Untracked`.
    Reset,
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentKind::Reset => f.write_str("reset_intent"),
        }
    }
}

/// The write-ahead intent marker for an in-flight multi-step transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Which protocol is in flight.
    pub kind: IntentKind,
    /// When the intent was recorded (unix millis).
    pub started_at: u64,
    /// How many remote steps have completed. Only ever increases.
    pub steps_completed: u8,
}

impl IntentRecord {
    /// Creates a fresh intent with zero completed steps.
    #[must_use]
    pub fn new(kind: IntentKind, started_at: u64) -> Self {
        Self {
            kind,
            started_at,
            steps_completed: 0,
        }
    }

    /// Age of the intent relative to `now`, in milliseconds.
    #[must_use]
    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }
}

/// The persisted per-document record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Stable document id (primary key).
    pub id: DocumentId,
    /// Current lifecycle state.
    pub state: DocumentState,
    /// OCC token. Bumped by exactly 1 per committed transition.
    pub version: u64,
    /// Remote raw-file identifier. Non-null only in Processing/Indexed.
    pub remote_file_id: Option<String>,
    /// Remote index-document identifier. Non-null only in Indexed.
    pub remote_store_doc_id: Option<String>,
    /// Hex digest of the last uploaded content, for change detection.
    pub content_digest: Option<String>,
    /// When the state last changed (unix millis).
    pub state_updated_at: u64,
    /// Pending multi-step transition, if one is in flight.
    pub intent: Option<IntentRecord>,
    /// When the local document was first observed missing (unix millis).
    ///
    /// A logical marker outside the state machine; it never affects
    /// version arithmetic.
    pub missing_since: Option<u64>,
    /// Cause of the most recent failure, recorded as data.
    pub last_error: Option<String>,
}

impl DocumentRecord {
    /// Creates the initial record for a newly observed document.
    #[must_use]
    pub fn untracked(id: DocumentId) -> Self {
        Self {
            id,
            state: DocumentState::Untracked,
            version: 0,
            remote_file_id: None,
            remote_store_doc_id: None,
            content_digest: None,
            state_updated_at: now_millis(),
            intent: None,
            missing_since: None,
            last_error: None,
        }
    }

    /// Returns true if a multi-step transition is in flight.
    #[must_use]
    pub fn has_intent(&self) -> bool {
        self.intent.is_some()
    }
}

/// Column updates applied together with a committed CAS write.
///
/// Each field follows the same convention: `None` leaves the column
/// untouched, `Some(value)` sets it (including `Some(None)` to clear).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordChanges {
    /// New remote file id, if the column should change.
    pub remote_file_id: Option<Option<String>>,
    /// New remote index-document id, if the column should change.
    pub remote_store_doc_id: Option<Option<String>>,
    /// New content digest, if the column should change.
    pub content_digest: Option<Option<String>>,
    /// New failure cause, if the column should change.
    pub last_error: Option<Option<String>>,
}

impl RecordChanges {
    /// No column changes.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the remote file id column.
    #[must_use]
    pub fn remote_file_id(mut self, value: Option<String>) -> Self {
        self.remote_file_id = Some(value);
        self
    }

    /// Sets the remote index-document id column.
    #[must_use]
    pub fn remote_store_doc_id(mut self, value: Option<String>) -> Self {
        self.remote_store_doc_id = Some(value);
        self
    }

    /// Sets the content digest column.
    #[must_use]
    pub fn content_digest(mut self, value: Option<String>) -> Self {
        self.content_digest = Some(value);
        self
    }

    /// Sets the failure cause column.
    #[must_use]
    pub fn last_error(mut self, value: Option<String>) -> Self {
        self.last_error = Some(value);
        self
    }

    /// Clears both remote identifiers and the content digest.
    ///
    /// Used by the writes that take a document back to `Untracked`.
    #[must_use]
    pub fn clear_remote(self) -> Self {
        self.remote_file_id(None)
            .remote_store_doc_id(None)
            .content_digest(None)
    }

    /// Applies the changes to a record in place.
    pub(crate) fn apply(&self, record: &mut DocumentRecord) {
        if let Some(value) = &self.remote_file_id {
            record.remote_file_id = value.clone();
        }
        if let Some(value) = &self.remote_store_doc_id {
            record.remote_store_doc_id = value.clone();
        }
        if let Some(value) = &self.content_digest {
            record.content_digest = value.clone();
        }
        if let Some(value) = &self.last_error {
            record.last_error = value.clone();
        }
    }
}

/// A durably recorded old remote version awaiting deletion.
///
/// Written by upload-first replacement before the old remote document is
/// touched; removed once both old resources are confirmed gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanRecord {
    /// The document whose replacement produced this orphan.
    pub doc_id: DocumentId,
    /// Old remote raw-file identifier.
    pub remote_file_id: String,
    /// Old remote index-document identifier, if one existed.
    pub remote_store_doc_id: Option<String>,
    /// When the orphan was recorded (unix millis).
    pub recorded_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_record_defaults() {
        let record = DocumentRecord::untracked(DocumentId::new("doc-1"));
        assert_eq!(record.state, DocumentState::Untracked);
        assert_eq!(record.version, 0);
        assert!(record.remote_file_id.is_none());
        assert!(record.remote_store_doc_id.is_none());
        assert!(record.intent.is_none());
        assert!(record.missing_since.is_none());
    }

    #[test]
    fn changes_leave_untouched_columns() {
        let mut record = DocumentRecord::untracked(DocumentId::new("doc-1"));
        record.remote_file_id = Some("file-1".into());
        record.content_digest = Some("abc".into());

        let changes = RecordChanges::none().remote_store_doc_id(Some("store-1".into()));
        changes.apply(&mut record);

        assert_eq!(record.remote_file_id.as_deref(), Some("file-1"));
        assert_eq!(record.remote_store_doc_id.as_deref(), Some("store-1"));
        assert_eq!(record.content_digest.as_deref(), Some("abc"));
    }

    #[test]
    fn clear_remote_clears_refs_and_digest() {
        let mut record = DocumentRecord::untracked(DocumentId::new("doc-1"));
        record.remote_file_id = Some("file-1".into());
        record.remote_store_doc_id = Some("store-1".into());
        record.content_digest = Some("abc".into());

        RecordChanges::none().clear_remote().apply(&mut record);

        assert!(record.remote_file_id.is_none());
        assert!(record.remote_store_doc_id.is_none());
        assert!(record.content_digest.is_none());
    }

    #[test]
    fn intent_age() {
        let intent = IntentRecord::new(IntentKind::Reset, 1_000);
        assert_eq!(intent.age_millis(4_500), 3_500);
        assert_eq!(intent.age_millis(500), 0);
    }
}
