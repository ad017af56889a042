//! The durable document state store.

use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, JournalEntry};
use crate::record::{
    now_millis, DocumentId, DocumentRecord, IntentKind, IntentRecord, OrphanRecord,
    RecordChanges,
};
use docsync_fsm::DocumentState;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};

/// Name of the journal file inside the store directory.
const JOURNAL_FILE: &str = "state.journal";

/// Name of the advisory lock file inside the store directory.
const LOCK_FILE: &str = ".lock";

/// Bounded backoff for writer-lock acquisition. Each attempt waits a
/// little longer than the last; past the final attempt the call fails
/// with [`StoreError::Busy`].
const WRITE_ATTEMPTS: u32 = 5;
const WRITE_ATTEMPT_BASE: Duration = Duration::from_millis(40);

/// Tunables for the state store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Journal size (bytes) past which a committed write triggers
    /// compaction.
    pub compaction_threshold: u64,
}

impl StoreOptions {
    /// Creates options with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compaction_threshold: 4 * 1024 * 1024,
        }
    }

    /// Sets the compaction threshold in bytes.
    #[must_use]
    pub fn with_compaction_threshold(mut self, bytes: u64) -> Self {
        self.compaction_threshold = bytes;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct StoreInner {
    journal: Journal,
    documents: HashMap<DocumentId, DocumentRecord>,
    orphans: HashMap<String, OrphanRecord>,
}

impl StoreInner {
    fn commit_document(&mut self, record: DocumentRecord) -> StoreResult<()> {
        self.journal.append(&JournalEntry::Document(record.clone()))?;
        self.documents.insert(record.id.clone(), record);
        Ok(())
    }

    fn maybe_compact(&mut self, threshold: u64) -> StoreResult<()> {
        if self.journal.size() <= threshold {
            return Ok(());
        }
        self.compact()
    }

    fn compact(&mut self) -> StoreResult<()> {
        let mut entries: Vec<JournalEntry> = self
            .documents
            .values()
            .cloned()
            .map(JournalEntry::Document)
            .collect();
        entries.extend(self.orphans.values().cloned().map(JournalEntry::OrphanAdd));
        self.journal.rewrite(&entries)
    }
}

/// Persistent per-document records with compare-and-swap writes.
///
/// All mutating operations are single atomic check-and-write steps: the
/// expected values are compared and the new record journaled under one
/// writer critical section, so concurrent writers conflict at commit time
/// rather than blocking in advance. No lock or file handle is ever held
/// across an await point; callers commit before yielding.
pub struct StateStore {
    inner: RwLock<StoreInner>,
    compaction_threshold: u64,
    /// Held for process lifetime; releases on drop.
    _dir_lock: Option<File>,
}

impl StateStore {
    /// Opens (or creates) a store in `dir` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process holds the store,
    /// [`StoreError::Corrupt`] if the journal header is unreadable.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Self::open_with_options(dir, StoreOptions::default())
    }

    /// Opens (or creates) a store in `dir`.
    pub fn open_with_options(dir: &Path, options: StoreOptions) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;

        let lock_file = File::create(dir.join(LOCK_FILE))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked(dir.to_path_buf()))?;

        let (journal, entries) = Journal::open(&dir.join(JOURNAL_FILE))?;
        let mut inner = StoreInner {
            journal,
            documents: HashMap::new(),
            orphans: HashMap::new(),
        };
        for entry in entries {
            match entry {
                JournalEntry::Document(record) => {
                    inner.documents.insert(record.id.clone(), record);
                }
                JournalEntry::OrphanAdd(orphan) => {
                    inner.orphans.insert(orphan.remote_file_id.clone(), orphan);
                }
                JournalEntry::OrphanRemove { remote_file_id } => {
                    inner.orphans.remove(&remote_file_id);
                }
            }
        }

        debug!(
            dir = %dir.display(),
            documents = inner.documents.len(),
            orphans = inner.orphans.len(),
            "state store opened"
        );

        Ok(Self {
            inner: RwLock::new(inner),
            compaction_threshold: options.compaction_threshold,
            _dir_lock: Some(lock_file),
        })
    }

    /// Opens a store with no durable journal, for tests.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                journal: Journal::in_memory(),
                documents: HashMap::new(),
                orphans: HashMap::new(),
            }),
            compaction_threshold: u64::MAX,
            _dir_lock: None,
        }
    }

    fn write_guard(&self) -> StoreResult<parking_lot::RwLockWriteGuard<'_, StoreInner>> {
        for attempt in 1..=WRITE_ATTEMPTS {
            if let Some(guard) = self.inner.try_write_for(WRITE_ATTEMPT_BASE * attempt) {
                return Ok(guard);
            }
            trace!(attempt, "writer lock contended, backing off");
        }
        Err(StoreError::Busy)
    }

    /// Reads the record for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.inner.read().documents.get(id).cloned()
    }

    /// Returns all records, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<_> = self.inner.read().documents.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Number of tracked documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Returns true if no documents are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts the initial record for a newly observed document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyTracked`] if a record exists.
    pub fn insert(&self, record: DocumentRecord) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        if inner.documents.contains_key(&record.id) {
            return Err(StoreError::AlreadyTracked(record.id.clone()));
        }
        inner.commit_document(record)?;
        inner.maybe_compact(self.compaction_threshold)
    }

    /// Compare-and-swap state transition.
    ///
    /// Applies `(state, version) -> (new_state, version + 1)` plus
    /// `changes` as one atomic write. Returns `Ok(false)`, with the
    /// record byte-for-byte unchanged, if the expected state or version
    /// no longer match, or if a write-ahead intent has claimed the
    /// record. A `false` here means the caller lost a race; it is never
    /// retried internally.
    pub fn cas_transition(
        &self,
        id: &DocumentId,
        expected_state: DocumentState,
        expected_version: u64,
        new_state: DocumentState,
        changes: &RecordChanges,
    ) -> StoreResult<bool> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if record.state != expected_state
            || record.version != expected_version
            || record.intent.is_some()
        {
            return Ok(false);
        }

        let mut next = record.clone();
        next.state = new_state;
        next.version = expected_version + 1;
        next.state_updated_at = now_millis();
        changes.apply(&mut next);

        inner.commit_document(next)?;
        inner.maybe_compact(self.compaction_threshold)?;
        Ok(true)
    }

    /// Transaction A of the write-ahead intent protocol.
    ///
    /// Records the intent marker conditioned on `(state, version)`
    /// without changing either. Returns `Ok(false)` if the condition
    /// fails or an intent is already pending.
    pub fn cas_put_intent(
        &self,
        id: &DocumentId,
        expected_state: DocumentState,
        expected_version: u64,
        kind: IntentKind,
    ) -> StoreResult<bool> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if record.state != expected_state
            || record.version != expected_version
            || record.intent.is_some()
        {
            return Ok(false);
        }

        let mut next = record.clone();
        next.intent = Some(IntentRecord::new(kind, now_millis()));

        inner.commit_document(next)?;
        Ok(true)
    }

    /// Unconditioned intent progress write.
    ///
    /// Safe because only the per-document lock holder advances progress.
    /// `steps_completed` only increases; a lower value is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IntentMissing`] if no intent is pending.
    pub fn advance_intent(&self, id: &DocumentId, steps_completed: u8) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let Some(intent) = record.intent.as_ref() else {
            return Err(StoreError::IntentMissing(id.clone()));
        };
        if steps_completed <= intent.steps_completed {
            return Ok(());
        }

        let mut next = record.clone();
        if let Some(intent) = next.intent.as_mut() {
            intent.steps_completed = steps_completed;
        }
        inner.commit_document(next)
    }

    /// Transaction B of the write-ahead intent protocol.
    ///
    /// Conditioned on the version *and* the pending intent kind; flips
    /// the state, bumps the version by 1, applies `changes`, and clears
    /// the intent, all in the same write. Returns `Ok(false)` if the
    /// condition fails.
    pub fn cas_finalize_intent(
        &self,
        id: &DocumentId,
        expected_version: u64,
        kind: IntentKind,
        new_state: DocumentState,
        changes: &RecordChanges,
    ) -> StoreResult<bool> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let intent_matches = record
            .intent
            .as_ref()
            .is_some_and(|intent| intent.kind == kind);
        if record.version != expected_version || !intent_matches {
            return Ok(false);
        }

        let mut next = record.clone();
        next.state = new_state;
        next.version = expected_version + 1;
        next.state_updated_at = now_millis();
        next.intent = None;
        changes.apply(&mut next);

        inner.commit_document(next)?;
        inner.maybe_compact(self.compaction_threshold)?;
        Ok(true)
    }

    /// Marks the local document missing. Outside the state machine: no
    /// version change, and an existing marker is preserved.
    pub fn set_missing(&self, id: &DocumentId, at: u64) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if record.missing_since.is_some() {
            return Ok(());
        }
        let mut next = record.clone();
        next.missing_since = Some(at);
        inner.commit_document(next)
    }

    /// Clears the missing marker (the document reappeared).
    pub fn clear_missing(&self, id: &DocumentId) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        let record = inner
            .documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if record.missing_since.is_none() {
            return Ok(());
        }
        let mut next = record.clone();
        next.missing_since = None;
        inner.commit_document(next)
    }

    /// All records with a pending intent, oldest `started_at` first.
    ///
    /// This is both the recovery crawler's work list and the operator
    /// diagnostics query for stuck entities.
    #[must_use]
    pub fn pending_intents(&self) -> Vec<DocumentRecord> {
        let mut records: Vec<_> = self
            .inner
            .read()
            .documents
            .values()
            .filter(|record| record.intent.is_some())
            .cloned()
            .collect();
        records.sort_by_key(|record| {
            record
                .intent
                .as_ref()
                .map(|intent| intent.started_at)
                .unwrap_or(u64::MAX)
        });
        records
    }

    /// Durably records an orphaned old remote version.
    pub fn add_orphan(&self, orphan: OrphanRecord) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        inner.journal.append(&JournalEntry::OrphanAdd(orphan.clone()))?;
        inner.orphans.insert(orphan.remote_file_id.clone(), orphan);
        Ok(())
    }

    /// Removes an orphan marker once both old resources are gone.
    pub fn remove_orphan(&self, remote_file_id: &str) -> StoreResult<()> {
        let mut inner = self.write_guard()?;
        if inner.orphans.remove(remote_file_id).is_none() {
            return Ok(());
        }
        inner.journal.append(&JournalEntry::OrphanRemove {
            remote_file_id: remote_file_id.to_string(),
        })
    }

    /// All orphan markers, oldest first.
    #[must_use]
    pub fn orphans(&self) -> Vec<OrphanRecord> {
        let mut orphans: Vec<_> = self.inner.read().orphans.values().cloned().collect();
        orphans.sort_by_key(|orphan| orphan.recorded_at);
        orphans
    }

    /// Forces a journal compaction.
    pub fn compact(&self) -> StoreResult<()> {
        self.write_guard()?.compact()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("documents", &self.len())
            .finish_non_exhaustive()
    }
}
