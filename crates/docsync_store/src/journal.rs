//! Append-only journal of committed state writes.
//!
//! Every committed store write appends one frame and syncs it before the
//! in-memory index is updated. On open, the journal is replayed to rebuild
//! the index; the newest frame per document wins. A torn trailing frame
//! (from a crash mid-append) is discarded and the file truncated back to
//! the last complete frame.

use crate::error::{StoreError, StoreResult};
use crate::record::{DocumentRecord, OrphanRecord};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes identifying a docsync journal.
const JOURNAL_MAGIC: [u8; 4] = *b"DSYJ";

/// Current journal format version.
const JOURNAL_VERSION: u16 = 1;

/// Header: magic + version.
const HEADER_LEN: u64 = 6;

/// Frame header: kind byte + 4-byte little-endian payload length.
const FRAME_HEADER_LEN: usize = 5;

/// Upper bound on a single frame payload.
const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Type of journal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    /// Full document record (newest wins on replay).
    Document = 1,
    /// Orphan marker added.
    OrphanAdd = 2,
    /// Orphan marker removed (keyed by old remote file id).
    OrphanRemove = 3,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Document),
            2 => Some(Self::OrphanAdd),
            3 => Some(Self::OrphanRemove),
            _ => None,
        }
    }
}

/// A single replayable journal entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalEntry {
    /// Full document record.
    Document(DocumentRecord),
    /// Orphan marker added.
    OrphanAdd(OrphanRecord),
    /// Orphan marker removed.
    OrphanRemove {
        /// Old remote file id the marker was keyed by.
        remote_file_id: String,
    },
}

impl JournalEntry {
    fn kind(&self) -> FrameKind {
        match self {
            JournalEntry::Document(_) => FrameKind::Document,
            JournalEntry::OrphanAdd(_) => FrameKind::OrphanAdd,
            JournalEntry::OrphanRemove { .. } => FrameKind::OrphanRemove,
        }
    }

    fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        let result = match self {
            JournalEntry::Document(record) => ciborium::ser::into_writer(record, &mut payload),
            JournalEntry::OrphanAdd(orphan) => ciborium::ser::into_writer(orphan, &mut payload),
            JournalEntry::OrphanRemove { remote_file_id } => {
                ciborium::ser::into_writer(remote_file_id, &mut payload)
            }
        };
        result.map_err(|e| StoreError::codec(e.to_string()))?;

        if payload.len() > MAX_PAYLOAD_LEN as usize {
            return Err(StoreError::codec(format!(
                "frame payload too large: {} bytes",
                payload.len()
            )));
        }

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.push(self.kind() as u8);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn decode(kind: FrameKind, payload: &[u8]) -> StoreResult<Self> {
        let entry = match kind {
            FrameKind::Document => JournalEntry::Document(
                ciborium::de::from_reader(payload)
                    .map_err(|e| StoreError::codec(e.to_string()))?,
            ),
            FrameKind::OrphanAdd => JournalEntry::OrphanAdd(
                ciborium::de::from_reader(payload)
                    .map_err(|e| StoreError::codec(e.to_string()))?,
            ),
            FrameKind::OrphanRemove => JournalEntry::OrphanRemove {
                remote_file_id: ciborium::de::from_reader(payload)
                    .map_err(|e| StoreError::codec(e.to_string()))?,
            },
        };
        Ok(entry)
    }
}

/// The journal itself. `None` file means an in-memory (test) store that
/// keeps no durable log.
pub(crate) struct Journal {
    file: Option<File>,
    path: Option<PathBuf>,
    len: u64,
}

impl Journal {
    /// Creates a journal with no backing file.
    pub fn in_memory() -> Self {
        Self {
            file: None,
            path: None,
            len: HEADER_LEN,
        }
    }

    /// Opens (or creates) the journal at `path` and replays it.
    ///
    /// Returns the journal handle and all complete entries in append
    /// order. A torn trailing frame is discarded and truncated away.
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<JournalEntry>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(&JOURNAL_MAGIC);
            header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_data()?;
            return Ok((
                Self {
                    file: Some(file),
                    path: Some(path.to_path_buf()),
                    len: HEADER_LEN,
                },
                Vec::new(),
            ));
        }

        if bytes.len() < HEADER_LEN as usize || bytes[..4] != JOURNAL_MAGIC {
            return Err(StoreError::corrupt("bad journal header"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != JOURNAL_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported journal version {version}"
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_LEN as usize;
        let mut good_end = offset;

        while offset < bytes.len() {
            if offset + FRAME_HEADER_LEN > bytes.len() {
                break; // torn frame header
            }
            let kind = FrameKind::from_byte(bytes[offset]);
            let len = u32::from_le_bytes([
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
                bytes[offset + 4],
            ]);
            let Some(kind) = kind else {
                break; // garbage at tail
            };
            if len > MAX_PAYLOAD_LEN {
                break;
            }
            let payload_start = offset + FRAME_HEADER_LEN;
            let payload_end = payload_start + len as usize;
            if payload_end > bytes.len() {
                break; // torn payload
            }
            match JournalEntry::decode(kind, &bytes[payload_start..payload_end]) {
                Ok(entry) => entries.push(entry),
                Err(_) => break,
            }
            offset = payload_end;
            good_end = offset;
        }

        if good_end < bytes.len() {
            warn!(
                path = %path.display(),
                discarded = bytes.len() - good_end,
                "discarding torn journal tail"
            );
            file.set_len(good_end as u64)?;
            file.seek(SeekFrom::Start(good_end as u64))?;
            file.sync_data()?;
        }

        debug!(
            path = %path.display(),
            entries = entries.len(),
            "journal replayed"
        );

        Ok((
            Self {
                file: Some(file),
                path: Some(path.to_path_buf()),
                len: good_end as u64,
            },
            entries,
        ))
    }

    /// Appends one entry and syncs it to durable storage.
    pub fn append(&mut self, entry: &JournalEntry) -> StoreResult<()> {
        let frame = entry.encode()?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(&frame)?;
            file.sync_data()?;
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// Rewrites the journal to contain exactly `entries`.
    ///
    /// Used by compaction: the replacement file is written fully, synced,
    /// then renamed over the live journal. In-memory journals only reset
    /// their nominal size.
    pub fn rewrite(&mut self, entries: &[JournalEntry]) -> StoreResult<()> {
        let Some(path) = self.path.clone() else {
            self.len = HEADER_LEN;
            for entry in entries {
                self.len += entry.encode()?.len() as u64;
            }
            return Ok(());
        };

        let tmp_path = path.with_extension("journal.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&JOURNAL_MAGIC)?;
        tmp.write_all(&JOURNAL_VERSION.to_le_bytes())?;
        let mut len = HEADER_LEN;
        for entry in entries {
            let frame = entry.encode()?;
            tmp.write_all(&frame)?;
            len += frame.len() as u64;
        }
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &path)?;

        let file = OpenOptions::new().read(true).append(true).open(&path)?;
        self.file = Some(file);
        self.len = len;
        debug!(path = %path.display(), size = len, "journal compacted");
        Ok(())
    }
}
