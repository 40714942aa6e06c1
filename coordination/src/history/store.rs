//! Bounded, time-ordered record of previously asked questions.
//!
//! Entries are kept oldest-first. Every append that pushes the store past its
//! capacity evicts the surplus from the front in one batch, so the survivors
//! are always the most recent `capacity` questions in their original order.
//!
//! A store may be file-backed. The whole collection is then written as a
//! versioned JSON document after every mutation (temp file + rename), and the
//! in-memory state only changes once the write has succeeded.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default number of questions retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// One previously asked question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Error type for history operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History storage unavailable at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("History file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("History file version {found} is newer than supported version {supported}")]
    VersionMismatch { supported: u32, found: u32 },

    #[error("History lock poisoned")]
    Poisoned,
}

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: u32,
    entries: Vec<HistoryEntry>,
}

impl HistoryDocument {
    const CURRENT_VERSION: u32 = 1;
}

/// Bounded question history.
pub struct HistoryStore {
    capacity: usize,
    path: Option<PathBuf>,
    entries: RwLock<VecDeque<HistoryEntry>>,
}

impl HistoryStore {
    /// Create a store that lives only in memory.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            capacity,
            path: None,
            entries: RwLock::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    /// Open a file-backed store, loading any entries already on disk.
    ///
    /// A missing file yields an empty store. Loaded entries are sorted by
    /// creation time and trimmed to `capacity`.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> HistoryResult<Self> {
        let path = path.into();
        let mut entries = load_entries(&path)?;
        entries
            .make_contiguous()
            .sort_by_key(|entry| entry.created_at);
        let evicted = evict_oldest(&mut entries, capacity);

        info!(
            path = %path.display(),
            loaded = entries.len(),
            evicted,
            capacity,
            "Question history opened"
        );

        Ok(Self {
            capacity,
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries.
    pub fn len(&self) -> HistoryResult<usize> {
        Ok(self.entries.read().map_err(|_| HistoryError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> HistoryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Append a question stamped with the current time, evicting the oldest
    /// entries if the store is now over capacity.
    ///
    /// Timestamps never go backwards: if the clock reads earlier than the
    /// newest entry, the newest entry's timestamp is reused.
    pub fn append(&self, text: &str) -> HistoryResult<HistoryEntry> {
        let mut entries = self.entries.write().map_err(|_| HistoryError::Poisoned)?;

        let now = Utc::now();
        let created_at = match entries.back() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };
        let entry = HistoryEntry {
            text: text.to_string(),
            created_at,
        };

        let mut next = entries.clone();
        next.push_back(entry.clone());
        let evicted = evict_oldest(&mut next, self.capacity);

        if let Some(path) = &self.path {
            persist_entries(path, &next)?;
        }
        *entries = next;

        debug!(len = entries.len(), evicted, "Question appended to history");
        Ok(entry)
    }

    /// Text of up to `n` most recent entries, oldest first.
    pub fn recent_ascending(&self, n: usize) -> HistoryResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| HistoryError::Poisoned)?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.iter().skip(skip).map(|e| e.text.clone()).collect())
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> HistoryResult<Vec<HistoryEntry>> {
        let entries = self.entries.read().map_err(|_| HistoryError::Poisoned)?;
        Ok(entries.iter().cloned().collect())
    }
}

/// Drop the oldest entries so at most `capacity` remain. Returns how many
/// were removed.
fn evict_oldest(entries: &mut VecDeque<HistoryEntry>, capacity: usize) -> usize {
    let excess = entries.len().saturating_sub(capacity);
    if excess > 0 {
        entries.drain(..excess);
    }
    excess
}

fn load_entries(path: &Path) -> HistoryResult<VecDeque<HistoryEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(VecDeque::new()),
        Err(source) => {
            return Err(HistoryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let doc: HistoryDocument = serde_json::from_str(&raw).map_err(|e| HistoryError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if doc.version > HistoryDocument::CURRENT_VERSION {
        return Err(HistoryError::VersionMismatch {
            supported: HistoryDocument::CURRENT_VERSION,
            found: doc.version,
        });
    }

    Ok(doc.entries.into())
}

fn persist_entries(path: &Path, entries: &VecDeque<HistoryEntry>) -> HistoryResult<()> {
    let io_err = |source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let doc = HistoryDocument {
        version: HistoryDocument::CURRENT_VERSION,
        entries: entries.iter().cloned().collect(),
    };
    let json = serde_json::to_string_pretty(&doc).map_err(|e| HistoryError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
