//! Append-only JSONL implementation of `AuditStore`.
//!
//! Layout on disk:
//!
//! - `<path>`            one JSON-serialized `AuditEntry` per line, in commit order
//! - `<path>.rollbacks`  one sequence number per line, for every executed rollback
//!
//! The log file is only ever appended to. The rollback annotation is kept in
//! the sidecar so that marking an entry never rewrites a hashed line.
//!
//! On `open` the whole log is loaded into an indexed in-memory cache that
//! serves every read. A final line without its newline is the trace of a
//! crash mid-append and is cut off with a warning; any other unreadable line
//! fails the open.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use chainlog_contracts::{
    entry::AuditEntry,
    error::{ChainlogError, ChainlogResult},
    query::AuditFilter,
};
use chainlog_core::traits::AuditStore;

use crate::memory::IndexedEntries;

/// Suffix appended to the log path for the rollback sidecar.
pub const ROLLBACK_SUFFIX: &str = "rollbacks";

struct FileState {
    log: File,
    /// Byte length of the log up to the last complete line.
    log_len: u64,
    sidecar: File,
    sidecar_len: u64,
    cache: IndexedEntries,
}

/// A durable `AuditStore` backed by an append-only JSON-lines file.
pub struct FileAuditStore {
    path: PathBuf,
    sidecar_path: PathBuf,
    fsync: bool,
    state: Mutex<FileState>,
}

impl FileAuditStore {
    /// Open (or create) the log at `path`.
    ///
    /// With `fsync` set, every append and rollback mark is flushed to stable
    /// storage before it is acknowledged.
    ///
    /// # Errors
    ///
    /// - `PersistenceFailure` if the files cannot be created or read, or an
    ///   interior line is not a valid entry.
    /// - `SequenceConflict` if two lines carry the same sequence.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> ChainlogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let sidecar_path = sidecar_path_for(&path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| io_failure(format!("failed to create {}", parent.display()), e))?;
        }

        let mut log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| io_failure(format!("failed to open {}", path.display()), e))?;

        let mut raw = Vec::new();
        log.read_to_end(&mut raw)
            .map_err(|e| io_failure(format!("failed to read {}", path.display()), e))?;

        let (mut cache, log_len) = load_entries(&path, &raw)?;
        if log_len < raw.len() as u64 {
            warn!(
                path = %path.display(),
                discarded_bytes = raw.len() as u64 - log_len,
                "truncating torn final line of audit log"
            );
            log.set_len(log_len)
                .map_err(|e| io_failure(format!("failed to truncate {}", path.display()), e))?;
        }

        let mut sidecar = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&sidecar_path)
            .map_err(|e| io_failure(format!("failed to open {}", sidecar_path.display()), e))?;

        let sidecar_len = apply_rollback_marks(&sidecar_path, &mut sidecar, &mut cache)?;

        info!(
            path = %path.display(),
            entries = cache.len(),
            "loaded audit log"
        );

        Ok(Self {
            path,
            sidecar_path,
            fsync,
            state: Mutex::new(FileState {
                log,
                log_len,
                sidecar,
                sidecar_len,
                cache,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    fn lock(&self) -> ChainlogResult<MutexGuard<'_, FileState>> {
        self.state.lock().map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!("audit file lock poisoned: {e}"),
        })
    }

    fn sync(&self, file: &File) -> std::io::Result<()> {
        if self.fsync {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// Append `bytes` to `file`, whose committed length is `len`.
///
/// Any failure, including one from `sync` after the bytes were written,
/// truncates the file back to `len`, so an error never leaves a line behind.
pub(crate) fn append_bytes(
    file: &mut File,
    len: u64,
    bytes: &[u8],
    path: &Path,
    sync: impl FnOnce(&File) -> std::io::Result<()>,
) -> ChainlogResult<u64> {
    let written = file
        .write_all(bytes)
        .and_then(|()| file.flush())
        .and_then(|()| sync(file));
    if let Err(e) = written {
        if let Err(trunc) = file.set_len(len) {
            error!(path = %path.display(), error = %trunc, "failed to roll back partial append");
        }
        return Err(io_failure(format!("failed to append to {}", path.display()), e));
    }
    Ok(len + bytes.len() as u64)
}

impl AuditStore for FileAuditStore {
    fn append(&self, entry: &AuditEntry) -> ChainlogResult<()> {
        let mut state = self.lock()?;
        if state.cache.contains(entry.sequence) {
            return Err(ChainlogError::SequenceConflict {
                sequence: entry.sequence,
            });
        }

        let mut line = serde_json::to_string(entry).map_err(|e| ChainlogError::EncodingFailure {
            reason: format!("failed to serialize entry {}: {e}", entry.sequence),
        })?;
        line.push('\n');

        let state = &mut *state;
        state.log_len = append_bytes(
            &mut state.log,
            state.log_len,
            line.as_bytes(),
            &self.path,
            |f| self.sync(f),
        )?;
        state.cache.insert(entry.clone())?;
        debug!(sequence = entry.sequence, "entry appended to audit log");
        Ok(())
    }

    fn get(&self, sequence: u64) -> ChainlogResult<Option<AuditEntry>> {
        Ok(self.lock()?.cache.get(sequence))
    }

    fn get_range(&self, start: u64, end: u64) -> ChainlogResult<Vec<AuditEntry>> {
        Ok(self.lock()?.cache.range(start, end))
    }

    fn last(&self) -> ChainlogResult<Option<AuditEntry>> {
        Ok(self.lock()?.cache.last())
    }

    fn set_rollback_executed(&self, sequence: u64) -> ChainlogResult<()> {
        let mut state = self.lock()?;
        if !state.cache.contains(sequence) {
            return Err(ChainlogError::EntryNotFound { sequence });
        }

        let state = &mut *state;
        state.sidecar_len = append_bytes(
            &mut state.sidecar,
            state.sidecar_len,
            format!("{sequence}\n").as_bytes(),
            &self.sidecar_path,
            |f| self.sync(f),
        )?;

        state.cache.mark_rollback_executed(sequence)?;
        Ok(())
    }

    fn count(&self) -> ChainlogResult<u64> {
        Ok(self.lock()?.cache.len())
    }

    fn matching(&self, filter: &AuditFilter) -> ChainlogResult<Vec<AuditEntry>> {
        Ok(self.lock()?.cache.matching(filter))
    }
}

impl std::fmt::Debug for FileAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditStore")
            .field("path", &self.path)
            .field("fsync", &self.fsync)
            .finish_non_exhaustive()
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

fn sidecar_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ROLLBACK_SUFFIX);
    PathBuf::from(name)
}

/// Parse every complete line of `raw`.
///
/// Returns the cache and the byte length covered by complete lines; the
/// caller truncates anything beyond it.
fn load_entries(path: &Path, raw: &[u8]) -> ChainlogResult<(IndexedEntries, u64)> {
    let complete = match raw.iter().rposition(|b| *b == b'\n') {
        Some(idx) => idx + 1,
        None => 0,
    };

    let mut cache = IndexedEntries::default();
    for (idx, line) in raw[..complete].split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry: AuditEntry = serde_json::from_slice(line).map_err(|e| {
            ChainlogError::PersistenceFailure {
                reason: format!("{}: line {} is not a valid entry: {e}", path.display(), idx + 1),
            }
        })?;
        cache.insert(entry)?;
    }
    Ok((cache, complete as u64))
}

/// Apply every complete mark in the sidecar; returns its committed length.
fn apply_rollback_marks(
    sidecar_path: &Path,
    sidecar: &mut File,
    cache: &mut IndexedEntries,
) -> ChainlogResult<u64> {
    let mut text = String::new();
    sidecar
        .read_to_string(&mut text)
        .map_err(|e| io_failure(format!("failed to read {}", sidecar_path.display()), e))?;

    // A torn mark would otherwise merge with the next one.
    let complete = text.rfind('\n').map_or(0, |idx| idx + 1);
    if complete < text.len() {
        warn!(path = %sidecar_path.display(), "truncating torn final rollback mark");
        sidecar.set_len(complete as u64).map_err(|e| {
            io_failure(format!("failed to truncate {}", sidecar_path.display()), e)
        })?;
    }

    for (idx, line) in text[..complete].lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sequence: u64 = line.parse().map_err(|e| ChainlogError::PersistenceFailure {
            reason: format!(
                "{}: line {} is not a sequence number: {e}",
                sidecar_path.display(),
                idx + 1
            ),
        })?;
        if cache.mark_rollback_executed(sequence).is_err() {
            warn!(sequence, "rollback mark for an entry missing from the log; ignored");
        }
    }
    Ok(complete as u64)
}

fn io_failure(context: String, err: std::io::Error) -> ChainlogError {
    ChainlogError::PersistenceFailure {
        reason: format!("{context}: {err}"),
    }
}
