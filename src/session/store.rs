//! Durable session persistence.
//!
//! Each session is one JSON file at `<dir>/<sessionId>.json`, so independent
//! server processes can share a store through the filesystem. All writes are
//! whole-file replacement while holding an exclusive advisory lock; readers
//! treat any I/O or parse failure as a miss, which makes transient partial
//! files harmless.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::session::record::{now_secs, SessionRecord, SessionStatus};

/// File-backed session store.
///
/// The store itself is stateless; every operation goes to disk. Cloning is
/// cheap and clones share the same directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Opens a store rooted at `dir`, creating the directory with private
    /// permissions if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();

        if !dir.exists() {
            let mut builder = std::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(&dir).map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }

        Ok(Self { dir })
    }

    /// The directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Persists a new session record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SessionExists`] if a file for this id already
    /// exists, or an I/O error if the write fails.
    pub fn create(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.session_id);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StoreError::SessionExists {
                        session: record.session_id.clone(),
                    }
                } else {
                    StoreError::Io {
                        path: path.clone(),
                        source: e,
                    }
                }
            })?;

        file.lock_exclusive().map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;

        let json = serde_json::to_vec(record).map_err(|e| StoreError::Serialise { source: e })?;
        file.write_all(&json)
            .and_then(|()| file.flush())
            .map_err(|e| StoreError::Io { path, source: e })?;

        Ok(())
    }

    /// Reads a session record.
    ///
    /// Returns `None` when the file is absent, unreadable, or does not parse
    /// into a complete record.
    #[must_use]
    pub fn read(&self, session_id: &str) -> Option<SessionRecord> {
        let path = self.path_for(session_id);
        let file = File::open(&path).ok()?;
        file.lock_shared().ok()?;
        read_record(&file)
    }

    /// Atomically moves a session to `new_status`.
    ///
    /// Performs a read-modify-write under an exclusive lock. `closedAt` is
    /// stamped when the transition target is `Closed`. Backward transitions
    /// are refused; the file is left untouched and the prior status is still
    /// returned.
    ///
    /// Returns the prior status, or `None` when the session could not be
    /// verified (absent or malformed file).
    #[must_use]
    pub fn update(&self, session_id: &str, new_status: SessionStatus) -> Option<SessionStatus> {
        let path = self.path_for(session_id);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .ok()?;
        file.lock_exclusive().ok()?;

        let mut record = read_record(&file)?;
        let prior = record.status;

        if new_status <= prior {
            return Some(prior);
        }

        record.status = new_status;
        if new_status == SessionStatus::Closed {
            record.closed_at = now_secs();
        }

        let json = serde_json::to_vec(&record).ok()?;
        file.seek(SeekFrom::Start(0)).ok()?;
        file.set_len(0).ok()?;
        file.write_all(&json).ok()?;
        file.flush().ok()?;

        Some(prior)
    }

    /// Yields every session id currently on disk, closed ones included.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem()
                        .and_then(|stem| stem.to_str())
                        .map(str::to_string)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Sweeps the store for expired sessions.
    ///
    /// For each session, in order:
    /// - older than `2 × max_uptime` → the file is deleted (audit retention
    ///   has lapsed);
    /// - still `Initializing` and older than `init_timeout` → deleted (the
    ///   handshake was abandoned);
    /// - not yet closed and older than `max_uptime` → moved to `Closed`.
    ///
    /// The sweep is idempotent: running it twice in a row is equivalent to
    /// running it once.
    pub fn reap(&self, now: u64, max_uptime: u64, init_timeout: u64) {
        for session_id in self.list() {
            let Some(record) = self.read(&session_id) else {
                continue;
            };

            if record.opened_at < now.saturating_sub(2 * max_uptime) {
                self.remove(&session_id);
            } else if record.status == SessionStatus::Initializing
                && record.opened_at < now.saturating_sub(init_timeout)
            {
                debug!(session = %session_id, "reaping abandoned handshake");
                self.remove(&session_id);
            } else if !record.is_closed() && record.opened_at < now.saturating_sub(max_uptime) {
                debug!(session = %session_id, "closing session past maximum uptime");
                let _ = self.update(&session_id, SessionStatus::Closed);
            }
        }
    }

    fn remove(&self, session_id: &str) {
        let path = self.path_for(session_id);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(session = %session_id, error = %e, "failed to delete session file");
        }
    }
}

/// Reads and parses a complete record from an already-locked file.
fn read_record(mut file: &File) -> Option<SessionRecord> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}
