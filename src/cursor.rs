//! Persisted cursor record (`{"ultNSU": "..."}`)

use crate::error::{PersistenceError, Result};
use crate::types::Cursor;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk shape of the cursor record
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCursorState {
    #[serde(rename = "ultNSU")]
    ult_nsu: String,
}

/// What [`CursorStore::save`] did with the requested cursor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorSave {
    /// The record now holds the requested cursor
    Written(Cursor),
    /// The record already held a later cursor and was left untouched
    Kept {
        /// Cursor found on disk
        persisted: Cursor,
        /// Cursor that was refused
        requested: Cursor,
    },
}

impl CursorSave {
    /// The cursor held by the record after the save
    pub fn effective(&self) -> &Cursor {
        match self {
            CursorSave::Written(cursor) => cursor,
            CursorSave::Kept { persisted, .. } => persisted,
        }
    }
}

/// Loads and saves the cursor for one identity
///
/// Different identities must use different record paths.
#[derive(Clone, Debug)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// Create a store backed by the given JSON file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cursor record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted cursor
    ///
    /// A missing, unreadable or malformed record yields the default cursor
    /// (`000000000000000`); this never fails.
    pub fn load(&self) -> Cursor {
        match self.read_persisted() {
            Ok(Some(cursor)) => {
                debug!(path = %self.path.display(), cursor = cursor.as_str(), "cursor loaded");
                cursor
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no cursor record, starting from zero");
                Cursor::default()
            }
            Err(reason) => {
                warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "cursor record unusable, starting from zero"
                );
                Cursor::default()
            }
        }
    }

    /// Persist a new cursor
    ///
    /// The record is replaced atomically (temporary file in the same
    /// directory, then rename) while holding an exclusive advisory lock on a
    /// sidecar `.lock` file, so concurrent savers for the same record are
    /// serialized. A cursor lower than the one already on disk is refused and
    /// reported as [`CursorSave::Kept`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the lock cannot be taken or the
    /// record cannot be written.
    pub fn save(&self, cursor: &Cursor) -> Result<CursorSave> {
        let _lock = self.lock()?;

        if let Ok(Some(persisted)) = self.read_persisted()
            && persisted > *cursor
        {
            warn!(
                path = %self.path.display(),
                persisted = persisted.as_str(),
                requested = cursor.as_str(),
                "refusing to move cursor backwards"
            );
            return Ok(CursorSave::Kept {
                persisted,
                requested: cursor.clone(),
            });
        }

        self.write_atomic(cursor)?;
        info!(path = %self.path.display(), cursor = cursor.as_str(), "cursor updated");
        Ok(CursorSave::Written(cursor.clone()))
    }

    /// [`CursorStore::load`] on the blocking thread pool
    pub async fn load_async(&self) -> Result<Cursor> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| self.task_error(e).into())
    }

    /// [`CursorStore::save`] on the blocking thread pool
    ///
    /// Waiting for another saver's lock then occupies a blocking thread
    /// instead of an async worker.
    pub async fn save_async(&self, cursor: &Cursor) -> Result<CursorSave> {
        let store = self.clone();
        let cursor = cursor.clone();
        tokio::task::spawn_blocking(move || store.save(&cursor))
            .await
            .map_err(|e| self.task_error(e))?
    }

    fn task_error(&self, error: tokio::task::JoinError) -> PersistenceError {
        PersistenceError::Task {
            path: self.path.clone(),
            reason: error.to_string(),
        }
    }

    fn read_persisted(&self) -> std::result::Result<Option<Cursor>, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };
        let state: PersistedCursorState =
            serde_json::from_str(&content).map_err(|e| e.to_string())?;
        Cursor::parse(&state.ult_nsu)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        let lock_err = |reason: String| PersistenceError::Lock {
            path: lock_path.clone(),
            reason,
        };

        std::fs::create_dir_all(self.parent_dir()).map_err(|e| lock_err(e.to_string()))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| lock_err(e.to_string()))?;
        // Blocks until any concurrent saver releases the lock
        file.lock_exclusive().map_err(|e| lock_err(e.to_string()))?;
        Ok(file)
    }

    fn write_atomic(&self, cursor: &Cursor) -> Result<()> {
        let write_err = |reason: String| PersistenceError::Write {
            path: self.path.clone(),
            reason,
        };

        let state = PersistedCursorState {
            ult_nsu: cursor.as_str().to_string(),
        };
        let json = serde_json::to_string_pretty(&state)?;

        let mut temp = tempfile::NamedTempFile::new_in(self.parent_dir())
            .map_err(|e| write_err(format!("creating temp file: {}", e)))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| write_err(format!("writing temp file: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| write_err(format!("syncing temp file: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| write_err(format!("renaming temp file: {}", e.error)))?;
        Ok(())
    }
}
