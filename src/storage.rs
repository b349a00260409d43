//! Storage boundary between the sync and extraction pipelines
//!
//! The sync pipeline `put`s raw responses into a [`ResponseStore`]; the
//! extraction pipeline later `list`s and `read`s them, and writes decoded
//! documents to a [`DocumentSink`]. Both have a filesystem and an in-memory
//! implementation.

use crate::error::{Error, Result};
use crate::types::{Cursor, DecodedDocument};
use crate::utils::list_xml_files;
use chrono::Local;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Location of one stored raw response
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseHandle(PathBuf);

impl ResponseHandle {
    /// Path (or in-memory key) of the response
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for ResponseHandle {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for ResponseHandle {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl fmt::Display for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// File name for a raw response: `resposta_<cursor>_<YYYYmmdd_HHMMSS>.xml`
///
/// `cursor` is the cursor the request was sent with.
pub fn response_file_name(cursor: &Cursor) -> String {
    format!(
        "resposta_{}_{}.xml",
        cursor.as_str(),
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Maximum number of suffixed names tried for one response
const MAX_NAME_ATTEMPTS: u32 = 9999;

/// Append `_<n>` before the extension until `taken` reports the name is free
fn unique_name(name: String, taken: impl Fn(&str) -> bool) -> Result<String> {
    if !taken(&name) {
        return Ok(name);
    }
    let stem = name.trim_end_matches(".xml");
    for n in 1..=MAX_NAME_ATTEMPTS {
        let candidate = format!("{}_{}.xml", stem, n);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {} after {} attempts", name, MAX_NAME_ATTEMPTS),
    )))
}

/// Where raw responses are kept between fetching and extraction
pub trait ResponseStore: Send + Sync {
    /// Store a raw response fetched with `cursor`
    fn put(&self, cursor: &Cursor, body: &str) -> Result<ResponseHandle>;

    /// All stored responses, in name order
    fn list(&self) -> Result<Vec<ResponseHandle>>;

    /// Raw bytes of a stored response
    fn read(&self, handle: &ResponseHandle) -> Result<Vec<u8>>;
}

/// Where decoded documents are written
pub trait DocumentSink: Send + Sync {
    /// Write a document under its file name; an existing one is replaced
    fn write(&self, document: &DecodedDocument) -> Result<PathBuf>;
}

/// Responses stored as files in one directory
#[derive(Clone, Debug)]
pub struct FsResponseStore {
    dir: PathBuf,
}

impl FsResponseStore {
    /// Create a store over `dir`; the directory is created on first `put`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the responses
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ResponseStore for FsResponseStore {
    fn put(&self, cursor: &Cursor, body: &str) -> Result<ResponseHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let name = unique_name(response_file_name(cursor), |candidate| {
            self.dir.join(candidate).exists()
        })?;
        let path = self.dir.join(name);
        std::fs::write(&path, body).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write response to {}: {}", path.display(), e),
            ))
        })?;
        info!(path = %path.display(), bytes = body.len(), "response saved");
        Ok(ResponseHandle(path))
    }

    fn list(&self) -> Result<Vec<ResponseHandle>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "response directory does not exist");
            return Ok(Vec::new());
        }
        Ok(list_xml_files(&self.dir)?
            .into_iter()
            .map(ResponseHandle)
            .collect())
    }

    fn read(&self, handle: &ResponseHandle) -> Result<Vec<u8>> {
        std::fs::read(handle.path()).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read response {}: {}", handle, e),
            ))
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the map half-updated
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Responses kept in memory, keyed by file name
#[derive(Debug, Default)]
pub struct MemoryResponseStore {
    responses: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryResponseStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a response under an explicit name
    pub fn insert(&self, name: impl Into<PathBuf>, body: impl Into<Vec<u8>>) -> ResponseHandle {
        let name = name.into();
        lock(&self.responses).insert(name.clone(), body.into());
        ResponseHandle(name)
    }

    /// Number of stored responses
    pub fn len(&self) -> usize {
        lock(&self.responses).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseStore for MemoryResponseStore {
    fn put(&self, cursor: &Cursor, body: &str) -> Result<ResponseHandle> {
        let mut responses = lock(&self.responses);
        let name = unique_name(response_file_name(cursor), |candidate| {
            responses.contains_key(Path::new(candidate))
        })?;
        let key = PathBuf::from(name);
        responses.insert(key.clone(), body.as_bytes().to_vec());
        Ok(ResponseHandle(key))
    }

    fn list(&self) -> Result<Vec<ResponseHandle>> {
        Ok(lock(&self.responses)
            .keys()
            .cloned()
            .map(ResponseHandle)
            .collect())
    }

    fn read(&self, handle: &ResponseHandle) -> Result<Vec<u8>> {
        lock(&self.responses)
            .get(handle.path())
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("response {} not found", handle),
                ))
            })
    }
}

/// Documents written as files in one directory
#[derive(Clone, Debug)]
pub struct FsDocumentSink {
    dir: PathBuf,
}

impl FsDocumentSink {
    /// Create a sink over `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentSink for FsDocumentSink {
    fn write(&self, document: &DecodedDocument) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&document.file_name);
        std::fs::write(&path, &document.content).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write document to {}: {}", path.display(), e),
            ))
        })?;
        Ok(path)
    }
}

/// Documents kept in memory, keyed by file name
#[derive(Debug, Default)]
pub struct MemoryDocumentSink {
    documents: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryDocumentSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of a written document
    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        lock(&self.documents).get(file_name).cloned()
    }

    /// Names of all written documents, sorted
    pub fn names(&self) -> Vec<String> {
        lock(&self.documents).keys().cloned().collect()
    }
}

impl DocumentSink for MemoryDocumentSink {
    fn write(&self, document: &DecodedDocument) -> Result<PathBuf> {
        lock(&self.documents).insert(document.file_name.clone(), document.content.clone());
        Ok(PathBuf::from(&document.file_name))
    }
}
