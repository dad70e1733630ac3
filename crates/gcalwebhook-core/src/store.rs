//! JSON document persistence.
//!
//! State is kept as one JSON document per logical file (tokens, channels)
//! inside the configuration directory. [`DocumentStore`] is the seam between
//! callers and the filesystem: [`FileStore`] is the real, crash-safe backend
//! and [`MemoryStore`] is an in-process stand-in for tests.
//!
//! Writes through [`FileStore`] are atomic: content goes to a temporary
//! sibling (`<name>.tmp-<pid>`) created with mode 0600, which is then renamed
//! over the destination. A reader sees either the previous complete document
//! or the new one, never a torn write.
//!
//! There is no cross-process locking. Two invocations doing
//! read-modify-write on the same document race, and the last rename wins.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors raised while loading or saving documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The document was read but is not valid JSON for the expected type.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be serialized.
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The document could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Raw document storage keyed by document name (e.g. `channels.json`).
pub trait DocumentStore: Send + Sync {
    /// Returns the document contents, or `None` if it does not exist.
    fn read(&self, name: &str) -> io::Result<Option<String>>;

    /// Replaces the document contents.
    fn write(&self, name: &str, contents: &str) -> io::Result<()>;

    /// Returns true if the document exists.
    fn exists(&self, name: &str) -> bool;

    /// Human-readable location of a document, for messages.
    fn location(&self, name: &str) -> PathBuf;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        (**self).read(name)
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        (**self).write(name, contents)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn location(&self, name: &str) -> PathBuf {
        (**self).location(name)
    }
}

/// Reads and parses `name`, returning `fallback` when the document is absent.
///
/// Any other failure (I/O error, malformed JSON) is returned as an error;
/// corrupt state is never silently replaced by the fallback.
pub fn read_document<S, T>(store: &S, name: &str, fallback: T) -> StoreResult<T>
where
    S: DocumentStore + ?Sized,
    T: DeserializeOwned,
{
    let location = || store.location(name).display().to_string();

    let Some(raw) = store.read(name).map_err(|source| StoreError::Read {
        path: location(),
        source,
    })?
    else {
        debug!(path = %location(), "document not found, using fallback");
        return Ok(fallback);
    };

    serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
        path: location(),
        source,
    })
}

/// Serializes `value` as pretty-printed JSON and writes it to `name`.
pub fn write_document<S, T>(store: &S, name: &str, value: &T) -> StoreResult<()>
where
    S: DocumentStore + ?Sized,
    T: Serialize + ?Sized,
{
    let location = || store.location(name).display().to_string();

    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: location(),
        source,
    })?;

    store
        .write(name, &content)
        .map_err(|source| StoreError::Write {
            path: location(),
            source,
        })?;

    debug!(path = %location(), "document written");
    Ok(())
}

/// Filesystem-backed store rooted at the configuration directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. Nothing is touched on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory (and parents) with mode 0700 if it is missing.
    pub fn ensure_directory(&self) -> io::Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.dir)?;
        debug!(path = %self.dir.display(), "created configuration directory");
        Ok(())
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.tmp-{}", name, std::process::id()))
    }

    fn write_temp(path: &Path, contents: &str) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        // A leftover temp file from a crashed run keeps its old mode.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }
}

impl DocumentStore for FileStore {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        self.ensure_directory()?;

        let destination = self.dir.join(name);
        let temp = self.temp_path(name);

        if let Err(e) = Self::write_temp(&temp, contents) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        fs::rename(&temp, &destination).inspect_err(|_| {
            let _ = fs::remove_file(&temp);
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.dir.join(name).exists()
    }

    fn location(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw contents of a document.
    pub fn contents(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Sets the raw contents of a document, bypassing serialization.
    pub fn insert(&self, name: impl Into<String>, contents: impl Into<String>) {
        self.lock().insert(name.into(), contents.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self.lock().get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        self.lock().insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn location(&self, name: &str) -> PathBuf {
        PathBuf::from("memory").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_document_returns_fallback() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cfg"));

        let value: Vec<String> = read_document(&store, "channels.json", Vec::new()).unwrap();
        assert!(value.is_empty());

        let tokens: Option<serde_json::Value> = read_document(&store, "tokens.json", None).unwrap();
        assert!(tokens.is_none());
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        fs::write(dir.path().join("channels.json"), "{ not json").unwrap();

        let result: StoreResult<Vec<String>> = read_document(&store, "channels.json", Vec::new());
        assert!(matches!(result, Err(StoreError::Parse { .. })));
    }

    #[test]
    fn unreadable_document_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        // A directory where a file is expected cannot be read as a string.
        fs::create_dir(dir.path().join("channels.json")).unwrap();

        let result: StoreResult<Vec<String>> = read_document(&store, "channels.json", Vec::new());
        assert!(matches!(result, Err(StoreError::Read { .. })));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("cfg"));
        let value = json!({
            "access_token": "abc",
            "expiry_date": 1_700_000_000_000_i64,
            "nested": [1, 2, {"k": null}]
        });

        write_document(&store, "tokens.json", &value).unwrap();
        let loaded: serde_json::Value =
            read_document(&store, "tokens.json", serde_json::Value::Null).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn written_document_is_pretty_printed() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        write_document(&store, "doc.json", &json!({"a": 1})).unwrap();
        let raw = fs::read_to_string(dir.path().join("doc.json")).unwrap();
        assert_eq!(raw, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        write_document(&store, "doc.json", &json!([1, 2, 3])).unwrap();
        write_document(&store, "doc.json", &json!([4])).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);

        let loaded: Vec<i32> = read_document(&store, "doc.json", Vec::new()).unwrap();
        assert_eq!(loaded, vec![4]);
    }

    #[test]
    fn ensure_directory_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("a").join("b"));
        store.ensure_directory().unwrap();
        store.ensure_directory().unwrap();
        assert!(store.dir().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cfg"));
        write_document(&store, "tokens.json", &json!({})).unwrap();

        let dir_mode = fs::metadata(store.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = fs::metadata(store.location("tokens.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[test]
    fn exists_reflects_writes() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(!store.exists("doc.json"));
        write_document(&store, "doc.json", &json!(1)).unwrap();
        assert!(store.exists("doc.json"));
    }

    #[test]
    fn memory_store_behaves_like_file_store() {
        let store = MemoryStore::new();
        let value: Vec<u8> = read_document(&store, "doc.json", vec![9]).unwrap();
        assert_eq!(value, vec![9]);

        write_document(&store, "doc.json", &vec![1_u8, 2]).unwrap();
        assert!(store.exists("doc.json"));
        let value: Vec<u8> = read_document(&store, "doc.json", Vec::new()).unwrap();
        assert_eq!(value, vec![1, 2]);

        store.insert("doc.json", "garbage");
        let result: StoreResult<Vec<u8>> = read_document(&store, "doc.json", Vec::new());
        assert!(matches!(result, Err(StoreError::Parse { .. })));
    }
}
