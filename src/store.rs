// src/store.rs
//! Content-addressed document storage shared by the Refiner and the Analyst.
//!
//! Keys are SHA-256 hex digests of a source URL. Presence of a key means the unit of work
//! behind it is done; stages consult `contains` before doing any network work.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Stable key for one source URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let mut out = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    /// Accepts only what `for_url` can produce (64 lowercase hex chars).
    pub fn parse(s: &str) -> Option<Self> {
        let ok = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        ok.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store directory not found: {0}")]
    MissingDir(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupted document {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// key → presence / get / put over one document type.
pub trait DocumentStore<T>: Send + Sync {
    fn contains(&self, key: &ContentAddress) -> bool;
    fn get(&self, key: &ContentAddress) -> StoreResult<Option<T>>;
    fn put(&self, key: &ContentAddress, doc: &T) -> StoreResult<()>;
    /// All keys, sorted.
    fn keys(&self) -> StoreResult<Vec<ContentAddress>>;
}

// ------------------------------------------------------------
// Filesystem store: one `<key>.json` per document
// ------------------------------------------------------------

pub struct JsonDirStore<T> {
    dir: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonDirStore<T> {
    /// Open a directory that must already exist.
    pub fn open_existing(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(StoreError::MissingDir(dir));
        }
        Ok(Self {
            dir,
            _doc: PhantomData,
        })
    }

    /// Open a directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            _doc: PhantomData,
        })
    }

    pub fn path_for(&self, key: &ContentAddress) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl<T> DocumentStore<T> for JsonDirStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn contains(&self, key: &ContentAddress) -> bool {
        self.path_for(key).is_file()
    }

    fn get(&self, key: &ContentAddress) -> StoreResult<Option<T>> {
        let path = self.path_for(key);
        let s = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_str(&s)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    fn put(&self, key: &ContentAddress, doc: &T) -> StoreResult<()> {
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, json.as_bytes()).map_err(|source| StoreError::Io { path, source })
    }

    fn keys(&self) -> StoreResult<Vec<ContentAddress>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut out = Vec::new();
        for e in entries.flatten() {
            let path = e.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(ContentAddress::parse)
            {
                out.push(key);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Write to a sibling temp file, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

// ------------------------------------------------------------
// In-memory store (tests, dry runs)
// ------------------------------------------------------------

pub struct MemoryStore<T> {
    docs: Mutex<BTreeMap<ContentAddress, T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> DocumentStore<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn contains(&self, key: &ContentAddress) -> bool {
        self.docs.lock().map(|m| m.contains_key(key)).unwrap_or(false)
    }

    fn get(&self, key: &ContentAddress) -> StoreResult<Option<T>> {
        Ok(self.docs.lock().ok().and_then(|m| m.get(key).cloned()))
    }

    fn put(&self, key: &ContentAddress, doc: &T) -> StoreResult<()> {
        if let Ok(mut m) = self.docs.lock() {
            m.insert(key.clone(), doc.clone());
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<ContentAddress>> {
        Ok(self
            .docs
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_same_address() {
        let a = ContentAddress::for_url("https://www.esma.europa.eu/press-news");
        let b = ContentAddress::for_url("https://www.esma.europa.eu/press-news");
        let c = ContentAddress::for_url("https://www.esma.europa.eu/press-news/");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(ContentAddress::parse(a.as_str()), Some(a));
    }

    #[test]
    fn parse_rejects_foreign_file_names() {
        assert!(ContentAddress::parse("notes").is_none());
        assert!(ContentAddress::parse(&"A".repeat(64)).is_none());
    }

    #[test]
    fn json_dir_store_roundtrip_and_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store: JsonDirStore<serde_json::Value> = JsonDirStore::create(tmp.path()).unwrap();
        let key = ContentAddress::for_url("https://example.eu/a");

        assert!(!store.contains(&key));
        assert!(store.get(&key).unwrap().is_none());

        store.put(&key, &serde_json::json!({"x": 1})).unwrap();
        assert!(store.contains(&key));
        assert_eq!(store.get(&key).unwrap().unwrap()["x"], 1);

        // stray files are ignored
        fs::write(tmp.path().join("README.txt"), "hi").unwrap();
        fs::write(tmp.path().join("bogus.json"), "{}").unwrap();
        assert_eq!(store.keys().unwrap(), vec![key]);
    }

    #[test]
    fn corrupt_file_is_reported_not_panicking() {
        let tmp = tempfile::tempdir().unwrap();
        let store: JsonDirStore<serde_json::Value> = JsonDirStore::create(tmp.path()).unwrap();
        let key = ContentAddress::for_url("https://example.eu/broken");
        fs::write(store.path_for(&key), "{ not json").unwrap();
        assert!(matches!(store.get(&key), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn open_existing_requires_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            JsonDirStore::<serde_json::Value>::open_existing(&missing),
            Err(StoreError::MissingDir(_))
        ));
    }
}
