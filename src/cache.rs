// Remote taxonomy retrieval, injected into a load rather than held globally
use crate::{Error, Result};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Source of remote taxonomy documents (`http`/`https` URIs).
///
/// A cache may be fresh per load or shared across loads through an `Arc`.
pub trait TaxonomyCache: Send + Sync {
    fn get(&self, uri: &Url) -> Result<Vec<u8>>;
}

/// In-memory cache keyed by absolute URI.
#[derive(Default, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<AHashMap<String, Arc<[u8]>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.entries
            .write()
            .insert(uri.to_string(), Arc::from(bytes.into_boxed_slice()));
    }

    #[inline]
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl TaxonomyCache for MemoryCache {
    fn get(&self, uri: &Url) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(uri.as_str())
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))
    }
}

/// Offline mirror: `http://host/a/b.xsd` is read from `<root>/host/a/b.xsd`.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, uri: &Url) -> Option<PathBuf> {
        let host = uri.host_str()?;
        let mut path = self.root.join(host);
        for segment in uri.path_segments()? {
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            path.push(segment);
        }
        Some(path)
    }
}

impl TaxonomyCache for DirectoryCache {
    fn get(&self, uri: &Url) -> Result<Vec<u8>> {
        let path = self
            .path_for(uri)
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ResourceNotFound(uri.to_string()),
            _ => Error::Io(e),
        })
    }
}
