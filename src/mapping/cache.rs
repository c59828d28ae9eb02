use crate::errors::Result;
use crate::mapping::llm::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identity of a classified field. Site redesigns are not detected: entries
/// live until the cache file is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub site: String,
    pub field_name: String,
    pub field_type: String,
    pub label: String,
}

impl CacheKey {
    pub fn new(site: &str, field_name: &str, field_type: &str, label: &str) -> Self {
        Self {
            site: site.to_lowercase(),
            field_name: field_name.to_string(),
            field_type: field_type.to_string(),
            label: label.trim().to_string(),
        }
    }
}

/// Rendered as a JSON array, the form used as the storage key.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = json!([self.site, self.field_name, self.field_type, self.label]);
        write!(f, "{}", parts)
    }
}

pub trait MappingCache: Send {
    fn get(&self, key: &CacheKey) -> Option<Classification>;

    fn put(&mut self, key: &CacheKey, classification: Classification);

    /// Persist pending writes. No-op for in-memory caches.
    fn flush(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    entries: HashMap<String, Classification>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Classification> {
        self.entries.get(&key.to_string()).cloned()
    }

    fn put(&mut self, key: &CacheKey, classification: Classification) {
        self.entries.insert(key.to_string(), classification);
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedEntry {
    classification: Classification,
    cached_at: DateTime<Utc>,
}

/// JSON file cache shared across runs. Writes go to a temp file in the same
/// directory which is then renamed over the target.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: BTreeMap<String, CachedEntry>,
    dirty: bool,
}

impl JsonFileCache {
    /// A missing file starts an empty cache; an unreadable one is logged and
    /// replaced on the next flush.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("ignoring corrupt mapping cache {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!("mapping cache {} holds {} entries", path.display(), entries.len());
        Self {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manual invalidation. Returns whether a file was removed.
    pub fn clear(path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl MappingCache for JsonFileCache {
    fn get(&self, key: &CacheKey) -> Option<Classification> {
        self.entries
            .get(&key.to_string())
            .map(|entry| entry.classification.clone())
    }

    fn put(&mut self, key: &CacheKey, classification: Classification) {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                classification,
                cached_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, &self.entries)?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        self.dirty = false;
        debug!("flushed {} cache entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
