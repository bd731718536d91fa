use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;

use crate::error::KnowledgeError;
use crate::error::Result;
use crate::store::KnowledgeStore;
use crate::store::sqlite::SqliteKnowledgeStore;

/// Shared store handles keyed by database location.
///
/// `open` hands out the live handle for a location, constructing it on first
/// use. A handle that has been closed (through the registry or directly on the
/// store) is never handed out again; the next `open` builds a fresh one.
/// Construction happens under the registry lock, so two threads opening the
/// same location for the first time get the same handle.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<PathBuf, Arc<SqliteKnowledgeStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static StoreRegistry {
        static GLOBAL: OnceLock<StoreRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StoreRegistry::new)
    }

    pub fn open(&self, path: impl AsRef<Path>) -> Result<Arc<SqliteKnowledgeStore>> {
        let key = normalize_location(path.as_ref())?;
        let mut stores = self.lock()?;
        if let Some(existing) = stores.get(&key) {
            if !existing.is_closed() {
                tracing::debug!("knowledge: reusing shared store {}", key.display());
                return Ok(Arc::clone(existing));
            }
            tracing::debug!("knowledge: replacing closed store {}", key.display());
        }
        let store = Arc::new(SqliteKnowledgeStore::open(&key)?);
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    /// Close the handle for `path` and forget it. Returns whether one was registered.
    pub fn close(&self, path: impl AsRef<Path>) -> Result<bool> {
        let key = normalize_location(path.as_ref())?;
        let removed = self.lock()?.remove(&key);
        match removed {
            Some(store) => {
                store.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn close_all(&self) -> Result<()> {
        let drained: Vec<_> = self.lock()?.drain().collect();
        for (_, store) in drained {
            store.close()?;
        }
        Ok(())
    }

    /// Number of registered handles that are still open.
    pub fn len(&self) -> usize {
        self.lock()
            .map(|stores| stores.values().filter(|s| !s.is_closed()).count())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<PathBuf, Arc<SqliteKnowledgeStore>>>> {
        self.stores.lock().map_err(|_| KnowledgeError::LockPoisoned)
    }
}

/// Canonical key for a database path. The parent directory is created so it
/// can be canonicalized; the file itself may not exist yet.
fn normalize_location(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        KnowledgeError::invalid("storage_location", format!("not a file path: {}", path.display()))
    })?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&parent)?;
    Ok(parent.canonicalize()?.join(file_name))
}
