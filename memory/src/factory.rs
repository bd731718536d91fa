use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::config::TOOLING_DIR;
use crate::error::Result;
use crate::registry::StoreRegistry;
use crate::store::KnowledgeStore;
use crate::store::sqlite::SqliteKnowledgeStore;

/// Open the knowledge store for a project, by default
/// `<project>/.memory-bank/knowledge.db`.
///
/// With `config.shared` the handle comes from [`StoreRegistry::global`], so
/// every caller in the process pointed at the same file gets the same handle.
/// Otherwise the caller owns a private handle.
pub fn open_project_store(
    project_root: &Path,
    config: &StoreConfig,
) -> Result<Arc<dyn KnowledgeStore>> {
    let path = config.resolve_db_path(project_root);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store: Arc<dyn KnowledgeStore> = if config.shared {
        StoreRegistry::global().open(&path)?
    } else {
        Arc::new(SqliteKnowledgeStore::open(&path)?)
    };
    Ok(store)
}

/// Nearest ancestor of `start` holding `.git` or the tooling directory.
pub fn detect_project_root(start: &Path) -> Option<PathBuf> {
    let mut cur = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    for _ in 0..64 {
        if cur.join(".git").exists() || cur.join(TOOLING_DIR).exists() {
            return Some(cur);
        }
        match cur.parent() {
            Some(parent) => cur = parent.to_path_buf(),
            None => break,
        }
    }
    None
}
