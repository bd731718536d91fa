use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KnowledgeError>;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    /// Caller-supplied value rejected before touching storage.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("knowledge store is closed: {}", .0.display())]
    Closed(PathBuf),

    #[error("knowledge store lock poisoned")]
    LockPoisoned,
}

impl KnowledgeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        KnowledgeError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, KnowledgeError::Validation { .. })
    }
}
