//! Memory Bank: a per-project knowledge base for coding agents.
//!
//! Notes (errors, solutions, decisions, ...) live in a SQLite file with an
//! FTS5 index over title, content, tags and source file. Identical content is
//! stored once, and items can be joined by typed, directed links.

pub mod config;
pub mod error;
pub mod factory;
pub mod registry;
pub mod store;
pub mod types;

pub use error::KnowledgeError;
pub use registry::StoreRegistry;
pub use store::KnowledgeStore;
pub use store::sqlite::SqliteKnowledgeStore;
pub use types::*;
