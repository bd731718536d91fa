use std::path::Path;

use sha2::Digest;
use sha2::Sha256;

use crate::error::KnowledgeError;
use crate::error::Result;
use crate::types::ItemType;
use crate::types::KnowledgeItem;
use crate::types::LinkType;
use crate::types::LinkedItem;
use crate::types::NewItem;
use crate::types::SearchHit;
use crate::types::StoreStats;

/// Query string meaning "everything", newest first.
pub const MATCH_ALL: &str = "*";

pub trait KnowledgeStore: Send + Sync {
    /// Store `item` and return its id. With `skip_duplicates` an item whose
    /// content is already stored yields the existing id and writes nothing.
    fn add(&self, item: NewItem, skip_duplicates: bool) -> Result<i64>;
    fn search(&self, query: &str, item_type: Option<ItemType>, limit: usize)
    -> Result<Vec<SearchHit>>;
    fn link(&self, from_id: i64, to_id: i64, link_type: LinkType) -> Result<()>;
    fn get_linked(&self, id: i64) -> Result<Vec<LinkedItem>>;
    fn get_stats(&self) -> Result<StoreStats>;
    fn content_exists(&self, content: &str) -> Result<Option<i64>>;
    fn get(&self, id: i64) -> Result<Option<KnowledgeItem>>;
    fn export(&self, out: &mut dyn std::io::Write) -> Result<usize>;
    fn import(&self, input: &mut dyn std::io::Read, skip_duplicates: bool) -> Result<usize>;
    fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
    fn location(&self) -> &Path;

    /// Best-effort ingestion: each item is added in order and its outcome is
    /// reported in the matching slot. A failed item does not stop the batch.
    fn add_batch(&self, items: Vec<NewItem>, skip_duplicates: bool) -> Vec<Result<i64>> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let outcome = self.add(item, skip_duplicates);
                if let Err(err) = &outcome {
                    tracing::warn!(index, "knowledge: batch item skipped: {err}");
                }
                outcome
            })
            .collect()
    }
}

/// Ids of the items a batch managed to store, in input order.
pub fn stored_ids(outcomes: &[Result<i64>]) -> Vec<i64> {
    outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok().copied())
        .collect()
}

/// SHA-256 of the content, hex encoded. Used only for dedup lookups.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

pub(crate) fn is_match_all(query: &str) -> bool {
    let q = query.trim();
    q.is_empty() || q == MATCH_ALL
}

pub(crate) fn validate_link_id(field: &'static str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(KnowledgeError::invalid(
            field,
            format!("item ids are positive, got {id}"),
        ));
    }
    Ok(())
}

pub mod fts;
pub mod sqlite;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("hello"));
        assert_ne!(h, content_hash("hello "));
    }

    #[test]
    fn sentinel_detection() {
        assert!(is_match_all("*"));
        assert!(is_match_all(""));
        assert!(is_match_all("  * "));
        assert!(!is_match_all("foo*"));
        assert!(!is_match_all("**"));
    }
}
