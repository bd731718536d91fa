use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::KnowledgeError;

/// Kind of note recorded in the knowledge base.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Error,
    Solution,
    Decision,
    Memo,
    Code,
    Concept,
    Pattern,
    Report,
    ArchivedError,
}

impl ItemType {
    pub const ALL: [ItemType; 9] = [
        ItemType::Error,
        ItemType::Solution,
        ItemType::Decision,
        ItemType::Memo,
        ItemType::Code,
        ItemType::Concept,
        ItemType::Pattern,
        ItemType::Report,
        ItemType::ArchivedError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Error => "error",
            ItemType::Solution => "solution",
            ItemType::Decision => "decision",
            ItemType::Memo => "memo",
            ItemType::Code => "code",
            ItemType::Concept => "concept",
            ItemType::Pattern => "pattern",
            ItemType::Report => "report",
            ItemType::ArchivedError => "archived_error",
        }
    }
}

impl FromStr for ItemType {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KnowledgeError::invalid("type", format!("unknown item type: {s}")))
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship carried by a directed link between two items.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Solves,
    Causes,
    Related,
    Implements,
    References,
}

impl LinkType {
    pub const ALL: [LinkType; 5] = [
        LinkType::Solves,
        LinkType::Causes,
        LinkType::Related,
        LinkType::Implements,
        LinkType::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Solves => "solves",
            LinkType::Causes => "causes",
            LinkType::Related => "related",
            LinkType::Implements => "implements",
            LinkType::References => "references",
        }
    }
}

impl FromStr for LinkType {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LinkType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KnowledgeError::invalid("link_type", format!("unknown link type: {s}")))
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input accepted by `add`, `add_batch` and `import`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_file: Option<String>,
}

impl NewItem {
    pub fn new(title: impl Into<String>, content: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            item_type,
            tags: Vec::new(),
            source_file: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    /// Rejects blank titles and blank content.
    pub fn validate(&self) -> Result<(), KnowledgeError> {
        if self.title.trim().is_empty() {
            return Err(KnowledgeError::invalid("title", "must not be empty"));
        }
        if self.content.trim().is_empty() {
            return Err(KnowledgeError::invalid("content", "must not be empty"));
        }
        Ok(())
    }
}

/// A stored note with everything the store knows about it except the hash.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct KnowledgeItem {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub tags: Vec<String>,
    pub source_file: Option<String>,
    pub created_at: String, // RFC3339
}

/// Row returned by `search`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub created_at: String,
}

/// Target of an outgoing link. `title` is `None` when the target id was never created.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LinkedItem {
    pub id: i64,
    pub title: Option<String>,
    pub link_type: LinkType,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total_items: u64,
    pub by_type: BTreeMap<String, u64>,
    pub storage_location: String,
}
