use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open mapping of backend-supplied attributes (uploader, tags, status, ...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Stable identity of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type of tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_folder(self) -> bool {
        self == NodeKind::Folder
    }
}

/// One entry of a remote flat listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ListingEntry {
    /// Entry with only a key; mostly useful for folder markers.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
            metadata: Metadata::new(),
        }
    }

    /// File entry with a size.
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::new(key)
        }
    }
}

/// A node in the mirrored hierarchy.
///
/// Children are referenced by id. The parent link lives in the store's
/// parent index, never on the node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub key: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub metadata: Metadata,
    pub children: BTreeMap<String, NodeId>,
}

impl TreeNode {
    pub(crate) fn new(id: NodeId, name: String, kind: NodeKind, key: String) -> Self {
        Self {
            id,
            name,
            kind,
            key,
            size: None,
            last_modified: None,
            metadata: Metadata::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_entry_parses_camel_case() {
        let json = r#"{
            "key": "docs/a.txt",
            "size": 42,
            "lastModified": "2024-03-01T12:00:00Z",
            "metadata": { "uploader": "Dana", "tags": ["legal"] }
        }"#;
        let entry: ListingEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.key, "docs/a.txt");
        assert_eq!(entry.size, Some(42));
        assert!(entry.last_modified.is_some());
        assert_eq!(entry.metadata["uploader"], "Dana");
    }

    #[test]
    fn listing_entry_defaults_optional_fields() {
        let entry: ListingEntry = serde_json::from_str(r#"{ "key": "docs/" }"#).unwrap();
        assert_eq!(entry, ListingEntry::new("docs/"));
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
