use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tree::node::{NodeId, NodeKind, TreeNode};
use crate::tree::store::TreeStore;
use crate::view::format::{format_modified, format_size};
use crate::view::sort::listing_cmp;

/// Metadata field holding the uploader's display name.
pub const OWNER_FIELD: &str = "uploader";
/// Metadata field holding the tag list.
pub const TAGS_FIELD: &str = "tags";

/// Where a non-empty search query looks for matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// The whole container, regardless of navigation depth.
    #[default]
    Root,
    /// Only below the current node.
    Current,
}

/// A flattened, display-ready projection of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub key: String,
    pub size: String,
    pub modified: String,
    pub owner: Option<String>,
    pub tags: Vec<String>,
    pub pending: bool,
}

impl Row {
    fn from_node(node: &TreeNode, pending: bool, now: DateTime<Utc>) -> Self {
        let size = match (node.kind, node.size) {
            (NodeKind::File, Some(bytes)) => format_size(bytes),
            _ => "-".to_string(),
        };
        Self {
            id: node.id,
            name: node.name.clone(),
            kind: node.kind,
            key: node.key.clone(),
            size,
            modified: format_modified(node.last_modified, now),
            owner: owner_of(node),
            tags: tags_of(node),
            pending,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

fn owner_of(node: &TreeNode) -> Option<String> {
    node.metadata
        .get(OWNER_FIELD)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn tags_of(node: &TreeNode) -> Vec<String> {
    match node.metadata.get(TAGS_FIELD) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(serde_json::Value::String(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Rows for the store's current view.
///
/// With an empty search query this is the current node's children. With a
/// query it is every node in the search scope whose name contains the query
/// case-insensitively, as a flat list. Both are sorted folders first.
pub fn project(
    store: &TreeStore,
    scope: SearchScope,
    pending: &HashSet<NodeId>,
    now: DateTime<Utc>,
) -> Vec<Row> {
    let query = store.search_query().to_lowercase();

    let mut nodes: Vec<&TreeNode> = if query.is_empty() {
        store.children(store.current_node())
    } else {
        let base = match scope {
            SearchScope::Root => store.root(),
            SearchScope::Current => store.current_node(),
        };
        store
            .walk(base)
            .into_iter()
            .filter(|id| *id != base)
            .filter_map(|id| store.get(id))
            .filter(|node| node.name.to_lowercase().contains(&query))
            .collect()
    };

    nodes.sort_by(|a, b| listing_cmp(a.kind, &a.name, b.kind, &b.name));
    nodes
        .into_iter()
        .map(|node| Row::from_node(node, pending.contains(&node.id), now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::ListingEntry;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn folders_first_case_insensitive() {
        let listing = vec![
            ListingEntry::file("b.txt", 1),
            ListingEntry::new("A_folder/"),
            ListingEntry::file("a.txt", 1),
            ListingEntry::new("B_folder/"),
        ];
        let store = TreeStore::from_listing("", &listing);
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(names(&rows), vec!["A_folder", "B_folder", "a.txt", "b.txt"]);
    }

    #[test]
    fn rows_follow_current_node() {
        let listing = vec![
            ListingEntry::file("docs/inner.txt", 1),
            ListingEntry::file("top.txt", 1),
        ];
        let mut store = TreeStore::from_listing("", &listing);
        store.navigate_to_path(&["docs"]).unwrap();
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(names(&rows), vec!["inner.txt"]);
    }

    #[test]
    fn search_ignores_navigation_depth() {
        let listing = vec![
            ListingEntry::file("a/b/report.pdf", 1),
            ListingEntry::file("readme.txt", 1),
        ];
        let mut store = TreeStore::from_listing("", &listing);
        store.navigate_to_path(&["a", "b"]).unwrap();
        store.set_search_query("rep");
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(names(&rows), vec!["report.pdf"]);

        store.go_back();
        store.go_back();
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(names(&rows), vec!["report.pdf"]);
    }

    #[test]
    fn search_is_case_insensitive_and_flat() {
        let listing = vec![
            ListingEntry::file("Reports/q1.pdf", 1),
            ListingEntry::file("x/REPORT.md", 1),
            ListingEntry::file("other.txt", 1),
        ];
        let mut store = TreeStore::from_listing("", &listing);
        store.set_search_query("RePoRt");
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(names(&rows), vec!["Reports", "REPORT.md"]);
    }

    #[test]
    fn search_scoped_to_current() {
        let listing = vec![
            ListingEntry::file("a/report.pdf", 1),
            ListingEntry::file("b/report.pdf", 1),
        ];
        let mut store = TreeStore::from_listing("", &listing);
        store.navigate_to_path(&["b"]).unwrap();
        store.set_search_query("report");
        let rows = project(&store, SearchScope::Current, &HashSet::new(), now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "b/report.pdf");
    }

    #[test]
    fn row_fields_are_formatted() {
        let mut entry = ListingEntry::file("deck.pptx", 1536);
        entry.last_modified = Some(now() - Duration::days(3));
        entry.metadata.insert(OWNER_FIELD.into(), json!("Dana Ruiz"));
        entry.metadata.insert(TAGS_FIELD.into(), json!(["board", "draft"]));
        let store = TreeStore::from_listing("", &[entry, ListingEntry::new("folder/")]);

        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        let folder = &rows[0];
        assert_eq!(folder.size, "-");
        assert_eq!(folder.modified, "-");

        let deck = &rows[1];
        assert_eq!(deck.size, "1.50 KB");
        assert_eq!(deck.modified, "3 days ago");
        assert_eq!(deck.owner.as_deref(), Some("Dana Ruiz"));
        assert_eq!(deck.tags, vec!["board", "draft"]);
        assert!(!deck.pending);
    }

    #[test]
    fn comma_separated_tags() {
        let mut entry = ListingEntry::file("a.txt", 1);
        entry.metadata.insert(TAGS_FIELD.into(), json!("legal, nda ,"));
        let store = TreeStore::from_listing("", &[entry]);
        let rows = project(&store, SearchScope::Root, &HashSet::new(), now());
        assert_eq!(rows[0].tags, vec!["legal", "nda"]);
    }

    #[test]
    fn pending_flag_comes_from_set() {
        let store = TreeStore::from_listing("", &[ListingEntry::file("a.txt", 1)]);
        let id = store.resolve_path("a.txt").unwrap();
        let pending: HashSet<NodeId> = [id].into_iter().collect();
        let rows = project(&store, SearchScope::Root, &pending, now());
        assert!(rows[0].pending);
    }
}
