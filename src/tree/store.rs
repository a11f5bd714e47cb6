use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::tree::key;
use crate::tree::node::{ListingEntry, Metadata, NodeId, NodeKind, TreeNode};

/// In-memory mirror of a remote container.
///
/// Nodes live in a flat table keyed by id. `children` on each node is the
/// ownership edge; the `parents` index is the navigation edge back up.
#[derive(Debug, Clone)]
pub struct TreeStore {
    nodes: HashMap<NodeId, TreeNode>,
    parents: HashMap<NodeId, NodeId>,
    root: NodeId,
    current: NodeId,
    search_query: String,
    prefix: String,
    next_id: u64,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new("")
    }
}

impl TreeStore {
    /// Create an empty store whose root sits at `prefix` in the bucket.
    pub fn new(prefix: &str) -> Self {
        let prefix = key::normalize_prefix(prefix);
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            TreeNode::new(root, String::new(), NodeKind::Folder, prefix.clone()),
        );
        Self {
            nodes,
            parents: HashMap::new(),
            root,
            current: root,
            search_query: String::new(),
            prefix,
            next_id: 1,
        }
    }

    /// Create a store and materialize `entries` into it.
    pub fn from_listing(prefix: &str, entries: &[ListingEntry]) -> Self {
        let mut store = Self::new(prefix);
        store.build_from_listing(entries);
        store
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Bucket/identity prefix of the root key (empty or `/`-terminated).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Child of `parent` named `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.get(&parent)?.children.get(name).copied()
    }

    /// Immediate children of `id`, in name order.
    pub fn children(&self, id: NodeId) -> Vec<&TreeNode> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.children
                    .values()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of parent hops from `id` to the root.
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        let mut depth = 0;
        let mut cursor = id;
        while let Some(parent) = self.parent_of(cursor) {
            depth += 1;
            cursor = parent;
        }
        Some(depth)
    }

    /// Names from the root (exclusive) down to `id` (inclusive).
    pub fn path_segments(&self, id: NodeId) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut cursor = id;
        while let Some(parent) = self.parent_of(cursor) {
            if let Some(node) = self.nodes.get(&cursor) {
                segments.push(node.name.as_str());
            }
            cursor = parent;
        }
        segments.reverse();
        segments
    }

    /// Resolve a segment list from the root.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Option<NodeId> {
        segments
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| !s.is_empty())
            .try_fold(self.root, |node, segment| self.child(node, segment))
    }

    /// Resolve a `/`-separated path relative to the root.
    pub fn resolve_path(&self, path: &str) -> Option<NodeId> {
        let (segments, _) = key::split(path);
        self.resolve(&segments)
    }

    /// Find a node by its full key (prefix included or not).
    pub fn find_by_key(&self, full_key: &str) -> Option<NodeId> {
        let relative = key::strip_prefix(full_key, &self.prefix);
        let (segments, is_folder) = key::split(relative);
        let id = self.resolve(&segments)?;
        let node = self.nodes.get(&id)?;
        if segments.is_empty() || node.is_folder() == is_folder {
            Some(id)
        } else {
            None
        }
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = id;
        while let Some(parent) = self.parent_of(cursor) {
            if parent == ancestor {
                return true;
            }
            cursor = parent;
        }
        false
    }

    /// Preorder ids of the subtree rooted at `id`, children in name order.
    pub fn walk(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.values().rev().copied());
        }
        out
    }

    // ── Bulk materialization ─────────────────────────────────────────────────

    /// Rebuild the tree from a flat remote listing.
    ///
    /// Missing intermediate folders are synthesized. Ids of keys that survive
    /// the rebuild are reused, and the cursor stays on its key when it can.
    pub fn build_from_listing(&mut self, entries: &[ListingEntry]) {
        let previous: HashMap<String, NodeId> = self
            .nodes
            .values()
            .map(|node| (node.key.clone(), node.id))
            .collect();
        let current_key = match self.current() {
            Some(node) => node.key.clone(),
            None => self.prefix.clone(),
        };

        self.nodes.clear();
        self.parents.clear();
        self.nodes.insert(
            self.root,
            TreeNode::new(self.root, String::new(), NodeKind::Folder, self.prefix.clone()),
        );

        for entry in entries {
            let relative = key::strip_prefix(&entry.key, &self.prefix);
            let (segments, is_folder) = key::split(relative);
            if segments.is_empty() {
                continue;
            }
            if let Some(bad) = segments.iter().find(|s| !key::is_valid_name(s)) {
                warn!(key = %entry.key, segment = %bad, "skipping listing entry with invalid segment");
                continue;
            }

            let mut parent = self.root;
            let last = segments.len() - 1;
            for (i, segment) in segments.iter().enumerate() {
                let kind = if i == last && !is_folder {
                    NodeKind::File
                } else {
                    NodeKind::Folder
                };
                parent = self.ensure_child(parent, segment, kind, &previous);
            }

            let wanted = if is_folder {
                NodeKind::Folder
            } else {
                NodeKind::File
            };
            if let Some(node) = self.nodes.get_mut(&parent) {
                if node.kind == wanted {
                    if wanted == NodeKind::File {
                        node.size = entry.size;
                    }
                    node.last_modified = entry.last_modified;
                    node.metadata = entry.metadata.clone();
                }
            }
        }

        self.current = self.find_by_key(&current_key).unwrap_or(self.root);
        debug!(nodes = self.nodes.len(), "built tree from listing");
    }

    /// Find or create the child `name` of `parent`. A folder request upgrades
    /// an existing file of the same name; a file request never downgrades a folder.
    fn ensure_child(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        previous: &HashMap<String, NodeId>,
    ) -> NodeId {
        if let Some(existing) = self.child(parent, name) {
            if kind.is_folder() {
                if let Some(node) = self.nodes.get_mut(&existing) {
                    if !node.is_folder() {
                        node.kind = NodeKind::Folder;
                        node.size = None;
                        node.key.push(key::SEPARATOR);
                    }
                }
            }
            return existing;
        }

        let parent_key = self.key_of(parent);
        let child_key = key::child_key(&parent_key, name, kind.is_folder());
        let id = match previous.get(&child_key) {
            Some(id) if !self.nodes.contains_key(id) => *id,
            _ => self.alloc_id(),
        };
        self.attach(parent, TreeNode::new(id, name.to_string(), kind, child_key));
        id
    }

    fn key_of(&self, id: NodeId) -> String {
        self.nodes
            .get(&id)
            .map(|node| node.key.clone())
            .unwrap_or_default()
    }

    fn attach(&mut self, parent: NodeId, node: TreeNode) {
        let id = node.id;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(node.name.clone(), id);
        }
        self.parents.insert(id, parent);
        self.nodes.insert(id, node);
    }

    // ── Navigation ───────────────────────────────────────────────────────────

    pub fn current_node(&self) -> NodeId {
        self.current
    }

    /// The node under the cursor. `None` only if the cursor points at a
    /// node that is gone, which deletes and rebuilds never leave behind.
    pub fn current(&self) -> Option<&TreeNode> {
        self.nodes.get(&self.current)
    }

    /// Move the cursor to the folder at `segments`. On failure the cursor stays put.
    pub fn navigate_to_path<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<NodeId> {
        let target = self.resolve(segments).ok_or_else(|| {
            let path: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();
            AppError::NotFound(path.join("/"))
        })?;
        self.enter(target)
    }

    /// Descend into the folder child `name` of the current node.
    pub fn change_current_node(&mut self, name: &str) -> Result<NodeId> {
        let target = self
            .child(self.current, name)
            .ok_or_else(|| AppError::NotFound(name.to_string()))?;
        self.enter(target)
    }

    /// Put the cursor on an arbitrary folder.
    pub fn enter(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self
            .nodes
            .get(&id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        if !node.is_folder() {
            return Err(AppError::InvalidPath(format!("{} is not a folder", node.key)));
        }
        self.current = id;
        Ok(id)
    }

    /// Ascend to the parent of the current node; no-op at the root.
    pub fn go_back(&mut self) -> NodeId {
        if let Some(parent) = self.parent_of(self.current) {
            self.current = parent;
        }
        self.current
    }

    // ── Search ───────────────────────────────────────────────────────────────

    pub fn set_search_query(&mut self, text: &str) {
        self.search_query = text.trim().to_string();
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    fn check_insert(&self, parent: NodeId, name: &str) -> Result<()> {
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or_else(|| AppError::NotFound(parent.to_string()))?;
        if !parent_node.is_folder() {
            return Err(AppError::InvalidPath(format!(
                "{} is not a folder",
                parent_node.key
            )));
        }
        if !key::is_valid_name(name) {
            return Err(AppError::InvalidPath(name.to_string()));
        }
        if parent_node.children.contains_key(name) {
            return Err(AppError::Conflict(key::child_key(
                &parent_node.key,
                name,
                false,
            )));
        }
        Ok(())
    }

    /// Insert an empty folder under `parent`.
    pub fn create_folder_node(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.check_insert(parent, name)?;
        let id = self.alloc_id();
        let key = key::child_key(&self.key_of(parent), name, true);
        self.attach(
            parent,
            TreeNode::new(id, name.to_string(), NodeKind::Folder, key),
        );
        Ok(id)
    }

    /// Resolve the folder at `segments` from the root, creating any folder
    /// that is missing. A file in the way is an error.
    pub fn ensure_folder_path<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<NodeId> {
        let mut parent = self.root;
        for segment in segments {
            let name = segment.as_ref();
            parent = match self.child(parent, name) {
                Some(existing) if self.nodes.get(&existing).is_some_and(|n| n.is_folder()) => {
                    existing
                }
                Some(existing) => {
                    return Err(AppError::InvalidPath(format!(
                        "{} is not a folder",
                        self.key_of(existing)
                    )))
                }
                None => self.create_folder_node(parent, name)?,
            };
        }
        Ok(parent)
    }

    /// Insert a file node under `parent` (used for uploads).
    pub fn insert_file_node(
        &mut self,
        parent: NodeId,
        name: &str,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
        metadata: Metadata,
    ) -> Result<NodeId> {
        self.check_insert(parent, name)?;
        let id = self.alloc_id();
        let key = key::child_key(&self.key_of(parent), name, false);
        let mut node = TreeNode::new(id, name.to_string(), NodeKind::File, key);
        node.size = Some(size);
        node.last_modified = last_modified;
        node.metadata = metadata;
        self.attach(parent, node);
        Ok(id)
    }

    /// Remove a node and its whole subtree.
    ///
    /// Returns the removed nodes in preorder, or `None` when the node is
    /// already gone (or is the root).
    pub fn delete_node(&mut self, id: NodeId) -> Option<Vec<TreeNode>> {
        let parent = self.parent_of(id)?;
        let subtree = self.walk(id);

        let name = self.nodes.get(&id)?.name.clone();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.remove(&name);
        }

        if subtree.contains(&self.current) {
            self.current = parent;
        }

        let removed = subtree
            .into_iter()
            .filter_map(|node_id| {
                self.parents.remove(&node_id);
                self.nodes.remove(&node_id)
            })
            .collect();
        Some(removed)
    }

    /// Re-parent `id` under the folder `dest`, rewriting keys of the whole subtree.
    pub fn move_node(&mut self, id: NodeId, dest: NodeId) -> Result<()> {
        let name = self
            .nodes
            .get(&id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?
            .name
            .clone();
        self.relocate(id, dest, &name)
    }

    /// Rename `id` in place, rewriting keys of the whole subtree.
    pub fn rename_node(&mut self, id: NodeId, new_name: &str) -> Result<()> {
        let parent = self
            .parent_of(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        self.relocate(id, parent, new_name)
    }

    /// Detach `id` and reattach it under `new_parent` as `new_name`.
    pub(crate) fn relocate(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> Result<()> {
        let old_parent = self
            .parent_of(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        let dest = self
            .nodes
            .get(&new_parent)
            .ok_or_else(|| AppError::NotFound(new_parent.to_string()))?;
        if !dest.is_folder() {
            return Err(AppError::InvalidGesture(format!(
                "{} is not a folder",
                dest.key
            )));
        }
        if id == new_parent || self.is_ancestor(id, new_parent) {
            return Err(AppError::InvalidGesture(
                "a folder cannot be moved into itself".into(),
            ));
        }
        if !key::is_valid_name(new_name) {
            return Err(AppError::InvalidPath(new_name.to_string()));
        }
        if let Some(existing) = dest.children.get(new_name) {
            if *existing != id {
                return Err(AppError::Conflict(key::child_key(&dest.key, new_name, false)));
            }
            return Ok(());
        }

        let old_name = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::replace(&mut node.name, new_name.to_string()),
            None => return Err(AppError::NotFound(id.to_string())),
        };
        if let Some(parent_node) = self.nodes.get_mut(&old_parent) {
            parent_node.children.remove(&old_name);
        }
        if let Some(parent_node) = self.nodes.get_mut(&new_parent) {
            parent_node.children.insert(new_name.to_string(), id);
        }
        self.parents.insert(id, new_parent);
        self.rewrite_keys(id);
        Ok(())
    }

    fn rewrite_keys(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let parent_key = match self.parent_of(current) {
                Some(parent) => self.key_of(parent),
                None => continue,
            };
            if let Some(node) = self.nodes.get_mut(&current) {
                node.key = key::child_key(&parent_key, &node.name, node.is_folder());
                stack.extend(node.children.values().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Vec<ListingEntry> {
        vec![
            ListingEntry::new("finance/"),
            ListingEntry::file("finance/q1/report.pdf", 2048),
            ListingEntry::file("finance/q1/notes.txt", 10),
            ListingEntry::file("legal/nda.docx", 512),
            ListingEntry::file("readme.txt", 5),
            ListingEntry::new("empty/"),
        ]
    }

    fn shape(store: &TreeStore) -> Vec<(String, NodeKind, Vec<String>)> {
        let mut out: Vec<_> = store
            .walk(store.root())
            .into_iter()
            .filter_map(|id| store.get(id))
            .map(|n| (n.key.clone(), n.kind, n.children.keys().cloned().collect()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn assert_keys_derived(store: &TreeStore) {
        for id in store.walk(store.root()) {
            let node = store.get(id).unwrap();
            if id == store.root() {
                assert_eq!(node.key, store.prefix());
                continue;
            }
            let mut expected = store.prefix().to_string();
            expected.push_str(&store.path_segments(id).join("/"));
            if node.is_folder() {
                expected.push('/');
            }
            assert_eq!(node.key, expected);
            let parent = store.parent_of(id).unwrap();
            assert_eq!(store.get(parent).unwrap().children[&node.name], id);
            assert_eq!(store.depth(id).unwrap(), store.path_segments(id).len());
        }
    }

    #[test]
    fn build_synthesizes_missing_folders() {
        let store = TreeStore::from_listing("", &sample_listing());
        let q1 = store.resolve_path("finance/q1").unwrap();
        assert!(store.get(q1).unwrap().is_folder());
        assert_eq!(store.get(q1).unwrap().key, "finance/q1/");
        let legal = store.resolve_path("legal").unwrap();
        assert_eq!(store.get(legal).unwrap().kind, NodeKind::Folder);
        let report = store.resolve_path("finance/q1/report.pdf").unwrap();
        assert_eq!(store.get(report).unwrap().size, Some(2048));
    }

    #[test]
    fn build_is_deterministic() {
        let a = TreeStore::from_listing("", &sample_listing());
        let b = TreeStore::from_listing("", &sample_listing());
        assert_eq!(shape(&a), shape(&b));
    }

    #[test]
    fn rebuild_with_same_listing_keeps_ids_and_cursor() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let before = shape(&store);
        let report = store.resolve_path("finance/q1/report.pdf").unwrap();
        store.navigate_to_path(&["finance", "q1"]).unwrap();
        let cursor = store.current_node();

        store.build_from_listing(&sample_listing());

        assert_eq!(shape(&store), before);
        assert_eq!(store.resolve_path("finance/q1/report.pdf"), Some(report));
        assert_eq!(store.current_node(), cursor);
    }

    #[test]
    fn rebuild_resets_cursor_when_folder_disappears() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        store.navigate_to_path(&["legal"]).unwrap();
        store.build_from_listing(&[ListingEntry::file("readme.txt", 5)]);
        assert_eq!(store.current_node(), store.root());
    }

    #[test]
    fn keys_are_derived_from_ancestors() {
        let store = TreeStore::from_listing("", &sample_listing());
        assert_keys_derived(&store);
    }

    #[test]
    fn prefix_is_stripped_from_listing_and_kept_in_keys() {
        let listing = vec![
            ListingEntry::file("tenant-9/docs/a.txt", 1),
            ListingEntry::new("tenant-9/"),
        ];
        let store = TreeStore::from_listing("tenant-9", &listing);
        let a = store.resolve_path("docs/a.txt").unwrap();
        assert_eq!(store.get(a).unwrap().key, "tenant-9/docs/a.txt");
        assert_eq!(store.len(), 3);
        assert_keys_derived(&store);
    }

    #[test]
    fn folder_wins_over_file_of_same_name() {
        let listing = vec![
            ListingEntry::file("shared", 3),
            ListingEntry::file("shared/inner.txt", 1),
        ];
        let store = TreeStore::from_listing("", &listing);
        let shared = store.resolve_path("shared").unwrap();
        let node = store.get(shared).unwrap();
        assert!(node.is_folder());
        assert_eq!(node.key, "shared/");
        assert_eq!(node.size, None);
        assert_keys_derived(&store);
    }

    #[test]
    fn listing_with_dot_dot_segment_is_skipped() {
        let listing = vec![
            ListingEntry::file("../escape.txt", 1),
            ListingEntry::file("ok.txt", 1),
        ];
        let store = TreeStore::from_listing("", &listing);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn navigate_to_missing_path_keeps_cursor() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        store.navigate_to_path(&["finance"]).unwrap();
        let before = store.current_node();
        let err = store.navigate_to_path(&["finance", "q9"]).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.current_node(), before);
    }

    #[test]
    fn change_current_node_rejects_files() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let err = store.change_current_node("readme.txt").unwrap_err();
        assert!(matches!(err, AppError::InvalidPath(_)));
        assert_eq!(store.current_node(), store.root());
        store.change_current_node("finance").unwrap();
        assert_eq!(store.current().unwrap().name, "finance");
    }

    #[test]
    fn go_back_stops_at_root() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        store.navigate_to_path(&["finance", "q1"]).unwrap();
        store.go_back();
        assert_eq!(store.current().unwrap().name, "finance");
        store.go_back();
        assert_eq!(store.current_node(), store.root());
        store.go_back();
        assert_eq!(store.current_node(), store.root());
    }

    #[test]
    fn create_folder_node_inserts_and_rejects_duplicates() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let finance = store.resolve_path("finance").unwrap();
        let id = store.create_folder_node(finance, "q2").unwrap();
        assert_eq!(store.get(id).unwrap().key, "finance/q2/");
        let err = store.create_folder_node(finance, "q2").unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = store.create_folder_node(finance, "a/b").unwrap_err();
        assert!(matches!(err, AppError::InvalidPath(_)));
    }

    #[test]
    fn delete_removes_subtree() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let before = store.len();
        let finance = store.resolve_path("finance").unwrap();
        let removed = store.delete_node(finance).unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(store.len(), before - 4);
        assert!(store.resolve_path("finance/q1/report.pdf").is_none());
        assert!(store.resolve_path("legal/nda.docx").is_some());
    }

    #[test]
    fn delete_twice_is_noop() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let readme = store.resolve_path("readme.txt").unwrap();
        assert!(store.delete_node(readme).is_some());
        let snapshot = shape(&store);
        assert!(store.delete_node(readme).is_none());
        assert_eq!(shape(&store), snapshot);
    }

    #[test]
    fn delete_moves_cursor_out_of_removed_subtree() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        store.navigate_to_path(&["finance", "q1"]).unwrap();
        let finance = store.resolve_path("finance").unwrap();
        store.delete_node(finance);
        assert_eq!(store.current_node(), store.root());
    }

    #[test]
    fn delete_root_is_refused() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        assert!(store.delete_node(store.root()).is_none());
        assert!(store.resolve_path("readme.txt").is_some());
    }

    #[test]
    fn cursor_always_names_a_live_node() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        assert!(store.current().is_some());
        store.navigate_to_path(&["finance", "q1"]).unwrap();
        let finance = store.resolve_path("finance").unwrap();
        store.delete_node(finance);
        assert_eq!(store.current().unwrap().id, store.root());

        store.navigate_to_path(&["legal"]).unwrap();
        store.build_from_listing(&[ListingEntry::file("other.txt", 1)]);
        assert_eq!(store.current().unwrap().id, store.root());
        assert!(store.delete_node(store.root()).is_none());
        assert!(store.current().is_some());
    }

    #[test]
    fn ensure_folder_path_creates_missing_folders() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let finance = store.resolve_path("finance").unwrap();
        assert_eq!(store.ensure_folder_path(&["finance"]).unwrap(), finance);

        let before = store.len();
        let inbox = store.ensure_folder_path(&["finance", "inbox", "2024"]).unwrap();
        assert_eq!(store.len(), before + 2);
        assert_eq!(store.get(inbox).unwrap().key, "finance/inbox/2024/");
        assert_eq!(store.ensure_folder_path::<&str>(&[]).unwrap(), store.root());

        let err = store.ensure_folder_path(&["readme.txt", "x"]).unwrap_err();
        assert!(matches!(err, AppError::InvalidPath(_)));
        assert_keys_derived(&store);
    }

    #[test]
    fn move_folder_preserves_subtree_and_rewrites_keys() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let finance = store.resolve_path("finance").unwrap();
        let legal = store.resolve_path("legal").unwrap();

        let relative_before: Vec<(NodeId, String, NodeKind)> = store
            .walk(finance)
            .into_iter()
            .map(|id| {
                let n = store.get(id).unwrap();
                (id, n.key.clone(), n.kind)
            })
            .collect();

        store.move_node(finance, legal).unwrap();

        for (id, old_key, kind) in relative_before {
            let node = store.get(id).unwrap();
            assert_eq!(node.kind, kind);
            assert_eq!(node.key, format!("legal/{}", old_key));
        }
        assert!(store.resolve_path("finance").is_none());
        assert!(store.resolve_path("legal/finance/q1/notes.txt").is_some());
        assert_keys_derived(&store);
    }

    #[test]
    fn move_into_own_descendant_is_rejected() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let finance = store.resolve_path("finance").unwrap();
        let q1 = store.resolve_path("finance/q1").unwrap();
        let err = store.move_node(finance, q1).unwrap_err();
        assert!(matches!(err, AppError::InvalidGesture(_)));
        let err = store.move_node(finance, finance).unwrap_err();
        assert!(matches!(err, AppError::InvalidGesture(_)));
    }

    #[test]
    fn move_onto_file_is_rejected() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let legal = store.resolve_path("legal").unwrap();
        let readme = store.resolve_path("readme.txt").unwrap();
        assert!(matches!(
            store.move_node(legal, readme),
            Err(AppError::InvalidGesture(_))
        ));
    }

    #[test]
    fn move_with_name_collision_is_conflict() {
        let listing = vec![
            ListingEntry::file("a/x.txt", 1),
            ListingEntry::file("b/x.txt", 2),
        ];
        let mut store = TreeStore::from_listing("", &listing);
        let ax = store.resolve_path("a/x.txt").unwrap();
        let b = store.resolve_path("b").unwrap();
        assert!(matches!(store.move_node(ax, b), Err(AppError::Conflict(_))));
        assert_eq!(store.get(ax).unwrap().key, "a/x.txt");
    }

    #[test]
    fn rename_rewrites_descendants() {
        let mut store = TreeStore::from_listing("", &sample_listing());
        let q1 = store.resolve_path("finance/q1").unwrap();
        store.rename_node(q1, "Q1-2024").unwrap();
        let report = store.resolve_path("finance/Q1-2024/report.pdf").unwrap();
        assert_eq!(store.get(report).unwrap().key, "finance/Q1-2024/report.pdf");
        assert_keys_derived(&store);
    }

    #[test]
    fn find_by_key_distinguishes_folder_marker() {
        let store = TreeStore::from_listing("", &sample_listing());
        assert!(store.find_by_key("finance/").is_some());
        assert!(store.find_by_key("finance").is_none());
        assert!(store.find_by_key("readme.txt").is_some());
        assert_eq!(store.find_by_key(""), Some(store.root()));
    }

    #[test]
    fn search_query_is_trimmed() {
        let mut store = TreeStore::default();
        store.set_search_query("  rep ");
        assert_eq!(store.search_query(), "rep");
    }
}
