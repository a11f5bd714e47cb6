use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::mutation::clipboard::{CutBuffer, CutEntry};
use crate::mutation::pending::{MutationId, MutationKind, PendingMutation, Snapshot};
use crate::remote::{dispatch, RemoteAck, RemoteCall, RemoteStore};
use crate::tree::key;
use crate::tree::node::{Metadata, NodeId};
use crate::tree::store::TreeStore;
use crate::view::row::{project, Row, SearchScope};

/// A started mutation: the caller sends `call` and reports back with `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: MutationId,
    pub kind: MutationKind,
    pub call: RemoteCall,
}

/// Result of settling a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Committed {
        id: MutationId,
        kind: MutationKind,
    },
    RolledBack {
        id: MutationId,
        kind: MutationKind,
        reason: String,
    },
    /// Unknown or already settled id; nothing changed.
    Ignored { id: MutationId },
}

/// Applies gestures optimistically to the tree and reconciles them with the
/// remote once the call settles.
pub struct Coordinator {
    store: TreeStore,
    remote: Arc<dyn RemoteStore>,
    container: String,
    timeout: Duration,
    pending: BTreeMap<MutationId, PendingMutation>,
    cut: CutBuffer,
    next_mutation: u64,
    refresh_deferred: bool,
}

impl Coordinator {
    pub fn new(
        store: TreeStore,
        remote: Arc<dyn RemoteStore>,
        container: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            container: container.into(),
            timeout,
            pending: BTreeMap::new(),
            cut: CutBuffer::new(),
            next_mutation: 1,
            refresh_deferred: false,
        }
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    /// Navigation and search only; structural edits go through gestures.
    pub fn store_mut(&mut self) -> &mut TreeStore {
        &mut self.store
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn cut_buffer(&self) -> &CutBuffer {
        &self.cut
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Nodes whose rows show as pending: in-flight mutations plus the cut item.
    pub fn pending_nodes(&self) -> HashSet<NodeId> {
        let mut nodes: HashSet<NodeId> = self
            .pending
            .values()
            .flat_map(|m| m.nodes.iter().copied())
            .collect();
        if let Some(entry) = self.cut.get() {
            nodes.insert(entry.node);
        }
        nodes
    }

    pub fn rows(&self, scope: SearchScope, now: DateTime<Utc>) -> Vec<Row> {
        project(&self.store, scope, &self.pending_nodes(), now)
    }

    /// Re-fetch the listing and rebuild the tree.
    ///
    /// A rebuild would discard optimistic edits, so while mutations are in
    /// flight the refresh is only recorded and `None` is returned. Once the
    /// last one settles, [`refresh_due`](Self::refresh_due) reports it.
    pub async fn refresh(&mut self) -> Result<Option<usize>> {
        if !self.pending.is_empty() {
            self.refresh_deferred = true;
            info!(in_flight = self.pending.len(), "refresh deferred until mutations settle");
            return Ok(None);
        }
        let listing = match tokio::time::timeout(
            self.timeout,
            self.remote.fetch_listing(&self.container),
        )
        .await
        {
            Ok(listing) => listing?,
            Err(_) => return Err(AppError::Timeout(self.timeout)),
        };
        self.refresh_deferred = false;
        self.store.build_from_listing(&listing);
        info!(container = %self.container, entries = listing.len(), "refreshed listing");
        Ok(Some(listing.len()))
    }

    /// A refresh was deferred and nothing is in flight anymore.
    pub fn refresh_due(&self) -> bool {
        self.refresh_deferred && self.pending.is_empty()
    }

    // ── Guards ───────────────────────────────────────────────────────────────

    fn is_subject(&self, node: NodeId) -> bool {
        self.pending.values().any(|m| m.touches(node))
    }

    /// A node is busy when it or one of its ancestors is the subject of an
    /// in-flight mutation.
    pub fn is_busy(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if self.is_subject(id) {
                return true;
            }
            cursor = self.store.parent_of(id);
        }
        false
    }

    /// Whether `node` holds something an in-flight mutation depends on: a
    /// pending node below it, or the folder a pending move rolls back into.
    fn carries_pending(&self, node: NodeId) -> bool {
        self.pending.values().any(|m| {
            m.nodes.iter().any(|n| self.store.is_ancestor(node, *n))
                || matches!(
                    m.snapshot(),
                    Some(Snapshot::Relocated { parent, .. })
                        if *parent == node || self.store.is_ancestor(node, *parent)
                )
        })
    }

    /// Whether a pending move would return a node to `name` under `parent`.
    fn is_reserved(&self, parent: NodeId, name: &str) -> bool {
        self.pending.values().any(|m| {
            matches!(
                m.snapshot(),
                Some(Snapshot::Relocated { parent: p, name: n, .. }) if *p == parent && n == name
            )
        })
    }

    /// Guard for the node a gesture removes or moves.
    fn ensure_movable(&self, node: NodeId) -> Result<()> {
        if !self.store.contains(node) {
            return Err(AppError::NotFound(node.to_string()));
        }
        if node == self.store.root() {
            return Err(AppError::InvalidGesture("the root cannot be changed".into()));
        }
        if self.is_busy(node) || self.carries_pending(node) {
            return Err(AppError::InvalidGesture(format!(
                "{} has a mutation in flight",
                node
            )));
        }
        Ok(())
    }

    /// Guard for the slot a gesture inserts into.
    fn ensure_insertable(&self, parent: NodeId, name: &str) -> Result<()> {
        if self.is_busy(parent) {
            return Err(AppError::InvalidGesture(format!(
                "{} has a mutation in flight",
                parent
            )));
        }
        if self.is_reserved(parent, name) {
            let parent_key = self.remote_key(parent)?;
            return Err(AppError::Conflict(key::child_key(&parent_key, name, false)));
        }
        Ok(())
    }

    fn remote_key(&self, node: NodeId) -> Result<String> {
        let node = self
            .store
            .get(node)
            .ok_or_else(|| AppError::NotFound(node.to_string()))?;
        Ok(key::strip_prefix(&node.key, self.store.prefix()).to_string())
    }

    fn start(
        &mut self,
        kind: MutationKind,
        nodes: Vec<NodeId>,
        call: RemoteCall,
        snapshot: Snapshot,
    ) -> Ticket {
        let id = MutationId(self.next_mutation);
        self.next_mutation += 1;
        debug!(%id, kind = kind.label(), %call, "mutation pending");
        self.pending.insert(
            id,
            PendingMutation::new(id, kind, nodes, call.clone(), snapshot),
        );
        Ticket { id, kind, call }
    }

    // ── Gestures ─────────────────────────────────────────────────────────────

    /// Insert a folder optimistically and ask the remote to create it.
    pub fn begin_create_folder(&mut self, parent: NodeId, name: &str) -> Result<Ticket> {
        self.ensure_insertable(parent, name)?;
        let parent_key = self.remote_key(parent)?;
        let node = self.store.create_folder_node(parent, name)?;
        let call = RemoteCall::CreateFolder {
            parent_key,
            name: name.to_string(),
        };
        Ok(self.start(
            MutationKind::CreateFolder,
            vec![node],
            call,
            Snapshot::Inserted { node },
        ))
    }

    /// Insert a file optimistically and upload its body.
    pub fn begin_upload(&mut self, parent: NodeId, name: &str, body: Vec<u8>) -> Result<Ticket> {
        self.ensure_insertable(parent, name)?;
        let parent_key = self.remote_key(parent)?;
        let node = self.store.insert_file_node(
            parent,
            name,
            body.len() as u64,
            Some(Utc::now()),
            Metadata::new(),
        )?;
        let call = RemoteCall::Upload {
            parent_key,
            name: name.to_string(),
            body,
        };
        Ok(self.start(
            MutationKind::Upload,
            vec![node],
            call,
            Snapshot::Inserted { node },
        ))
    }

    /// Mark a node pending and ask the remote to delete it. The tree changes
    /// only once the remote confirms.
    pub fn begin_delete(&mut self, node: NodeId) -> Result<Ticket> {
        self.ensure_movable(node)?;
        let (is_folder, full_key) = match self.store.get(node) {
            Some(n) => (n.is_folder(), n.key.clone()),
            None => return Err(AppError::NotFound(node.to_string())),
        };
        if self.cut.holds(node) {
            self.cut.clear();
        }
        let call = RemoteCall::Delete {
            key: self.remote_key(node)?,
            is_folder,
        };
        Ok(self.start(
            MutationKind::Delete,
            vec![node],
            call,
            Snapshot::Deferred {
                node,
                key: full_key,
            },
        ))
    }

    /// Drop `source` onto `target`. Only folder targets distinct from the
    /// source are meaningful; anything else is an invalid gesture.
    pub fn begin_drop(&mut self, source: NodeId, target: NodeId) -> Result<Ticket> {
        if source == target {
            return Err(AppError::InvalidGesture("dropped onto itself".into()));
        }
        match self.store.get(target) {
            Some(t) if t.is_folder() => {}
            _ => {
                return Err(AppError::InvalidGesture(
                    "drop target is not a folder".into(),
                ))
            }
        }
        let name = match self.store.get(source) {
            Some(n) => n.name.clone(),
            None => return Err(AppError::NotFound(source.to_string())),
        };
        if self.cut.holds(source) {
            self.cut.clear();
        }
        self.begin_relocate(source, target, &name, MutationKind::Move)
    }

    /// Rename a node in place.
    pub fn begin_rename(&mut self, node: NodeId, new_name: &str) -> Result<Ticket> {
        let parent = self
            .store
            .parent_of(node)
            .ok_or_else(|| AppError::NotFound(node.to_string()))?;
        self.begin_relocate(node, parent, new_name, MutationKind::Rename)
    }

    fn begin_relocate(
        &mut self,
        node: NodeId,
        dest: NodeId,
        name: &str,
        kind: MutationKind,
    ) -> Result<Ticket> {
        self.ensure_movable(node)?;
        self.ensure_insertable(dest, name)?;

        let (old_parent, old_name) = match (self.store.parent_of(node), self.store.get(node)) {
            (Some(parent), Some(n)) => (parent, n.name.clone()),
            _ => return Err(AppError::NotFound(node.to_string())),
        };
        if old_parent == dest && old_name == name {
            return Err(AppError::InvalidGesture("already in place".into()));
        }

        let source_key = self.remote_key(node)?;
        self.store.relocate(node, dest, name)?;
        let dest_key = self.remote_key(node)?;

        let call = RemoteCall::Move {
            source_key,
            dest_key,
        };
        Ok(self.start(
            kind,
            vec![node],
            call,
            Snapshot::Relocated {
                node,
                parent: old_parent,
                name: old_name,
            },
        ))
    }

    /// Hold `node` for a later paste. The tree is untouched.
    pub fn cut(&mut self, node: NodeId) -> Result<()> {
        self.ensure_movable(node)?;
        let (parent, full_key) = match (self.store.parent_of(node), self.store.get(node)) {
            (Some(parent), Some(n)) => (parent, n.key.clone()),
            _ => return Err(AppError::NotFound(node.to_string())),
        };
        if let Some(previous) = self.cut.set(CutEntry {
            node,
            parent,
            key: full_key,
        }) {
            debug!(node = %previous.node, "replaced cut item");
        }
        Ok(())
    }

    /// Deselecting the cut item cancels the cut. Returns whether it did.
    pub fn deselect(&mut self, node: NodeId) -> bool {
        if self.cut.holds(node) {
            self.cut.clear();
            return true;
        }
        false
    }

    /// Move the cut node into the current node.
    pub fn begin_paste(&mut self) -> Result<Ticket> {
        let entry = match self.cut.get() {
            Some(entry) => entry.clone(),
            None => return Err(AppError::InvalidGesture("nothing to paste".into())),
        };

        let still_there = self.store.parent_of(entry.node) == Some(entry.parent)
            && self
                .store
                .get(entry.node)
                .is_some_and(|n| n.key == entry.key);
        if !still_there {
            self.cut.clear();
            return Err(AppError::NotFound(entry.key));
        }

        let name = match self.store.get(entry.node) {
            Some(n) => n.name.clone(),
            None => return Err(AppError::NotFound(entry.key)),
        };
        let dest = self.store.current_node();
        let ticket = self.begin_relocate(entry.node, dest, &name, MutationKind::Move)?;
        self.cut.clear();
        Ok(ticket)
    }

    // ── Settlement ───────────────────────────────────────────────────────────

    /// Future that performs the remote side of `ticket`. It borrows nothing
    /// from the coordinator, so it can be spawned.
    pub fn remote_work(
        &self,
        ticket: Ticket,
    ) -> impl Future<Output = (MutationId, Result<RemoteAck>)> + Send + 'static {
        let remote = Arc::clone(&self.remote);
        let container = self.container.clone();
        let timeout = self.timeout;
        async move {
            let result = dispatch(remote, container, ticket.call, timeout).await;
            (ticket.id, result)
        }
    }

    /// Run the remote call for `ticket` inline and settle it.
    pub async fn perform(&mut self, ticket: Ticket) -> Settled {
        let (id, result) = self.remote_work(ticket).await;
        self.settle(id, result)
    }

    /// Commit or roll back mutation `id` given the remote outcome.
    pub fn settle(&mut self, id: MutationId, result: Result<RemoteAck>) -> Settled {
        let Some(mut mutation) = self.pending.remove(&id) else {
            debug!(%id, "ignoring settlement of unknown mutation");
            return Settled::Ignored { id };
        };
        let kind = mutation.kind;

        match result {
            Ok(ack) => {
                match (mutation.commit(), ack) {
                    (Some(Snapshot::Deferred { node, key }), _) => {
                        let in_place = self.store.get(node).is_some_and(|n| n.key == key);
                        if in_place {
                            self.store.delete_node(node);
                        } else {
                            debug!(%id, %key, "deferred delete target moved; skipping");
                        }
                    }
                    (Some(Snapshot::Inserted { node }), RemoteAck::Uploaded { key }) => {
                        self.adopt_uploaded_key(node, &key);
                    }
                    _ => {}
                }
                info!(%id, kind = kind.label(), "mutation committed");
                Settled::Committed { id, kind }
            }
            Err(err) => {
                if let Some(snapshot) = mutation.roll_back() {
                    self.restore(snapshot);
                }
                warn!(%id, kind = kind.label(), error = %err, "mutation rolled back");
                Settled::RolledBack {
                    id,
                    kind,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// The remote may store an upload under another key than the one asked
    /// for. Move the node there so later calls address the stored object.
    fn adopt_uploaded_key(&mut self, node: NodeId, stored: &str) {
        match self.store.get(node) {
            Some(n) if key::strip_prefix(&n.key, self.store.prefix()) == stored => return,
            Some(_) => {}
            None => return,
        }
        let (segments, is_folder) = key::split(stored);
        let placed = match segments.split_last() {
            Some((name, dirs)) if !is_folder => self
                .store
                .ensure_folder_path(dirs)
                .and_then(|parent| self.store.relocate(node, parent, name)),
            _ => Err(AppError::InvalidPath(stored.to_string())),
        };
        match placed {
            Ok(()) => debug!(%node, key = %stored, "adopted stored upload key"),
            Err(err) => {
                warn!(%node, key = %stored, error = %err, "stored upload key does not fit the tree");
                self.store.delete_node(node);
            }
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        match snapshot {
            Snapshot::Deferred { .. } => {}
            Snapshot::Inserted { node } => {
                self.store.delete_node(node);
            }
            Snapshot::Relocated { node, parent, name } => {
                if !self.store.contains(node) || !self.store.contains(parent) {
                    warn!(%node, "rollback target vanished");
                    return;
                }
                if let Err(err) = self.store.relocate(node, parent, &name) {
                    warn!(%node, error = %err, "could not restore node");
                }
            }
        }
    }
}
