use std::fmt;

use crate::remote::RemoteCall;
use crate::tree::node::NodeId;

/// Identity of one in-flight mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub(crate) u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    CreateFolder,
    Upload,
    Delete,
    Move,
    Rename,
}

impl MutationKind {
    pub fn label(self) -> &'static str {
        match self {
            MutationKind::CreateFolder => "create folder",
            MutationKind::Upload => "upload",
            MutationKind::Delete => "delete",
            MutationKind::Move => "move",
            MutationKind::Rename => "rename",
        }
    }
}

/// What the optimistic edit changed, and so what undoing it takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Nothing was applied up front; the edit happens on commit, and only if
    /// the node still sits at `key`.
    Deferred { node: NodeId, key: String },
    /// A node was inserted; undo removes it.
    Inserted { node: NodeId },
    /// A node was re-parented or renamed; undo puts it back.
    Relocated {
        node: NodeId,
        parent: NodeId,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Committed,
    RolledBack,
}

/// One optimistic mutation between gesture and remote acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub nodes: Vec<NodeId>,
    pub call: RemoteCall,
    snapshot: Option<Snapshot>,
    state: MutationState,
}

impl PendingMutation {
    pub(crate) fn new(
        id: MutationId,
        kind: MutationKind,
        nodes: Vec<NodeId>,
        call: RemoteCall,
        snapshot: Snapshot,
    ) -> Self {
        Self {
            id,
            kind,
            nodes,
            call,
            snapshot: Some(snapshot),
            state: MutationState::Pending,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// `Pending -> Committed`; the snapshot is dropped. Returns it so a
    /// deferred edit can still be applied.
    pub fn commit(&mut self) -> Option<Snapshot> {
        if self.state != MutationState::Pending {
            return None;
        }
        self.state = MutationState::Committed;
        self.snapshot.take()
    }

    /// `Pending -> RolledBack`; hands out the snapshot to restore from.
    pub fn roll_back(&mut self) -> Option<Snapshot> {
        if self.state != MutationState::Pending {
            return None;
        }
        self.state = MutationState::RolledBack;
        self.snapshot.take()
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation() -> PendingMutation {
        PendingMutation::new(
            MutationId(1),
            MutationKind::Move,
            vec![NodeId(4)],
            RemoteCall::Move {
                source_key: "a/x".into(),
                dest_key: "b/x".into(),
            },
            Snapshot::Relocated {
                node: NodeId(4),
                parent: NodeId(2),
                name: "x".into(),
            },
        )
    }

    #[test]
    fn starts_pending_with_snapshot() {
        let m = mutation();
        assert_eq!(m.state(), MutationState::Pending);
        assert!(m.snapshot().is_some());
        assert!(m.touches(NodeId(4)));
    }

    #[test]
    fn commit_discards_snapshot_once() {
        let mut m = mutation();
        assert!(m.commit().is_some());
        assert_eq!(m.state(), MutationState::Committed);
        assert!(m.snapshot().is_none());
        assert!(m.commit().is_none());
        assert!(m.roll_back().is_none());
        assert_eq!(m.state(), MutationState::Committed);
    }

    #[test]
    fn roll_back_hands_out_snapshot() {
        let mut m = mutation();
        let snapshot = m.roll_back().unwrap();
        assert!(matches!(snapshot, Snapshot::Relocated { parent: NodeId(2), .. }));
        assert_eq!(m.state(), MutationState::RolledBack);
        assert!(m.commit().is_none());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(MutationKind::CreateFolder.label(), "create folder");
        assert_eq!(MutationKind::Rename.label(), "rename");
    }
}
