use crate::tree::node::NodeId;

/// A node captured by a cut gesture, with where it lived at cut time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutEntry {
    pub node: NodeId,
    pub parent: NodeId,
    pub key: String,
}

/// Single-item cut buffer.
///
/// Cutting marks one row as pending without touching the tree; paste moves
/// it. Cutting another item replaces the previous one.
#[derive(Debug, Clone, Default)]
pub struct CutBuffer {
    entry: Option<CutEntry>,
}

impl CutBuffer {
    pub fn new() -> Self {
        Self { entry: None }
    }

    /// Hold `entry`, returning whatever was cut before.
    pub fn set(&mut self, entry: CutEntry) -> Option<CutEntry> {
        self.entry.replace(entry)
    }

    pub fn clear(&mut self) -> Option<CutEntry> {
        self.entry.take()
    }

    pub fn get(&self) -> Option<&CutEntry> {
        self.entry.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Whether `node` is the cut item.
    pub fn holds(&self, node: NodeId) -> bool {
        self.entry.as_ref().is_some_and(|e| e.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: u64) -> CutEntry {
        CutEntry {
            node: NodeId(node),
            parent: NodeId(0),
            key: format!("n{}", node),
        }
    }

    #[test]
    fn new_buffer_is_empty() {
        let cb = CutBuffer::new();
        assert!(cb.is_empty());
        assert!(cb.get().is_none());
    }

    #[test]
    fn set_replaces_previous() {
        let mut cb = CutBuffer::default();
        assert!(cb.set(entry(1)).is_none());
        let previous = cb.set(entry(2)).unwrap();
        assert_eq!(previous.node, NodeId(1));
        assert!(cb.holds(NodeId(2)));
        assert!(!cb.holds(NodeId(1)));
    }

    #[test]
    fn clear_empties_buffer() {
        let mut cb = CutBuffer::new();
        cb.set(entry(3));
        assert_eq!(cb.clear().map(|e| e.node), Some(NodeId(3)));
        assert!(cb.is_empty());
        assert!(cb.clear().is_none());
    }
}
