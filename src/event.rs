use crossterm::event::KeyEvent;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::mutation::MutationId;
use crate::remote::RemoteAck;
use crate::tree::node::NodeId;

/// A user intent, already resolved against the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    /// Descend into a folder row.
    Open(NodeId),
    /// Go up one level.
    Back,
    SelectNext,
    SelectPrevious,
    Search(String),
    Cut(NodeId),
    Paste,
    /// Deselect a row; cancels the cut when it is the cut item.
    Deselect(NodeId),
    Drop {
        source: NodeId,
        target: NodeId,
    },
    CreateFolder {
        parent: NodeId,
        name: String,
    },
    Upload {
        parent: NodeId,
        name: String,
        body: Vec<u8>,
    },
    Delete(NodeId),
    Rename {
        node: NodeId,
        name: String,
    },
    Refresh,
    Quit,
}

/// Session events.
#[derive(Debug)]
pub enum Event {
    /// A key press from the terminal.
    Key(KeyEvent),
    /// A line typed into the shell.
    Line(String),
    Gesture(Gesture),
    /// A remote call finished.
    Settled {
        id: MutationId,
        result: Result<RemoteAck>,
    },
}

/// Event queue shared between the session and the tasks it spawns.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    tx: mpsc::UnboundedSender<Event>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { rx, tx }
    }

    /// Sender clone for remote tasks and input readers.
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    /// Next event; `None` never happens while `self` holds a sender.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
