use std::rc::Rc;

use derive_more::Display;

use crate::node::{Metadata, NodeError};
use crate::typed::Node;

/// Lifecycle events a node publishes to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventKind {
    #[display("change")]
    Change,
    #[display("transform")]
    Transform,
    #[display("missing")]
    Missing,
    #[display("error")]
    Error,
}

#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A fresh snapshot with a new modification time (or the first snapshot).
    Change(Metadata),
    /// The node changed kind; carries the rebuilt wrapper.
    Transform(Node),
    /// The path no longer exists or could not be watched.
    Missing(Rc<NodeError>),
    Error(Rc<NodeError>),
}

impl NodeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NodeEvent::Change(_) => EventKind::Change,
            NodeEvent::Transform(_) => EventKind::Transform,
            NodeEvent::Missing(_) => EventKind::Missing,
            NodeEvent::Error(_) => EventKind::Error,
        }
    }

    /// Routes a failure to the event it belongs to.
    pub fn from_failure(error: NodeError) -> Self {
        if error.is_not_found() {
            NodeEvent::Missing(Rc::new(error))
        } else {
            NodeEvent::Error(Rc::new(error))
        }
    }
}

pub type Listener = Rc<dyn Fn(&NodeEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(EventKind, ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((kind, id, listener));
        id
    }

    pub(crate) fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(entry_kind, entry_id, _)| !(*entry_kind == kind && *entry_id == id));
        self.entries.len() != before
    }

    /// Copies out the listeners for `kind` in subscription order, so dispatch
    /// can run without holding a borrow on the list.
    pub(crate) fn matching(&self, kind: EventKind) -> Vec<Listener> {
        self.entries
            .iter()
            .filter(|(entry_kind, _, _)| *entry_kind == kind)
            .map(|(_, _, listener)| listener.clone())
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
