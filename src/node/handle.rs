use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use compio::runtime::spawn;
use tracing::{debug, error, info, warn};

use crate::ext::{BestEffortPathExt, PathParts, resolve_path};
use crate::node::events::Listeners;
use crate::node::supervisor::Supervisor;
use crate::node::{
    EventKind, Kind, ListenerId, Metadata, NodeConfig, NodeDescriptor, NodeError, NodeEvent,
};
use crate::primitives::fs;
use crate::typed::Node;

pub(crate) struct NodeInner {
    path: PathBuf,
    parts: PathParts,
    kind: Cell<Kind>,
    snapshot: RefCell<Option<Metadata>>,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<BTreeMap<PathBuf, Node>>,
    listing: RefCell<Option<Vec<String>>>,
    listeners: RefCell<Listeners>,
    supervisor: RefCell<Supervisor>,
    config: NodeConfig,
}

/// Live handle on one filesystem path.
///
/// Cloning is cheap and every clone refers to the same node. The handle caches
/// the last stat result, tracks the node's kind, publishes lifecycle events and
/// owns the node's watch (see [`NodeHandle::start_watch`]).
#[derive(Clone)]
pub struct NodeHandle {
    inner: Rc<NodeInner>,
}

impl NodeHandle {
    pub(crate) fn new(descriptor: &NodeDescriptor, kind: Kind) -> Self {
        let path = resolve_path(descriptor.path());
        let parts = PathParts::of(&path);

        Self {
            inner: Rc::new(NodeInner {
                path,
                parts,
                kind: Cell::new(kind),
                snapshot: RefCell::new(descriptor.initial_snapshot.clone()),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(BTreeMap::new()),
                listing: RefCell::new(None),
                listeners: RefCell::new(Listeners::default()),
                supervisor: RefCell::new(Supervisor::default()),
                config: descriptor.config.clone(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<NodeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn supervisor(&self) -> &RefCell<Supervisor> {
        &self.inner.supervisor
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Rc::downgrade(&self.inner)
    }

    /// Absolute, normalized path of the node.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn name(&self) -> &str {
        &self.inner.parts.name
    }

    pub fn base_name(&self) -> &str {
        &self.inner.parts.base_name
    }

    pub fn extension(&self) -> &str {
        &self.inner.parts.extension
    }

    pub fn kind(&self) -> Kind {
        self.inner.kind.get()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn cached_snapshot(&self) -> Option<Metadata> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.inner.parent.borrow().upgrade().map(NodeHandle::from_inner)
    }

    /// The wrapper matching the node's current kind.
    pub fn typed(&self) -> Node {
        Node::from_handle(self.clone())
    }

    pub fn ptr_eq(&self, other: &NodeHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the cached snapshot unless `force` is set or nothing is cached,
    /// in which case the path is stat'ed and the result reconciled.
    pub async fn stat(&self, force: bool) -> Result<Metadata, NodeError> {
        if !force {
            if let Some(snapshot) = self.cached_snapshot() {
                return Ok(snapshot);
            }
        }
        if self.is_disposed() {
            return Err(NodeError::DisposedError {
                path: self.path().to_path_buf(),
            });
        }

        let snapshot = fs::stat(self.path()).await?;
        self.install_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Like [`NodeHandle::stat`], but failures are published as `missing` or
    /// `error` events instead of being returned.
    pub fn stat_in_background(&self, force: bool) {
        let node = self.clone();
        self.spawn_reporting(async move { node.stat(force).await });
    }

    /// Reconciles a fresh snapshot against the cached one.
    ///
    /// `change` fires when there was no snapshot or the modification time
    /// moved; `transform` fires after it when the kind flipped. Cached state
    /// is updated before any listener runs.
    pub(crate) fn install_snapshot(&self, snapshot: Metadata) {
        let previous = self.inner.snapshot.replace(Some(snapshot.clone()));
        let changed = previous
            .as_ref()
            .is_none_or(|old| old.modified() != snapshot.modified());

        let new_kind = snapshot.kind();
        let old_kind = self.inner.kind.replace(new_kind);
        let rebuilt = (old_kind != new_kind).then(|| self.rebuild_wrapper(new_kind));

        if changed {
            self.emit(NodeEvent::Change(snapshot));
        }
        if let Some(node) = rebuilt {
            info!(
                "{} turned from a {} into a {}",
                self.path().best_effort_path_display(),
                old_kind,
                new_kind
            );
            self.emit(NodeEvent::Transform(node));
        }
    }

    fn rebuild_wrapper(&self, kind: Kind) -> Node {
        if kind == Kind::File {
            self.detach_children();
            self.inner.listing.replace(None);
        }

        let node = Node::from_handle(self.clone());
        if let Some(parent) = self.parent() {
            parent.replace_child_wrapper(&node);
        }
        node
    }

    /// Stops the watch and removes the path recursively, then detaches the
    /// node from its parent. A path that is already gone counts as deleted.
    pub async fn delete(&self) -> Result<(), NodeError> {
        self.delete_with(|path| async move {
            match fs::remove_all(&path).await {
                Err(error) if error.is_not_found() => Ok(()),
                other => other,
            }
        })
        .await
    }

    pub(crate) async fn delete_with<F, Fut>(&self, removal: F) -> Result<(), NodeError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), NodeError>>,
    {
        self.stop_watch();
        removal(self.path().to_path_buf()).await?;
        debug!("Deleted {}", self.path().display());
        self.remove();
        Ok(())
    }

    /// Like [`NodeHandle::delete`], with failures published as events.
    pub fn delete_in_background(&self) {
        let node = self.clone();
        self.spawn_reporting(async move { node.delete().await });
    }

    /// Detaches this node from its parent's registry.
    ///
    /// Returns the registry entry that was dropped, if any.
    pub fn remove(&self) -> Option<Node> {
        let parent = self.parent()?;
        parent.unregister_child(self)
    }

    pub fn listen(&self, kind: EventKind, listener: impl Fn(&NodeEvent) + 'static) -> ListenerId {
        self.inner
            .listeners
            .borrow_mut()
            .add(kind, Rc::new(listener))
    }

    pub fn unlisten(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.listeners.borrow_mut().remove(kind, id)
    }

    pub(crate) fn clear_listeners(&self) {
        self.inner.listeners.borrow_mut().clear();
    }

    /// Calls every subscriber of the event's kind in subscription order.
    ///
    /// `missing` and `error` without subscribers go to the log.
    pub fn emit(&self, event: NodeEvent) {
        let listeners = self.inner.listeners.borrow().matching(event.kind());

        if listeners.is_empty() {
            match &event {
                NodeEvent::Missing(error) => warn!(
                    "Unhandled missing event for {}: {}",
                    self.path().best_effort_path_display(),
                    error
                ),
                NodeEvent::Error(error) => error!(
                    "Unhandled error event for {}: {}",
                    self.path().best_effort_path_display(),
                    error
                ),
                _ => {}
            }
            return;
        }

        for listener in listeners {
            listener(&event);
        }
    }

    pub(crate) fn report(&self, error: NodeError) {
        self.emit(NodeEvent::from_failure(error));
    }

    pub(crate) fn spawn_reporting<T, Fut>(&self, operation: Fut)
    where
        T: 'static,
        Fut: Future<Output = Result<T, NodeError>> + 'static,
    {
        let node = self.clone();
        spawn(async move {
            if let Err(error) = operation.await {
                node.report(error);
            }
        })
        .detach();
    }

    pub(crate) fn set_listing(&self, names: Vec<String>) {
        self.inner.listing.replace(Some(names));
    }

    pub(crate) fn listing(&self) -> Option<Vec<String>> {
        self.inner.listing.borrow().clone()
    }

    pub(crate) fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().values().cloned().collect()
    }

    pub(crate) fn child(&self, path: &Path) -> Option<Node> {
        self.inner.children.borrow().get(path).cloned()
    }

    /// Registers `child` under this node and points it back here. A different
    /// node registered at the same path is detached first.
    pub(crate) fn register_child(&self, child: Node) {
        let key = child.path().to_path_buf();
        if let Some(previous_parent) = child.parent() {
            if !previous_parent.ptr_eq(self) {
                previous_parent.unregister_child(&child);
            }
        }

        child.inner.parent.replace(self.downgrade());
        let displaced = self.inner.children.borrow_mut().insert(key, child.clone());
        if let Some(displaced) = displaced {
            if !displaced.ptr_eq(&child) {
                displaced.inner.parent.replace(Weak::new());
            }
        }
    }

    pub(crate) fn unregister_child(&self, child: &NodeHandle) -> Option<Node> {
        let removed = {
            let mut children = self.inner.children.borrow_mut();
            let key = children
                .iter()
                .find(|(_, node)| node.ptr_eq(child))
                .map(|(key, _)| key.clone())?;
            children.remove(&key)
        }?;
        removed.inner.parent.replace(Weak::new());
        Some(removed)
    }

    pub(crate) fn unregister_child_by_path(&self, path: &Path) -> Option<Node> {
        let removed = self.inner.children.borrow_mut().remove(path)?;
        removed.inner.parent.replace(Weak::new());
        Some(removed)
    }

    fn replace_child_wrapper(&self, node: &Node) {
        let mut children = self.inner.children.borrow_mut();
        if let Some(entry) = children.get_mut(node.path()) {
            if entry.ptr_eq(node) {
                *entry = node.clone();
            }
        }
    }

    fn detach_children(&self) {
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        if !children.is_empty() {
            debug!(
                "Detaching {} children of {}",
                children.len(),
                self.path().display()
            );
        }
        for child in children.values() {
            child.inner.parent.replace(Weak::new());
        }
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("path", &self.inner.path)
            .field("kind", &self.inner.kind.get())
            .finish_non_exhaustive()
    }
}
