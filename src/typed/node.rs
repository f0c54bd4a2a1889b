use std::ops::Deref;
use std::path::Path;

use tracing::debug;

use crate::ext::AsyncTryFrom;
use crate::node::{Kind, NodeDescriptor, NodeError, NodeHandle};
use crate::primitives::fs;
use crate::typed::{DirectoryNode, FileNode};

/// A node with the capability set of its kind.
///
/// When a node changes kind on disk its old wrapper goes stale and the
/// `transform` event carries the replacement.
#[derive(Debug, Clone)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    /// Builds a node from a descriptor whose kind is known up front, either
    /// explicitly or through its initial snapshot.
    pub fn from_descriptor(descriptor: impl Into<NodeDescriptor>) -> Result<Self, NodeError> {
        let descriptor = descriptor.into();
        let kind = descriptor
            .resolved_kind()
            .ok_or_else(|| NodeError::UnrecognizedTypeError {
                kind: "unspecified".to_string(),
            })?;

        Ok(match kind {
            Kind::File => assemble(descriptor, Kind::File, FileNode::new).into(),
            Kind::Directory => assemble(descriptor, Kind::Directory, DirectoryNode::new).into(),
        })
    }

    /// Wraps an existing handle according to its current kind.
    pub fn from_handle(handle: NodeHandle) -> Self {
        match handle.kind() {
            Kind::File => Node::File(FileNode::new(handle)),
            Kind::Directory => Node::Directory(DirectoryNode::new(handle)),
        }
    }

    /// Stats the path first and builds the node from what is on disk.
    pub async fn open(descriptor: impl Into<NodeDescriptor>) -> Result<Self, NodeError> {
        let mut descriptor = descriptor.into();
        let snapshot = fs::stat(descriptor.path()).await?;
        debug!(
            "Opened {} as a {}",
            descriptor.path().display(),
            snapshot.kind()
        );

        descriptor.kind = None;
        Node::from_descriptor(descriptor.with_snapshot(snapshot))
    }

    pub fn handle(&self) -> &NodeHandle {
        match self {
            Node::File(file) => file.handle(),
            Node::Directory(directory) => directory.handle(),
        }
    }

    /// Kind of this wrapper, which may lag behind the handle's once stale.
    pub fn wrapper_kind(&self) -> Kind {
        match self {
            Node::File(_) => Kind::File,
            Node::Directory(_) => Kind::Directory,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.wrapper_kind() != self.handle().kind()
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(directory) => Some(directory),
            Node::File(_) => None,
        }
    }

    /// Deletes with the semantics of the wrapper's kind; `force` removes
    /// recursively.
    pub async fn delete(&self, force: bool) -> Result<(), NodeError> {
        match self {
            Node::File(file) => file.delete(force).await,
            Node::Directory(directory) => directory.delete(force).await,
        }
    }
}

impl Deref for Node {
    type Target = NodeHandle;

    fn deref(&self) -> &Self::Target {
        self.handle()
    }
}

impl From<FileNode> for Node {
    fn from(file: FileNode) -> Self {
        Node::File(file)
    }
}

impl From<DirectoryNode> for Node {
    fn from(directory: DirectoryNode) -> Self {
        Node::Directory(directory)
    }
}

impl AsyncTryFrom<&Path> for Node {
    type Error = NodeError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        Node::open(path).await
    }
}

/// Builds the handle, wraps it, registers it with a directory parent and
/// starts the watch the descriptor asks for.
pub(crate) fn assemble<W>(
    descriptor: NodeDescriptor,
    kind: Kind,
    wrap: impl FnOnce(NodeHandle) -> W,
) -> W
where
    W: Clone + Into<Node>,
{
    let handle = NodeHandle::new(&descriptor, kind);
    let wrapper = wrap(handle.clone());

    if let Some(parent) = descriptor.parent.upgrade().map(NodeHandle::from_inner) {
        if parent.kind() == Kind::Directory {
            parent.register_child(wrapper.clone().into());
        }
    }

    let watch = descriptor.watch_mode();
    if watch.is_enabled() {
        handle.start_watch(watch.is_persistent());
    }

    wrapper
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tempfile::TempDir;

    use crate::ext::AsyncTryInto;
    use crate::node::{Metadata, WatchMode, WatchState};

    #[rstest]
    #[case(Kind::File)]
    #[case(Kind::Directory)]
    fn test_from_descriptor_dispatches_on_kind(#[case] kind: Kind) {
        let node = Node::from_descriptor(NodeDescriptor::new("/tmp/x").with_kind(kind))
            .expect("Failed to build node");
        assert_eq!(node.wrapper_kind(), kind);
        assert_eq!(node.kind(), kind);
        assert!(!node.is_stale());
    }

    #[test]
    fn test_from_descriptor_infers_kind_from_snapshot() {
        let descriptor =
            NodeDescriptor::new("/tmp/x").with_snapshot(Metadata::new(0, None, Kind::Directory));
        let node = Node::from_descriptor(descriptor).expect("Failed to build node");

        assert!(node.as_directory().is_some());
        assert_eq!(node.cached_snapshot().map(|s| s.kind()), Some(Kind::Directory));
    }

    #[test]
    fn test_from_descriptor_without_kind_is_unrecognized() {
        let result = Node::from_descriptor("/tmp/x");
        assert!(matches!(
            result,
            Err(NodeError::UnrecognizedTypeError { .. })
        ));
    }

    #[test]
    fn test_from_descriptor_registers_with_directory_parent() {
        let parent = Node::from_descriptor(NodeDescriptor::new("/tmp/d").with_kind(Kind::Directory))
            .expect("Failed to build parent");
        let child = Node::from_descriptor(
            NodeDescriptor::new("/tmp/d/f")
                .with_kind(Kind::File)
                .with_parent(&parent),
        )
        .expect("Failed to build child");

        assert!(child.parent().is_some_and(|p| p.ptr_eq(&parent)));
        let children = parent.as_directory().map(|d| d.children()).unwrap_or_default();
        assert_eq!(children.len(), 1);
        assert!(children[0].ptr_eq(&child));
    }

    #[test]
    fn test_file_parent_is_ignored() {
        let parent = Node::from_descriptor(NodeDescriptor::new("/tmp/f").with_kind(Kind::File))
            .expect("Failed to build parent");
        let child = Node::from_descriptor(
            NodeDescriptor::new("/tmp/f/g")
                .with_kind(Kind::File)
                .with_parent(&parent),
        )
        .expect("Failed to build child");

        assert!(child.parent().is_none());
    }

    #[compio::test]
    async fn test_open_stats_the_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file_path = temp_dir.path().join("a.txt");
        std::fs::write(&file_path, "x").expect("Failed to write file");

        let directory = Node::open(temp_dir.path()).await.expect("Failed to open dir");
        assert!(directory.as_directory().is_some());

        let file: Result<Node, NodeError> = file_path.as_path().async_try_into().await;
        let file = file.expect("Failed to open file");
        assert!(file.as_file().is_some());
        assert_eq!(file.cached_snapshot().map(|s| s.size()), Some(1));
    }

    #[compio::test]
    async fn test_open_ignores_a_contradicting_kind() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let node = Node::open(NodeDescriptor::new(temp_dir.path()).with_kind(Kind::File))
            .await
            .expect("Failed to open dir");
        assert!(node.as_directory().is_some());
    }

    #[compio::test]
    async fn test_open_missing_path_fails() {
        let result = Node::open("/this/path/does/not/exist").await;
        assert!(matches!(result, Err(NodeError::NotFoundError { .. })));
    }

    #[compio::test]
    async fn test_descriptor_watch_mode_starts_watch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let node = Node::open(NodeDescriptor::new(temp_dir.path()).with_watch(WatchMode::Transient))
            .await
            .expect("Failed to open dir");

        assert_eq!(node.watch_state(), WatchState::Watching);
        node.dispose();
    }

    #[test]
    fn test_transform_makes_old_wrapper_stale() {
        let node = Node::from_descriptor(NodeDescriptor::new("/tmp/a.txt").with_kind(Kind::File))
            .expect("Failed to build node");
        node.install_snapshot(Metadata::new(0, None, Kind::Directory));

        assert!(node.is_stale());
        let current = node.typed();
        assert!(!current.is_stale());
        assert!(current.as_directory().is_some());
    }
}
