use std::ops::Deref;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::ext::{BestEffortPathExt, resolve_path};
use crate::node::{Kind, NodeDescriptor, NodeError, NodeHandle};
use crate::primitives::fs;
use crate::typed::{Node, create_directory, create_file};

/// A node known to be a directory. It owns the child nodes created or
/// registered through it.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    handle: NodeHandle,
}

impl DirectoryNode {
    pub(crate) fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    pub fn is_stale(&self) -> bool {
        self.handle.kind() != Kind::Directory
    }

    fn ensure_current(&self) -> Result<(), NodeError> {
        if self.is_stale() {
            return Err(NodeError::StaleWrapperError {
                path: self.path().to_path_buf(),
                expected: Kind::Directory,
                actual: self.handle.kind(),
            });
        }
        Ok(())
    }

    /// Names of the directory's entries, sorted. The result is kept as the
    /// cached listing.
    pub async fn list(&self) -> Result<Vec<String>, NodeError> {
        self.ensure_current()?;
        let names = fs::list(self.path()).await?;
        self.handle.set_listing(names.clone());
        Ok(names)
    }

    /// Listing from the last successful [`DirectoryNode::list`].
    pub fn cached_listing(&self) -> Option<Vec<String>> {
        self.handle.listing()
    }

    /// Creates a file (when `content` is given) or a directory at `relative`
    /// under this directory and registers it as a child.
    pub async fn add_child(
        &self,
        relative: impl AsRef<Path>,
        content: Option<&str>,
        auto_create_ancestors: bool,
    ) -> Result<Node, NodeError> {
        self.ensure_current()?;
        let relative = relative.as_ref();
        validate_relative(relative)?;

        let descriptor = NodeDescriptor::new(self.path().join(relative))
            .with_parent(self)
            .with_config(self.config().clone());
        debug!(
            "Adding {} under {}",
            relative.best_effort_path_display(),
            self.path().best_effort_path_display()
        );

        Ok(match content {
            Some(content) => create_file(descriptor, content, auto_create_ancestors)
                .await?
                .into(),
            None => create_directory(descriptor, auto_create_ancestors)
                .await?
                .into(),
        })
    }

    /// Drops `child` from the registry and clears its parent.
    pub fn remove_child(&self, child: &NodeHandle) -> Option<Node> {
        self.handle.unregister_child(child)
    }

    /// Drops the child registered at `path`; relative paths are taken under
    /// this directory.
    pub fn remove_child_by_path(&self, path: impl AsRef<Path>) -> Option<Node> {
        self.handle.unregister_child_by_path(&self.child_key(path.as_ref()))
    }

    /// Registered children in path order.
    pub fn children(&self) -> Vec<Node> {
        self.handle.children()
    }

    pub fn child(&self, path: impl AsRef<Path>) -> Option<Node> {
        self.handle.child(&self.child_key(path.as_ref()))
    }

    /// Removes the directory. Without `force` only an empty directory can go;
    /// with `force` the whole tree is removed and a missing path is not an
    /// error.
    pub async fn delete(&self, force: bool) -> Result<(), NodeError> {
        self.ensure_current()?;
        if force {
            return self.handle.delete().await;
        }
        self.handle
            .delete_with(|path| async move { fs::remove_dir(&path).await })
            .await
    }

    /// Registry key for `path`, normalized the way child paths are.
    fn child_key(&self, path: &Path) -> PathBuf {
        resolve_path(&self.path().join(path))
    }
}

impl Deref for DirectoryNode {
    type Target = NodeHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

fn validate_relative(relative: &Path) -> Result<(), NodeError> {
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes || relative.as_os_str().is_empty() {
        return Err(NodeError::InvalidArgumentError {
            reason: format!(
                "child path {} must stay inside its directory",
                relative.best_effort_path_display()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::node::Metadata;

    fn directory_at(path: &Path) -> DirectoryNode {
        DirectoryNode::new(NodeHandle::new(&NodeDescriptor::new(path), Kind::Directory))
    }

    #[compio::test]
    async fn test_list_caches_sorted_names() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::write(temp_dir.path().join("b.txt"), "x").expect("Failed to write file");
        std::fs::create_dir(temp_dir.path().join("a")).expect("Failed to create dir");
        let directory = directory_at(temp_dir.path());

        assert_eq!(directory.cached_listing(), None);
        let names = directory.list().await.expect("Failed to list");
        assert_eq!(names, vec!["a", "b.txt"]);
        assert_eq!(directory.cached_listing(), Some(names));
    }

    #[compio::test]
    async fn test_add_child_file_and_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());

        let file = directory
            .add_child("notes.txt", Some("hello"), false)
            .await
            .expect("Failed to add file");
        let sub = directory
            .add_child("sub", None, false)
            .await
            .expect("Failed to add directory");

        assert!(file.as_file().is_some());
        assert!(sub.as_directory().is_some());
        assert!(file.parent().is_some_and(|p| p.ptr_eq(&directory)));
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("notes.txt")).expect("Failed to read"),
            "hello"
        );

        let children = directory.children();
        assert_eq!(children.len(), 2);
        assert!(children[0].ptr_eq(&file));
        assert!(children[1].ptr_eq(&sub));
        assert!(directory.child("sub").is_some_and(|c| c.ptr_eq(&sub)));
    }

    #[compio::test]
    async fn test_add_child_under_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(&temp_dir.path().join("d"));

        let sub = directory
            .add_child("sub", None, true)
            .await
            .expect("Failed to add child");

        assert!(temp_dir.path().join("d").join("sub").is_dir());
        assert_eq!(sub.kind(), Kind::Directory);
        assert!(sub.parent().is_some_and(|p| p.ptr_eq(&directory)));
        assert_eq!(directory.children().len(), 1);
    }

    #[compio::test]
    async fn test_add_child_rejects_escaping_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());

        for relative in ["../escape", "a/../../escape", "/etc/passwd", ""] {
            let result = directory.add_child(relative, Some("x"), true).await;
            assert!(
                matches!(result, Err(NodeError::InvalidArgumentError { .. })),
                "{relative:?} should be rejected"
            );
        }
        assert!(directory.children().is_empty());
    }

    #[compio::test]
    async fn test_re_adding_a_path_displaces_the_previous_child() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());

        let first = directory
            .add_child("a.txt", Some("1"), false)
            .await
            .expect("Failed to add child");
        let second = directory
            .add_child("a.txt", Some("2"), false)
            .await
            .expect("Failed to add child");

        assert!(first.parent().is_none());
        assert!(second.parent().is_some());
        assert_eq!(directory.children().len(), 1);
    }

    #[compio::test]
    async fn test_remove_child_by_identity_and_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());
        let a = directory
            .add_child("a", None, false)
            .await
            .expect("Failed to add child");
        let b = directory
            .add_child("b", None, false)
            .await
            .expect("Failed to add child");

        assert!(directory.remove_child(&a).is_some());
        assert!(a.parent().is_none());
        assert!(directory.remove_child(&a).is_none());

        assert!(directory.remove_child_by_path("b").is_some());
        assert!(b.parent().is_none());
        assert!(directory.children().is_empty());
    }

    #[compio::test]
    async fn test_lookup_by_dotted_path_finds_the_child() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());
        let a = directory
            .add_child("./a", None, false)
            .await
            .expect("Failed to add child");

        assert!(directory.child("a").is_some_and(|c| c.ptr_eq(&a)));
        assert!(directory.child("./a").is_some_and(|c| c.ptr_eq(&a)));
        assert!(directory.child("b/../a").is_some_and(|c| c.ptr_eq(&a)));

        assert!(directory.remove_child_by_path("./a").is_some());
        assert!(a.parent().is_none());
        assert!(directory.children().is_empty());
    }

    #[compio::test]
    async fn test_dispose_child_detaches_it_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());
        let a = directory
            .add_child("a", None, false)
            .await
            .expect("Failed to add child");
        let b = directory
            .add_child("b.txt", Some("x"), false)
            .await
            .expect("Failed to add child");

        a.dispose();
        a.dispose();

        assert!(a.is_disposed());
        assert!(a.parent().is_none());
        let children = directory.children();
        assert_eq!(children.len(), 1);
        assert!(children[0].ptr_eq(&b));
        assert!(b.parent().is_some_and(|p| p.ptr_eq(&directory)));
        assert!(directory.child("a").is_none());
        assert!(directory.child("b.txt").is_some_and(|c| c.ptr_eq(&b)));
    }

    #[compio::test]
    async fn test_delete_detaches_from_parent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());
        let file = directory
            .add_child("a.txt", Some("x"), false)
            .await
            .expect("Failed to add child");

        file.delete(false).await.expect("Failed to delete");

        assert!(file.parent().is_none());
        assert!(directory.children().is_empty());
        assert!(!temp_dir.path().join("a.txt").exists());
    }

    #[compio::test]
    async fn test_non_force_delete_refuses_non_empty_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("d");
        std::fs::create_dir(&path).expect("Failed to create dir");
        std::fs::write(path.join("f"), "x").expect("Failed to write file");
        let directory = directory_at(&path);

        assert!(matches!(
            directory.delete(false).await,
            Err(NodeError::IoError { .. })
        ));
        assert!(path.exists());

        directory.delete(true).await.expect("Failed to delete tree");
        assert!(!path.exists());
    }

    #[compio::test]
    async fn test_turning_into_a_file_detaches_children() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let directory = directory_at(temp_dir.path());
        let child = directory
            .add_child("a", None, false)
            .await
            .expect("Failed to add child");
        directory.list().await.expect("Failed to list");

        directory.install_snapshot(Metadata::new(0, None, Kind::File));

        assert!(child.parent().is_none());
        assert!(directory.children().is_empty());
        assert_eq!(directory.cached_listing(), None);
        assert!(matches!(
            directory.list().await,
            Err(NodeError::StaleWrapperError { .. })
        ));
    }
}
