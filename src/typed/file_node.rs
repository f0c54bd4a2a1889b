use std::ops::Deref;

use compio::fs::File;
use tracing::debug;

use crate::node::{Kind, NodeError, NodeHandle};
use crate::primitives::fs;

/// A node known to be a regular file.
#[derive(Debug, Clone)]
pub struct FileNode {
    handle: NodeHandle,
}

impl FileNode {
    pub(crate) fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    pub fn is_stale(&self) -> bool {
        self.handle.kind() != Kind::File
    }

    fn ensure_current(&self) -> Result<(), NodeError> {
        if self.is_stale() {
            return Err(NodeError::StaleWrapperError {
                path: self.path().to_path_buf(),
                expected: Kind::File,
                actual: self.handle.kind(),
            });
        }
        Ok(())
    }

    /// Reads the whole file as UTF-8 text.
    pub async fn read(&self) -> Result<String, NodeError> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes).map_err(|e| NodeError::InvalidArgumentError {
            reason: format!(
                "{} is not valid UTF-8: {}",
                self.path().display(),
                e.utf8_error()
            ),
        })
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, NodeError> {
        self.ensure_current()?;
        fs::read(self.path()).await
    }

    pub async fn open_reader(&self) -> Result<File, NodeError> {
        self.ensure_current()?;
        fs::open_reader(self.path()).await
    }

    /// Replaces the file's content.
    pub async fn write(&self, content: impl Into<String>) -> Result<(), NodeError> {
        self.ensure_current()?;
        let content = content.into();
        debug!("Writing {} bytes to {}", content.len(), self.path().display());
        fs::write(self.path(), content.into_bytes()).await
    }

    /// Opens the file for writing, truncating it.
    pub async fn open_writer(&self) -> Result<File, NodeError> {
        self.ensure_current()?;
        fs::open_writer(self.path()).await
    }

    /// Like [`FileNode::write`], with failures published as events.
    pub fn write_in_background(&self, content: impl Into<String>) {
        let file = self.clone();
        let content = content.into();
        self.handle
            .spawn_reporting(async move { file.write(content).await });
    }

    /// Removes the file. With `force` the path goes whatever it has become
    /// and a missing path is not an error.
    pub async fn delete(&self, force: bool) -> Result<(), NodeError> {
        self.ensure_current()?;
        if force {
            return self.handle.delete().await;
        }
        self.handle
            .delete_with(|path| async move { fs::remove_file(&path).await })
            .await
    }
}

impl Deref for FileNode {
    type Target = NodeHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}
