use std::path::Path;

use tracing::debug;

use crate::ext::BestEffortPathExt;
use crate::node::{Kind, NodeDescriptor, NodeError};
use crate::primitives::fs;
use crate::typed::node::assemble;
use crate::typed::{DirectoryNode, FileNode};

/// Writes `content` to the descriptor's path and returns the new file node.
///
/// When the parent directory is missing and `auto_create_ancestors` is set,
/// the ancestor chain is created and the write retried once.
pub async fn create_file(
    descriptor: impl Into<NodeDescriptor>,
    content: &str,
    auto_create_ancestors: bool,
) -> Result<FileNode, NodeError> {
    let descriptor = descriptor.into();
    let path = descriptor.path();

    match fs::write(path, content.as_bytes().to_vec()).await {
        Err(error) if error.is_not_found() && auto_create_ancestors => {
            create_ancestors(path).await?;
            fs::write(path, content.as_bytes().to_vec()).await?;
        }
        other => other?,
    }

    debug!("Created file {}", path.best_effort_path_display());
    Ok(assemble(descriptor, Kind::File, FileNode::new))
}

/// Creates the descriptor's directory and returns its node.
///
/// `auto_create_ancestors` creates missing ancestors on the way; otherwise a
/// missing parent fails with `NotFound`.
pub async fn create_directory(
    descriptor: impl Into<NodeDescriptor>,
    auto_create_ancestors: bool,
) -> Result<DirectoryNode, NodeError> {
    let descriptor = descriptor.into();
    fs::create_dir(descriptor.path(), auto_create_ancestors).await?;

    debug!(
        "Created directory {}",
        descriptor.path().best_effort_path_display()
    );
    Ok(assemble(descriptor, Kind::Directory, DirectoryNode::new))
}

async fn create_ancestors(path: &Path) -> Result<(), NodeError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    debug!(
        "Creating missing ancestors of {}",
        path.best_effort_path_display()
    );
    fs::create_dir(parent, true).await
}
