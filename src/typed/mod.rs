//! Kind-specific wrappers over [`NodeHandle`](crate::node::NodeHandle) and
//! the factories that create nodes on disk.

mod create;
mod directory_node;
mod file_node;
mod node;

pub use create::{create_directory, create_file};
pub use directory_node::DirectoryNode;
pub use file_node::FileNode;
pub use node::Node;
