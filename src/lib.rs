//! Live handles on filesystem paths.
//!
//! A node caches what it last saw on disk, tells subscribers when the path
//! changes or turns into another kind of node, and keeps a watch on the path
//! that re-arms itself after every notification. A node whose path vanishes
//! is disposed once its grace period runs out without the path coming back.

#![allow(clippy::enum_variant_names)]

pub mod application;
pub mod cli;
pub mod config;
pub mod ext;
pub mod node;
pub mod primitives;
pub mod typed;

pub use node::{
    EventKind, Kind, ListenerId, Metadata, NodeConfig, NodeDescriptor, NodeError, NodeEvent,
    NodeHandle, WatchMode, WatchState,
};
pub use typed::{DirectoryNode, FileNode, Node, create_directory, create_file};
