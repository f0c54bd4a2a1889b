use std::str::FromStr;
use std::time::SystemTime;

use derive_more::Display;

use crate::node::NodeError;

/// File or directory classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Kind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
}

impl FromStr for Kind {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Kind::File),
            "directory" => Ok(Kind::Directory),
            other => Err(NodeError::UnrecognizedTypeError {
                kind: other.to_string(),
            }),
        }
    }
}

/// Point-in-time stat result of a node.
///
/// Snapshots are never mutated: every stat produces a new one and the node
/// swaps its cached copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    size: u64,
    modified: Option<SystemTime>,
    kind: Kind,
}

impl Metadata {
    pub fn new(size: u64, modified: Option<SystemTime>, kind: Kind) -> Self {
        Self {
            size,
            modified,
            kind,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// `None` where the platform does not report modification times.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == Kind::Directory
    }
}

impl From<&compio::fs::Metadata> for Metadata {
    fn from(metadata: &compio::fs::Metadata) -> Self {
        let kind = if metadata.is_dir() {
            Kind::Directory
        } else {
            Kind::File
        };
        Self {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            kind,
        }
    }
}
