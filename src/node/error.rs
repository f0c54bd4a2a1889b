use std::io;
use std::path::{Path, PathBuf};

use derive_more::Display;
use snafu::Snafu;

use crate::ext::BestEffortPathExt;
use crate::node::Kind;

/// Filesystem operation a [`NodeError`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operation {
    #[display("stat")]
    Stat,
    #[display("read")]
    Read,
    #[display("write")]
    Write,
    #[display("list")]
    List,
    #[display("create directory")]
    CreateDir,
    #[display("remove")]
    Remove,
    #[display("open")]
    Open,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NodeError {
    #[snafu(display("Path {} does not exist ({operation})", path.best_effort_path_display()))]
    NotFoundError {
        path: PathBuf,
        operation: Operation,
        source: io::Error,
    },
    #[snafu(display("Failed to {operation} {}", path.best_effort_path_display()))]
    IoError {
        path: PathBuf,
        operation: Operation,
        source: io::Error,
    },
    #[snafu(display("Invalid argument: {reason}"))]
    InvalidArgumentError { reason: String },
    #[snafu(display("Unrecognized node type '{kind}'"))]
    UnrecognizedTypeError { kind: String },
    #[snafu(display("Node {} has been disposed", path.best_effort_path_display()))]
    DisposedError { path: PathBuf },
    #[snafu(display(
        "Wrapper for {} expects a {expected} but the node is now a {actual}",
        path.best_effort_path_display()
    ))]
    StaleWrapperError {
        path: PathBuf,
        expected: Kind,
        actual: Kind,
    },
    #[snafu(display("Cannot watch {}", path.best_effort_path_display()))]
    WatchRegistrationError {
        path: PathBuf,
        source: notify::Error,
    },
    #[snafu(display("Failed to dispatch {operation} of {}: {error}", path.best_effort_path_display()))]
    DispatchError {
        path: PathBuf,
        operation: Operation,
        error: String,
    },
    #[snafu(display("{operation} of {} got cancelled", path.best_effort_path_display()))]
    CanceledError {
        path: PathBuf,
        operation: Operation,
        source: futures_channel::oneshot::Canceled,
    },
}

impl NodeError {
    /// Classifies an OS error, splitting "not found" from every other failure.
    pub(crate) fn from_io(path: &Path, operation: Operation, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::NotFound {
            NodeError::NotFoundError {
                path,
                operation,
                source,
            }
        } else {
            NodeError::IoError {
                path,
                operation,
                source,
            }
        }
    }

    /// True when the failure means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            NodeError::NotFoundError { .. } => true,
            NodeError::WatchRegistrationError { source, .. } => match &source.kind {
                notify::ErrorKind::PathNotFound => true,
                notify::ErrorKind::Io(err) => err.kind() == io::ErrorKind::NotFound,
                _ => false,
            },
            _ => false,
        }
    }
}
