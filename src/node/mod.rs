//! The reconciliation engine behind every node: metadata snapshots, the
//! shared handle, its lifecycle events and its watch supervision.

mod descriptor;
pub(crate) mod error;
mod events;
pub(crate) mod handle;
mod metadata;
mod supervisor;

pub use descriptor::{DEFAULT_GRACE_PERIOD, NodeConfig, NodeDescriptor, WatchMode};
pub use error::{NodeError, Operation};
pub use events::{EventKind, Listener, ListenerId, NodeEvent};
pub use handle::NodeHandle;
pub use metadata::{Kind, Metadata};
pub use supervisor::{WatchState, live_watch_count};
