use std::path::{Path, PathBuf};
use std::rc::Weak;
use std::str::FromStr;
use std::time::Duration;

use derive_more::Display;

use crate::node::handle::NodeInner;
use crate::node::{Kind, Metadata, NodeError, NodeHandle};

/// Grace period used when no configuration overrides it.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Whether a node watches its path, and whether the watch keeps it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum WatchMode {
    #[default]
    #[display("off")]
    Off,
    /// The watch loop only holds a weak reference: dropping every handle ends it.
    #[display("transient")]
    Transient,
    /// The watch loop keeps the node alive until stopped or disposed.
    #[display("persistent")]
    Persistent,
}

impl WatchMode {
    pub fn is_enabled(self) -> bool {
        self != WatchMode::Off
    }

    pub fn is_persistent(self) -> bool {
        self == WatchMode::Persistent
    }
}

impl From<bool> for WatchMode {
    fn from(watch: bool) -> Self {
        if watch {
            WatchMode::Transient
        } else {
            WatchMode::Off
        }
    }
}

impl FromStr for WatchMode {
    type Err = NodeError;

    /// Accepts `off`, `on` (same as `transient`), `transient` and `persistent`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(WatchMode::Off),
            "on" | "transient" => Ok(WatchMode::Transient),
            "persistent" => Ok(WatchMode::Persistent),
            other => Err(NodeError::InvalidArgumentError {
                reason: format!("unknown watch mode '{other}'"),
            }),
        }
    }
}

/// Per-node tuning shared by a directory with the children it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// How long a node that lost its watch may wait for its path to come back
    /// before it is disposed.
    pub grace_period: Duration,
    /// Watch mode applied to nodes built without an explicit one.
    pub watch: WatchMode,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            watch: WatchMode::Off,
        }
    }
}

/// Construction input of a node.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub(crate) path: PathBuf,
    pub(crate) kind: Option<Kind>,
    pub(crate) initial_snapshot: Option<Metadata>,
    pub(crate) watch: Option<WatchMode>,
    pub(crate) parent: Weak<NodeInner>,
    pub(crate) config: NodeConfig,
}

impl NodeDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: None,
            initial_snapshot: None,
            watch: None,
            parent: Weak::new(),
            config: NodeConfig::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_snapshot(mut self, snapshot: Metadata) -> Self {
        self.initial_snapshot = Some(snapshot);
        self
    }

    pub fn with_watch(mut self, watch: impl Into<WatchMode>) -> Self {
        self.watch = Some(watch.into());
        self
    }

    pub fn with_parent(mut self, parent: &NodeHandle) -> Self {
        self.parent = parent.downgrade();
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Explicit kind first, then the kind of the initial snapshot.
    pub fn resolved_kind(&self) -> Option<Kind> {
        self.kind
            .or_else(|| self.initial_snapshot.as_ref().map(Metadata::kind))
    }

    pub fn watch_mode(&self) -> WatchMode {
        self.watch.unwrap_or(self.config.watch)
    }
}

impl From<&str> for NodeDescriptor {
    fn from(path: &str) -> Self {
        NodeDescriptor::new(path)
    }
}

impl From<&Path> for NodeDescriptor {
    fn from(path: &Path) -> Self {
        NodeDescriptor::new(path)
    }
}

impl From<PathBuf> for NodeDescriptor {
    fn from(path: PathBuf) -> Self {
        NodeDescriptor::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(None, None, None)]
    #[case(Some(Kind::File), None, Some(Kind::File))]
    #[case(None, Some(Kind::Directory), Some(Kind::Directory))]
    #[case(Some(Kind::File), Some(Kind::Directory), Some(Kind::File))]
    fn test_resolved_kind_prefers_explicit_kind(
        #[case] explicit: Option<Kind>,
        #[case] from_snapshot: Option<Kind>,
        #[case] expected: Option<Kind>,
    ) {
        let mut descriptor = NodeDescriptor::new("/tmp/x");
        if let Some(kind) = explicit {
            descriptor = descriptor.with_kind(kind);
        }
        if let Some(kind) = from_snapshot {
            descriptor = descriptor.with_snapshot(Metadata::new(0, None, kind));
        }
        assert_eq!(descriptor.resolved_kind(), expected);
    }

    #[rstest]
    #[case("off", WatchMode::Off)]
    #[case("on", WatchMode::Transient)]
    #[case("Transient", WatchMode::Transient)]
    #[case("persistent", WatchMode::Persistent)]
    fn test_watch_mode_from_str(#[case] input: &str, #[case] expected: WatchMode) {
        assert_eq!(input.parse::<WatchMode>().ok(), Some(expected));
    }

    #[test]
    fn test_unknown_watch_mode_is_rejected() {
        assert!(matches!(
            "sometimes".parse::<WatchMode>(),
            Err(NodeError::InvalidArgumentError { .. })
        ));
    }

    #[test]
    fn test_watch_mode_falls_back_to_config() {
        let config = NodeConfig {
            watch: WatchMode::Persistent,
            ..NodeConfig::default()
        };
        let descriptor = NodeDescriptor::new("/tmp/x").with_config(config);
        assert_eq!(descriptor.watch_mode(), WatchMode::Persistent);

        let descriptor = descriptor.with_watch(false);
        assert_eq!(descriptor.watch_mode(), WatchMode::Off);
    }
}
