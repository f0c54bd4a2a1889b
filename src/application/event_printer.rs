use std::path::Path;

use colored::{Color, Colorize};
use supports_color::Stream;

use crate::node::{Metadata, NodeError, NodeEvent};
use crate::typed::Node;

/// Formats node events as single terminal lines.
#[derive(Debug, Clone, Copy)]
pub struct EventPrinter {
    colour: bool,
}

impl EventPrinter {
    pub fn new(colour: bool) -> Self {
        Self { colour }
    }

    /// Colours output only when stdout supports it.
    pub fn for_stdout() -> Self {
        let colour = supports_color::on(Stream::Stdout).is_some();
        if colour {
            colored::control::set_override(true);
        }
        Self::new(colour)
    }

    pub fn opened(&self, node: &Node) -> String {
        let detail = match node.cached_snapshot() {
            Some(snapshot) => describe_snapshot(&snapshot),
            None => node.kind().to_string(),
        };
        self.line("opened", Color::Blue, node.path(), &detail)
    }

    pub fn failed(&self, path: &Path, error: &NodeError) -> String {
        self.line("failed", Color::Red, path, &error.to_string())
    }

    pub fn event(&self, path: &Path, event: &NodeEvent) -> String {
        match event {
            NodeEvent::Change(snapshot) => {
                self.line("change", Color::Green, path, &describe_snapshot(snapshot))
            }
            NodeEvent::Transform(node) => self.line(
                "transform",
                Color::Magenta,
                path,
                &format!("is now a {}", node.kind()),
            ),
            NodeEvent::Missing(error) => {
                self.line("missing", Color::Yellow, path, &error.to_string())
            }
            NodeEvent::Error(error) => self.line("error", Color::Red, path, &error.to_string()),
        }
    }

    fn line(&self, label: &str, color: Color, path: &Path, detail: &str) -> String {
        let label = format!("{label:<9}");
        let label = if self.colour {
            label.color(color).bold().to_string()
        } else {
            label
        };
        format!("{label} {} {detail}", path.display())
    }
}

fn describe_snapshot(snapshot: &Metadata) -> String {
    format!("{}, {} bytes", snapshot.kind(), snapshot.size())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::node::{Kind, NodeDescriptor};

    #[test]
    fn test_change_line() {
        let printer = EventPrinter::new(false);
        let line = printer.event(
            Path::new("/tmp/fsnode-printer/a.txt"),
            &NodeEvent::Change(Metadata::new(12, None, Kind::File)),
        );
        assert_eq!(line, "change    /tmp/fsnode-printer/a.txt file, 12 bytes");
    }

    #[test]
    fn test_transform_line() {
        let printer = EventPrinter::new(false);
        let descriptor = NodeDescriptor::new("/tmp/fsnode-printer/a").with_kind(Kind::Directory);
        let node = Node::from_descriptor(descriptor).expect("Failed to build node");
        let line = printer.event(
            Path::new("/tmp/fsnode-printer/a"),
            &NodeEvent::Transform(node),
        );
        assert_eq!(line, "transform /tmp/fsnode-printer/a is now a directory");
    }

    #[test]
    fn test_missing_line_carries_error() {
        let printer = EventPrinter::new(false);
        let error = NodeError::DisposedError {
            path: "/tmp/fsnode-printer/a".into(),
        };
        let expected = format!("missing   /tmp/fsnode-printer/a {error}");
        let line = printer.event(
            Path::new("/tmp/fsnode-printer/a"),
            &NodeEvent::Missing(Rc::new(error)),
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn test_opened_without_snapshot_prints_kind() {
        let printer = EventPrinter::new(false);
        let descriptor = NodeDescriptor::new("/tmp/fsnode-printer/a.txt").with_kind(Kind::File);
        let node = Node::from_descriptor(descriptor).expect("Failed to build node");
        assert_eq!(printer.opened(&node), "opened    /tmp/fsnode-printer/a.txt file");
    }
}
