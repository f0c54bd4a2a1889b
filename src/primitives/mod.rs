//! Platform calls nodes are built on: content I/O, creation and removal.

mod blocking;
pub mod fs;
