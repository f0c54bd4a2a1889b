//! The `fsnode` binary's driver: merges CLI and file configuration, opens the
//! requested nodes and reports their events until all of them are gone.

#[allow(clippy::module_inception)]
mod application;
pub mod data;
mod event_printer;
mod runtime_config;

pub use application::{Application, ApplicationError};
pub use event_printer::EventPrinter;
pub use runtime_config::RuntimeConfig;
