//! Probar Coverage CLI Library
//!
//! Attach to a live page's debugger WebSocket, collect script and
//! stylesheet coverage for a while, and print what ran.

#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod error;
mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, OutputFormatArg};
pub use error::{CliError, CliResult};
pub use logging::{init_logging, LogOptions};
pub use output::render;
pub use runner::{collect, resolve_settings, run_against, wait_for_stop, RunReport};
