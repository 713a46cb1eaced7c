//! Command line front end for the Case Conductor registry.

pub mod cli;
pub mod commands;
pub mod invoke;
pub mod telemetry;

pub use cli::{Cli, Commands};
pub use commands::{CommandError, CommandResult, Outcome, Session};
pub use invoke::invoke;
pub use telemetry::{init_logging, EventTracer, TelemetryError};
