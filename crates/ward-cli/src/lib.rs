//! # ward-cli
//!
//! Operator tooling for the `ward-escalation` engine.
//!
//! Provides commands for:
//! - Validating escalation policy files
//! - Showing which ladder a kind and severity resolve to
//! - Simulating an alert's escalation against a log-only roster
//!
//! Every command writes either human-readable tables or JSON, selected
//! with `--output`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, PolicyCommands, SimulateArgs};
pub use error::CliError;
pub use output::OutputFormat;
