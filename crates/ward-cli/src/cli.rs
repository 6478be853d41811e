//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ward_escalation::{AlertKind, Severity};

/// wardctl - clinical alert escalation tooling.
#[derive(Parser, Debug, Clone)]
#[command(name = "wardctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub output: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Escalation policy tools.
    Policy {
        /// Policy subcommand to execute.
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Run one alert through the engine in real time.
    Simulate(SimulateArgs),
}

/// Policy subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PolicyCommands {
    /// Load and validate a policy file, then print its ladders.
    Check {
        /// Path to the JSON policy file.
        file: PathBuf,
    },

    /// Show which ladder an alert kind and severity would climb.
    Resolve {
        /// Path to the JSON policy file.
        file: PathBuf,

        /// Alert kind (e.g. vital-sign, equipment).
        #[arg(short, long)]
        kind: AlertKind,

        /// Severity (low, medium, high, critical).
        #[arg(short, long)]
        severity: Severity,
    },
}

/// Arguments for `wardctl simulate`.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to the JSON policy file.
    #[arg(short, long)]
    pub policy: PathBuf,

    /// Optional JSON engine configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Monitored subject (bed, patient or unit).
    #[arg(long, default_value = "SIM-1")]
    pub subject: String,

    /// Alert kind.
    #[arg(short, long)]
    pub kind: AlertKind,

    /// Severity.
    #[arg(short, long)]
    pub severity: Severity,

    /// Reading that crossed the threshold.
    #[arg(long)]
    pub value: f64,

    /// Threshold that was crossed.
    #[arg(long)]
    pub threshold: f64,

    /// Acknowledge the alert after this many seconds.
    #[arg(long)]
    pub ack_after: Option<u64>,

    /// Who acknowledges when `--ack-after` is set.
    #[arg(long, default_value = "simulator")]
    pub ack_by: String,

    /// Stop the simulation after this many seconds.
    #[arg(long, default_value_t = 60)]
    pub run_for: u64,
}
