//! Policy command implementation.
//!
//! Validates policy files and shows how the fallback chain resolves a
//! kind and severity into a ladder.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use ward_escalation::{
    AlertKind, ChannelKind, EngineConfig, EscalationLadder, PolicySource, PolicyStore, Severity,
};

use crate::cli::PolicyCommands;
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay, truncate};

/// Handler for policy subcommands.
#[derive(Debug, Clone, Copy)]
pub struct PolicyCommand {
    generic_repeat_secs: u64,
}

impl PolicyCommand {
    /// Creates a policy command handler.
    #[must_use]
    pub const fn new(generic_repeat_secs: u64) -> Self {
        Self {
            generic_repeat_secs,
        }
    }

    /// Executes the policy subcommand.
    ///
    /// # Errors
    ///
    /// Returns error if the policy file cannot be loaded or output fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &PolicyCommands,
    ) -> Result<(), CliError> {
        match command {
            PolicyCommands::Check { file } => {
                let store = self.load(file)?;
                format.write(out, &check(&store, &file.display().to_string()))
            }
            PolicyCommands::Resolve {
                file,
                kind,
                severity,
            } => {
                let store = self.load(file)?;
                format.write(out, &resolve(&store, *kind, *severity))
            }
        }
    }

    fn load(&self, file: &Path) -> Result<PolicyStore, CliError> {
        PolicyStore::load_file(file, self.generic_repeat_secs)
            .map_err(|e| CliError::Config(format!("{}: {e}", file.display())))
    }
}

impl Default for PolicyCommand {
    fn default() -> Self {
        Self::new(EngineConfig::default().generic_repeat_secs)
    }
}

/// Builds the report for `policy check`.
#[must_use]
pub fn check(store: &PolicyStore, file: &str) -> PolicyCheck {
    let ladders: Vec<LadderView> = store
        .snapshot()
        .to_file()
        .policies
        .into_iter()
        .map(|entry| LadderView {
            kind: entry.kind,
            severity: entry.severity,
            steps: steps(&entry.ladder),
        })
        .collect();

    PolicyCheck {
        file: file.to_string(),
        valid: true,
        ladders,
    }
}

/// Builds the report for `policy resolve`.
#[must_use]
pub fn resolve(store: &PolicyStore, kind: AlertKind, severity: Severity) -> ResolvedLadder {
    let resolved = store.resolve(kind, severity);
    ResolvedLadder {
        kind,
        severity,
        source: resolved.source,
        fallback: resolved.source.is_fallback(),
        max_level: resolved.ladder.max_level(),
        repeat_interval_secs: resolved.ladder.repeat_interval().as_secs(),
        steps: steps(&resolved.ladder),
    }
}

fn steps(ladder: &EscalationLadder) -> Vec<StepView> {
    ladder
        .steps()
        .iter()
        .enumerate()
        .map(|(level, step)| StepView {
            level,
            delay_secs: step.delay_secs,
            tier: step.tier.clone(),
            channel: step.channel,
        })
        .collect()
}

fn write_steps<W: Write>(writer: &mut W, steps: &[StepView]) -> Result<(), CliError> {
    writeln!(
        writer,
        "  {:>5}  {:>9}  {:<24}  {:<8}",
        "LEVEL", "DELAY (s)", "TIER", "CHANNEL"
    )?;
    for step in steps {
        writeln!(
            writer,
            "  {:>5}  {:>9}  {:<24}  {:<8}",
            step.level,
            step.delay_secs,
            truncate(&step.tier, 24),
            step.channel
        )?;
    }
    Ok(())
}

// Output types

/// One rung of a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    /// Escalation level this rung is reached at.
    pub level: usize,
    /// Wait before this rung is reached (seconds).
    pub delay_secs: u64,
    /// Responder tier.
    pub tier: String,
    /// Delivery channel.
    pub channel: ChannelKind,
}

/// A configured ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LadderView {
    /// Alert kind.
    pub kind: AlertKind,
    /// Severity; absent for the kind's default ladder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Rungs, lowest first.
    pub steps: Vec<StepView>,
}

/// Result of `policy check`.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyCheck {
    /// The file that was checked.
    pub file: String,
    /// Always true; invalid files fail to load.
    pub valid: bool,
    /// Ladders sorted by kind then severity.
    pub ladders: Vec<LadderView>,
}

impl TableDisplay for PolicyCheck {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Policy file: {}", self.file)?;
        writeln!(writer, "══════════════════════════════════")?;

        if self.ladders.is_empty() {
            writeln!(
                writer,
                "No ladders configured; every alert uses the generic notify-all ladder"
            )?;
            return Ok(());
        }

        for ladder in &self.ladders {
            writeln!(writer)?;
            match ladder.severity {
                Some(severity) => writeln!(writer, "{} / {}", ladder.kind, severity)?,
                None => writeln!(writer, "{} / (kind default)", ladder.kind)?,
            }
            write_steps(writer, &ladder.steps)?;
        }

        writeln!(writer)?;
        writeln!(writer, "OK: {} ladder(s)", self.ladders.len())?;
        Ok(())
    }
}

/// Result of `policy resolve`.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLadder {
    /// Requested kind.
    pub kind: AlertKind,
    /// Requested severity.
    pub severity: Severity,
    /// Fallback rung that produced the ladder.
    pub source: PolicySource,
    /// True unless an exact ladder matched.
    pub fallback: bool,
    /// Highest level of the ladder.
    pub max_level: usize,
    /// Repeat interval at the top level (seconds), before the engine floor.
    pub repeat_interval_secs: u64,
    /// Rungs, lowest first.
    pub steps: Vec<StepView>,
}

impl TableDisplay for ResolvedLadder {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{} / {}", self.kind, self.severity)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Source:           {}", self.source)?;
        writeln!(writer, "Max level:        {}", self.max_level)?;
        writeln!(writer, "Repeat interval:  {}s", self.repeat_interval_secs)?;
        writeln!(writer)?;
        write_steps(writer, &self.steps)?;
        Ok(())
    }
}
