//! Simulate command implementation.
//!
//! Runs a single alert through a real engine on the wall clock. Every tier
//! is filled with one log-channel contact, so pages show up in the tracing
//! output while change events stream to stdout.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;
use ward_escalation::policy::ALL_ASSIGNED_TIER;
use ward_escalation::{
    AlertEvent, AlertFilter, AlertKind, AlertStatus, ChannelRegistry, Contact, EngineConfig,
    EscalationEngine, PolicySource, PolicyStore, Severity, StaticRoster,
};

use crate::cli::SimulateArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay, TableRow};

/// Handler for `wardctl simulate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulateCommand;

impl SimulateCommand {
    /// Creates a simulate command handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads the policy file and runs the simulation.
    ///
    /// # Errors
    ///
    /// Returns error if the files cannot be loaded, the engine rejects an
    /// operation, or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &SimulateArgs,
    ) -> Result<(), CliError> {
        let config = match &args.config {
            Some(path) => EngineConfig::load_file(path)
                .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?,
            None => EngineConfig::default(),
        };
        let policies = PolicyStore::load_file(&args.policy, config.generic_repeat_secs)
            .map_err(|e| CliError::Config(format!("{}: {e}", args.policy.display())))?;

        let summary = run(out, format, config, policies, args).await?;
        if !format.is_json() {
            writeln!(out)?;
            format.write(out, &summary)?;
        }
        Ok(())
    }
}

/// Runs the simulation, streaming events to `out`, and returns its summary.
///
/// Stops when the alert leaves the active state, or after `run_for`.
///
/// # Errors
///
/// Returns error if the engine rejects an operation or output fails.
pub async fn run<W: Write>(
    out: &mut W,
    format: &OutputFormat,
    config: EngineConfig,
    policies: PolicyStore,
    args: &SimulateArgs,
) -> Result<SimulationSummary, CliError> {
    if args.run_for == 0 {
        return Err(CliError::InvalidArgument("--run-for must be at least 1".into()));
    }

    let roster = on_call_roster(&policies);
    let engine = EscalationEngine::builder()
        .config(config)
        .policies(Arc::new(policies))
        .roster(Arc::new(roster))
        .channels(Arc::new(ChannelRegistry::with_log_fallback()))
        .build();

    let mut events = engine.subscribe(AlertFilter::new().subject(args.subject.clone()));
    format.write_header::<_, AlertEvent>(out)?;

    let started = Instant::now();
    let alert = engine.report_condition(
        &args.subject,
        args.kind,
        args.value,
        args.threshold,
        args.severity,
    )?;
    info!(alert_id = %alert.id, level = alert.level, "simulation started");

    let stop = tokio::time::sleep(Duration::from_secs(args.run_for));
    tokio::pin!(stop);
    let ack_deadline = args.ack_after.map(|secs| started + Duration::from_secs(secs));
    let mut acked = false;

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                format.write_line(out, &event)?;
                if event.alert.id == alert.id && !event.alert.is_active() {
                    break;
                }
            }
            () = wait_for(ack_deadline), if !acked => {
                acked = true;
                engine.acknowledge(&alert.id, &args.ack_by)?;
            }
            () = &mut stop => {
                info!(run_for = args.run_for, "simulation time limit reached");
                break;
            }
        }
    }

    let state = engine.get_state(&alert.id)?;
    let latency = engine
        .acknowledgments()
        .into_iter()
        .find(|record| record.alert_id == alert.id)
        .and_then(|record| u64::try_from(record.response_latency_ms).ok());
    engine.shutdown();

    Ok(SimulationSummary {
        alert_id: state.id,
        subject_id: state.subject_id,
        kind: state.kind,
        severity: state.severity,
        policy_source: state.policy_source,
        status: state.status,
        level: state.level,
        max_level: state.max_level,
        dispatches: state.notified_tiers.len(),
        repeat_count: state.repeat_count,
        ack_by: state.ack_by,
        response_latency_ms: latency,
        elapsed_secs: started.elapsed().as_secs(),
    })
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One log-channel contact for every tier any ladder names, plus the
/// generic fallback tier.
fn on_call_roster(policies: &PolicyStore) -> StaticRoster {
    let mut tiers = BTreeSet::from([ALL_ASSIGNED_TIER.to_string()]);
    for entry in policies.snapshot().to_file().policies {
        tiers.extend(entry.ladder.steps().iter().map(|step| step.tier.clone()));
    }

    let roster = StaticRoster::new();
    for tier in tiers {
        let contact = Contact::new(format!("{tier}-on-call"), format!("log://{tier}"));
        roster.set_tier(tier, vec![contact]);
    }
    roster
}

impl TableRow for AlertEvent {
    fn write_header<W: Write>(writer: &mut W) -> Result<(), CliError> {
        writeln!(
            writer,
            "{:<8}  {:<16}  {:>5}  {:<12}  {}",
            "TIME", "EVENT", "LEVEL", "STATUS", "LAST TIER"
        )?;
        writeln!(writer, "{}", "─".repeat(64))?;
        Ok(())
    }

    fn write_row<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let tier = self
            .alert
            .last_record()
            .map_or("-", |record| record.tier.as_str());
        writeln!(
            writer,
            "{:<8}  {:<16}  {:>5}  {:<12}  {}",
            self.at.format("%H:%M:%S"),
            self.kind,
            format!("{}/{}", self.alert.level, self.alert.max_level),
            self.alert.status,
            tier
        )?;
        Ok(())
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    /// The simulated alert.
    pub alert_id: String,
    /// Its subject.
    pub subject_id: String,
    /// Its kind.
    pub kind: AlertKind,
    /// Its severity.
    pub severity: Severity,
    /// Fallback rung that produced the ladder.
    pub policy_source: PolicySource,
    /// Final status.
    pub status: AlertStatus,
    /// Final level.
    pub level: usize,
    /// Highest level of the ladder.
    pub max_level: usize,
    /// Number of dispatches made.
    pub dispatches: usize,
    /// Repeats at the top level.
    pub repeat_count: u32,
    /// Who acknowledged, if anyone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_by: Option<String>,
    /// Time from trigger to acknowledgment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_latency_ms: Option<u64>,
    /// Wall time the simulation ran.
    pub elapsed_secs: u64,
}

impl TableDisplay for SimulationSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Simulation Summary")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Alert:            {}", self.alert_id)?;
        writeln!(writer, "Subject:          {}", self.subject_id)?;
        writeln!(writer, "Kind:             {} / {}", self.kind, self.severity)?;
        writeln!(writer, "Policy:           {}", self.policy_source)?;
        writeln!(writer, "Status:           {}", self.status)?;
        writeln!(writer, "Level:            {}/{}", self.level, self.max_level)?;
        writeln!(writer, "Dispatches:       {}", self.dispatches)?;
        writeln!(writer, "Repeats:          {}", self.repeat_count)?;
        if let Some(ack_by) = &self.ack_by {
            writeln!(writer, "Acknowledged by:  {ack_by}")?;
        }
        if let Some(latency) = self.response_latency_ms {
            writeln!(writer, "Response time:    {latency} ms")?;
        }
        writeln!(writer, "Elapsed:          {}s", self.elapsed_secs)?;
        Ok(())
    }
}
