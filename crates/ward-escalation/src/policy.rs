//! Escalation policies and their resolution.
//!
//! A policy maps an alert kind (and optionally a severity) to an
//! [`EscalationLadder`]: the ordered steps an unacknowledged alert climbs.
//! [`PolicyStore::resolve`] walks a fixed fallback chain:
//!
//! 1. the ladder for the exact `(kind, severity)`;
//! 2. the kind's default ladder;
//! 3. a generic single-step ladder that notifies all assigned staff in-app
//!    and never escalates.
//!
//! Each fallback is logged and counted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EscalationError, Result};
use crate::types::{AlertKind, ChannelKind, PolicySource, Severity};

/// Tier name used by the generic fallback ladder.
pub const ALL_ASSIGNED_TIER: &str = "all-assigned";

/// Longest wait a ladder step may configure (one week).
pub const MAX_STEP_DELAY_SECS: u64 = 7 * 86_400;

/// One rung of an escalation ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Wait at the previous level before this step is reached (seconds).
    /// For the top step this is also the repeat interval.
    pub delay_secs: u64,
    /// The responder tier to notify.
    pub tier: String,
    /// The channel to notify the tier on.
    pub channel: ChannelKind,
}

impl EscalationStep {
    /// Creates a step.
    #[must_use]
    pub fn new(delay_secs: u64, tier: impl Into<String>, channel: ChannelKind) -> Self {
        Self {
            delay_secs,
            tier: tier.into(),
            channel,
        }
    }

    /// Returns the delay as a [`Duration`].
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// An ordered, non-empty list of escalation steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EscalationStep>", into = "Vec<EscalationStep>")]
pub struct EscalationLadder {
    steps: Vec<EscalationStep>,
}

impl EscalationLadder {
    /// Creates a ladder.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::InvalidPolicy` if the ladder is empty, a
    /// step has an empty tier name, or a delay exceeds
    /// [`MAX_STEP_DELAY_SECS`].
    pub fn new(steps: Vec<EscalationStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(EscalationError::InvalidPolicy {
                reason: "escalation ladder cannot be empty".to_string(),
            });
        }
        if let Some(pos) = steps.iter().position(|s| s.tier.trim().is_empty()) {
            return Err(EscalationError::InvalidPolicy {
                reason: format!("step {pos} has an empty tier name"),
            });
        }
        if let Some(pos) = steps.iter().position(|s| s.delay_secs > MAX_STEP_DELAY_SECS) {
            return Err(EscalationError::InvalidPolicy {
                reason: format!(
                    "step {pos} delay {}s exceeds the {MAX_STEP_DELAY_SECS}s limit",
                    steps[pos].delay_secs
                ),
            });
        }
        Ok(Self { steps })
    }

    /// The ladder used when nothing is configured for a kind.
    #[must_use]
    pub fn generic(repeat_secs: u64) -> Self {
        Self {
            steps: vec![EscalationStep::new(
                repeat_secs,
                ALL_ASSIGNED_TIER,
                ChannelKind::InApp,
            )],
        }
    }

    /// Returns the steps.
    #[must_use]
    pub fn steps(&self) -> &[EscalationStep] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; ladders cannot be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the top step.
    #[must_use]
    pub fn max_level(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Returns the step for a level, clamped to the top step.
    #[must_use]
    pub fn step(&self, level: usize) -> &EscalationStep {
        &self.steps[level.min(self.max_level())]
    }

    /// How long to wait at `level` before escalating to `level + 1`.
    ///
    /// `None` at the top level, where the alert repeats instead.
    #[must_use]
    pub fn escalation_delay(&self, level: usize) -> Option<Duration> {
        self.steps.get(level + 1).map(EscalationStep::delay)
    }

    /// Interval between re-dispatches at the top level.
    #[must_use]
    pub fn repeat_interval(&self) -> Duration {
        self.step(self.max_level()).delay()
    }

    /// Wait before the next timer action at `level`, with the repeat
    /// interval raised to at least `min_repeat`.
    #[must_use]
    pub fn wait_at(&self, level: usize, min_repeat: Duration) -> Duration {
        self.escalation_delay(level)
            .unwrap_or_else(|| self.repeat_interval().max(min_repeat))
    }
}

impl TryFrom<Vec<EscalationStep>> for EscalationLadder {
    type Error = EscalationError;

    fn try_from(steps: Vec<EscalationStep>) -> Result<Self> {
        Self::new(steps)
    }
}

impl From<EscalationLadder> for Vec<EscalationStep> {
    fn from(ladder: EscalationLadder) -> Self {
        ladder.steps
    }
}

/// A ladder together with the fallback rung that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// The ladder to climb.
    pub ladder: Arc<EscalationLadder>,
    /// Where the ladder came from.
    pub source: PolicySource,
}

/// One entry of a policy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// The alert kind.
    pub kind: AlertKind,
    /// The severity; omitted for the kind's default ladder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// The ladder.
    pub ladder: EscalationLadder,
}

/// Serialized form of a policy set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFile {
    /// All entries.
    pub policies: Vec<PolicyEntry>,
}

/// An immutable snapshot of configured ladders.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    exact: HashMap<(AlertKind, Severity), Arc<EscalationLadder>>,
    kind_defaults: HashMap<AlertKind, Arc<EscalationLadder>>,
}

impl PolicySet {
    /// Creates an empty policy set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ladder for an exact kind and severity.
    pub fn insert(&mut self, kind: AlertKind, severity: Severity, ladder: EscalationLadder) {
        self.exact.insert((kind, severity), Arc::new(ladder));
    }

    /// Sets the default ladder for a kind.
    pub fn insert_default(&mut self, kind: AlertKind, ladder: EscalationLadder) {
        self.kind_defaults.insert(kind, Arc::new(ladder));
    }

    /// Returns the number of configured ladders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.kind_defaults.len()
    }

    /// Returns true if nothing is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts to the serialized form, sorted by kind then severity.
    #[must_use]
    pub fn to_file(&self) -> PolicyFile {
        let mut policies: Vec<PolicyEntry> = self
            .kind_defaults
            .iter()
            .map(|(kind, ladder)| PolicyEntry {
                kind: *kind,
                severity: None,
                ladder: ladder.as_ref().clone(),
            })
            .chain(self.exact.iter().map(|((kind, severity), ladder)| PolicyEntry {
                kind: *kind,
                severity: Some(*severity),
                ladder: ladder.as_ref().clone(),
            }))
            .collect();
        policies.sort_by_key(|p| (p.kind, p.severity));
        PolicyFile { policies }
    }
}

impl From<PolicyFile> for PolicySet {
    fn from(file: PolicyFile) -> Self {
        let mut set = Self::new();
        for entry in file.policies {
            match entry.severity {
                Some(severity) => set.insert(entry.kind, severity, entry.ladder),
                None => set.insert_default(entry.kind, entry.ladder),
            }
        }
        set
    }
}

/// Thread-safe holder of the current [`PolicySet`].
///
/// Readers take an `Arc` snapshot, so a configuration swap never blocks
/// resolution for longer than a pointer clone.
#[derive(Debug)]
pub struct PolicyStore {
    current: RwLock<Arc<PolicySet>>,
    generic: Arc<EscalationLadder>,
    fallbacks: AtomicU64,
}

impl PolicyStore {
    /// Creates a store with the given policies.
    #[must_use]
    pub fn new(set: PolicySet, generic_repeat_secs: u64) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
            generic: Arc::new(EscalationLadder::generic(generic_repeat_secs)),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Parses a policy set from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a ladder is invalid.
    pub fn from_json(json: &str, generic_repeat_secs: u64) -> Result<Self> {
        let file: PolicyFile = serde_json::from_str(json)?;
        Ok(Self::new(file.into(), generic_repeat_secs))
    }

    /// Loads a policy set from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: impl AsRef<Path>, generic_repeat_secs: u64) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw, generic_repeat_secs)
    }

    /// Atomically swaps in a new policy set.
    ///
    /// Alerts already escalating keep the ladder they were created with.
    pub fn replace(&self, set: PolicySet) {
        info!(ladders = set.len(), "replaced escalation policies");
        *self.current.write() = Arc::new(set);
    }

    /// Returns the current policy snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySet> {
        Arc::clone(&self.current.read())
    }

    /// Resolves the ladder for a kind and severity.
    #[must_use]
    pub fn resolve(&self, kind: AlertKind, severity: Severity) -> ResolvedPolicy {
        let set = self.snapshot();

        if let Some(ladder) = set.exact.get(&(kind, severity)) {
            debug!(%kind, %severity, steps = ladder.len(), "resolved exact policy");
            return ResolvedPolicy {
                ladder: Arc::clone(ladder),
                source: PolicySource::Exact,
            };
        }

        self.fallbacks.fetch_add(1, Ordering::Relaxed);

        if let Some(ladder) = set.kind_defaults.get(&kind) {
            warn!(
                %kind,
                %severity,
                steps = ladder.len(),
                "no policy for severity, falling back to kind default ladder"
            );
            return ResolvedPolicy {
                ladder: Arc::clone(ladder),
                source: PolicySource::KindDefault,
            };
        }

        warn!(
            %kind,
            %severity,
            tier = ALL_ASSIGNED_TIER,
            "no policy for kind, falling back to generic notify-all ladder"
        );
        ResolvedPolicy {
            ladder: Arc::clone(&self.generic),
            source: PolicySource::Generic,
        }
    }

    /// Number of resolutions that fell back.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(PolicySet::new(), 300)
    }
}
