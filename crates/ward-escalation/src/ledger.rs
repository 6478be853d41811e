//! Acknowledgment ledger and engine metrics.
//!
//! The ledger records who acknowledged what and how long it took, and keeps
//! the counters behind [`EngineMetrics`]. It is written by the engine at
//! each lifecycle transition; delivery and policy counters are merged in
//! when a snapshot is taken.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{AlertInstance, AlertKind, Severity};

const RECENT_ACKS: usize = 1024;

/// Latency samples kept per (kind, severity); older samples roll off.
pub const LATENCY_WINDOW: usize = 512;

/// One acknowledgment and the response latency it closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentRecord {
    /// The acknowledged alert.
    pub alert_id: String,
    /// The alert's kind.
    pub kind: AlertKind,
    /// The alert's severity.
    pub severity: Severity,
    /// Who acknowledged.
    pub ack_by: String,
    /// When the alert was acknowledged.
    pub ack_at: DateTime<Utc>,
    /// The level the alert was at when acknowledged.
    pub level: usize,
    /// `ack_at - triggered_at`, in milliseconds.
    pub response_latency_ms: i64,
}

impl AcknowledgmentRecord {
    /// Builds the record for an acknowledged alert.
    ///
    /// Returns `None` if the alert carries no acknowledgment.
    #[must_use]
    pub fn from_alert(alert: &AlertInstance) -> Option<Self> {
        let ack_at = alert.ack_at?;
        Some(Self {
            alert_id: alert.id.clone(),
            kind: alert.kind,
            severity: alert.severity,
            ack_by: alert.ack_by.clone().unwrap_or_default(),
            ack_at,
            level: alert.level,
            response_latency_ms: ack_at
                .signed_duration_since(alert.triggered_at)
                .num_milliseconds()
                .max(0),
        })
    }
}

/// Response latency statistics for one (kind, severity) pair, over the last
/// [`LATENCY_WINDOW`] acknowledgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Alert kind.
    pub kind: AlertKind,
    /// Alert severity.
    pub severity: Severity,
    /// Number of samples in the window.
    pub count: usize,
    /// Mean latency in milliseconds.
    pub mean_ms: f64,
    /// Median latency in milliseconds.
    pub p50_ms: i64,
    /// 90th percentile latency in milliseconds.
    pub p90_ms: i64,
    /// 99th percentile latency in milliseconds.
    pub p99_ms: i64,
}

impl LatencySummary {
    fn from_samples(kind: AlertKind, severity: Severity, mut sorted: Vec<i64>) -> Self {
        sorted.sort_unstable();
        let total: i64 = sorted.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_ms = if sorted.is_empty() {
            0.0
        } else {
            total as f64 / sorted.len() as f64
        };
        Self {
            kind,
            severity,
            count: sorted.len(),
            mean_ms,
            p50_ms: nearest_rank(&sorted, 50),
            p90_ms: nearest_rank(&sorted, 90),
            p99_ms: nearest_rank(&sorted, 99),
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
fn nearest_rank(sorted: &[i64], percentile: usize) -> i64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Point-in-time view of engine health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Alerts created.
    pub triggered: u64,
    /// Alerts acknowledged.
    pub acknowledged: u64,
    /// Alerts resolved.
    pub resolved: u64,
    /// Alerts expired.
    pub expired: u64,
    /// Alerts that stopped escalating (acknowledged, resolved or expired).
    pub closed: u64,
    /// Closed alerts that escalated past level 0.
    pub escalated: u64,
    /// Alerts that reached their top level while unacknowledged.
    pub reached_max_unacknowledged: u64,
    /// Highest level reached, counted per closed alert.
    pub depth_distribution: BTreeMap<usize, u64>,
    /// Response latency per (kind, severity).
    pub latency: Vec<LatencySummary>,
    /// Contacts reached.
    pub deliveries_succeeded: u64,
    /// Contacts not reached after every retry.
    pub deliveries_failed: u64,
    /// Deliveries stopped because the alert no longer needed them.
    pub deliveries_cancelled: u64,
    /// Policy lookups that fell back past an exact match.
    pub policy_fallbacks: u64,
    /// Timers that could not be armed.
    pub scheduler_faults: u64,
    /// Alerts currently open.
    pub open_alerts: usize,
    /// `escalated / closed`.
    pub escalation_rate: f64,
    /// `resolved / closed`.
    pub resolution_rate: f64,
}

/// Counters owned by other components, merged into a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExternalCounters {
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub deliveries_cancelled: u64,
    pub policy_fallbacks: u64,
    pub scheduler_faults: u64,
    pub open_alerts: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    triggered: u64,
    acknowledged: u64,
    resolved: u64,
    expired: u64,
    closed: u64,
    escalated: u64,
    reached_max: u64,
    depth: BTreeMap<usize, u64>,
    latencies: HashMap<(AlertKind, Severity), VecDeque<i64>>,
    recent: VecDeque<AcknowledgmentRecord>,
}

/// Records acknowledgments and lifecycle counts.
#[derive(Debug, Default)]
pub struct AcknowledgmentLedger {
    state: Mutex<LedgerState>,
}

impl AcknowledgmentLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_triggered(&self) {
        self.state.lock().triggered += 1;
    }

    pub(crate) fn record_reached_max(&self) {
        self.state.lock().reached_max += 1;
    }

    /// Records an acknowledgment and returns its ledger entry.
    pub(crate) fn record_acknowledged(&self, alert: &AlertInstance) -> Option<AcknowledgmentRecord> {
        let record = AcknowledgmentRecord::from_alert(alert)?;
        let mut state = self.state.lock();
        state.acknowledged += 1;
        let samples = state.latencies.entry((record.kind, record.severity)).or_default();
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(record.response_latency_ms);
        if state.recent.len() == RECENT_ACKS {
            state.recent.pop_front();
        }
        state.recent.push_back(record.clone());
        Some(record)
    }

    pub(crate) fn record_resolved(&self) {
        self.state.lock().resolved += 1;
    }

    pub(crate) fn record_expired(&self) {
        self.state.lock().expired += 1;
    }

    /// Records that an alert stopped escalating at its current level.
    pub(crate) fn record_closed(&self, alert: &AlertInstance) {
        let mut state = self.state.lock();
        state.closed += 1;
        if alert.level > 0 {
            state.escalated += 1;
        }
        *state.depth.entry(alert.level).or_default() += 1;
    }

    /// Returns the most recent acknowledgments, oldest first.
    #[must_use]
    pub fn recent_acknowledgments(&self) -> Vec<AcknowledgmentRecord> {
        self.state.lock().recent.iter().cloned().collect()
    }

    pub(crate) fn snapshot(&self, external: ExternalCounters) -> EngineMetrics {
        let state = self.state.lock();

        let samples: Vec<((AlertKind, Severity), Vec<i64>)> = state
            .latencies
            .iter()
            .map(|(key, window)| (*key, window.iter().copied().collect()))
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let rate = |n: u64| {
            if state.closed == 0 {
                0.0
            } else {
                n as f64 / state.closed as f64
            }
        };

        let metrics = EngineMetrics {
            triggered: state.triggered,
            acknowledged: state.acknowledged,
            resolved: state.resolved,
            expired: state.expired,
            closed: state.closed,
            escalated: state.escalated,
            reached_max_unacknowledged: state.reached_max,
            depth_distribution: state.depth.clone(),
            deliveries_succeeded: external.deliveries_succeeded,
            deliveries_failed: external.deliveries_failed,
            deliveries_cancelled: external.deliveries_cancelled,
            policy_fallbacks: external.policy_fallbacks,
            scheduler_faults: external.scheduler_faults,
            open_alerts: external.open_alerts,
            escalation_rate: rate(state.escalated),
            resolution_rate: rate(state.resolved),
            latency: Vec::new(),
        };
        drop(state);

        let mut latency: Vec<LatencySummary> = samples
            .into_iter()
            .map(|((kind, severity), window)| LatencySummary::from_samples(kind, severity, window))
            .collect();
        latency.sort_by_key(|s| (s.kind, s.severity));
        EngineMetrics { latency, ..metrics }
    }

    /// Number of latency samples held for a (kind, severity) pair.
    #[cfg(test)]
    fn sample_count(&self, kind: AlertKind, severity: Severity) -> usize {
        self.state
            .lock()
            .latencies
            .get(&(kind, severity))
            .map_or(0, VecDeque::len)
    }
}
