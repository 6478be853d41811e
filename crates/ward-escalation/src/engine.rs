//! The escalation engine.
//!
//! [`EscalationEngine`] is the command surface collaborators use. It owns the
//! alert store, the per-alert timers, the dispatcher and the ledger, and
//! drives every lifecycle transition:
//! - Creating alerts from condition reports and paging tier 0
//! - Escalating (or repeating) when a timer fires unacknowledged
//! - Closing alerts on acknowledgment, resolution or expiry
//! - Snoozing and manual escalation
//!
//! All commands are synchronous. Each takes the alert's row lock, applies
//! the transition, re-arms or cancels its timer, and releases the lock
//! before any page is handed to a delivery task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::channels::ChannelRegistry;
use crate::clock::EngineClock;
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchPlan, Dispatcher};
use crate::error::{EscalationError, Result};
use crate::ledger::{AcknowledgmentLedger, AcknowledgmentRecord, EngineMetrics, ExternalCounters};
use crate::policy::{PolicySet, PolicyStore};
use crate::roster::{AlwaysMonitored, SharedLifecycle, SharedRoster, StaticRoster};
use crate::scheduler::{Scheduler, TimerPurpose, TimerStamp};
use crate::store::{AlertRow, AlertStore, RowHandle};
use crate::stream::{AlertEventKind, AlertFilter, AlertStream};
use crate::types::{AlertInstance, AlertKind, DispatchReason, Severity};

/// Subject of the alerts the engine raises about itself.
pub const ENGINE_SUBJECT: &str = "escalation-engine";

/// `resolved_by` recorded when the condition source clears an alert.
pub const CONDITION_SOURCE: &str = "condition-source";

/// Resolution reason recorded when the condition source clears an alert.
pub const CONDITION_CLEARED: &str = "condition cleared";

/// Expiry reason recorded by [`EscalationEngine::sweep_unmonitored`].
pub const UNMONITORED: &str = "subject no longer monitored";

/// Longest snooze a responder may request (one day).
pub const MAX_SNOOZE_SECS: u64 = 86_400;

fn span(secs: u64) -> chrono::Duration {
    chrono::Duration::from_std(Duration::from_secs(secs)).unwrap_or(chrono::Duration::MAX)
}

/// Builder for [`EscalationEngine`].
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    policies: Option<Arc<PolicyStore>>,
    roster: Option<SharedRoster>,
    lifecycle: Option<SharedLifecycle>,
    channels: Option<Arc<ChannelRegistry>>,
    clock: Option<EngineClock>,
}

impl EngineBuilder {
    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the policy store.
    #[must_use]
    pub fn policies(mut self, policies: Arc<PolicyStore>) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Sets the roster directory.
    #[must_use]
    pub fn roster(mut self, roster: SharedRoster) -> Self {
        self.roster = Some(roster);
        self
    }

    /// Sets the subject lifecycle.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: SharedLifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Sets the channel registry.
    #[must_use]
    pub fn channels(mut self, channels: Arc<ChannelRegistry>) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Sets the clock.
    #[must_use]
    pub const fn clock(mut self, clock: EngineClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> EscalationEngine {
        let config = self.config;
        let clock = self.clock.unwrap_or_default();
        let policies = self.policies.unwrap_or_else(|| {
            Arc::new(PolicyStore::new(PolicySet::new(), config.generic_repeat_secs))
        });
        let roster = self
            .roster
            .unwrap_or_else(|| Arc::new(StaticRoster::new()));
        let lifecycle = self.lifecycle.unwrap_or_else(|| Arc::new(AlwaysMonitored));
        let channels = self
            .channels
            .unwrap_or_else(|| Arc::new(ChannelRegistry::with_log_fallback()));

        let store = Arc::new(AlertStore::new(config.event_buffer_size));
        let dispatcher = Arc::new(Dispatcher::new(
            roster,
            channels,
            Arc::clone(&store),
            config.delivery.clone(),
            clock,
        ));

        let inner = Arc::new_cyclic(|this| EngineInner {
            config,
            clock,
            policies,
            lifecycle,
            store,
            scheduler: Arc::new(Scheduler::new()),
            dispatcher,
            ledger: AcknowledgmentLedger::new(),
            scheduler_faults: AtomicU64::new(0),
            this: this.clone(),
        });

        EscalationEngine { inner }
    }
}

/// The clinical alert escalation engine.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct EscalationEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    clock: EngineClock,
    policies: Arc<PolicyStore>,
    lifecycle: SharedLifecycle,
    store: Arc<AlertStore>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<Dispatcher>,
    ledger: AcknowledgmentLedger,
    scheduler_faults: AtomicU64,
    this: Weak<EngineInner>,
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationEngine {
    /// Creates an engine with default configuration, an empty roster and a
    /// log channel for every kind.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates an engine with custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the policy store.
    #[must_use]
    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.inner.policies
    }

    /// Returns the channel registry.
    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        self.inner.dispatcher.channels()
    }

    // ============ Condition Intake ============

    /// Reports a reading that crossed its threshold.
    ///
    /// Creates a level-0 alert and pages tier 0 when nothing is open for
    /// `(subject_id, kind)`; otherwise records the newer reading on the open
    /// alert and leaves its level and timer alone.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank subject or a reading or threshold
    /// that is not a finite number.
    pub fn report_condition(
        &self,
        subject_id: &str,
        kind: AlertKind,
        value: f64,
        threshold: f64,
        severity: Severity,
    ) -> Result<AlertInstance> {
        if subject_id.trim().is_empty() {
            return Err(EscalationError::InvalidInput {
                reason: "subject id cannot be blank".to_string(),
            });
        }
        if !value.is_finite() || !threshold.is_finite() {
            return Err(EscalationError::InvalidInput {
                reason: format!("reading {value} / threshold {threshold} must be finite"),
            });
        }
        Ok(self
            .inner
            .report(subject_id, kind, value, threshold, severity, true))
    }

    /// Resolves the open alert for `(subject_id, kind)` because the reading
    /// returned to range. Returns `None` when nothing was open.
    pub fn clear_condition(&self, subject_id: &str, kind: AlertKind) -> Result<Option<AlertInstance>> {
        let Some(alert_id) = self.inner.store.open_id(subject_id, kind) else {
            debug!(subject = %subject_id, %kind, "clear for subject with no open alert");
            return Ok(None);
        };
        match self.resolve(&alert_id, CONDITION_SOURCE, CONDITION_CLEARED) {
            Ok(alert) => Ok(Some(alert)),
            Err(EscalationError::NotFound { .. }) => Ok(None),
            Err(EscalationError::Conflict { status, .. }) if status.is_terminal() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ============ Responder Commands ============

    /// Acknowledges an alert and stops its escalation.
    ///
    /// Acknowledging an alert that is already acknowledged or resolved
    /// returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Conflict` for an expired
    /// alert.
    pub fn acknowledge(&self, alert_id: &str, ack_by: &str) -> Result<AlertInstance> {
        self.inner.acknowledge(alert_id, ack_by)
    }

    /// Resolves an alert.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, and `Conflict` for an expired
    /// alert or one already resolved with a different reason.
    pub fn resolve(&self, alert_id: &str, resolved_by: &str, reason: &str) -> Result<AlertInstance> {
        let result = self.inner.resolve(alert_id, resolved_by, reason);
        self.inner.prune_archive();
        result
    }

    /// Administratively expires an alert whose subject is no longer
    /// monitored.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Conflict` for a resolved
    /// alert.
    pub fn expire(&self, alert_id: &str, reason: &str) -> Result<AlertInstance> {
        let result = self.inner.expire(alert_id, reason);
        self.inner.prune_archive();
        result
    }

    /// Expires every open alert whose subject the lifecycle reports as no
    /// longer monitored. Returns the expired alerts.
    pub fn sweep_unmonitored(&self) -> Vec<AlertInstance> {
        let stale: Vec<AlertInstance> = self
            .inner
            .store
            .snapshot_open()
            .into_iter()
            .filter(|a| !self.inner.lifecycle.is_monitored(&a.subject_id))
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for alert in stale {
            match self.inner.expire(&alert.id, UNMONITORED) {
                Ok(alert) => expired.push(alert),
                Err(e) => debug!(alert_id = %alert.id, error = %e, "skipped during sweep"),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired alerts for unmonitored subjects");
            self.inner.prune_archive();
        }
        expired
    }

    /// Suppresses paging for `duration_secs`. When the snooze runs out the
    /// alert waits the full delay of its current level again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when `duration_secs` exceeds
    /// [`MAX_SNOOZE_SECS`], `NotFound` for an unknown id and `Conflict`
    /// unless the alert is active.
    pub fn snooze(&self, alert_id: &str, duration_secs: u64) -> Result<AlertInstance> {
        if duration_secs > MAX_SNOOZE_SECS {
            return Err(EscalationError::InvalidInput {
                reason: format!("snooze of {duration_secs}s exceeds the {MAX_SNOOZE_SECS}s limit"),
            });
        }
        self.inner.snooze(alert_id, duration_secs)
    }

    /// Escalates an active alert one level now and pages the new tier. At
    /// the top level this re-pages the top tier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Conflict` unless the alert
    /// is active.
    pub fn escalate_now(&self, alert_id: &str) -> Result<AlertInstance> {
        self.inner.escalate_now(alert_id)
    }

    // ============ Queries ============

    /// Returns an alert, open or archived.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_state(&self, alert_id: &str) -> Result<AlertInstance> {
        Ok(self.inner.row(alert_id)?.lock().instance.clone())
    }

    /// Returns the open alert for `(subject_id, kind)`.
    #[must_use]
    pub fn find_open(&self, subject_id: &str, kind: AlertKind) -> Option<AlertInstance> {
        let alert_id = self.inner.store.open_id(subject_id, kind)?;
        let row = self.inner.store.get(&alert_id)?;
        let alert = row.lock().instance.clone();
        alert.status.is_open().then_some(alert)
    }

    /// Returns every open alert, oldest first.
    #[must_use]
    pub fn open_alerts(&self) -> Vec<AlertInstance> {
        let mut alerts = self.inner.store.snapshot_open();
        alerts.sort_by_key(|a| a.triggered_at);
        alerts
    }

    /// Returns every alert still held, open or archived, oldest first.
    #[must_use]
    pub fn list_alerts(&self) -> Vec<AlertInstance> {
        let mut alerts = self.inner.store.snapshot_all();
        alerts.sort_by_key(|a| a.triggered_at);
        alerts
    }

    /// Subscribes to alert changes.
    #[must_use]
    pub fn subscribe(&self, filter: AlertFilter) -> AlertStream {
        self.inner.store.subscribe(filter)
    }

    /// Returns the most recent acknowledgments.
    #[must_use]
    pub fn acknowledgments(&self) -> Vec<AcknowledgmentRecord> {
        self.inner.ledger.recent_acknowledgments()
    }

    /// Returns a metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> EngineMetrics {
        let inner = &self.inner;
        let stats = inner.dispatcher.stats();
        inner.ledger.snapshot(ExternalCounters {
            deliveries_succeeded: stats.succeeded.load(Ordering::Relaxed),
            deliveries_failed: stats.failed.load(Ordering::Relaxed),
            deliveries_cancelled: stats.cancelled.load(Ordering::Relaxed),
            policy_fallbacks: inner.policies.fallback_count(),
            scheduler_faults: inner.scheduler_faults.load(Ordering::Relaxed),
            open_alerts: inner.store.snapshot_open().len(),
        })
    }

    /// Returns the number of armed timers.
    #[must_use]
    pub fn armed_timers(&self) -> usize {
        self.inner.scheduler.armed_count()
    }

    /// Cancels every timer and pending delivery retry. Alerts keep their
    /// state; nothing escalates afterwards.
    pub fn shutdown(&self) {
        let timers = self.inner.scheduler.cancel_all();
        for alert_id in self.inner.store.open_ids() {
            if let Some(row) = self.inner.store.get(&alert_id) {
                row.lock().cancel.cancel();
            }
        }
        info!(timers, "escalation engine stopped");
    }
}

impl EngineInner {
    fn row(&self, alert_id: &str) -> Result<RowHandle> {
        self.store.get(alert_id).ok_or_else(|| EscalationError::NotFound {
            id: alert_id.to_string(),
        })
    }

    fn report(
        &self,
        subject_id: &str,
        kind: AlertKind,
        value: f64,
        threshold: f64,
        severity: Severity,
        timers: bool,
    ) -> AlertInstance {
        loop {
            let now = self.clock.now();
            let (handle, created) = self.store.open_or_insert(subject_id, kind, || {
                let policy = self.policies.resolve(kind, severity);
                let instance = AlertInstance::new(
                    subject_id,
                    kind,
                    severity,
                    value,
                    threshold,
                    policy.ladder.max_level(),
                    policy.source,
                    now,
                );
                let row = AlertRow::new(instance, policy.ladder);
                if timers { row } else { row.without_timers() }
            });

            let mut row = handle.lock();

            if created {
                self.ledger.record_triggered();
                info!(
                    alert_id = %row.instance.id,
                    subject = %subject_id,
                    %kind,
                    %severity,
                    value,
                    threshold,
                    max_level = row.instance.max_level,
                    policy = ?row.instance.policy_source,
                    "alert created"
                );
                self.store.publish(AlertEventKind::Created, &row.instance, now);
                let plan = self.dispatcher.prepare(&mut row, DispatchReason::Initial);
                let fault = self.arm_escalation(&mut row).err();
                let snapshot = row.instance.clone();
                drop(row);
                self.finish_transition(plan, fault, &snapshot);
                return snapshot;
            }

            if !row.instance.status.is_open() {
                // Lost a race with a closing transition; the next pass creates a fresh alert.
                let alert_id = row.instance.id.clone();
                drop(row);
                self.store.close_open(subject_id, kind, &alert_id);
                continue;
            }

            row.instance.update_trigger_value(value);
            debug!(
                alert_id = %row.instance.id,
                subject = %subject_id,
                %kind,
                value,
                "updated reading on open alert"
            );
            self.store.publish(AlertEventKind::Updated, &row.instance, now);
            return row.instance.clone();
        }
    }

    fn acknowledge(&self, alert_id: &str, ack_by: &str) -> Result<AlertInstance> {
        let handle = self.row(alert_id)?;
        let mut row = handle.lock();
        let now = self.clock.now();

        if !row.instance.acknowledge(ack_by, now)? {
            debug!(alert_id = %alert_id, status = %row.instance.status, "acknowledge is a no-op");
            return Ok(row.instance.clone());
        }

        self.scheduler.cancel(alert_id);
        row.cancel.cancel();
        self.ledger.record_closed(&row.instance);
        if let Some(record) = self.ledger.record_acknowledged(&row.instance) {
            info!(
                alert_id = %alert_id,
                ack_by = %ack_by,
                level = record.level,
                latency_ms = record.response_latency_ms,
                "alert acknowledged"
            );
        }
        self.store.publish(AlertEventKind::Acknowledged, &row.instance, now);
        Ok(row.instance.clone())
    }

    fn resolve(&self, alert_id: &str, resolved_by: &str, reason: &str) -> Result<AlertInstance> {
        let handle = self.row(alert_id)?;
        let mut row = handle.lock();
        let now = self.clock.now();
        let was_active = row.instance.is_active();

        if !row.instance.resolve(resolved_by, reason, now)? {
            debug!(alert_id = %alert_id, "resolve is a no-op");
            return Ok(row.instance.clone());
        }

        self.close(&mut row, was_active);
        self.ledger.record_resolved();
        info!(
            alert_id = %alert_id,
            resolved_by = %resolved_by,
            reason = %reason,
            level = row.instance.level,
            "alert resolved"
        );
        self.store.publish(AlertEventKind::Resolved, &row.instance, now);
        Ok(row.instance.clone())
    }

    fn expire(&self, alert_id: &str, reason: &str) -> Result<AlertInstance> {
        let handle = self.row(alert_id)?;
        let mut row = handle.lock();
        let now = self.clock.now();
        let was_active = row.instance.is_active();

        if !row.instance.expire(reason, now)? {
            debug!(alert_id = %alert_id, "expire is a no-op");
            return Ok(row.instance.clone());
        }

        self.close(&mut row, was_active);
        self.ledger.record_expired();
        info!(alert_id = %alert_id, reason = %reason, "alert expired");
        self.store.publish(AlertEventKind::Expired, &row.instance, now);
        Ok(row.instance.clone())
    }

    fn snooze(&self, alert_id: &str, duration_secs: u64) -> Result<AlertInstance> {
        let handle = self.row(alert_id)?;
        let mut row = handle.lock();
        let now = self.clock.now();

        let until = now
            .checked_add_signed(span(duration_secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        row.instance.snooze(until)?;
        info!(alert_id = %alert_id, duration_secs, level = row.instance.level, "alert snoozed");
        self.store.publish(AlertEventKind::Snoozed, &row.instance, now);

        let fault = self
            .arm(&mut row, TimerPurpose::SnoozeExpiry, Duration::from_secs(duration_secs))
            .err();
        let snapshot = row.instance.clone();
        drop(row);
        self.finish_transition(None, fault, &snapshot);
        Ok(snapshot)
    }

    fn escalate_now(&self, alert_id: &str) -> Result<AlertInstance> {
        let handle = self.row(alert_id)?;
        let mut row = handle.lock();
        let now = self.clock.now();

        if !row.instance.is_active() {
            return Err(EscalationError::conflict(
                alert_id,
                row.instance.status,
                "only active alerts can be escalated",
            ));
        }
        if row.instance.snoozed_until.is_some() {
            row.instance.end_snooze();
        }

        self.step_up(&mut row, now);
        info!(alert_id = %alert_id, level = row.instance.level, "manual escalation");
        let plan = self.dispatcher.prepare(&mut row, DispatchReason::Manual);
        let fault = self.arm_escalation(&mut row).err();
        let snapshot = row.instance.clone();
        drop(row);
        self.finish_transition(plan, fault, &snapshot);
        Ok(snapshot)
    }

    // ============ Timers ============

    fn on_timer(&self, stamp: &TimerStamp) {
        let Some(handle) = self.store.get(&stamp.alert_id) else {
            debug!(alert_id = %stamp.alert_id, "timer fired for unknown alert");
            return;
        };
        let mut row = handle.lock();

        if !row.instance.is_active() || row.instance.version != stamp.version {
            debug!(
                alert_id = %stamp.alert_id,
                stamp_version = stamp.version,
                stamp_level = stamp.level,
                current_version = row.instance.version,
                status = %row.instance.status,
                "stale timer ignored"
            );
            return;
        }

        let now = self.clock.now();
        let (plan, fault) = match stamp.purpose {
            TimerPurpose::Escalate => {
                let reason = self.step_up(&mut row, now);
                let plan = self.dispatcher.prepare(&mut row, reason);
                (plan, self.arm_escalation(&mut row).err())
            }
            TimerPurpose::SnoozeExpiry => {
                row.instance.end_snooze();
                info!(alert_id = %stamp.alert_id, level = row.instance.level, "snooze ended");
                self.store.publish(AlertEventKind::SnoozeEnded, &row.instance, now);
                (None, self.arm_escalation(&mut row).err())
            }
        };

        let snapshot = row.instance.clone();
        drop(row);
        self.finish_transition(plan, fault, &snapshot);
    }

    /// Raises the level by one, or counts a repeat at the top level.
    fn step_up(&self, row: &mut AlertRow, now: DateTime<Utc>) -> DispatchReason {
        let alert = &mut row.instance;
        if alert.escalate(now) {
            info!(
                alert_id = %alert.id,
                level = alert.level,
                max_level = alert.max_level,
                "alert escalated"
            );
            if alert.at_max_level() {
                self.ledger.record_reached_max();
            }
            self.store.publish(AlertEventKind::Escalated, alert, now);
            DispatchReason::Escalation
        } else {
            if !alert.reached_max_unacknowledged {
                self.ledger.record_reached_max();
            }
            alert.record_repeat();
            info!(
                alert_id = %alert.id,
                level = alert.level,
                repeats = alert.repeat_count,
                "repeating top tier"
            );
            self.store.publish(AlertEventKind::Repeated, alert, now);
            DispatchReason::Repeat
        }
    }

    fn arm_escalation(&self, row: &mut AlertRow) -> Result<()> {
        let wait = row
            .ladder
            .wait_at(row.instance.level, self.config.min_repeat_interval());
        self.arm(row, TimerPurpose::Escalate, wait)
    }

    fn arm(&self, row: &mut AlertRow, purpose: TimerPurpose, delay: Duration) -> Result<()> {
        if !row.timers_enabled {
            return Ok(());
        }

        let stamp = TimerStamp {
            alert_id: row.instance.id.clone(),
            version: row.instance.version,
            level: row.instance.level,
            purpose,
        };
        let engine = self.this.clone();
        let armed = self.scheduler.arm(stamp, delay, move |stamp| {
            if let Some(engine) = engine.upgrade() {
                engine.on_timer(&stamp);
            }
        });

        match armed {
            Ok(()) => {
                row.instance.escalation_stalled = false;
                Ok(())
            }
            Err(e) => {
                row.instance.escalation_stalled = true;
                self.scheduler_faults.fetch_add(1, Ordering::Relaxed);
                error!(
                    alert_id = %row.instance.id,
                    level = row.instance.level,
                    error = %e,
                    "escalation stalled"
                );
                self.store
                    .publish(AlertEventKind::Stalled, &row.instance, self.clock.now());
                Err(e)
            }
        }
    }

    /// Work done after the row lock is released.
    fn finish_transition(
        &self,
        plan: Option<DispatchPlan>,
        fault: Option<EscalationError>,
        alert: &AlertInstance,
    ) {
        if let Some(plan) = plan {
            debug!(alert_id = %alert.id, seq = plan.seq(), "launching delivery");
            self.dispatcher.launch(plan);
        }
        if let Some(fault) = fault {
            self.raise_engine_fault(alert, &fault);
        }
    }

    /// Pages about an alert the engine could not escalate. The fault alert
    /// itself never arms a timer.
    fn raise_engine_fault(&self, stalled: &AlertInstance, fault: &EscalationError) {
        if stalled.kind == AlertKind::EngineFault {
            return;
        }
        let faults = self.scheduler_faults.load(Ordering::Relaxed);
        warn!(
            stalled_alert = %stalled.id,
            error = %fault,
            faults,
            "raising engine fault alert"
        );
        self.report(
            ENGINE_SUBJECT,
            AlertKind::EngineFault,
            faults as f64,
            0.0,
            Severity::Critical,
            false,
        );
    }

    // ============ Closing ============

    fn close(&self, row: &mut AlertRow, was_active: bool) {
        self.scheduler.cancel(&row.instance.id);
        row.cancel.cancel();
        self.store
            .close_open(&row.instance.subject_id, row.instance.kind, &row.instance.id);
        if was_active {
            self.ledger.record_closed(&row.instance);
        }
    }

    fn prune_archive(&self) {
        self.store.prune_archive(
            self.clock.now(),
            span(self.config.archive_retention_secs),
            self.config.max_archived,
        );
    }
}
