//! In-memory alert table with a per-row lock and an open-alert index.
//!
//! Every alert lives in its own [`AlertRow`] behind a `parking_lot::Mutex`,
//! so state transitions on one alert never wait on another. The table map
//! is only locked long enough to look up or insert a row. A secondary index
//! maps `(subject_id, kind)` to the alert currently open for that pair.
//!
//! Lock order: open index, then table map, then a row. A row lock may be
//! held while touching the open index, but never while inserting a row.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::policy::EscalationLadder;
use crate::stream::{AlertEvent, AlertEventKind, AlertFilter, AlertStream};
use crate::types::{AlertInstance, AlertKind, AlertStatus, DeliveryState};

/// One alert plus the engine-private state that travels with it.
#[derive(Debug)]
pub(crate) struct AlertRow {
    /// The public alert record.
    pub instance: AlertInstance,
    /// The ladder pinned when the alert was created.
    pub ladder: Arc<EscalationLadder>,
    /// Fired when the alert leaves `Active` for good; stops delivery retries.
    pub cancel: CancellationToken,
    /// Self-monitoring alerts never arm timers.
    pub timers_enabled: bool,
}

impl AlertRow {
    pub(crate) fn new(instance: AlertInstance, ladder: Arc<EscalationLadder>) -> Self {
        Self {
            instance,
            ladder,
            cancel: CancellationToken::new(),
            timers_enabled: true,
        }
    }

    pub(crate) fn without_timers(mut self) -> Self {
        self.timers_enabled = false;
        self
    }
}

/// Shared handle to a row.
pub(crate) type RowHandle = Arc<Mutex<AlertRow>>;

/// Alert table, open index and change-event publisher.
#[derive(Debug)]
pub(crate) struct AlertStore {
    rows: RwLock<HashMap<String, RowHandle>>,
    open: RwLock<HashMap<(String, AlertKind), String>>,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertStore {
    pub(crate) fn new(event_buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer_size.max(1));
        Self {
            rows: RwLock::new(HashMap::new()),
            open: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Returns the row open for `(subject_id, kind)`, or inserts the row
    /// built by `create`. The bool is true when a row was inserted.
    pub(crate) fn open_or_insert(
        &self,
        subject_id: &str,
        kind: AlertKind,
        create: impl FnOnce() -> AlertRow,
    ) -> (RowHandle, bool) {
        let key = (subject_id.to_string(), kind);
        let mut open = self.open.write();

        if let Some(id) = open.get(&key) {
            if let Some(row) = self.rows.read().get(id) {
                return (Arc::clone(row), false);
            }
        }

        let row = create();
        let id = row.instance.id.clone();
        let handle = Arc::new(Mutex::new(row));
        self.rows.write().insert(id.clone(), Arc::clone(&handle));
        open.insert(key, id);
        (handle, true)
    }

    /// Drops the open-index entry for a pair if it still points at `alert_id`.
    pub(crate) fn close_open(&self, subject_id: &str, kind: AlertKind, alert_id: &str) {
        let key = (subject_id.to_string(), kind);
        let mut open = self.open.write();
        if open.get(&key).is_some_and(|id| id == alert_id) {
            open.remove(&key);
        }
    }

    pub(crate) fn get(&self, alert_id: &str) -> Option<RowHandle> {
        self.rows.read().get(alert_id).cloned()
    }

    /// Returns the id of the alert open for a pair.
    pub(crate) fn open_id(&self, subject_id: &str, kind: AlertKind) -> Option<String> {
        self.open
            .read()
            .get(&(subject_id.to_string(), kind))
            .cloned()
    }

    /// Returns the ids of every open alert.
    pub(crate) fn open_ids(&self) -> Vec<String> {
        self.open.read().values().cloned().collect()
    }

    /// Snapshots every alert, open and archived.
    pub(crate) fn snapshot_all(&self) -> Vec<AlertInstance> {
        let rows: Vec<RowHandle> = self.rows.read().values().cloned().collect();
        rows.iter().map(|r| r.lock().instance.clone()).collect()
    }

    /// Snapshots every open alert.
    pub(crate) fn snapshot_open(&self) -> Vec<AlertInstance> {
        self.open_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .map(|r| r.lock().instance.clone())
            .filter(|a| a.status.is_open())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Publishes a change event. Having no subscribers is not an error.
    pub(crate) fn publish(&self, kind: AlertEventKind, alert: &AlertInstance, at: DateTime<Utc>) {
        let _ = self.events.send(AlertEvent {
            kind,
            at,
            alert: alert.clone(),
        });
    }

    pub(crate) fn subscribe(&self, filter: AlertFilter) -> AlertStream {
        AlertStream::new(self.events.subscribe(), filter)
    }

    /// Returns true if delivery for this alert should still go ahead.
    pub(crate) fn deliverable(&self, alert_id: &str, now: DateTime<Utc>) -> bool {
        self.get(alert_id).is_some_and(|row| {
            let row = row.lock();
            row.instance.status == AlertStatus::Active && !row.instance.is_snoozed(now)
        })
    }

    /// Counts one delivery attempt against a recipient.
    pub(crate) fn record_attempt(
        &self,
        alert_id: &str,
        seq: u64,
        recipient: usize,
        error: Option<String>,
    ) {
        let Some(row) = self.get(alert_id) else {
            return;
        };
        let mut row = row.lock();
        row.instance.contact_attempts += 1;
        if let Some(outcome) = row
            .instance
            .notified_tiers
            .get_mut(seq as usize)
            .and_then(|r| r.recipients.get_mut(recipient))
        {
            outcome.attempts += 1;
            if error.is_some() {
                outcome.last_error = error;
            }
        }
    }

    /// Sets a recipient's final delivery state and publishes the change.
    pub(crate) fn settle(
        &self,
        alert_id: &str,
        seq: u64,
        recipient: usize,
        state: DeliveryState,
        now: DateTime<Utc>,
    ) {
        let Some(handle) = self.get(alert_id) else {
            return;
        };
        let snapshot = {
            let mut row = handle.lock();
            if let Some(outcome) = row
                .instance
                .notified_tiers
                .get_mut(seq as usize)
                .and_then(|r| r.recipients.get_mut(recipient))
            {
                outcome.state = state;
            }
            row.instance.clone()
        };
        self.publish(AlertEventKind::DeliveryUpdated, &snapshot, now);
    }

    /// Removes archived alerts past retention, then the oldest archived
    /// alerts beyond `max_archived`.
    pub(crate) fn prune_archive(
        &self,
        now: DateTime<Utc>,
        retention: chrono::Duration,
        max_archived: usize,
    ) -> usize {
        let mut rows = self.rows.write();
        let mut archived: Vec<(String, DateTime<Utc>)> = rows
            .iter()
            .filter_map(|(id, row)| {
                let row = row.try_lock()?;
                let closed_at = match row.instance.status {
                    AlertStatus::Resolved => row.instance.resolved_at,
                    AlertStatus::Expired => row.instance.expired_at,
                    AlertStatus::Active | AlertStatus::Acknowledged => None,
                }?;
                Some((id.clone(), closed_at))
            })
            .collect();

        archived.sort_by_key(|(_, closed_at)| *closed_at);
        let over_cap = archived.len().saturating_sub(max_archived);
        let mut removed = 0;
        for (i, (id, closed_at)) in archived.into_iter().enumerate() {
            if i < over_cap || now.signed_duration_since(closed_at) >= retention {
                rows.remove(&id);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "pruned archived alerts");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EscalationStep;
    use crate::types::{
        ChannelKind, DispatchReason, NotificationRecord, PolicySource, RecipientOutcome, Severity,
    };

    fn ladder() -> Arc<EscalationLadder> {
        Arc::new(
            EscalationLadder::new(vec![EscalationStep::new(0, "bedside-nurse", ChannelKind::Pager)])
                .unwrap(),
        )
    }

    fn row(subject: &str) -> AlertRow {
        AlertRow::new(
            AlertInstance::new(
                subject,
                AlertKind::VitalSign,
                Severity::High,
                120.0,
                110.0,
                0,
                PolicySource::Exact,
                Utc::now(),
            ),
            ladder(),
        )
    }

    #[test]
    fn open_or_insert_dedupes() {
        let store = AlertStore::new(16);
        let (a, created_a) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        let (b, created_b) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        assert!(created_a);
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn different_kind_is_separate() {
        let store = AlertStore::new(16);
        store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        let (_, created) = store.open_or_insert("ICU-A1", AlertKind::Equipment, || row("ICU-A1"));
        assert!(created);
        assert_eq!(store.open_ids().len(), 2);
    }

    #[test]
    fn close_open_only_removes_matching_id() {
        let store = AlertStore::new(16);
        let (handle, _) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        let id = handle.lock().instance.id.clone();

        store.close_open("ICU-A1", AlertKind::VitalSign, "someone-else");
        assert_eq!(store.open_id("ICU-A1", AlertKind::VitalSign), Some(id.clone()));

        store.close_open("ICU-A1", AlertKind::VitalSign, &id);
        assert!(store.open_id("ICU-A1", AlertKind::VitalSign).is_none());
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn attempts_and_settle_update_record() {
        let store = AlertStore::new(16);
        let (handle, _) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        let id = {
            let mut row = handle.lock();
            row.instance.push_record(NotificationRecord {
                seq: 0,
                level: 0,
                tier: "bedside-nurse".into(),
                channel: ChannelKind::Pager,
                dispatched_at: Utc::now(),
                reason: DispatchReason::Initial,
                recipients: vec![RecipientOutcome::pending("rn-1", "pager:101")],
            });
            row.instance.id.clone()
        };

        let mut events = store.subscribe(AlertFilter::new());
        store.record_attempt(&id, 0, 0, Some("busy".into()));
        store.record_attempt(&id, 0, 0, None);
        store.settle(&id, 0, 0, DeliveryState::Delivered, Utc::now());

        let row = handle.lock();
        let outcome = &row.instance.notified_tiers[0].recipients[0];
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.last_error.as_deref(), Some("busy"));
        assert_eq!(outcome.state, DeliveryState::Delivered);
        assert_eq!(row.instance.contact_attempts, 2);
        drop(row);

        let event = events.try_next().unwrap();
        assert_eq!(event.kind, AlertEventKind::DeliveryUpdated);
    }

    #[test]
    fn deliverable_requires_active_and_unsnoozed() {
        let store = AlertStore::new(16);
        let (handle, _) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || row("ICU-A1"));
        let id = handle.lock().instance.id.clone();
        let now = Utc::now();
        assert!(store.deliverable(&id, now));

        handle
            .lock()
            .instance
            .snooze(now + chrono::Duration::seconds(60))
            .unwrap();
        assert!(!store.deliverable(&id, now));
        assert!(!store.deliverable("missing", now));
    }

    #[test]
    fn prune_removes_expired_archive() {
        let store = AlertStore::new(16);
        let now = Utc::now();
        for subject in ["a", "b", "c"] {
            let (handle, _) = store.open_or_insert(subject, AlertKind::VitalSign, || row(subject));
            let mut row = handle.lock();
            row.instance.resolve("rn-1", "stable", now).unwrap();
            let id = row.instance.id.clone();
            drop(row);
            store.close_open(subject, AlertKind::VitalSign, &id);
        }
        let (_, _) = store.open_or_insert("d", AlertKind::VitalSign, || row("d"));

        assert_eq!(store.prune_archive(now, chrono::Duration::hours(1), 10), 0);
        assert_eq!(store.prune_archive(now, chrono::Duration::hours(1), 1), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.prune_archive(now + chrono::Duration::hours(2), chrono::Duration::hours(1), 10),
            1
        );
        assert_eq!(store.snapshot_open().len(), 1);
    }
}
