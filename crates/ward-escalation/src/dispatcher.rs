//! Notification dispatch with bounded, cancellable retry.
//!
//! Dispatch happens in two halves. [`Dispatcher::prepare`] runs under the
//! alert's row lock: it resolves the roster, appends the audit record with
//! every recipient pending, and returns a [`DispatchPlan`]. The caller drops
//! the lock and hands the plan to [`Dispatcher::launch`], which spawns one
//! delivery task per contact. Delivery never blocks a state transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channels::{ChannelRegistry, Notification};
use crate::clock::EngineClock;
use crate::config::DeliveryConfig;
use crate::error::EscalationError;
use crate::roster::{Contact, SharedRoster};
use crate::store::{AlertRow, AlertStore};
use crate::stream::AlertEventKind;
use crate::types::{
    AlertInstance, ChannelKind, DeliveryState, DispatchReason, NotificationRecord, RecipientOutcome,
};

/// A dispatch whose audit record is written and whose delivery is pending.
#[derive(Debug)]
pub(crate) struct DispatchPlan {
    alert: AlertInstance,
    seq: u64,
    tier: String,
    channel: ChannelKind,
    reason: DispatchReason,
    contacts: Vec<Contact>,
    cancel: CancellationToken,
}

impl DispatchPlan {
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
struct DeliveryJob {
    alert_id: String,
    seq: u64,
    recipient: usize,
    notification: Notification,
    cancel: CancellationToken,
}

/// Delivery totals.
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

/// Resolves rosters and delivers pages.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    roster: SharedRoster,
    channels: Arc<ChannelRegistry>,
    store: Arc<AlertStore>,
    config: DeliveryConfig,
    clock: EngineClock,
    stats: DeliveryStats,
}

impl Dispatcher {
    pub(crate) fn new(
        roster: SharedRoster,
        channels: Arc<ChannelRegistry>,
        store: Arc<AlertStore>,
        config: DeliveryConfig,
        clock: EngineClock,
    ) -> Self {
        Self {
            roster,
            channels,
            store,
            config,
            clock,
            stats: DeliveryStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    pub(crate) fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    /// Records a dispatch of the row's current level.
    ///
    /// Returns `None` while the alert is snoozed.
    pub(crate) fn prepare(&self, row: &mut AlertRow, reason: DispatchReason) -> Option<DispatchPlan> {
        let now = self.clock.now();
        let alert = &row.instance;
        if alert.is_snoozed(now) {
            debug!(alert_id = %alert.id, level = alert.level, "dispatch suppressed by snooze");
            return None;
        }

        let step = row.ladder.step(alert.level).clone();
        let contacts = self.roster.resolve(alert.kind, &step.tier);
        if contacts.is_empty() {
            warn!(
                alert_id = %alert.id,
                kind = %alert.kind,
                tier = %step.tier,
                "roster resolved no contacts for tier"
            );
        }

        let record = NotificationRecord {
            seq: 0,
            level: alert.level,
            tier: step.tier.clone(),
            channel: step.channel,
            dispatched_at: now,
            reason,
            recipients: contacts
                .iter()
                .map(|c| RecipientOutcome::pending(c.contact_id.clone(), c.address.clone()))
                .collect(),
        };
        let seq = row.instance.push_record(record);

        info!(
            alert_id = %row.instance.id,
            level = row.instance.level,
            tier = %step.tier,
            channel = %step.channel,
            recipients = contacts.len(),
            ?reason,
            "dispatching tier"
        );
        self.store
            .publish(AlertEventKind::Dispatched, &row.instance, now);

        Some(DispatchPlan {
            alert: row.instance.clone(),
            seq,
            tier: step.tier,
            channel: step.channel,
            reason,
            contacts,
            cancel: row.cancel.clone(),
        })
    }

    /// Starts delivery of a prepared dispatch, one task per contact.
    pub(crate) fn launch(self: &Arc<Self>, plan: DispatchPlan) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(alert_id = %plan.alert.id, "no async runtime, marking dispatch failed");
            for recipient in 0..plan.contacts.len() {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.store.settle(
                    &plan.alert.id,
                    plan.seq,
                    recipient,
                    DeliveryState::Failed,
                    self.clock.now(),
                );
            }
            return;
        };

        for (recipient, contact) in plan.contacts.into_iter().enumerate() {
            let job = DeliveryJob {
                alert_id: plan.alert.id.clone(),
                seq: plan.seq,
                recipient,
                notification: Notification::for_contact(
                    &plan.alert,
                    plan.tier.clone(),
                    plan.channel,
                    plan.reason,
                    contact,
                ),
                cancel: plan.cancel.clone(),
            };
            let dispatcher = Arc::clone(self);
            runtime.spawn(async move { dispatcher.deliver(job).await });
        }
    }

    async fn deliver(&self, job: DeliveryJob) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        let state = loop {
            if job.cancel.is_cancelled() || !self.store.deliverable(&job.alert_id, self.clock.now()) {
                break DeliveryState::Cancelled;
            }

            attempt += 1;
            let error = tokio::select! {
                () = job.cancel.cancelled() => break DeliveryState::Cancelled,
                sent = self.send_once(&job.notification) => sent.err(),
            };
            self.store
                .record_attempt(&job.alert_id, job.seq, job.recipient, error.clone());

            let Some(reason) = error else {
                break DeliveryState::Delivered;
            };

            if attempt >= max_attempts {
                let failure = EscalationError::DeliveryFailed {
                    contact: job.notification.contact.to_string(),
                    reason,
                };
                warn!(
                    alert_id = %job.alert_id,
                    channel = %job.notification.channel,
                    attempts = attempt,
                    error = %failure,
                    "giving up on contact"
                );
                break DeliveryState::Failed;
            }

            let backoff = self.config.backoff_after(attempt);
            debug!(
                alert_id = %job.alert_id,
                contact = %job.notification.contact.contact_id,
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %reason,
                "delivery attempt failed, retrying"
            );
            tokio::select! {
                () = job.cancel.cancelled() => break DeliveryState::Cancelled,
                () = tokio::time::sleep(backoff) => {}
            }
        };

        let counter = match state {
            DeliveryState::Delivered => &self.stats.succeeded,
            DeliveryState::Failed => &self.stats.failed,
            DeliveryState::Cancelled | DeliveryState::Pending => &self.stats.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.store
            .settle(&job.alert_id, job.seq, job.recipient, state, self.clock.now());
    }

    /// One attempt. The error is the reason the page did not go out.
    async fn send_once(&self, notification: &Notification) -> Result<(), String> {
        let channel = self
            .channels
            .get(notification.channel)
            .ok_or_else(|| format!("no channel registered for {}", notification.channel))?;

        match channel.send(notification).await {
            Ok(receipt) if receipt.success => Ok(()),
            Ok(receipt) => Err(receipt
                .message
                .unwrap_or_else(|| format!("{} rejected the page", receipt.channel))),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DeliveryChannel, DeliveryReceipt, LogChannel};
    use crate::error::Result;
    use crate::policy::{EscalationLadder, EscalationStep};
    use crate::roster::StaticRoster;
    use crate::types::{AlertKind, PolicySource, Severity};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Fails the first `failures` sends.
    #[derive(Debug)]
    struct FlakyChannel {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl DeliveryChannel for FlakyChannel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _notification: &Notification) -> Result<DeliveryReceipt> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(EscalationError::DeliveryFailed {
                    contact: "rn-1".into(),
                    reason: "gateway timeout".into(),
                })
            } else {
                Ok(DeliveryReceipt::success("flaky"))
            }
        }
    }

    /// Never answers.
    #[derive(Debug)]
    struct HangingChannel;

    #[async_trait::async_trait]
    impl DeliveryChannel for HangingChannel {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn send(&self, _notification: &Notification) -> Result<DeliveryReceipt> {
            std::future::pending().await
        }
    }

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        store: Arc<AlertStore>,
        alert_id: String,
        row: Arc<Mutex<AlertRow>>,
    }

    fn fixture(channel: Option<Arc<dyn DeliveryChannel>>, contacts: Vec<Contact>) -> Fixture {
        let roster = Arc::new(StaticRoster::new().with_tier("bedside-nurse", contacts));
        let registry = Arc::new(ChannelRegistry::new());
        if let Some(channel) = channel {
            registry.register(ChannelKind::Pager, channel);
        }
        let store = Arc::new(AlertStore::new(64));
        let dispatcher = Arc::new(Dispatcher::new(
            roster,
            registry,
            Arc::clone(&store),
            DeliveryConfig::default(),
            EngineClock::new(),
        ));

        let ladder = Arc::new(
            EscalationLadder::new(vec![EscalationStep::new(0, "bedside-nurse", ChannelKind::Pager)])
                .unwrap(),
        );
        let (row, _) = store.open_or_insert("ICU-A1", AlertKind::VitalSign, || {
            AlertRow::new(
                AlertInstance::new(
                    "ICU-A1",
                    AlertKind::VitalSign,
                    Severity::Critical,
                    85.0,
                    90.0,
                    0,
                    PolicySource::Exact,
                    chrono::Utc::now(),
                ),
                ladder,
            )
        });
        let alert_id = row.lock().instance.id.clone();
        Fixture {
            dispatcher,
            store,
            alert_id,
            row,
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn dispatch(f: &Fixture) {
        let plan = f
            .dispatcher
            .prepare(&mut f.row.lock(), DispatchReason::Initial)
            .unwrap();
        f.dispatcher.launch(plan);
    }

    fn outcome(f: &Fixture, recipient: usize) -> RecipientOutcome {
        f.row.lock().instance.notified_tiers[0].recipients[recipient].clone()
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_to_every_contact() {
        let f = fixture(
            Some(Arc::new(LogChannel::new("pager"))),
            vec![Contact::new("rn-1", "pager:101"), Contact::new("rn-2", "pager:102")],
        );
        dispatch(&f);

        // Pending until the delivery tasks run.
        assert_eq!(outcome(&f, 0).state, DeliveryState::Pending);
        settle().await;

        assert_eq!(outcome(&f, 0).state, DeliveryState::Delivered);
        assert_eq!(outcome(&f, 1).state, DeliveryState::Delivered);
        assert_eq!(f.row.lock().instance.contact_attempts, 2);
        assert_eq!(f.dispatcher.stats().succeeded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_then_delivers() {
        let channel = Arc::new(FlakyChannel {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let f = fixture(Some(channel), vec![Contact::new("rn-1", "pager:101")]);
        dispatch(&f);
        settle().await;
        assert_eq!(outcome(&f, 0).attempts, 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(outcome(&f, 0).attempts, 2);

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        let result = outcome(&f, 0);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.state, DeliveryState::Delivered);
        assert_eq!(result.last_error.as_deref(), Some("delivery to rn-1 failed: gateway timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let channel = Arc::new(FlakyChannel {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let f = fixture(Some(channel), vec![Contact::new("rn-1", "pager:101")]);
        dispatch(&f);
        settle().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;

        let result = outcome(&f, 0);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.state, DeliveryState::Failed);
        assert_eq!(f.dispatcher.stats().failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_channel_fails() {
        let f = fixture(None, vec![Contact::new("rn-1", "pager:101")]);
        dispatch(&f);
        settle().await;
        for backoff_ms in [500, 1000] {
            tokio::time::advance(Duration::from_millis(backoff_ms)).await;
            settle().await;
        }

        let result = outcome(&f, 0);
        assert_eq!(result.state, DeliveryState::Failed);
        assert!(result.last_error.unwrap().contains("no channel registered for pager"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retries() {
        let channel = Arc::new(FlakyChannel {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let f = fixture(Some(channel), vec![Contact::new("rn-1", "pager:101")]);
        dispatch(&f);
        settle().await;
        assert_eq!(outcome(&f, 0).attempts, 1);

        {
            let mut row = f.row.lock();
            row.instance.acknowledge("rn-1", chrono::Utc::now()).unwrap();
            row.cancel.cancel();
        }
        settle().await;

        let result = outcome(&f, 0);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.state, DeliveryState::Cancelled);
        assert!(!f.store.deliverable(&f.alert_id, chrono::Utc::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_send_in_flight() {
        let f = fixture(Some(Arc::new(HangingChannel)), vec![Contact::new("rn-1", "pager:101")]);
        dispatch(&f);
        settle().await;
        assert_eq!(outcome(&f, 0).state, DeliveryState::Pending);

        f.row.lock().cancel.cancel();
        settle().await;
        assert_eq!(outcome(&f, 0).state, DeliveryState::Cancelled);
        assert_eq!(f.dispatcher.stats().succeeded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_channel_is_never_delivered() {
        let f = fixture(
            Some(Arc::new(LogChannel::new("pager").enabled(false))),
            vec![Contact::new("rn-1", "pager:101")],
        );
        dispatch(&f);
        settle().await;
        for backoff_ms in [500, 1000] {
            tokio::time::advance(Duration::from_millis(backoff_ms)).await;
            settle().await;
        }

        let result = outcome(&f, 0);
        assert_eq!(result.state, DeliveryState::Failed);
        assert_eq!(result.last_error.as_deref(), Some("channel disabled"));
        assert_eq!(f.dispatcher.stats().succeeded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_roster_records_dispatch() {
        let f = fixture(Some(Arc::new(LogChannel::default())), Vec::new());
        dispatch(&f);
        settle().await;
        let row = f.row.lock();
        assert_eq!(row.instance.notified_tiers.len(), 1);
        assert!(row.instance.notified_tiers[0].recipients.is_empty());
        assert!(row.instance.notified_tiers[0].is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn snoozed_alert_is_not_dispatched() {
        let f = fixture(
            Some(Arc::new(LogChannel::default())),
            vec![Contact::new("rn-1", "pager:101")],
        );
        f.row
            .lock()
            .instance
            .snooze(chrono::Utc::now() + chrono::Duration::minutes(10))
            .unwrap();
        let plan = f.dispatcher.prepare(&mut f.row.lock(), DispatchReason::Repeat);
        assert!(plan.is_none());
        assert!(f.row.lock().instance.notified_tiers.is_empty());
    }

    #[test]
    fn launch_without_runtime_marks_failed() {
        let f = fixture(
            Some(Arc::new(LogChannel::default())),
            vec![Contact::new("rn-1", "pager:101")],
        );
        dispatch(&f);
        assert_eq!(outcome(&f, 0).state, DeliveryState::Failed);
    }
}
