//! Per-alert single-shot timers.
//!
//! Each alert owns at most one armed timer. Arming replaces (and aborts) the
//! previous one. A timer carries a [`TimerStamp`] taken when it was armed;
//! the engine compares that stamp against the alert's current version when
//! the timer fires, so a timer that lost a race with an acknowledgment is a
//! no-op even if cancellation came too late to stop it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{EscalationError, Result};

/// Deadline used when `now + delay` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPurpose {
    /// Escalate one level, or repeat at the top level.
    Escalate,
    /// Lift a snooze and start a fresh escalation wait.
    SnoozeExpiry,
}

/// Identity of the alert state a timer was armed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TimerStamp {
    pub alert_id: String,
    pub version: u64,
    pub level: usize,
    pub purpose: TimerPurpose,
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    purpose: TimerPurpose,
    handle: JoinHandle<()>,
}

/// Owns the timer task of every alert.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    timers: Mutex<HashMap<String, ArmedTimer>>,
    next_generation: AtomicU64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms the alert's timer to call `on_fire` after `delay`, replacing any
    /// timer already armed for it.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Scheduler` when called outside a tokio
    /// runtime.
    pub(crate) fn arm<F>(self: &Arc<Self>, stamp: TimerStamp, delay: Duration, on_fire: F) -> Result<()>
    where
        F: FnOnce(TimerStamp) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| EscalationError::Scheduler {
            reason: format!("cannot arm timer for alert {}: {e}", stamp.alert_id),
        })?;

        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let alert_id = stamp.alert_id.clone();
        let purpose = stamp.purpose;

        // Held across spawn so the task cannot complete before it is registered.
        let mut timers = self.timers.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(scheduler) = scheduler.upgrade() else {
                return;
            };
            if scheduler.complete(&stamp.alert_id, generation) {
                on_fire(stamp);
            }
        });

        debug!(
            alert_id = %alert_id,
            ?purpose,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "armed timer"
        );
        if let Some(previous) = timers.insert(
            alert_id,
            ArmedTimer {
                generation,
                purpose,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        Ok(())
    }

    /// Cancels the alert's timer. Safe to call when none is armed.
    pub(crate) fn cancel(&self, alert_id: &str) -> bool {
        let removed = self.timers.lock().remove(alert_id);
        removed.is_some_and(|timer| {
            timer.handle.abort();
            debug!(alert_id = %alert_id, purpose = ?timer.purpose, "cancelled timer");
            true
        })
    }

    /// Returns true if a timer is armed for the alert.
    #[cfg(test)]
    pub(crate) fn is_armed(&self, alert_id: &str) -> bool {
        self.timers.lock().contains_key(alert_id)
    }

    /// Returns the purpose of the alert's armed timer.
    #[cfg(test)]
    pub(crate) fn armed_purpose(&self, alert_id: &str) -> Option<TimerPurpose> {
        self.timers.lock().get(alert_id).map(|t| t.purpose)
    }

    pub(crate) fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Aborts every armed timer.
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<ArmedTimer> = self.timers.lock().drain().map(|(_, t)| t).collect();
        for timer in &drained {
            timer.handle.abort();
        }
        drained.len()
    }

    /// Unregisters a timer that fired. Returns false if it was replaced.
    fn complete(&self, alert_id: &str, generation: u64) -> bool {
        let mut timers = self.timers.lock();
        match timers.get(alert_id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(alert_id);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.handle.abort();
        }
    }
}
