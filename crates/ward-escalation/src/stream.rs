//! Change events and the subscription stream dashboards consume.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use chrono::{DateTime, Utc};
use futures::{FutureExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::types::{AlertInstance, AlertKind, Severity};

/// What changed on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertEventKind {
    /// A new alert was created.
    Created,
    /// A newer reading arrived for an open alert.
    Updated,
    /// A tier was dispatched.
    Dispatched,
    /// One recipient's delivery settled.
    DeliveryUpdated,
    /// The alert moved up a level.
    Escalated,
    /// The alert was re-dispatched at its top level.
    Repeated,
    /// A responder acknowledged the alert.
    Acknowledged,
    /// The alert was resolved.
    Resolved,
    /// The alert was administratively expired.
    Expired,
    /// Dispatch was suppressed.
    Snoozed,
    /// A snooze ran out and escalation resumed.
    SnoozeEnded,
    /// The scheduler could not arm a timer for the alert.
    Stalled,
}

impl AlertEventKind {
    /// Returns the event kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Dispatched => "dispatched",
            Self::DeliveryUpdated => "delivery-updated",
            Self::Escalated => "escalated",
            Self::Repeated => "repeated",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
            Self::Snoozed => "snoozed",
            Self::SnoozeEnded => "snooze-ended",
            Self::Stalled => "stalled",
        }
    }
}

impl fmt::Display for AlertEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to an alert, carrying the alert as it is after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// What changed.
    pub kind: AlertEventKind,
    /// When it changed.
    pub at: DateTime<Utc>,
    /// The alert after the change.
    pub alert: AlertInstance,
}

/// Selects which events a subscriber receives. Empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    /// Only this alert.
    pub alert_id: Option<String>,
    /// Only this subject.
    pub subject_id: Option<String>,
    /// Only these alert kinds.
    pub kinds: Vec<AlertKind>,
    /// Only alerts at or above this severity.
    pub min_severity: Option<Severity>,
    /// Only these event kinds.
    pub events: Vec<AlertEventKind>,
}

impl AlertFilter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one alert.
    #[must_use]
    pub fn alert(mut self, alert_id: impl Into<String>) -> Self {
        self.alert_id = Some(alert_id.into());
        self
    }

    /// Restricts to one subject.
    #[must_use]
    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Adds an alert kind.
    #[must_use]
    pub fn kind(mut self, kind: AlertKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub const fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Adds an event kind.
    #[must_use]
    pub fn event(mut self, kind: AlertEventKind) -> Self {
        self.events.push(kind);
        self
    }

    /// Returns true if the event passes the filter.
    #[must_use]
    pub fn matches(&self, event: &AlertEvent) -> bool {
        let alert = &event.alert;
        self.alert_id.as_ref().is_none_or(|id| *id == alert.id)
            && self
                .subject_id
                .as_ref()
                .is_none_or(|s| *s == alert.subject_id)
            && (self.kinds.is_empty() || self.kinds.contains(&alert.kind))
            && self.min_severity.is_none_or(|min| alert.severity >= min)
            && (self.events.is_empty() || self.events.contains(&event.kind))
    }
}

/// Async stream of alert change events.
///
/// Yields events published after the subscription was created.
pub struct AlertStream {
    inner: BroadcastStream<AlertEvent>,
    filter: AlertFilter,
    closed: bool,
    lagged: u64,
}

impl AlertStream {
    pub(crate) fn new(receiver: broadcast::Receiver<AlertEvent>, filter: AlertFilter) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            closed: false,
            lagged: 0,
        }
    }

    /// Closes the stream.
    pub const fn close(&mut self) {
        self.closed = true;
    }

    /// Returns true if the stream is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of events dropped because this subscriber fell behind.
    #[must_use]
    pub const fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Receives the next matching event.
    pub async fn recv(&mut self) -> Option<AlertEvent> {
        self.next().await
    }

    /// Returns the next matching event if one is already buffered.
    pub fn try_next(&mut self) -> Option<AlertEvent> {
        self.next().now_or_never().flatten()
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<AlertEvent>> {
        loop {
            if self.closed {
                return Poll::Ready(None);
            }
            match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(event)) if self.filter.matches(&event) => return Poll::Ready(Some(event)),
                Some(Ok(_)) => {}
                // Slow consumer; dashboards re-read state with get_state.
                Some(Err(BroadcastStreamRecvError::Lagged(n))) => self.lagged += n,
                None => {
                    self.closed = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl fmt::Debug for AlertStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertStream")
            .field("filter", &self.filter)
            .field("closed", &self.closed)
            .field("lagged", &self.lagged)
            .finish_non_exhaustive()
    }
}

impl Stream for AlertStream {
    type Item = AlertEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PolicySource;
    use futures::StreamExt;

    fn event(kind: AlertEventKind, subject: &str, severity: Severity) -> AlertEvent {
        AlertEvent {
            kind,
            at: Utc::now(),
            alert: AlertInstance::new(
                subject,
                AlertKind::VitalSign,
                severity,
                85.0,
                90.0,
                2,
                PolicySource::Exact,
                Utc::now(),
            ),
        }
    }

    mod filter_tests {
        use super::*;

        #[test]
        fn empty_filter_matches_all() {
            let f = AlertFilter::new();
            assert!(f.matches(&event(AlertEventKind::Created, "ICU-A1", Severity::Low)));
        }

        #[test]
        fn subject_filter() {
            let f = AlertFilter::new().subject("ICU-A1");
            assert!(f.matches(&event(AlertEventKind::Created, "ICU-A1", Severity::Low)));
            assert!(!f.matches(&event(AlertEventKind::Created, "OT-3", Severity::Low)));
        }

        #[test]
        fn severity_floor() {
            let f = AlertFilter::new().min_severity(Severity::High);
            assert!(f.matches(&event(AlertEventKind::Created, "ICU-A1", Severity::Critical)));
            assert!(!f.matches(&event(AlertEventKind::Created, "ICU-A1", Severity::Medium)));
        }

        #[test]
        fn kind_and_event_filters() {
            let f = AlertFilter::new()
                .kind(AlertKind::Equipment)
                .event(AlertEventKind::Escalated);
            assert!(!f.matches(&event(AlertEventKind::Escalated, "ICU-A1", Severity::Low)));

            let f = AlertFilter::new()
                .kind(AlertKind::VitalSign)
                .event(AlertEventKind::Escalated)
                .event(AlertEventKind::Acknowledged);
            assert!(f.matches(&event(AlertEventKind::Acknowledged, "ICU-A1", Severity::Low)));
            assert!(!f.matches(&event(AlertEventKind::Created, "ICU-A1", Severity::Low)));
        }

        #[test]
        fn alert_id_filter() {
            let e = event(AlertEventKind::Created, "ICU-A1", Severity::Low);
            assert!(AlertFilter::new().alert(e.alert.id.clone()).matches(&e));
            assert!(!AlertFilter::new().alert("other").matches(&e));
        }
    }

    mod stream_tests {
        use super::*;

        #[tokio::test]
        async fn stream_yields_matching_events() {
            let (tx, rx) = broadcast::channel(16);
            let mut stream = AlertStream::new(rx, AlertFilter::new().subject("ICU-A1"));

            tx.send(event(AlertEventKind::Created, "OT-3", Severity::Low)).unwrap();
            tx.send(event(AlertEventKind::Created, "ICU-A1", Severity::Low)).unwrap();

            let next = stream.next().await.unwrap();
            assert_eq!(next.alert.subject_id, "ICU-A1");
        }

        #[tokio::test]
        async fn waiting_subscriber_is_woken() {
            let (tx, rx) = broadcast::channel(16);
            let mut stream = AlertStream::new(rx, AlertFilter::new());

            let waiter = tokio::spawn(async move { stream.next().await });
            tokio::task::yield_now().await;
            tx.send(event(AlertEventKind::Escalated, "ICU-A1", Severity::High)).unwrap();

            let received = waiter.await.unwrap().unwrap();
            assert_eq!(received.kind, AlertEventKind::Escalated);
        }

        #[tokio::test]
        async fn stream_ends_when_sender_dropped() {
            let (tx, rx) = broadcast::channel::<AlertEvent>(16);
            let mut stream = AlertStream::new(rx, AlertFilter::new());
            drop(tx);
            assert!(stream.next().await.is_none());
            assert!(stream.is_closed());
        }

        #[test]
        fn try_next_counts_lag() {
            let (tx, rx) = broadcast::channel(2);
            let mut stream = AlertStream::new(rx, AlertFilter::new());
            for _ in 0..4 {
                tx.send(event(AlertEventKind::Updated, "ICU-A1", Severity::Low)).unwrap();
            }
            assert!(stream.try_next().is_some());
            assert_eq!(stream.lagged(), 2);
            assert!(stream.try_next().is_some());
            assert!(stream.try_next().is_none());
        }

        #[test]
        fn closed_stream_yields_nothing() {
            let (_tx, rx) = broadcast::channel::<AlertEvent>(2);
            let mut stream = AlertStream::new(rx, AlertFilter::new());
            stream.close();
            assert!(stream.is_closed());
        }
    }
}
