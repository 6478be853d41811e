//! Core types for the escalation engine.
//!
//! This module provides the fundamental types used throughout the crate:
//! - [`AlertKind`]: The category of monitored condition
//! - [`Severity`]: How urgent the condition is
//! - [`AlertStatus`]: Where an alert is in its lifecycle
//! - [`ChannelKind`]: The transport a notification is delivered on
//! - [`AlertInstance`]: The mutable record of one escalation
//! - [`NotificationRecord`]: The audit entry of one dispatch

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EscalationError, Result};

/// The category of monitored condition an alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// A patient vital sign crossed a threshold.
    VitalSign,
    /// Monitoring or life-support equipment fault.
    Equipment,
    /// Nurse-to-patient or staff ratio below the safe minimum.
    StaffingRatio,
    /// Code blue or other emergency team activation.
    CodeEvent,
    /// A scheduled patient visit or round was missed.
    MissedVisit,
    /// A laboratory result in the critical range.
    CriticalLab,
    /// The escalation engine could not escalate one of its own alerts.
    EngineFault,
}

impl AlertKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::VitalSign,
        Self::Equipment,
        Self::StaffingRatio,
        Self::CodeEvent,
        Self::MissedVisit,
        Self::CriticalLab,
        Self::EngineFault,
    ];

    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VitalSign => "vital-sign",
            Self::Equipment => "equipment",
            Self::StaffingRatio => "staffing-ratio",
            Self::CodeEvent => "code-event",
            Self::MissedVisit => "missed-visit",
            Self::CriticalLab => "critical-lab",
            Self::EngineFault => "engine-fault",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = EscalationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EscalationError::InvalidPolicy {
                reason: format!("unknown alert kind '{s}'"),
            })
    }
}

/// The severity of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, routine follow-up.
    Low,
    /// Needs attention within the shift.
    Medium,
    /// Needs prompt bedside attention.
    High,
    /// Life-threatening, immediate response.
    Critical,
}

impl Severity {
    /// All severities, least to most urgent.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EscalationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| EscalationError::InvalidPolicy {
                reason: format!("unknown severity '{s}'"),
            })
    }
}

/// Where an alert is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Escalating; timers are armed.
    Active,
    /// A responder has taken the alert; no further escalation.
    Acknowledged,
    /// The condition cleared or someone closed the alert.
    Resolved,
    /// Administratively closed because the subject is no longer monitored.
    Expired,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
        }
    }

    /// Returns true while the alert still occupies its `(subject, kind)` slot.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Acknowledged)
    }

    /// Returns true for statuses no transition leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Expired)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transport a notification is delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Hospital pager.
    Pager,
    /// Text message.
    Sms,
    /// Voice call.
    Phone,
    /// Email.
    Email,
    /// Dashboard or mobile app notification.
    InApp,
    /// Overhead announcement.
    Overhead,
}

impl ChannelKind {
    /// Returns the channel kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pager => "pager",
            Self::Sms => "sms",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::InApp => "in-app",
            Self::Overhead => "overhead",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rung of the policy fallback chain produced a ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicySource {
    /// A ladder configured for the exact kind and severity.
    Exact,
    /// The kind's default ladder; no severity-specific entry exists.
    KindDefault,
    /// The generic notify-all-assigned ladder; the kind is unknown.
    Generic,
}

impl PolicySource {
    /// Returns the source as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::KindDefault => "kind-default",
            Self::Generic => "generic",
        }
    }

    /// Returns true if resolution had to fall back.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a dispatch happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchReason {
    /// First notification when the alert was created.
    Initial,
    /// The alert timed out and moved up a level.
    Escalation,
    /// Re-notification at the top level.
    Repeat,
    /// Someone pressed escalate by hand.
    Manual,
}

/// Delivery progress for one recipient of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Delivery still in flight.
    Pending,
    /// The channel accepted the notification.
    Delivered,
    /// Every attempt failed.
    Failed,
    /// Retries stopped because the alert no longer needed this page.
    Cancelled,
}

/// Outcome of delivering one dispatch to one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    /// The contact that was notified.
    pub contact_id: String,
    /// The channel address used (pager number, email, ...).
    pub address: String,
    /// Current delivery state.
    pub state: DeliveryState,
    /// Attempts made so far.
    pub attempts: u32,
    /// The last error seen, if any.
    pub last_error: Option<String>,
}

impl RecipientOutcome {
    /// Creates a pending outcome for a contact.
    #[must_use]
    pub fn pending(contact_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            address: address.into(),
            state: DeliveryState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Audit entry for one dispatch of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Sequence number of this dispatch within the alert.
    pub seq: u64,
    /// The level that was notified.
    pub level: usize,
    /// The responder tier that was notified.
    pub tier: String,
    /// The channel the tier was notified on.
    pub channel: ChannelKind,
    /// When the dispatch started.
    pub dispatched_at: DateTime<Utc>,
    /// Why the dispatch happened.
    pub reason: DispatchReason,
    /// Per-recipient delivery outcomes.
    pub recipients: Vec<RecipientOutcome>,
}

impl NotificationRecord {
    /// Returns true once no recipient is still pending.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.recipients
            .iter()
            .all(|r| r.state != DeliveryState::Pending)
    }
}

/// The mutable record of one active (or archived) escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    /// Unique identifier for this alert.
    pub id: String,
    /// Patient, bed, room or shift the condition is about.
    pub subject_id: String,
    /// The category of condition.
    pub kind: AlertKind,
    /// How urgent the condition is.
    pub severity: Severity,
    /// The most recent reading.
    pub trigger_value: f64,
    /// The threshold the reading crossed.
    pub threshold_value: f64,
    /// Current escalation level.
    pub level: usize,
    /// Highest level the ladder allows.
    pub max_level: usize,
    /// Current status.
    pub status: AlertStatus,
    /// When the alert was created.
    pub triggered_at: DateTime<Utc>,
    /// When the level last changed (creation counts).
    pub last_escalated_at: DateTime<Utc>,
    /// When the alert was acknowledged.
    pub ack_at: Option<DateTime<Utc>>,
    /// Who acknowledged the alert.
    pub ack_by: Option<String>,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved the alert.
    pub resolved_by: Option<String>,
    /// Why the alert was resolved or expired.
    pub resolution_reason: Option<String>,
    /// When the alert expired.
    pub expired_at: Option<DateTime<Utc>>,
    /// Dispatch is suppressed until this time.
    pub snoozed_until: Option<DateTime<Utc>>,
    /// Ordered log of dispatches.
    pub notified_tiers: Vec<NotificationRecord>,
    /// Stamp bumped on every scheduling-relevant transition.
    pub version: u64,
    /// Which policy rung produced the ladder.
    pub policy_source: PolicySource,
    /// Delivery attempts made across all dispatches.
    pub contact_attempts: u32,
    /// Re-dispatches made at the top level.
    pub repeat_count: u32,
    /// Set when the alert reached `max_level` while still active.
    pub reached_max_unacknowledged: bool,
    /// Set when the scheduler could not arm a timer for this alert.
    pub escalation_stalled: bool,
}

impl AlertInstance {
    /// Creates a new alert at level 0.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subject_id: impl Into<String>,
        kind: AlertKind,
        severity: Severity,
        trigger_value: f64,
        threshold_value: f64,
        max_level: usize,
        policy_source: PolicySource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.into(),
            kind,
            severity,
            trigger_value,
            threshold_value,
            level: 0,
            max_level,
            status: AlertStatus::Active,
            triggered_at: now,
            last_escalated_at: now,
            ack_at: None,
            ack_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
            expired_at: None,
            snoozed_until: None,
            notified_tiers: Vec::new(),
            version: 1,
            policy_source,
            contact_attempts: 0,
            repeat_count: 0,
            reached_max_unacknowledged: false,
            escalation_stalled: false,
        }
    }

    /// Returns true while the alert is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Returns true if dispatch is suppressed at `now`.
    #[must_use]
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.is_some_and(|until| until > now)
    }

    /// Returns true if the alert sits on its top level.
    #[must_use]
    pub const fn at_max_level(&self) -> bool {
        self.level >= self.max_level
    }

    /// Records a newer reading for an open alert.
    pub fn update_trigger_value(&mut self, value: f64) {
        self.trigger_value = value;
    }

    /// Moves the alert one level up.
    ///
    /// Returns false (and changes nothing) unless the alert is active and
    /// below its top level.
    pub fn escalate(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active() || self.at_max_level() {
            return false;
        }
        self.level += 1;
        self.last_escalated_at = now;
        self.version += 1;
        if self.at_max_level() {
            self.reached_max_unacknowledged = true;
        }
        true
    }

    /// Counts a re-dispatch at the top level.
    pub fn record_repeat(&mut self) {
        self.repeat_count += 1;
        self.reached_max_unacknowledged = true;
        self.version += 1;
    }

    /// Marks the alert acknowledged.
    ///
    /// Returns `Ok(false)` when it was already acknowledged or resolved.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Conflict` if the alert has expired.
    pub fn acknowledge(&mut self, ack_by: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            AlertStatus::Active => {
                self.status = AlertStatus::Acknowledged;
                self.ack_at = Some(now);
                self.ack_by = Some(ack_by.to_string());
                self.snoozed_until = None;
                self.version += 1;
                Ok(true)
            }
            AlertStatus::Acknowledged | AlertStatus::Resolved => Ok(false),
            AlertStatus::Expired => Err(EscalationError::conflict(
                &self.id,
                self.status,
                "cannot acknowledge an expired alert",
            )),
        }
    }

    /// Marks the alert resolved.
    ///
    /// Resolving an already-resolved alert with the same reason is a no-op
    /// returning `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Conflict` if the alert expired, or was
    /// already resolved with a different reason.
    pub fn resolve(&mut self, resolved_by: &str, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            AlertStatus::Active | AlertStatus::Acknowledged => {
                self.status = AlertStatus::Resolved;
                self.resolved_at = Some(now);
                self.resolved_by = Some(resolved_by.to_string());
                self.resolution_reason = Some(reason.to_string());
                self.snoozed_until = None;
                self.version += 1;
                Ok(true)
            }
            AlertStatus::Resolved if self.resolution_reason.as_deref() == Some(reason) => Ok(false),
            AlertStatus::Resolved => Err(EscalationError::conflict(
                &self.id,
                self.status,
                format!(
                    "already resolved with reason '{}'",
                    self.resolution_reason.as_deref().unwrap_or_default()
                ),
            )),
            AlertStatus::Expired => Err(EscalationError::conflict(
                &self.id,
                self.status,
                "cannot resolve an expired alert",
            )),
        }
    }

    /// Forces the alert to expired.
    ///
    /// Returns `Ok(false)` when it had already expired.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Conflict` if the alert was resolved.
    pub fn expire(&mut self, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.status {
            AlertStatus::Active | AlertStatus::Acknowledged => {
                self.status = AlertStatus::Expired;
                self.expired_at = Some(now);
                self.resolution_reason = Some(reason.to_string());
                self.snoozed_until = None;
                self.version += 1;
                Ok(true)
            }
            AlertStatus::Expired => Ok(false),
            AlertStatus::Resolved => Err(EscalationError::conflict(
                &self.id,
                self.status,
                "cannot expire a resolved alert",
            )),
        }
    }

    /// Suppresses dispatch until `until`.
    ///
    /// # Errors
    ///
    /// Returns `EscalationError::Conflict` unless the alert is active.
    pub fn snooze(&mut self, until: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            return Err(EscalationError::conflict(
                &self.id,
                self.status,
                "only active alerts can be snoozed",
            ));
        }
        self.snoozed_until = Some(until);
        self.version += 1;
        Ok(())
    }

    /// Lifts a snooze.
    pub fn end_snooze(&mut self) {
        self.snoozed_until = None;
        self.version += 1;
    }

    /// Appends a dispatch record and returns its sequence number.
    pub fn push_record(&mut self, mut record: NotificationRecord) -> u64 {
        let seq = self.notified_tiers.len() as u64;
        record.seq = seq;
        self.notified_tiers.push(record);
        seq
    }

    /// Returns the most recent dispatch record.
    #[must_use]
    pub fn last_record(&self) -> Option<&NotificationRecord> {
        self.notified_tiers.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use test_case::test_case;

    fn alert(max_level: usize) -> AlertInstance {
        AlertInstance::new(
            "ICU-A1",
            AlertKind::VitalSign,
            Severity::Critical,
            85.0,
            90.0,
            max_level,
            PolicySource::Exact,
            Utc::now(),
        )
    }

    mod enum_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("vital-sign", AlertKind::VitalSign)]
        #[test_case("staffing-ratio", AlertKind::StaffingRatio)]
        #[test_case("code-event", AlertKind::CodeEvent)]
        #[test_case("engine-fault", AlertKind::EngineFault)]
        fn kind_parses(input: &str, expected: AlertKind) {
            assert_eq!(input.parse::<AlertKind>().ok(), Some(expected));
            assert_eq!(expected.to_string(), input);
        }

        #[test]
        fn kind_rejects_unknown() {
            assert!("cardiac".parse::<AlertKind>().is_err());
        }

        #[test]
        fn kind_serializes_kebab_case() {
            let json = serde_json::to_string(&AlertKind::StaffingRatio).unwrap();
            assert_eq!(json, "\"staffing-ratio\"");
        }

        #[test]
        fn severity_ordering() {
            assert!(Severity::Low < Severity::Medium);
            assert!(Severity::High < Severity::Critical);
        }

        #[test]
        fn severity_parses() {
            assert_eq!("critical".parse::<Severity>().ok(), Some(Severity::Critical));
            assert!("urgent".parse::<Severity>().is_err());
        }

        #[test]
        fn status_open_and_terminal() {
            assert!(AlertStatus::Active.is_open());
            assert!(AlertStatus::Acknowledged.is_open());
            assert!(!AlertStatus::Resolved.is_open());
            assert!(AlertStatus::Resolved.is_terminal());
            assert!(AlertStatus::Expired.is_terminal());
            assert!(!AlertStatus::Acknowledged.is_terminal());
        }

        #[test]
        fn channel_kind_display() {
            assert_eq!(ChannelKind::InApp.to_string(), "in-app");
            assert_eq!(ChannelKind::Pager.to_string(), "pager");
        }

        #[test]
        fn policy_source_fallback() {
            assert!(!PolicySource::Exact.is_fallback());
            assert!(PolicySource::KindDefault.is_fallback());
            assert!(PolicySource::Generic.is_fallback());
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn new_alert_starts_active_at_zero() {
            let a = alert(2);
            assert_eq!(a.status, AlertStatus::Active);
            assert_eq!(a.level, 0);
            assert_eq!(a.version, 1);
            assert!(!a.reached_max_unacknowledged);
            assert!(a.notified_tiers.is_empty());
        }

        #[test]
        fn single_step_ladder_starts_at_max() {
            let mut a = alert(0);
            assert!(a.at_max_level());
            assert!(!a.reached_max_unacknowledged);
            a.record_repeat();
            assert!(a.reached_max_unacknowledged);
            assert_eq!(a.repeat_count, 1);
            assert_eq!(a.version, 2);
        }

        #[test]
        fn escalate_is_capped() {
            let mut a = alert(2);
            let now = Utc::now();
            assert!(a.escalate(now));
            assert!(a.escalate(now));
            assert!(!a.escalate(now));
            assert_eq!(a.level, 2);
            assert!(a.reached_max_unacknowledged);
            assert_eq!(a.version, 3);
        }

        #[test]
        fn escalate_ignored_after_ack() {
            let mut a = alert(2);
            a.acknowledge("rn-1", Utc::now()).unwrap();
            assert!(!a.escalate(Utc::now()));
            assert_eq!(a.level, 0);
        }

        #[test]
        fn acknowledge_is_idempotent() {
            let mut a = alert(2);
            let now = Utc::now();
            assert!(a.acknowledge("rn-1", now).unwrap());
            let version = a.version;
            assert!(!a.acknowledge("rn-2", now).unwrap());
            assert_eq!(a.ack_by.as_deref(), Some("rn-1"));
            assert_eq!(a.version, version);
        }

        #[test]
        fn acknowledge_expired_conflicts() {
            let mut a = alert(2);
            a.expire("discharged", Utc::now()).unwrap();
            let err = a.acknowledge("rn-1", Utc::now()).unwrap_err();
            assert!(matches!(err, EscalationError::Conflict { .. }));
        }

        #[test]
        fn acknowledge_resolved_is_noop() {
            let mut a = alert(2);
            a.resolve("dr-1", "stable", Utc::now()).unwrap();
            assert!(!a.acknowledge("rn-1", Utc::now()).unwrap());
            assert_eq!(a.status, AlertStatus::Resolved);
        }

        #[test]
        fn resolve_from_acknowledged() {
            let mut a = alert(2);
            a.acknowledge("rn-1", Utc::now()).unwrap();
            assert!(a.resolve("rn-1", "treated", Utc::now()).unwrap());
            assert_eq!(a.status, AlertStatus::Resolved);
            assert_eq!(a.resolution_reason.as_deref(), Some("treated"));
        }

        #[test]
        fn resolve_twice_same_reason_is_noop() {
            let mut a = alert(2);
            a.resolve("rn-1", "treated", Utc::now()).unwrap();
            assert!(!a.resolve("rn-2", "treated", Utc::now()).unwrap());
            assert_eq!(a.resolved_by.as_deref(), Some("rn-1"));
        }

        #[test]
        fn resolve_twice_different_reason_conflicts() {
            let mut a = alert(2);
            a.resolve("rn-1", "treated", Utc::now()).unwrap();
            let err = a.resolve("rn-2", "false alarm", Utc::now()).unwrap_err();
            assert!(matches!(err, EscalationError::Conflict { .. }));
        }

        #[test]
        fn expire_resolved_conflicts() {
            let mut a = alert(2);
            a.resolve("rn-1", "treated", Utc::now()).unwrap();
            assert!(a.expire("discharged", Utc::now()).is_err());
        }

        #[test]
        fn snooze_only_when_active() {
            let mut a = alert(2);
            let now = Utc::now();
            a.snooze(now + Duration::seconds(600)).unwrap();
            assert!(a.is_snoozed(now));
            assert!(!a.is_snoozed(now + Duration::seconds(601)));
            a.acknowledge("rn-1", now).unwrap();
            assert!(a.snoozed_until.is_none());
            assert!(a.snooze(now + Duration::seconds(60)).is_err());
        }

        #[test]
        fn snooze_keeps_level_and_trigger_time() {
            let mut a = alert(2);
            let now = Utc::now();
            a.escalate(now);
            let triggered = a.triggered_at;
            a.snooze(now + Duration::seconds(60)).unwrap();
            a.end_snooze();
            assert_eq!(a.level, 1);
            assert_eq!(a.triggered_at, triggered);
            assert!(a.snoozed_until.is_none());
        }

        #[test]
        fn push_record_assigns_sequence() {
            let mut a = alert(2);
            let record = NotificationRecord {
                seq: 99,
                level: 0,
                tier: "bedside".into(),
                channel: ChannelKind::Pager,
                dispatched_at: Utc::now(),
                reason: DispatchReason::Initial,
                recipients: vec![RecipientOutcome::pending("rn-1", "pager:100")],
            };
            assert_eq!(a.push_record(record.clone()), 0);
            assert_eq!(a.push_record(record), 1);
            assert_eq!(a.last_record().map(|r| r.seq), Some(1));
            assert!(!a.notified_tiers[0].is_settled());
        }

        #[test]
        fn alert_serialization_roundtrip() {
            let a = alert(2);
            let json = serde_json::to_string(&a).unwrap();
            let parsed: AlertInstance = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, a);
        }
    }
}
