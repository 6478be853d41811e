//! Clinical alert escalation engine.
//!
//! `ward-escalation` turns threshold crossings from ward monitoring into a
//! tiered paging lifecycle. A condition source reports a reading; the engine
//! pages the first responder tier at once and, if nobody acknowledges before
//! the tier's deadline, escalates to the next tier, repeating at the top of
//! the ladder until someone acknowledges or the condition is resolved.
//!
//! # Features
//!
//! - **Escalation Ladders**: Per (kind, severity) policies with kind defaults
//!   and a generic notify-all fallback
//! - **Per-Alert Timers**: One cancellable timer per alert, guarded by a
//!   version stamp so late timers never escalate an acknowledged alert
//! - **Delivery Channels**: Pager, SMS, phone, email, in-app and overhead
//!   transports behind one trait, with bounded retry
//! - **Snooze and Manual Escalation**: Suppress paging for a while, or push
//!   an alert up a tier by hand
//! - **Metrics**: Response latency percentiles, escalation depth, delivery
//!   and fallback counts
//! - **Change Stream**: Filtered `futures::Stream` of alert events for
//!   dashboards
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ward_escalation::{
//!     AlertKind, ChannelKind, Contact, EscalationEngine, EscalationLadder, EscalationStep,
//!     PolicySet, PolicyStore, Severity, StaticRoster,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ward_escalation::Result<()> {
//! let mut policies = PolicySet::new();
//! policies.insert(
//!     AlertKind::VitalSign,
//!     Severity::Critical,
//!     EscalationLadder::new(vec![
//!         EscalationStep::new(0, "bedside-nurse", ChannelKind::Pager),
//!         EscalationStep::new(60, "charge-nurse", ChannelKind::Phone),
//!         EscalationStep::new(120, "on-call-physician", ChannelKind::Phone),
//!     ])?,
//! );
//!
//! let roster = StaticRoster::new()
//!     .with_tier("bedside-nurse", vec![Contact::new("rn-1", "pager:101")]);
//!
//! let engine = EscalationEngine::builder()
//!     .policies(Arc::new(PolicyStore::new(policies, 300)))
//!     .roster(Arc::new(roster))
//!     .build();
//!
//! let alert = engine.report_condition("ICU-A1", AlertKind::VitalSign, 85.0, 90.0, Severity::Critical)?;
//! assert_eq!(alert.level, 0);
//!
//! let acked = engine.acknowledge(&alert.id, "rn-1")?;
//! assert_eq!(acked.ack_by.as_deref(), Some("rn-1"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod clock;
pub mod config;
mod dispatcher;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod roster;
mod scheduler;
mod store;
pub mod stream;
pub mod types;

// Re-export main types at crate root
pub use channels::{
    ChannelRegistry, DeliveryChannel, DeliveryReceipt, LogChannel, Notification, WebhookChannel,
    WebhookConfig, WebhookPayload,
};
pub use clock::EngineClock;
pub use config::{DeliveryConfig, EngineConfig};
pub use engine::{EngineBuilder, EscalationEngine, MAX_SNOOZE_SECS};
pub use error::{EscalationError, Result};
pub use ledger::{
    AcknowledgmentLedger, AcknowledgmentRecord, EngineMetrics, LATENCY_WINDOW, LatencySummary,
};
pub use policy::{
    EscalationLadder, EscalationStep, MAX_STEP_DELAY_SECS, PolicyEntry, PolicyFile, PolicySet,
    PolicyStore, ResolvedPolicy,
};
pub use roster::{
    AlwaysMonitored, Contact, DischargeList, RosterDirectory, SharedLifecycle, SharedRoster,
    StaticRoster, SubjectLifecycle,
};
pub use stream::{AlertEvent, AlertEventKind, AlertFilter, AlertStream};
pub use types::{
    AlertInstance, AlertKind, AlertStatus, ChannelKind, DeliveryState, DispatchReason,
    NotificationRecord, PolicySource, RecipientOutcome, Severity,
};
