//! Collaborator interfaces the engine consults but does not own.
//!
//! - [`RosterDirectory`] turns a responder tier into contactable staff.
//! - [`SubjectLifecycle`] reports whether a patient, bed or shift is still
//!   being monitored.
//!
//! [`StaticRoster`] and [`AlwaysMonitored`] are simple in-memory
//! implementations for wiring and tests.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::AlertKind;

/// A member of staff that can be notified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// Staff identifier.
    pub contact_id: String,
    /// Address on the tier's channel (pager number, phone, email, ...).
    pub address: String,
}

impl Contact {
    /// Creates a contact.
    #[must_use]
    pub fn new(contact_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            contact_id: contact_id.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.contact_id, self.address)
    }
}

/// Resolves a responder tier into the staff currently filling it.
pub trait RosterDirectory: Send + Sync + fmt::Debug {
    /// Returns the contacts for `tier` when handling an alert of `kind`.
    fn resolve(&self, kind: AlertKind, tier: &str) -> Vec<Contact>;
}

/// Reports whether a subject is still under monitoring.
pub trait SubjectLifecycle: Send + Sync + fmt::Debug {
    /// Returns false once the subject was discharged, closed or ended.
    fn is_monitored(&self, subject_id: &str) -> bool;
}

/// In-memory roster keyed by tier, with optional per-kind overrides.
#[derive(Debug, Default)]
pub struct StaticRoster {
    by_kind: RwLock<HashMap<(AlertKind, String), Vec<Contact>>>,
    by_tier: RwLock<HashMap<String, Vec<Contact>>>,
}

impl StaticRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the contacts for a tier, for every kind.
    pub fn set_tier(&self, tier: impl Into<String>, contacts: Vec<Contact>) {
        self.by_tier.write().insert(tier.into(), contacts);
    }

    /// Sets the contacts for a tier when handling one kind.
    pub fn set_kind_tier(&self, kind: AlertKind, tier: impl Into<String>, contacts: Vec<Contact>) {
        self.by_kind.write().insert((kind, tier.into()), contacts);
    }

    /// Builder-style [`StaticRoster::set_tier`].
    #[must_use]
    pub fn with_tier(self, tier: impl Into<String>, contacts: Vec<Contact>) -> Self {
        self.set_tier(tier, contacts);
        self
    }
}

impl RosterDirectory for StaticRoster {
    fn resolve(&self, kind: AlertKind, tier: &str) -> Vec<Contact> {
        if let Some(contacts) = self.by_kind.read().get(&(kind, tier.to_string())) {
            return contacts.clone();
        }
        self.by_tier.read().get(tier).cloned().unwrap_or_default()
    }
}

/// Lifecycle that treats every subject as monitored.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMonitored;

impl SubjectLifecycle for AlwaysMonitored {
    fn is_monitored(&self, _subject_id: &str) -> bool {
        true
    }
}

/// Lifecycle backed by a set of discharged subjects.
#[derive(Debug, Default)]
pub struct DischargeList {
    discharged: RwLock<HashSet<String>>,
}

impl DischargeList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a subject as no longer monitored.
    pub fn discharge(&self, subject_id: impl Into<String>) {
        self.discharged.write().insert(subject_id.into());
    }

    /// Marks a subject as monitored again (readmission).
    pub fn readmit(&self, subject_id: &str) {
        self.discharged.write().remove(subject_id);
    }
}

impl SubjectLifecycle for DischargeList {
    fn is_monitored(&self, subject_id: &str) -> bool {
        !self.discharged.read().contains(subject_id)
    }
}

/// Shared roster handle.
pub type SharedRoster = Arc<dyn RosterDirectory>;

/// Shared lifecycle handle.
pub type SharedLifecycle = Arc<dyn SubjectLifecycle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_tier_contacts() {
        let roster = StaticRoster::new().with_tier(
            "bedside-nurse",
            vec![Contact::new("rn-1", "pager:101"), Contact::new("rn-2", "pager:102")],
        );
        let contacts = roster.resolve(AlertKind::VitalSign, "bedside-nurse");
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].contact_id, "rn-1");
    }

    #[test]
    fn kind_override_wins() {
        let roster = StaticRoster::new().with_tier("on-call", vec![Contact::new("dr-1", "555-0101")]);
        roster.set_kind_tier(
            AlertKind::Equipment,
            "on-call",
            vec![Contact::new("biomed-1", "555-0199")],
        );
        assert_eq!(
            roster.resolve(AlertKind::Equipment, "on-call")[0].contact_id,
            "biomed-1"
        );
        assert_eq!(
            roster.resolve(AlertKind::VitalSign, "on-call")[0].contact_id,
            "dr-1"
        );
    }

    #[test]
    fn unknown_tier_is_empty() {
        let roster = StaticRoster::new();
        assert!(roster.resolve(AlertKind::CodeEvent, "rapid-response").is_empty());
    }

    #[test]
    fn contact_display() {
        assert_eq!(Contact::new("rn-1", "pager:101").to_string(), "rn-1 <pager:101>");
    }

    #[test]
    fn discharge_list_tracks_subjects() {
        let lifecycle = DischargeList::new();
        assert!(lifecycle.is_monitored("ICU-A1"));
        lifecycle.discharge("ICU-A1");
        assert!(!lifecycle.is_monitored("ICU-A1"));
        lifecycle.readmit("ICU-A1");
        assert!(lifecycle.is_monitored("ICU-A1"));
        assert!(AlwaysMonitored.is_monitored("anything"));
    }
}
