//! Error types for the ward-escalation crate.

use thiserror::Error;

use crate::types::AlertStatus;

/// Errors that can occur in the escalation engine.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Alert with the given ID was not found.
    #[error("alert not found: {id}")]
    NotFound {
        /// The alert ID that was not found.
        id: String,
    },

    /// The operation is not valid for the alert's current status.
    #[error("conflict on alert {id} ({status}): {reason}")]
    Conflict {
        /// The alert ID.
        id: String,
        /// The status the alert was in.
        status: AlertStatus,
        /// Why the operation was rejected.
        reason: String,
    },

    /// A single contact could not be notified after all retries.
    #[error("delivery to {contact} failed: {reason}")]
    DeliveryFailed {
        /// The contact that was not reached.
        contact: String,
        /// The reason delivery failed.
        reason: String,
    },

    /// An escalation policy or ladder is malformed.
    #[error("invalid policy: {reason}")]
    InvalidPolicy {
        /// The reason the policy is invalid.
        reason: String,
    },

    /// A reading or command argument is out of range.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// The timer subsystem could not arm or run a timer.
    #[error("scheduler fault: {reason}")]
    Scheduler {
        /// The reason the scheduler failed.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failed to read a configuration or policy file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EscalationError {
    /// Builds a [`EscalationError::Conflict`].
    pub(crate) fn conflict(
        id: impl Into<String>,
        status: AlertStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            id: id.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Returns true for the expected, caller-facing outcomes (`NotFound`, `Conflict`).
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for EscalationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for escalation operations.
pub type Result<T> = std::result::Result<T, EscalationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_found() {
        let err = EscalationError::NotFound {
            id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "alert not found: abc-123");
    }

    #[test]
    fn error_display_conflict() {
        let err = EscalationError::conflict("a1", AlertStatus::Expired, "alert has expired");
        assert_eq!(err.to_string(), "conflict on alert a1 (expired): alert has expired");
    }

    #[test]
    fn error_display_delivery_failed() {
        let err = EscalationError::DeliveryFailed {
            contact: "rn-42".to_string(),
            reason: "pager offline".to_string(),
        };
        assert_eq!(err.to_string(), "delivery to rn-42 failed: pager offline");
    }

    #[test]
    fn error_display_invalid_policy() {
        let err = EscalationError::InvalidPolicy {
            reason: "empty ladder".to_string(),
        };
        assert_eq!(err.to_string(), "invalid policy: empty ladder");
    }

    #[test]
    fn error_display_invalid_input() {
        let err = EscalationError::InvalidInput {
            reason: "reading is not a number".to_string(),
        };
        assert_eq!(err.to_string(), "invalid input: reading is not a number");
        assert!(!err.is_expected());
    }

    #[test]
    fn error_display_scheduler() {
        let err = EscalationError::Scheduler {
            reason: "no runtime".to_string(),
        };
        assert_eq!(err.to_string(), "scheduler fault: no runtime");
    }

    #[test]
    fn expected_errors() {
        assert!(EscalationError::NotFound { id: "x".into() }.is_expected());
        assert!(EscalationError::conflict("x", AlertStatus::Resolved, "r").is_expected());
        assert!(!EscalationError::Scheduler { reason: "r".into() }.is_expected());
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let err: EscalationError = json_err.unwrap_err().into();
        assert!(matches!(err, EscalationError::Serialization(_)));
    }

    #[test]
    fn error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EscalationError = io.into();
        assert!(matches!(err, EscalationError::Io(_)));
    }
}
