use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Lifecycle status of a return request.
///
/// `Pending` is the only initial state. `Rejected` and `Completed` are terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[strum(ascii_case_insensitive)]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl ReturnStatus {
    /// Statuses reachable from `self` in one step.
    pub fn allowed_transitions(&self) -> &'static [ReturnStatus] {
        match self {
            ReturnStatus::Pending => &[ReturnStatus::Approved, ReturnStatus::Rejected],
            ReturnStatus::Approved => &[ReturnStatus::Completed],
            ReturnStatus::Rejected | ReturnStatus::Completed => &[],
        }
    }

    /// Checks if the status is final and cannot be changed.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// The status a record must be in to reach `self`; `None` for `Pending`.
    pub fn predecessor(&self) -> Option<ReturnStatus> {
        match self {
            ReturnStatus::Pending => None,
            ReturnStatus::Approved | ReturnStatus::Rejected => Some(ReturnStatus::Pending),
            ReturnStatus::Completed => Some(ReturnStatus::Approved),
        }
    }

    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Validates a single step of the state machine, failing closed on any edge
    /// that is not explicitly allowed.
    pub fn transition_to(self, next: ReturnStatus) -> Result<ReturnStatus, ServiceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ServiceError::InvalidTransition {
                current: self,
                requested: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "Pending",
            ReturnStatus::Approved => "Approved",
            ReturnStatus::Rejected => "Rejected",
            ReturnStatus::Completed => "Completed",
        }
    }
}

/// A customer-initiated request to return or replace an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReturnRecord {
    /// Record identifier generated by the store.
    pub id: Uuid,
    /// External order identifier supplied by the customer. Not unique.
    pub order_id: String,
    pub email: String,
    pub reason: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    /// Time of the last status change; equals `created_at` until the first one.
    pub updated_at: DateTime<Utc>,
}

impl ReturnRecord {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Validated input for a new record. Identity, timestamps and status are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReturnRecord {
    pub order_id: String,
    pub email: String,
    pub reason: String,
}

/// One entry of a record's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusChange {
    pub id: Uuid,
    pub return_id: Uuid,
    pub from_status: ReturnStatus,
    pub to_status: ReturnStatus,
    /// Identity of the operator who made the change, when known.
    pub changed_by: Option<String>,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn pending_moves_to_approved_or_rejected_only() {
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Approved));
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Rejected));
        assert!(!ReturnStatus::Pending.can_transition_to(ReturnStatus::Completed));
        assert!(!ReturnStatus::Pending.can_transition_to(ReturnStatus::Pending));
    }

    #[test]
    fn approved_only_completes() {
        assert_eq!(
            ReturnStatus::Approved.allowed_transitions(),
            &[ReturnStatus::Completed]
        );
        assert_matches!(
            ReturnStatus::Approved.transition_to(ReturnStatus::Pending),
            Err(ServiceError::InvalidTransition {
                current: ReturnStatus::Approved,
                requested: ReturnStatus::Pending,
            })
        );
    }

    #[test]
    fn terminal_statuses_reject_every_edge() {
        for terminal in [ReturnStatus::Rejected, ReturnStatus::Completed] {
            assert!(terminal.is_terminal());
            for next in ReturnStatus::iter() {
                assert!(terminal.transition_to(next).is_err());
            }
        }
    }

    #[test]
    fn predecessor_agrees_with_allowed_transitions() {
        for to in ReturnStatus::iter() {
            let sources: Vec<_> = ReturnStatus::iter()
                .filter(|from| from.can_transition_to(to))
                .collect();
            assert_eq!(sources.first().copied(), to.predecessor());
            assert!(sources.len() <= 1);
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(ReturnStatus::from_str("approved").unwrap(), ReturnStatus::Approved);
        assert_eq!(ReturnStatus::from_str("PENDING").unwrap(), ReturnStatus::Pending);
        assert!(ReturnStatus::from_str("refunded").is_err());
    }

    #[test]
    fn display_matches_as_str() {
        for status in ReturnStatus::iter() {
            assert_eq!(status.to_string(), status.as_str());
            assert_eq!(status.as_ref(), status.as_str());
        }
    }

    #[test]
    fn serializes_with_variant_names() {
        let json = serde_json::to_string(&ReturnStatus::Completed).unwrap();
        assert_eq!(json, "\"Completed\"");
    }
}
