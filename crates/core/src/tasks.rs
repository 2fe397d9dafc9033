//! Task kinds, dispatch ordering and the task state machine.
//!
//! Status ids match the `task_statuses` seed data (1-based SMALLSERIAL).
//! The state machine is duplicated from the `db` crate's `TaskStatus` enum
//! because `core` must have zero internal deps.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// A unit of work the remote worker can perform.
///
/// The discriminant matches the `task_kinds` seed data.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Renew the credentials of an existing system.
    Renewal = 1,
    /// Create one new system account.
    SingleGeneration = 2,
    /// Create `quantity` new system accounts in one browser session.
    BatchGeneration = 3,
}

impl TaskKind {
    /// All kinds in dispatch order.
    pub const ALL: [TaskKind; 3] = [
        TaskKind::Renewal,
        TaskKind::SingleGeneration,
        TaskKind::BatchGeneration,
    ];

    /// Return the database kind ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Wire / log name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Renewal => "renewal",
            TaskKind::SingleGeneration => "single_generation",
            TaskKind::BatchGeneration => "batch_generation",
        }
    }

    /// Dispatch rank: lower ranks are leased first.
    ///
    /// Renewal tasks always drain before generation tasks.
    pub fn dispatch_rank(self) -> i16 {
        match self {
            TaskKind::Renewal => 0,
            TaskKind::SingleGeneration | TaskKind::BatchGeneration => 1,
        }
    }

    /// Kinds a poll may lease given the global automation switch.
    ///
    /// Renewal is never gated: expired credentials lock a paying user out.
    pub fn leasable(automation_enabled: bool) -> &'static [TaskKind] {
        if automation_enabled {
            &Self::ALL
        } else {
            &[TaskKind::Renewal]
        }
    }
}

impl TryFrom<i16> for TaskKind {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TaskKind::Renewal),
            2 => Ok(TaskKind::SingleGeneration),
            3 => Ok(TaskKind::BatchGeneration),
            other => Err(CoreError::Internal(format!("Unknown task kind id {other}"))),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Generation quantities
// ---------------------------------------------------------------------------

/// Upper bound on systems a single generation request may ask for.
pub const MAX_GENERATION_QUANTITY: i32 = 100;

/// Pick the task kind for a generation request of `quantity` systems.
pub fn generation_kind(quantity: i32) -> Result<TaskKind, CoreError> {
    match quantity {
        1 => Ok(TaskKind::SingleGeneration),
        q if (2..=MAX_GENERATION_QUANTITY).contains(&q) => Ok(TaskKind::BatchGeneration),
        _ => Err(CoreError::Validation(format!(
            "Generation quantity must be between 1 and {MAX_GENERATION_QUANTITY}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    /// Returns the set of valid target status IDs reachable from `from_status`.
    ///
    /// Terminal states (Completed=3, Failed=4, Cancelled=5) return an empty
    /// slice because no further transitions are allowed.
    pub fn valid_transitions(from_status: i16) -> &'static [i16] {
        match from_status {
            // Pending -> Leased, Cancelled, or a late report on a reclaimed
            // lease (Completed, Failed)
            1 => &[2, 5, 3, 4],
            // Leased -> Completed, Failed, Cancelled, Pending (lease reclaimed)
            2 => &[3, 4, 5, 1],
            // Terminal states: Completed, Failed, Cancelled
            3..=5 => &[],
            _ => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: i16, to: i16) -> bool {
        valid_transitions(from).contains(&to)
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    #[test]
    fn kind_ids_round_trip() {
        for kind in TaskKind::ALL {
            assert_eq!(TaskKind::try_from(kind.id()).unwrap(), kind);
        }
        assert!(TaskKind::try_from(9).is_err());
    }

    #[test]
    fn renewal_outranks_generation() {
        assert!(TaskKind::Renewal.dispatch_rank() < TaskKind::BatchGeneration.dispatch_rank());
        assert!(TaskKind::Renewal.dispatch_rank() < TaskKind::SingleGeneration.dispatch_rank());
    }

    #[test]
    fn disabled_automation_only_leases_renewals() {
        assert_eq!(TaskKind::leasable(false), &[TaskKind::Renewal]);
        assert_eq!(TaskKind::leasable(true).len(), 3);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&TaskKind::BatchGeneration).unwrap();
        assert_eq!(json, "\"batch_generation\"");
    }

    #[test]
    fn generation_kind_by_quantity() {
        assert_eq!(generation_kind(1).unwrap(), TaskKind::SingleGeneration);
        assert_eq!(generation_kind(5).unwrap(), TaskKind::BatchGeneration);
        assert!(generation_kind(0).is_err());
        assert!(generation_kind(MAX_GENERATION_QUANTITY + 1).is_err());
    }

    #[test]
    fn pending_to_leased() {
        assert!(can_transition(1, 2));
    }

    #[test]
    fn leased_back_to_pending() {
        assert!(can_transition(2, 1));
    }

    #[test]
    fn late_report_on_reclaimed_lease_is_accepted() {
        assert!(can_transition(1, 3));
        assert!(can_transition(1, 4));
    }

    #[test]
    fn completed_cannot_be_reopened() {
        assert!(!can_transition(3, 1));
        assert!(!can_transition(4, 2));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        for status in [3, 4, 5] {
            assert!(valid_transitions(status).is_empty());
        }
    }

    #[test]
    fn unknown_status_has_no_transitions() {
        assert!(valid_transitions(99).is_empty());
    }
}
