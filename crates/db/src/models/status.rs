//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Map a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Renewal bookkeeping state of a system (`renewal_states`).
    RenewalState {
        Idle = 1,
        Queued = 2,
        Renewing = 3,
        FailedCooldown = 4,
    }
}

define_status_enum! {
    /// Task queue status (`task_statuses`).
    TaskStatus {
        Pending = 1,
        Leased = 2,
        Completed = 3,
        Failed = 4,
        Cancelled = 5,
    }
}

impl TaskStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Leased => "leased",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use rotor_core::renewal::state;
    use rotor_core::tasks::state_machine;

    use super::*;

    #[test]
    fn renewal_state_ids_match_seed_data() {
        assert_eq!(RenewalState::Idle.id(), 1);
        assert_eq!(RenewalState::Queued.id(), 2);
        assert_eq!(RenewalState::Renewing.id(), 3);
        assert_eq!(RenewalState::FailedCooldown.id(), 4);
    }

    #[test]
    fn renewal_state_ids_match_core_constants() {
        assert_eq!(RenewalState::Idle.id(), state::IDLE);
        assert_eq!(RenewalState::Queued.id(), state::QUEUED);
        assert_eq!(RenewalState::Renewing.id(), state::RENEWING);
        assert_eq!(RenewalState::FailedCooldown.id(), state::FAILED_COOLDOWN);
    }

    #[test]
    fn task_status_ids_match_seed_data() {
        assert_eq!(TaskStatus::Pending.id(), 1);
        assert_eq!(TaskStatus::Leased.id(), 2);
        assert_eq!(TaskStatus::Completed.id(), 3);
        assert_eq!(TaskStatus::Failed.id(), 4);
        assert_eq!(TaskStatus::Cancelled.id(), 5);
    }

    #[test]
    fn task_statuses_agree_with_core_state_machine() {
        let (pending, leased) = (TaskStatus::Pending.id(), TaskStatus::Leased.id());
        assert!(state_machine::can_transition(pending, leased));
        assert!(state_machine::can_transition(leased, TaskStatus::Completed.id()));
        assert!(state_machine::can_transition(leased, TaskStatus::Failed.id()));
        assert!(!state_machine::can_transition(TaskStatus::Cancelled.id(), pending));
    }

    #[test]
    fn from_id_round_trips() {
        assert_eq!(TaskStatus::from_id(2), Some(TaskStatus::Leased));
        assert_eq!(RenewalState::from_id(4), Some(RenewalState::FailedCooldown));
        assert_eq!(TaskStatus::from_id(42), None);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = TaskStatus::Failed.into();
        assert_eq!(id, 4);
    }
}
