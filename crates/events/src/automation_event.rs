//! Typed automation events.
//!
//! Producers build an [`AutomationEvent`] and publish it as a
//! [`PlatformEvent`](crate::PlatformEvent); subscribers match on
//! [`PlatformEvent::kind`](crate::PlatformEvent::kind). The event name,
//! target ids and JSON payload of the log row are all derived from the
//! variant.

use rotor_core::event_types;
use rotor_core::types::{DbId, Timestamp};
use serde_json::json;

/// One automation state change.
#[derive(Debug, Clone, PartialEq)]
pub enum AutomationEvent {
    SystemRenewed {
        system_id: DbId,
        task_id: DbId,
        expires_at: Timestamp,
    },
    SystemsGenerated {
        task_id: DbId,
        system_ids: Vec<DbId>,
    },
    PointsRedistributed {
        mode: String,
        systems_created: usize,
        points_bound: usize,
    },
    RenewalQueued {
        system_id: DbId,
        task_id: DbId,
        forced: bool,
    },
    RenewalFailed {
        system_id: Option<DbId>,
        task_id: DbId,
        reason: String,
        malformed: bool,
    },
    RenewalCancelled {
        system_id: DbId,
        task_ids: Vec<DbId>,
    },
    GenerationQueued {
        task_id: DbId,
        quantity: i32,
        automatic: bool,
    },
    GenerationFailed {
        task_id: DbId,
        reason: String,
        malformed: bool,
    },
    TasksReaped {
        task_ids: Vec<DbId>,
    },
    /// A system stuck in flight without a live task was reset to idle.
    SystemSelfHealed {
        system_id: DbId,
    },
    ConfigUpdated {
        settings: serde_json::Value,
    },
}

impl AutomationEvent {
    /// Dot-separated name stored in `automation_log.event_type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SystemRenewed { .. } => event_types::SYSTEM_RENEWED,
            Self::SystemsGenerated { .. } => event_types::SYSTEMS_GENERATED,
            Self::PointsRedistributed { .. } => event_types::POINTS_REDISTRIBUTED,
            Self::RenewalQueued { .. } => event_types::RENEWAL_QUEUED,
            Self::RenewalFailed { .. } => event_types::RENEWAL_FAILED,
            Self::RenewalCancelled { .. } => event_types::RENEWAL_CANCELLED,
            Self::GenerationQueued { .. } => event_types::GENERATION_QUEUED,
            Self::GenerationFailed { .. } => event_types::GENERATION_FAILED,
            Self::TasksReaped { .. } => event_types::TASKS_REAPED,
            Self::SystemSelfHealed { .. } => event_types::SYSTEM_SELF_HEALED,
            Self::ConfigUpdated { .. } => event_types::CONFIG_UPDATED,
        }
    }

    pub fn system_id(&self) -> Option<DbId> {
        match self {
            Self::SystemRenewed { system_id, .. }
            | Self::RenewalQueued { system_id, .. }
            | Self::RenewalCancelled { system_id, .. }
            | Self::SystemSelfHealed { system_id } => Some(*system_id),
            Self::RenewalFailed { system_id, .. } => *system_id,
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<DbId> {
        match self {
            Self::SystemRenewed { task_id, .. }
            | Self::SystemsGenerated { task_id, .. }
            | Self::RenewalQueued { task_id, .. }
            | Self::RenewalFailed { task_id, .. }
            | Self::GenerationQueued { task_id, .. }
            | Self::GenerationFailed { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    /// camelCase JSON payload for the log row and the webhook body.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::SystemRenewed { expires_at, .. } => json!({ "expiresAt": expires_at }),
            Self::SystemsGenerated { system_ids, .. } => {
                json!({ "systemIds": system_ids, "count": system_ids.len() })
            }
            Self::PointsRedistributed {
                mode,
                systems_created,
                points_bound,
            } => json!({
                "mode": mode,
                "systemsCreated": systems_created,
                "pointsBound": points_bound,
            }),
            Self::RenewalQueued { forced, .. } => json!({ "forced": forced }),
            Self::RenewalFailed {
                reason, malformed, ..
            }
            | Self::GenerationFailed {
                reason, malformed, ..
            } => json!({ "reason": reason, "malformed": malformed }),
            Self::RenewalCancelled { task_ids, .. } => json!({ "cancelledTasks": task_ids }),
            Self::GenerationQueued {
                quantity, automatic, ..
            } => json!({ "quantity": quantity, "automatic": automatic }),
            Self::TasksReaped { task_ids } => {
                json!({ "taskIds": task_ids, "count": task_ids.len() })
            }
            Self::SystemSelfHealed { .. } => json!({}),
            Self::ConfigUpdated { settings } => settings.clone(),
        }
    }

    /// Whether the operator webhook forwards this event.
    ///
    /// Failures, repairs and changes to the system inventory are forwarded;
    /// routine queueing and renewals are not.
    pub fn notifies_operator(&self) -> bool {
        matches!(
            self,
            Self::RenewalFailed { .. }
                | Self::GenerationFailed { .. }
                | Self::SystemSelfHealed { .. }
                | Self::TasksReaped { .. }
                | Self::SystemsGenerated { .. }
                | Self::PointsRedistributed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_renewal_without_system() {
        let event = AutomationEvent::RenewalFailed {
            system_id: None,
            task_id: 9,
            reason: "captcha".into(),
            malformed: false,
        };
        assert_eq!(event.event_type(), event_types::RENEWAL_FAILED);
        assert_eq!(event.system_id(), None);
        assert_eq!(event.task_id(), Some(9));
        assert_eq!(event.payload()["reason"], "captcha");
    }

    #[test]
    fn reaped_tasks_carry_no_single_target() {
        let event = AutomationEvent::TasksReaped { task_ids: vec![1, 2] };
        assert_eq!(event.system_id(), None);
        assert_eq!(event.task_id(), None);
        assert_eq!(event.payload()["count"], 2);
    }

    #[test]
    fn operator_is_paged_for_failures_not_routine_work() {
        assert!(AutomationEvent::SystemSelfHealed { system_id: 1 }.notifies_operator());
        assert!(AutomationEvent::GenerationFailed {
            task_id: 1,
            reason: "x".into(),
            malformed: true,
        }
        .notifies_operator());
        assert!(!AutomationEvent::RenewalQueued {
            system_id: 1,
            task_id: 2,
            forced: false,
        }
        .notifies_operator());
        assert!(!AutomationEvent::ConfigUpdated {
            settings: json!({}),
        }
        .notifies_operator());
    }
}
