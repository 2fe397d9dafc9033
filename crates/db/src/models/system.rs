//! System entity models and DTOs.
//!
//! A system is one set of credentials on the provisioning service. Its
//! renewal bookkeeping lives on the same row so a renewal can be applied
//! with a single `UPDATE`.

use rotor_core::allocation;
use rotor_core::credentials::Credentials;
use rotor_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RenewalState, StatusId};

/// A row from the `systems` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub id: DbId,
    pub external_id: i32,
    pub username: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub expires_at: Timestamp,
    pub capacity: i32,
    pub bound_count: i32,
    pub renewal_state_id: StatusId,
    pub last_renewed_at: Option<Timestamp>,
    pub renewal_count: i32,
    pub last_failure_at: Option<Timestamp>,
    pub last_failure_reason: Option<String>,
    pub mirror_pending: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl System {
    /// Decoded renewal state. Unknown IDs read as `None`.
    pub fn renewal_state(&self) -> Option<RenewalState> {
        RenewalState::from_id(self.renewal_state_id)
    }

    /// Whether the system sits in the permanently-reserved range.
    pub fn is_reserved(&self) -> bool {
        allocation::is_reserved(self.external_id)
    }
}

/// DTO for `POST /api/v1/systems`.
///
/// Omitted fields are filled in by the server: the next free pool external
/// ID, placeholder credentials and capacity 1.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSystem {
    pub external_id: Option<i32>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub capacity: Option<i32>,
}

/// Fully resolved values for inserting a system row.
#[derive(Debug, Clone)]
pub struct NewSystem {
    pub external_id: i32,
    pub credentials: Credentials,
    pub expires_at: Timestamp,
    pub capacity: i32,
}
