//! Point distribution request and result shapes.

use rotor_core::allocation::DistributionMode;
use rotor_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/automation/distribute`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRequest {
    pub mode: DistributionMode,
    pub points_per_system: Option<i32>,
    /// Restricts fixed-capacity mode to these reserved systems.
    pub reserved_system_ids: Option<Vec<DbId>>,
}

/// Points bound to one system after a distribution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionDetail {
    pub system_id: DbId,
    pub external_id: i32,
    pub point_ids: Vec<DbId>,
}

/// Result of a committed distribution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionOutcome {
    pub systems_created: usize,
    pub points_bound: usize,
    pub details: Vec<DistributionDetail>,
}

impl DistributionOutcome {
    /// Every system whose allocation row was rewritten.
    pub fn touched_system_ids(&self) -> Vec<DbId> {
        self.details.iter().map(|d| d.system_id).collect()
    }
}
