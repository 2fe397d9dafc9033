//! Point-to-system allocation planning.
//!
//! Planning is pure: it decides how many systems to create and which points
//! go to which system slot. The repository layer applies a plan inside one
//! transaction, so a plan that fails validation never mutates anything.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// External IDs at or above this value denote permanently-reserved systems.
///
/// Reserved systems are never created or retired by the allocator.
pub const RESERVED_EXTERNAL_ID_FLOOR: i32 = 1000;

/// Default upper bound for `pointsPerSystem` in fixed-capacity mode.
pub const DEFAULT_MAX_POINTS_PER_SYSTEM: i32 = 50;

/// Whether an external ID belongs to the reserved range.
pub fn is_reserved(external_id: i32) -> bool {
    external_id >= RESERVED_EXTERNAL_ID_FLOOR
}

// ---------------------------------------------------------------------------
// Modes and plans
// ---------------------------------------------------------------------------

/// How points are spread over systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionMode {
    /// Every active point gets its own system with capacity 1.
    OnePerPoint,
    /// Points are grouped onto systems holding at most `pointsPerSystem`.
    FixedCapacity,
}

impl DistributionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionMode::OnePerPoint => "one-per-point",
            DistributionMode::FixedCapacity => "fixed-capacity",
        }
    }
}

/// The outcome of planning a distribution.
///
/// `groups[i]` holds the points for slot `i`. Slots `0..existing_systems.len()`
/// map onto `existing_systems` in order; the remaining
/// `systems_to_create` slots map onto systems the caller must create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    pub existing_systems: Vec<DbId>,
    pub systems_to_create: usize,
    /// Capacity every slotted system ends up with.
    pub capacity: i32,
    pub groups: Vec<Vec<DbId>>,
}

impl DistributionPlan {
    /// Total number of system slots (existing plus created).
    pub fn slot_count(&self) -> usize {
        self.existing_systems.len() + self.systems_to_create
    }

    /// Number of points the plan binds.
    pub fn points_bound(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Group size for spreading `total` points over `slots` systems.
pub fn group_size(total: usize, slots: usize) -> usize {
    if slots == 0 {
        0
    } else {
        total.div_ceil(slots)
    }
}

/// Split `points` into `slots` consecutive groups of `g = ceil(N / slots)`.
///
/// Every group but the last holds exactly `g` points; the last holds the
/// remainder `N - g * (slots - 1)`, which is between 1 and `g` whenever
/// `slots <= N`. With `slots = ceil(N / k)` this keeps `g <= k`.
pub fn partition(points: &[DbId], slots: usize) -> Vec<Vec<DbId>> {
    let size = group_size(points.len(), slots);
    (0..slots)
        .map(|slot| {
            let start = (slot * size).min(points.len());
            let end = if slot + 1 == slots {
                points.len()
            } else {
                ((slot + 1) * size).min(points.len())
            };
            points[start..end].to_vec()
        })
        .collect()
}

/// Plan a one-per-point distribution.
///
/// `eligible_systems` are the non-reserved systems in pairing order. Missing
/// systems are created; surplus systems end up with no point.
pub fn plan_one_per_point(points: &[DbId], eligible_systems: &[DbId]) -> DistributionPlan {
    let systems_to_create = points.len().saturating_sub(eligible_systems.len());
    let slots = eligible_systems.len() + systems_to_create;
    let groups = (0..slots)
        .map(|i| points.get(i).map(|p| vec![*p]).unwrap_or_default())
        .collect();

    DistributionPlan {
        existing_systems: eligible_systems.to_vec(),
        systems_to_create,
        capacity: 1,
        groups,
    }
}

/// Plan a fixed-capacity distribution.
///
/// With `create_missing` (general pool), systems are created until
/// `ceil(N / k)` exist. Without it (reserved systems), the supplied systems
/// must already be able to hold every point.
pub fn plan_fixed_capacity(
    points: &[DbId],
    systems: &[DbId],
    points_per_system: i32,
    max_points_per_system: i32,
    create_missing: bool,
) -> Result<DistributionPlan, CoreError> {
    validate_points_per_system(points_per_system, max_points_per_system)?;
    let per_system = points_per_system as usize;

    let systems_to_create = if create_missing {
        points
            .len()
            .div_ceil(per_system)
            .saturating_sub(systems.len())
    } else {
        check_capacity(points.len(), systems.len(), per_system)?;
        0
    };

    let slots = systems.len() + systems_to_create;
    Ok(DistributionPlan {
        existing_systems: systems.to_vec(),
        systems_to_create,
        capacity: points_per_system,
        groups: partition(points, slots),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a requested `pointsPerSystem` against the configured cap.
pub fn validate_points_per_system(points_per_system: i32, max: i32) -> Result<(), CoreError> {
    if !(1..=max).contains(&points_per_system) {
        return Err(CoreError::Validation(format!(
            "pointsPerSystem must be between 1 and {max}"
        )));
    }
    Ok(())
}

/// Reject packing more points than `system_count * per_system` allows.
pub fn check_capacity(
    point_count: usize,
    system_count: usize,
    per_system: usize,
) -> Result<(), CoreError> {
    if point_count > system_count * per_system {
        return Err(CoreError::Validation(format!(
            "Cannot place {point_count} points on {system_count} systems \
             holding at most {per_system} points each"
        )));
    }
    Ok(())
}

/// Validate that caller-supplied reserved systems really are reserved.
///
/// `found` pairs each requested system ID with its external ID; requested
/// IDs missing from `found` do not exist.
pub fn validate_reserved_selection(
    requested: &[DbId],
    found: &[(DbId, i32)],
) -> Result<(), CoreError> {
    if requested.is_empty() {
        return Err(CoreError::Validation(
            "reservedSystemIds must not be empty".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::with_capacity(requested.len());
    for id in requested {
        if !seen.insert(*id) {
            return Err(CoreError::Validation(format!(
                "Duplicate reserved system id {id}"
            )));
        }
        match found.iter().find(|(sid, _)| sid == id) {
            None => {
                return Err(CoreError::NotFound {
                    entity: "System",
                    id: *id,
                })
            }
            Some((_, external_id)) if !is_reserved(*external_id) => {
                return Err(CoreError::Validation(format!(
                    "System {id} is not a reserved system (external id {external_id})"
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}
