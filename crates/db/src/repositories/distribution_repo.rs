//! Transactional application of point distributions.
//!
//! Planning is delegated to `rotor_core::allocation`; this repository reads
//! the inputs and writes the result inside one transaction serialised by the
//! `automation_config` row lock. A plan that fails validation returns before
//! any row changes.

use rotor_core::allocation::{self, DistributionMode, DistributionPlan};
use rotor_core::credentials::Credentials;
use rotor_core::error::CoreError;
use rotor_core::renewal::RenewalPolicy;
use rotor_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::distribution::{DistributionDetail, DistributionOutcome, DistributionRequest};
use crate::models::system::NewSystem;
use crate::repositories::{AutomationConfigRepo, PointRepo, SystemRepo};

/// Errors from a distribution run.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// The request or the resulting plan is invalid.
    #[error(transparent)]
    Plan(#[from] CoreError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Applies point distributions.
pub struct DistributionRepo;

impl DistributionRepo {
    /// Rebind every active point according to `request`.
    ///
    /// All points are unbound and all bound counts reset first; systems
    /// missing from the general pool are created with placeholder
    /// credentials that are already expired.
    pub async fn redistribute(
        pool: &PgPool,
        request: &DistributionRequest,
        max_points_per_system: i32,
        now: Timestamp,
    ) -> Result<DistributionOutcome, DistributionError> {
        let mut tx = pool.begin().await?;
        AutomationConfigRepo::lock(&mut *tx).await?;

        let points = PointRepo::list_active_ids(&mut *tx).await?;
        tracing::debug!(
            mode = request.mode.as_str(),
            points = points.len(),
            "Planning point distribution",
        );

        let plan = match request.mode {
            DistributionMode::OnePerPoint => {
                let eligible = SystemRepo::list_pool_ids(&mut *tx).await?;
                allocation::plan_one_per_point(&points, &eligible)
            }
            DistributionMode::FixedCapacity => {
                let per_system = request.points_per_system.ok_or_else(|| {
                    CoreError::Validation(
                        "pointsPerSystem is required for fixed-capacity mode".to_string(),
                    )
                })?;
                match &request.reserved_system_ids {
                    Some(requested) => {
                        let found = SystemRepo::external_ids(&mut *tx, requested).await?;
                        allocation::validate_reserved_selection(requested, &found)?;
                        // Allocation order is ascending ID, as in the general pool.
                        let systems: Vec<DbId> = found.iter().map(|(id, _)| *id).collect();
                        allocation::plan_fixed_capacity(
                            &points,
                            &systems,
                            per_system,
                            max_points_per_system,
                            false,
                        )?
                    }
                    None => {
                        let eligible = SystemRepo::list_pool_ids(&mut *tx).await?;
                        allocation::plan_fixed_capacity(
                            &points,
                            &eligible,
                            per_system,
                            max_points_per_system,
                            true,
                        )?
                    }
                }
            }
        };

        PointRepo::unbind_all(&mut *tx).await?;
        SystemRepo::reset_bound_counts(&mut *tx).await?;

        let slots = Self::create_missing_systems(&mut tx, &plan, now).await?;

        let mut details = Vec::with_capacity(slots.len());
        for (system_id, group) in slots.iter().zip(&plan.groups) {
            let system =
                SystemRepo::set_allocation(&mut *tx, *system_id, plan.capacity, group.len() as i32)
                    .await?;
            if !group.is_empty() {
                PointRepo::bind(&mut *tx, *system_id, group).await?;
            }
            details.push(DistributionDetail {
                system_id: system.id,
                external_id: system.external_id,
                point_ids: group.clone(),
            });
        }

        tx.commit().await?;

        Ok(DistributionOutcome {
            systems_created: plan.systems_to_create,
            points_bound: plan.points_bound(),
            details,
        })
    }

    /// Create the systems a plan asks for and return every slot's system ID
    /// in slot order.
    async fn create_missing_systems(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        plan: &DistributionPlan,
        now: Timestamp,
    ) -> Result<Vec<DbId>, DistributionError> {
        let mut slots = plan.existing_systems.clone();
        for _ in 0..plan.systems_to_create {
            let external_id = SystemRepo::next_pool_external_id(&mut **tx)
                .await?
                .ok_or_else(|| {
                    CoreError::Conflict("No free external IDs left in the general pool".to_string())
                })?;
            let system = SystemRepo::insert(
                &mut **tx,
                &NewSystem {
                    external_id,
                    credentials: Credentials::placeholder(external_id),
                    expires_at: RenewalPolicy::placeholder_expiry(now),
                    capacity: plan.capacity,
                },
            )
            .await?;
            slots.push(system.id);
        }
        Ok(slots)
    }
}
