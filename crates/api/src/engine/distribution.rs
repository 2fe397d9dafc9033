//! Point redistribution with directory mirroring.

use chrono::Utc;
use rotor_db::models::distribution::{DistributionOutcome, DistributionRequest};
use rotor_db::repositories::DistributionRepo;
use rotor_events::PlatformEvent;

use crate::error::AppResult;
use crate::state::AppState;

/// Rebind all active points and mirror every system that received points.
///
/// Mirror failures leave `mirror_pending` set for the reconciler and do not
/// fail the request.
pub async fn distribute(
    state: &AppState,
    request: &DistributionRequest,
) -> AppResult<DistributionOutcome> {
    let outcome = DistributionRepo::redistribute(
        &state.pool,
        request,
        state.config.max_points_per_system,
        Utc::now(),
    )
    .await?;

    let touched = outcome.touched_system_ids();
    let mirrored = state.directory.mirror_ids(&state.pool, &touched).await;

    tracing::info!(
        mode = request.mode.as_str(),
        systems_created = outcome.systems_created,
        points_bound = outcome.points_bound,
        mirrored,
        touched = touched.len(),
        "Points redistributed",
    );
    state.event_bus.publish(PlatformEvent::points_redistributed(
        request.mode.as_str(),
        outcome.systems_created,
        outcome.points_bound,
    ));

    Ok(outcome)
}
