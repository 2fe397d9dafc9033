//! Repository for the `automation_config` singleton.

use rotor_core::types::Timestamp;
use sqlx::{PgExecutor, PgPool};

use crate::models::automation::{AutomationConfig, UpdateAutomationConfig};

/// Column list for `automation_config` queries.
const COLUMNS: &str =
    "enabled, batch_size, interval_minutes, advance_minutes, last_generation_at, updated_at";

/// Reads and writes the runtime automation settings.
pub struct AutomationConfigRepo;

impl AutomationConfigRepo {
    /// Load the current settings.
    pub async fn get(pool: &PgPool) -> Result<AutomationConfig, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM automation_config WHERE id = 1");
        sqlx::query_as::<_, AutomationConfig>(&query)
            .fetch_one(pool)
            .await
    }

    /// Apply a partial update. Only non-`None` fields change.
    pub async fn update(
        pool: &PgPool,
        input: &UpdateAutomationConfig,
    ) -> Result<AutomationConfig, sqlx::Error> {
        let query = format!(
            "UPDATE automation_config SET \
                 enabled = COALESCE($1, enabled), \
                 batch_size = COALESCE($2, batch_size), \
                 interval_minutes = COALESCE($3, interval_minutes), \
                 advance_minutes = COALESCE($4, advance_minutes) \
             WHERE id = 1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AutomationConfig>(&query)
            .bind(input.enabled)
            .bind(input.batch_size)
            .bind(input.interval_minutes)
            .bind(input.advance_minutes)
            .fetch_one(pool)
            .await
    }

    /// Lock the settings row until the surrounding transaction ends.
    ///
    /// Distributions take this lock so that two of them never interleave.
    pub async fn lock<'e>(executor: impl PgExecutor<'e>) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT id FROM automation_config WHERE id = 1 FOR UPDATE")
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Claim the next automatic generation slot.
    ///
    /// Succeeds only while automation is enabled, an interval is set and
    /// the last claim is at least one interval old; the stamp is written in
    /// the same statement so concurrent callers cannot both claim. Returns
    /// the batch size to request.
    pub async fn claim_generation_slot(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE automation_config SET last_generation_at = $1 \
             WHERE id = 1 AND enabled AND interval_minutes > 0 \
               AND (last_generation_at IS NULL \
                    OR last_generation_at <= $1 - make_interval(mins => interval_minutes)) \
             RETURNING batch_size",
        )
        .bind(now)
        .fetch_optional(pool)
        .await
    }
}
