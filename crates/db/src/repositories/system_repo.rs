//! Repository for the `systems` table (the System Registry).
//!
//! Renewal state transitions go through `RenewalState`; every state literal
//! in the SQL is bound from the enum.

use rotor_core::allocation::RESERVED_EXTERNAL_ID_FLOOR;
use rotor_core::credentials::Credentials;
use rotor_core::tasks::TaskKind;
use rotor_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::status::{RenewalState, TaskStatus};
use crate::models::system::{NewSystem, System};

/// Column list for `systems` queries.
const COLUMNS: &str = "\
    id, external_id, username, secret, expires_at, capacity, bound_count, \
    renewal_state_id, last_renewed_at, renewal_count, \
    last_failure_at, last_failure_reason, mirror_pending, \
    created_at, updated_at";

/// Advisory lock key guarding external ID allocation.
const EXTERNAL_ID_LOCK_KEY: i64 = 0x726f_746f_725f_6964;

/// Provides registry operations for systems.
pub struct SystemRepo;

impl SystemRepo {
    /// Insert a system row. New systems start `idle` and `mirror_pending`.
    pub async fn insert<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewSystem,
    ) -> Result<System, sqlx::Error> {
        let query = format!(
            "INSERT INTO systems (external_id, username, secret, expires_at, capacity) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, System>(&query)
            .bind(input.external_id)
            .bind(&input.credentials.username)
            .bind(&input.credentials.secret)
            .bind(input.expires_at)
            .bind(input.capacity)
            .fetch_one(executor)
            .await
    }

    /// Serialize external ID allocation until the surrounding transaction
    /// ends. Every path that inserts a system takes this lock before picking
    /// or checking an external ID.
    pub async fn lock_external_ids<'e>(executor: impl PgExecutor<'e>) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(EXTERNAL_ID_LOCK_KEY)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Lowest unused external ID in the general pool (below the reserved
    /// floor), or `None` when the pool range is full.
    ///
    /// Takes the external ID lock first, so it must run inside a
    /// transaction that also performs the insert. The lookup is a separate
    /// statement and sees rows committed by the previous lock holder.
    pub async fn next_pool_external_id(conn: &mut PgConnection) -> Result<Option<i32>, sqlx::Error> {
        Self::lock_external_ids(&mut *conn).await?;
        sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MIN(candidate) \
             FROM generate_series(1, $1) AS candidate \
             WHERE NOT EXISTS (SELECT 1 FROM systems WHERE external_id = candidate)",
        )
        .bind(RESERVED_EXTERNAL_ID_FLOOR - 1)
        .fetch_one(&mut *conn)
        .await
    }

    /// Find a system by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<System>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM systems WHERE id = $1");
        sqlx::query_as::<_, System>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the systems with the given IDs, ordered by ID.
    pub async fn find_by_ids<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<Vec<System>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM systems WHERE id = ANY($1) ORDER BY id");
        sqlx::query_as::<_, System>(&query)
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    /// List all systems ordered by external ID.
    pub async fn list(pool: &PgPool) -> Result<Vec<System>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM systems ORDER BY external_id");
        sqlx::query_as::<_, System>(&query).fetch_all(pool).await
    }

    /// IDs of the non-reserved systems in allocation order (ascending ID).
    pub async fn list_pool_ids<'e>(
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM systems WHERE external_id < $1 ORDER BY id",
        )
        .bind(RESERVED_EXTERNAL_ID_FLOOR)
        .fetch_all(executor)
        .await
    }

    /// `(id, external_id)` pairs for the requested systems that exist.
    pub async fn external_ids<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<Vec<(DbId, i32)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, i32)>(
            "SELECT id, external_id FROM systems WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(executor)
        .await
    }

    /// Delete a system.
    ///
    /// Live tasks for the system are cancelled first in the same
    /// transaction; bound points are released by `ON DELETE SET NULL`.
    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId, now: Timestamp) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, completed_at = $3, error_message = 'System deleted' \
             WHERE system_id = $1 AND status_id IN ($4, $5)",
        )
        .bind(id)
        .bind(TaskStatus::Cancelled.id())
        .bind(now)
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Leased.id())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM systems WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Renewal detection
    // -----------------------------------------------------------------------

    /// Idle systems that are due for renewal.
    ///
    /// Due means `expires_at <= due_cutoff` (expiry minus the advance window
    /// has passed) and the last renewal, if any, is older than the cooldown.
    pub async fn list_due(
        pool: &PgPool,
        due_cutoff: Timestamp,
        cooldown_cutoff: Timestamp,
    ) -> Result<Vec<System>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM systems \
             WHERE renewal_state_id = $1 \
               AND expires_at <= $2 \
               AND (last_renewed_at IS NULL OR last_renewed_at <= $3) \
             ORDER BY expires_at ASC, id ASC"
        );
        sqlx::query_as::<_, System>(&query)
            .bind(RenewalState::Idle.id())
            .bind(due_cutoff)
            .bind(cooldown_cutoff)
            .fetch_all(pool)
            .await
    }

    /// Move an idle or cooled-down system to `queued`.
    ///
    /// Returns `false` if the system was in any other state.
    pub async fn mark_queued<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET renewal_state_id = $2 \
             WHERE id = $1 AND renewal_state_id IN ($3, $4)",
        )
        .bind(id)
        .bind(RenewalState::Queued.id())
        .bind(RenewalState::Idle.id())
        .bind(RenewalState::FailedCooldown.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a queued system to `renewing` when its task is leased.
    pub async fn mark_renewing<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET renewal_state_id = $2 \
             WHERE id = $1 AND renewal_state_id = $3",
        )
        .bind(id)
        .bind(RenewalState::Renewing.id())
        .bind(RenewalState::Queued.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move `renewing` systems back to `queued` (their task returned to the
    /// queue). Returns the number of systems changed.
    pub async fn requeue<'e>(
        executor: impl PgExecutor<'e>,
        ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET renewal_state_id = $2 \
             WHERE id = ANY($1) AND renewal_state_id = $3",
        )
        .bind(ids)
        .bind(RenewalState::Queued.id())
        .bind(RenewalState::Renewing.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Return a system to `idle` regardless of its renewal state.
    pub async fn reset_to_idle<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET renewal_state_id = $2 \
             WHERE id = $1 AND renewal_state_id <> $2",
        )
        .bind(id)
        .bind(RenewalState::Idle.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release `failed_cooldown` systems whose last failure is older than
    /// `cutoff` back to `idle`. Returns the released IDs.
    pub async fn release_cooldowns(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE systems SET renewal_state_id = $1 \
             WHERE renewal_state_id = $2 \
               AND (last_failure_at IS NULL OR last_failure_at <= $3) \
             RETURNING id",
        )
        .bind(RenewalState::Idle.id())
        .bind(RenewalState::FailedCooldown.id())
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// Reset `queued`/`renewing` systems that own no live renewal task.
    ///
    /// Such systems would otherwise never be scheduled again. Returns the
    /// IDs that were reset.
    pub async fn reset_orphaned(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE systems s SET renewal_state_id = $1 \
             WHERE s.renewal_state_id IN ($2, $3) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM tasks t \
                   WHERE t.system_id = s.id AND t.kind_id = $4 \
                     AND t.status_id IN ($5, $6) \
               ) \
             RETURNING s.id",
        )
        .bind(RenewalState::Idle.id())
        .bind(RenewalState::Queued.id())
        .bind(RenewalState::Renewing.id())
        .bind(TaskKind::Renewal.id())
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Leased.id())
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Apply a successful renewal in a single statement.
    ///
    /// Credentials, expiry, state, renewal timestamp, counter and the
    /// directory flag change together or not at all.
    pub async fn apply_renewal<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        credentials: &Credentials,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Option<System>, sqlx::Error> {
        let query = format!(
            "UPDATE systems SET \
                 username = $2, secret = $3, expires_at = $4, \
                 renewal_state_id = $5, last_renewed_at = $6, \
                 renewal_count = renewal_count + 1, \
                 last_failure_at = NULL, last_failure_reason = NULL, \
                 mirror_pending = TRUE \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, System>(&query)
            .bind(id)
            .bind(&credentials.username)
            .bind(&credentials.secret)
            .bind(expires_at)
            .bind(RenewalState::Idle.id())
            .bind(now)
            .fetch_optional(executor)
            .await
    }

    /// Record a worker-reported renewal failure and start the cooldown.
    pub async fn record_failure<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        reason: &str,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET \
                 renewal_state_id = $2, last_failure_at = $3, last_failure_reason = $4 \
             WHERE id = $1 AND renewal_state_id IN ($5, $6)",
        )
        .bind(id)
        .bind(RenewalState::FailedCooldown.id())
        .bind(now)
        .bind(reason)
        .bind(RenewalState::Queued.id())
        .bind(RenewalState::Renewing.id())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Zero `bound_count` on every system before a redistribution.
    pub async fn reset_bound_counts<'e>(
        executor: impl PgExecutor<'e>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE systems SET bound_count = 0 WHERE bound_count <> 0")
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Set the capacity and bound count a distribution assigned, and flag
    /// the system for the directory.
    pub async fn set_allocation<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        capacity: i32,
        bound_count: i32,
    ) -> Result<System, sqlx::Error> {
        let query = format!(
            "UPDATE systems SET capacity = $2, bound_count = $3, mirror_pending = TRUE \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, System>(&query)
            .bind(id)
            .bind(capacity)
            .bind(bound_count)
            .fetch_one(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Directory mirroring
    // -----------------------------------------------------------------------

    /// Systems whose latest state has not reached the directory yet.
    pub async fn list_mirror_pending(pool: &PgPool, limit: i64) -> Result<Vec<System>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM systems WHERE mirror_pending ORDER BY updated_at ASC LIMIT $1"
        );
        sqlx::query_as::<_, System>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Clear the directory flag, but only if the row has not changed since
    /// `seen_updated_at`. A newer change keeps the flag for the next pass.
    pub async fn clear_mirror_pending(
        pool: &PgPool,
        id: DbId,
        seen_updated_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE systems SET mirror_pending = FALSE \
             WHERE id = $1 AND mirror_pending AND updated_at = $2",
        )
        .bind(id)
        .bind(seen_updated_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
