//! Repository for the `points` table.

use rotor_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::point::{CreatePoint, Point};

/// Column list for `points` queries.
const COLUMNS: &str = "id, label, system_id, is_active, created_at, updated_at";

/// Provides CRUD and binding operations for points.
pub struct PointRepo;

impl PointRepo {
    /// Register a new, unbound point.
    pub async fn create(pool: &PgPool, input: &CreatePoint) -> Result<Point, sqlx::Error> {
        let query = format!(
            "INSERT INTO points (label, is_active) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Point>(&query)
            .bind(&input.label)
            .bind(input.is_active.unwrap_or(true))
            .fetch_one(pool)
            .await
    }

    /// Find a point by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Point>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM points WHERE id = $1");
        sqlx::query_as::<_, Point>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all points ordered by ID.
    pub async fn list(pool: &PgPool) -> Result<Vec<Point>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM points ORDER BY id");
        sqlx::query_as::<_, Point>(&query).fetch_all(pool).await
    }

    /// Enable or disable a point. Returns `true` if the row exists.
    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE points SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs of the active points in allocation order (ascending ID).
    pub async fn list_active_ids<'e>(
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM points WHERE is_active ORDER BY id")
            .fetch_all(executor)
            .await
    }

    /// IDs of the points bound to a system, ascending.
    pub async fn ids_for_system<'e>(
        executor: impl PgExecutor<'e>,
        system_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>("SELECT id FROM points WHERE system_id = $1 ORDER BY id")
            .bind(system_id)
            .fetch_all(executor)
            .await
    }

    /// Release every point from its system.
    pub async fn unbind_all<'e>(executor: impl PgExecutor<'e>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE points SET system_id = NULL WHERE system_id IS NOT NULL")
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Bind the given points to a system.
    pub async fn bind<'e>(
        executor: impl PgExecutor<'e>,
        system_id: DbId,
        point_ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE points SET system_id = $1 WHERE id = ANY($2)")
            .bind(system_id)
            .bind(point_ids)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
