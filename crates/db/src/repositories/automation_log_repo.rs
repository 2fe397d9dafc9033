//! Repository for the append-only `automation_log` table.

use rotor_core::types::DbId;
use sqlx::PgPool;

use crate::models::automation::{CreateLogEntry, LogEntry, LogListQuery};

/// Column list for `automation_log` queries.
const COLUMNS: &str = "id, event_type, system_id, task_id, payload, created_at";

/// Maximum page size for log listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for log listing.
const DEFAULT_LIMIT: i64 = 50;

/// Appends and lists automation log entries.
pub struct AutomationLogRepo;

impl AutomationLogRepo {
    /// Append an entry. Returns the new row ID.
    pub async fn insert(pool: &PgPool, entry: &CreateLogEntry) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO automation_log (event_type, system_id, task_id, payload) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&entry.event_type)
        .bind(entry.system_id)
        .bind(entry.task_id)
        .bind(&entry.payload)
        .fetch_one(pool)
        .await
    }

    /// List entries newest first, optionally filtered by system and type.
    pub async fn list(pool: &PgPool, params: &LogListQuery) -> Result<Vec<LogEntry>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM automation_log \
             WHERE ($1::BIGINT IS NULL OR system_id = $1) \
               AND ($2::TEXT IS NULL OR event_type = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, LogEntry>(&query)
            .bind(params.system_id)
            .bind(params.event_type.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
