//! Repository for the `tasks` table (the Task Queue).
//!
//! Deduplication is enforced by the partial unique indexes over live rows;
//! `enqueue` relies on `ON CONFLICT DO NOTHING` so concurrent producers can
//! never create two live tasks for the same target.

use rotor_core::tasks::TaskKind;
use rotor_core::types::{DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::{Task, TaskListQuery};
use crate::repositories::SystemRepo;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, kind_id, status_id, system_id, payload, result, error_message, \
    attempts, created_at, leased_at, completed_at, updated_at";

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 50;

/// Statuses a terminal transition may start from.
const LIVE_STATUSES: [StatusId; 2] = [TaskStatus::Pending as StatusId, TaskStatus::Leased as StatusId];

/// `CASE` expression ordering `kind_id` by [`TaskKind::dispatch_rank`].
fn dispatch_rank_sql() -> String {
    let arms: Vec<String> = TaskKind::ALL
        .iter()
        .map(|kind| format!("WHEN {} THEN {}", kind.id(), kind.dispatch_rank()))
        .collect();
    format!("CASE kind_id {} END", arms.join(" "))
}

/// Provides queue operations for automation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a pending task unless a live duplicate exists.
    ///
    /// Returns `None` when the unique index rejected the row.
    pub async fn enqueue<'e>(
        executor: impl PgExecutor<'e>,
        kind: TaskKind,
        system_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (kind_id, status_id, system_id, payload) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(kind.id())
            .bind(TaskStatus::Pending.id())
            .bind(system_id)
            .bind(payload)
            .fetch_optional(executor)
            .await
    }

    /// Find a task by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Load a task and lock its row until the surrounding transaction ends.
    pub async fn lock<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// The live task of `kind` targeting a system, if any.
    pub async fn find_live_for_system<'e>(
        executor: impl PgExecutor<'e>,
        kind: TaskKind,
        system_id: DbId,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE kind_id = $1 AND system_id = $2 AND status_id IN ($3, $4)"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(kind.id())
            .bind(system_id)
            .bind(LIVE_STATUSES[0])
            .bind(LIVE_STATUSES[1])
            .fetch_optional(executor)
            .await
    }

    /// Lease the next pending task among `kinds`.
    ///
    /// Renewal tasks are served before generation tasks, FIFO otherwise.
    /// `SKIP LOCKED` keeps two concurrent polls from leasing the same row.
    /// Leasing a renewal task moves its system to `renewing` in the same
    /// transaction.
    pub async fn lease(
        pool: &PgPool,
        kinds: &[TaskKind],
        now: Timestamp,
    ) -> Result<Option<Task>, sqlx::Error> {
        if kinds.is_empty() {
            return Ok(None);
        }
        let kind_ids: Vec<i16> = kinds.iter().map(|k| k.id()).collect();
        let rank = dispatch_rank_sql();

        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE tasks \
             SET status_id = $1, leased_at = $2, attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM tasks \
                 WHERE status_id = $3 AND kind_id = ANY($4) \
                 ORDER BY {rank}, created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Leased.id())
            .bind(now)
            .bind(TaskStatus::Pending.id())
            .bind(&kind_ids)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(task) = &task {
            if task.kind_id == TaskKind::Renewal.id() {
                if let Some(system_id) = task.system_id {
                    SystemRepo::mark_renewing(&mut *tx, system_id).await?;
                }
            }
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Mark a live task `completed` with its result.
    ///
    /// Returns `false` if the task was already terminal.
    pub async fn complete<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        result: &serde_json::Value,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result = $3, completed_at = $4 \
             WHERE id = $1 AND status_id IN ($5, $6)",
        )
        .bind(id)
        .bind(TaskStatus::Completed.id())
        .bind(result)
        .bind(now)
        .bind(LIVE_STATUSES[0])
        .bind(LIVE_STATUSES[1])
        .execute(executor)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Mark a live task `failed` with a reason.
    ///
    /// Returns `false` if the task was already terminal.
    pub async fn fail<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        reason: &str,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, error_message = $3, completed_at = $4 \
             WHERE id = $1 AND status_id IN ($5, $6)",
        )
        .bind(id)
        .bind(TaskStatus::Failed.id())
        .bind(reason)
        .bind(now)
        .bind(LIVE_STATUSES[0])
        .bind(LIVE_STATUSES[1])
        .execute(executor)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Return leases older than `cutoff` to the queue.
    ///
    /// Reclaimed renewal tasks move their systems from `renewing` back to
    /// `queued`. Returns the reclaimed tasks.
    pub async fn reap_abandoned(pool: &PgPool, cutoff: Timestamp) -> Result<Vec<Task>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE tasks SET status_id = $1, leased_at = NULL \
             WHERE status_id = $2 AND leased_at <= $3 \
             RETURNING {COLUMNS}"
        );
        let reaped = sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Leased.id())
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;

        let system_ids: Vec<DbId> = reaped
            .iter()
            .filter(|t| t.kind_id == TaskKind::Renewal.id())
            .filter_map(|t| t.system_id)
            .collect();
        if !system_ids.is_empty() {
            SystemRepo::requeue(&mut *tx, &system_ids).await?;
        }

        tx.commit().await?;
        Ok(reaped)
    }

    /// Cancel every live task targeting a system and return the system to
    /// `idle`, in one transaction. Returns the cancelled task IDs.
    pub async fn cancel_for_system(
        pool: &PgPool,
        system_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let cancelled = sqlx::query_scalar::<_, DbId>(
            "UPDATE tasks \
             SET status_id = $2, completed_at = $3, error_message = 'Cancelled by operator' \
             WHERE system_id = $1 AND status_id IN ($4, $5) \
             RETURNING id",
        )
        .bind(system_id)
        .bind(TaskStatus::Cancelled.id())
        .bind(now)
        .bind(LIVE_STATUSES[0])
        .bind(LIVE_STATUSES[1])
        .fetch_all(&mut *tx)
        .await?;

        SystemRepo::reset_to_idle(&mut *tx, system_id).await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    /// List tasks, newest first, with optional kind/status/system filters.
    pub async fn list(pool: &PgPool, params: &TaskListQuery) -> Result<Vec<Task>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.kind.is_some() {
            conditions.push(format!("kind_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.system_id.is_some() {
            conditions.push(format!("system_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM tasks {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let mut q = sqlx::query_as::<_, Task>(&query);
        if let Some(kind) = params.kind {
            q = q.bind(kind.id());
        }
        if let Some(status) = params.status {
            q = q.bind(status);
        }
        if let Some(system_id) = params.system_id {
            q = q.bind(system_id);
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }
}
