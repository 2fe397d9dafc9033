//! Integration tests for the task queue.
//!
//! Exercises against a real database:
//! - Enqueue deduplication over live tasks
//! - Lease ordering and the renewing transition
//! - Idempotent terminal transitions
//! - Lease timeout reclamation
//! - Operator cancellation

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rotor_core::credentials::Credentials;
use rotor_core::tasks::TaskKind;
use rotor_db::models::status::{RenewalState, TaskStatus};
use rotor_db::models::system::{NewSystem, System};
use rotor_db::models::task::TaskListQuery;
use rotor_db::repositories::{SystemRepo, TaskRepo};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_system(pool: &PgPool, external_id: i32) -> System {
    SystemRepo::insert(
        pool,
        &NewSystem {
            external_id,
            credentials: Credentials {
                username: format!("user-{external_id}"),
                secret: "secret".to_string(),
            },
            expires_at: Utc::now() - Duration::minutes(5),
            capacity: 1,
        },
    )
    .await
    .unwrap()
}

/// Enqueue a renewal and mark the system queued, the way the detector does.
async fn queue_renewal(pool: &PgPool, system: &System) -> i64 {
    let task = TaskRepo::enqueue(pool, TaskKind::Renewal, Some(system.id), &json!({}))
        .await
        .unwrap()
        .expect("first enqueue creates a task");
    assert!(SystemRepo::mark_queued(pool, system.id).await.unwrap());
    task.id
}

async fn state_of(pool: &PgPool, id: i64) -> RenewalState {
    SystemRepo::find_by_id(pool, id)
        .await
        .unwrap()
        .unwrap()
        .renewal_state()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_is_deduplicated_per_system(pool: PgPool) {
    let system = seed_system(&pool, 1).await;

    let first = TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(system.id), &json!({}))
        .await
        .unwrap();
    let second = TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(system.id), &json!({}))
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());

    let live = TaskRepo::list(
        &pool,
        &TaskListQuery {
            system_id: Some(system.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(live.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_enqueue_creates_one_task(pool: PgPool) {
    let system_id = seed_system(&pool, 1).await.id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(system_id), &json!({}))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_allowed_again_after_terminal(pool: PgPool) {
    let system = seed_system(&pool, 1).await;
    let task_id = queue_renewal(&pool, &system).await;

    assert!(TaskRepo::fail(&pool, task_id, "boom", Utc::now()).await.unwrap());

    let again = TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(system.id), &json!({}))
        .await
        .unwrap();
    assert!(again.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn only_one_live_batch_generation(pool: PgPool) {
    let first = TaskRepo::enqueue(&pool, TaskKind::BatchGeneration, None, &json!({"quantity": 5}))
        .await
        .unwrap();
    let second = TaskRepo::enqueue(&pool, TaskKind::BatchGeneration, None, &json!({"quantity": 5}))
        .await
        .unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    // Single generations without a system are not deduplicated.
    let a = TaskRepo::enqueue(&pool, TaskKind::SingleGeneration, None, &json!({"quantity": 1}))
        .await
        .unwrap();
    let b = TaskRepo::enqueue(&pool, TaskKind::SingleGeneration, None, &json!({"quantity": 1}))
        .await
        .unwrap();
    assert!(a.is_some() && b.is_some());
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn lease_prefers_renewal_and_marks_system_renewing(pool: PgPool) {
    let generation = TaskRepo::enqueue(&pool, TaskKind::SingleGeneration, None, &json!({}))
        .await
        .unwrap()
        .unwrap();
    let system = seed_system(&pool, 1).await;
    let renewal_id = queue_renewal(&pool, &system).await;

    let leased = TaskRepo::lease(&pool, TaskKind::leasable(true), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leased.id, renewal_id);
    assert_eq!(leased.status(), Some(TaskStatus::Leased));
    assert_eq!(leased.attempts, 1);
    assert!(leased.leased_at.is_some());
    assert_eq!(state_of(&pool, system.id).await, RenewalState::Renewing);

    let next = TaskRepo::lease(&pool, TaskKind::leasable(true), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, generation.id);

    let none = TaskRepo::lease(&pool, TaskKind::leasable(true), Utc::now())
        .await
        .unwrap();
    assert!(none.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lease_skips_generation_when_disabled(pool: PgPool) {
    TaskRepo::enqueue(&pool, TaskKind::BatchGeneration, None, &json!({"quantity": 3}))
        .await
        .unwrap()
        .unwrap();

    let leased = TaskRepo::lease(&pool, TaskKind::leasable(false), Utc::now())
        .await
        .unwrap();
    assert!(leased.is_none());
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_is_idempotent(pool: PgPool) {
    let system = seed_system(&pool, 1).await;
    let task_id = queue_renewal(&pool, &system).await;

    let first = TaskRepo::complete(&pool, task_id, &json!({"ok": true}), Utc::now())
        .await
        .unwrap();
    let second = TaskRepo::complete(&pool, task_id, &json!({"ok": false}), Utc::now())
        .await
        .unwrap();
    let late_fail = TaskRepo::fail(&pool, task_id, "late", Utc::now()).await.unwrap();

    assert!(first);
    assert!(!second);
    assert!(!late_fail);

    let task = TaskRepo::find_by_id(&pool, task_id).await.unwrap().unwrap();
    assert_eq!(task.status(), Some(TaskStatus::Completed));
    assert_eq!(task.result, Some(json!({"ok": true})));
    assert!(task.error_message.is_none());
}

// ---------------------------------------------------------------------------
// Reaper
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn abandoned_lease_returns_to_queue(pool: PgPool) {
    let system = seed_system(&pool, 1).await;
    let task_id = queue_renewal(&pool, &system).await;

    let leased_at = Utc::now() - Duration::minutes(20);
    TaskRepo::lease(&pool, TaskKind::leasable(true), leased_at)
        .await
        .unwrap()
        .unwrap();

    // A lease younger than the cutoff is left alone.
    let untouched = TaskRepo::reap_abandoned(&pool, leased_at - Duration::minutes(1))
        .await
        .unwrap();
    assert!(untouched.is_empty());

    let reaped = TaskRepo::reap_abandoned(&pool, Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].id, task_id);
    assert_eq!(reaped[0].status(), Some(TaskStatus::Pending));
    assert!(reaped[0].leased_at.is_none());
    assert_eq!(state_of(&pool, system.id).await, RenewalState::Queued);

    // It can be leased again; attempts keep counting.
    let again = TaskRepo::lease(&pool, TaskKind::leasable(true), Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, task_id);
    assert_eq!(again.attempts, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn late_report_on_reclaimed_lease_is_accepted(pool: PgPool) {
    let system = seed_system(&pool, 1).await;
    let task_id = queue_renewal(&pool, &system).await;
    TaskRepo::lease(&pool, TaskKind::leasable(true), Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    TaskRepo::reap_abandoned(&pool, Utc::now() - Duration::minutes(15))
        .await
        .unwrap();

    let done = TaskRepo::complete(&pool, task_id, &json!({}), Utc::now())
        .await
        .unwrap();
    assert!(done);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_for_system_clears_live_task_and_state(pool: PgPool) {
    let system = seed_system(&pool, 1).await;
    let task_id = queue_renewal(&pool, &system).await;

    let cancelled = TaskRepo::cancel_for_system(&pool, system.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(cancelled, vec![task_id]);
    assert_eq!(state_of(&pool, system.id).await, RenewalState::Idle);

    let task = TaskRepo::find_by_id(&pool, task_id).await.unwrap().unwrap();
    assert_matches!(task.status(), Some(TaskStatus::Cancelled));
    assert!(!TaskRepo::complete(&pool, task_id, &json!({}), Utc::now())
        .await
        .unwrap());
}
