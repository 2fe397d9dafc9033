//! Integration tests for the system registry and automation settings.

use chrono::{Duration, Utc};
use rotor_core::credentials::Credentials;
use rotor_core::tasks::TaskKind;
use rotor_db::models::automation::{CreateLogEntry, LogListQuery, UpdateAutomationConfig};
use rotor_db::models::status::{RenewalState, TaskStatus};
use rotor_db::models::system::{NewSystem, System};
use rotor_db::repositories::{AutomationConfigRepo, AutomationLogRepo, SystemRepo, TaskRepo};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_system(pool: &PgPool, external_id: i32, expires_in: Duration) -> System {
    SystemRepo::insert(
        pool,
        &NewSystem {
            external_id,
            credentials: Credentials {
                username: format!("user-{external_id}"),
                secret: "old-secret".to_string(),
            },
            expires_at: Utc::now() + expires_in,
            capacity: 1,
        },
    )
    .await
    .unwrap()
}

fn pool_system(external_id: i32) -> NewSystem {
    NewSystem {
        external_id,
        credentials: Credentials::placeholder(external_id),
        expires_at: Utc::now(),
        capacity: 1,
    }
}

fn creds(username: &str, secret: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        secret: secret.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Due detection
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_due_honours_advance_and_cooldown(pool: PgPool) {
    let now = Utc::now();
    let soon = seed_system(&pool, 1, Duration::minutes(10)).await;
    let later = seed_system(&pool, 2, Duration::hours(3)).await;
    let recently_renewed = seed_system(&pool, 3, Duration::minutes(10)).await;
    SystemRepo::apply_renewal(&pool, recently_renewed.id, &creds("u", "p"), now + Duration::minutes(10), now)
        .await
        .unwrap();

    let due = SystemRepo::list_due(&pool, now + Duration::minutes(30), now - Duration::minutes(30))
        .await
        .unwrap();
    let ids: Vec<i64> = due.iter().map(|s| s.id).collect();

    assert_eq!(ids, vec![soon.id]);
    assert!(!ids.contains(&later.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn queued_systems_are_not_due(pool: PgPool) {
    let now = Utc::now();
    let system = seed_system(&pool, 1, Duration::minutes(-5)).await;
    assert!(SystemRepo::mark_queued(&pool, system.id).await.unwrap());
    assert!(!SystemRepo::mark_queued(&pool, system.id).await.unwrap());

    let due = SystemRepo::list_due(&pool, now + Duration::minutes(30), now - Duration::minutes(30))
        .await
        .unwrap();
    assert!(due.is_empty());
}

// ---------------------------------------------------------------------------
// Renewal application
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn apply_renewal_updates_every_field_together(pool: PgPool) {
    let now = Utc::now();
    let system = seed_system(&pool, 1, Duration::minutes(-5)).await;
    SystemRepo::mark_queued(&pool, system.id).await.unwrap();

    let renewed = SystemRepo::apply_renewal(&pool, system.id, &creds("fresh", "pw"), now + Duration::hours(6), now)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(renewed.username, "fresh");
    assert_eq!(renewed.secret, "pw");
    assert!(renewed.expires_at > now);
    assert_eq!(renewed.renewal_state(), Some(RenewalState::Idle));
    assert!(renewed.last_renewed_at.is_some());
    assert_eq!(renewed.renewal_count, system.renewal_count + 1);
    assert!(renewed.mirror_pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rolled_back_renewal_leaves_no_trace(pool: PgPool) {
    let now = Utc::now();
    let system = seed_system(&pool, 1, Duration::minutes(-5)).await;

    let mut tx = pool.begin().await.unwrap();
    SystemRepo::apply_renewal(&mut *tx, system.id, &creds("fresh", "pw"), now + Duration::hours(6), now)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let after = SystemRepo::find_by_id(&pool, system.id).await.unwrap().unwrap();
    assert_eq!(after.username, system.username);
    assert_eq!(after.secret, system.secret);
    assert_eq!(after.expires_at, system.expires_at);
    assert_eq!(after.renewal_count, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failure_cooldown_then_release(pool: PgPool) {
    let now = Utc::now();
    let system = seed_system(&pool, 1, Duration::minutes(-5)).await;
    SystemRepo::mark_queued(&pool, system.id).await.unwrap();

    assert!(SystemRepo::record_failure(&pool, system.id, "captcha", now).await.unwrap());
    let failed = SystemRepo::find_by_id(&pool, system.id).await.unwrap().unwrap();
    assert_eq!(failed.renewal_state(), Some(RenewalState::FailedCooldown));
    assert_eq!(failed.last_failure_reason.as_deref(), Some("captcha"));

    // Not yet cooled down.
    let released = SystemRepo::release_cooldowns(&pool, now - Duration::minutes(15))
        .await
        .unwrap();
    assert!(released.is_empty());

    let released = SystemRepo::release_cooldowns(&pool, now + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(released, vec![system.id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn orphaned_queued_system_is_reset(pool: PgPool) {
    let with_task = seed_system(&pool, 1, Duration::minutes(-5)).await;
    let orphan = seed_system(&pool, 2, Duration::minutes(-5)).await;

    TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(with_task.id), &json!({}))
        .await
        .unwrap()
        .unwrap();
    SystemRepo::mark_queued(&pool, with_task.id).await.unwrap();
    SystemRepo::mark_queued(&pool, orphan.id).await.unwrap();

    let reset = SystemRepo::reset_orphaned(&pool).await.unwrap();
    assert_eq!(reset, vec![orphan.id]);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_cancels_live_tasks(pool: PgPool) {
    let system = seed_system(&pool, 1, Duration::minutes(-5)).await;
    let task = TaskRepo::enqueue(&pool, TaskKind::Renewal, Some(system.id), &json!({}))
        .await
        .unwrap()
        .unwrap();

    assert!(SystemRepo::delete(&pool, system.id, Utc::now()).await.unwrap());
    assert!(SystemRepo::find_by_id(&pool, system.id).await.unwrap().is_none());

    let task = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(task.status(), Some(TaskStatus::Cancelled));
    assert!(task.system_id.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn next_pool_external_id_fills_gaps(pool: PgPool) {
    seed_system(&pool, 1, Duration::hours(1)).await;
    seed_system(&pool, 3, Duration::hours(1)).await;
    seed_system(&pool, 1000, Duration::hours(1)).await;

    let mut tx = pool.begin().await.unwrap();
    let next = SystemRepo::next_pool_external_id(&mut *tx).await.unwrap();
    assert_eq!(next, Some(2));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn overlapping_allocations_pick_distinct_external_ids(pool: PgPool) {
    let mut first = pool.begin().await.unwrap();
    let first_id = SystemRepo::next_pool_external_id(&mut *first)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_id, 1);
    SystemRepo::insert(&mut *first, &pool_system(first_id))
        .await
        .unwrap();

    let second_pool = pool.clone();
    let second = tokio::spawn(async move {
        let mut tx = second_pool.begin().await.unwrap();
        let id = SystemRepo::next_pool_external_id(&mut *tx)
            .await
            .unwrap()
            .unwrap();
        SystemRepo::insert(&mut *tx, &pool_system(id)).await.unwrap();
        tx.commit().await.unwrap();
        id
    });

    // The second allocation waits while the first transaction is open.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!second.is_finished());

    first.commit().await.unwrap();
    assert_eq!(second.await.unwrap(), 2);

    let external_ids: Vec<i32> = SystemRepo::list(&pool)
        .await
        .unwrap()
        .iter()
        .map(|s| s.external_id)
        .collect();
    assert_eq!(external_ids, vec![1, 2]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_external_id_is_rejected(pool: PgPool) {
    seed_system(&pool, 7, Duration::hours(1)).await;
    let err = SystemRepo::insert(
        &pool,
        &NewSystem {
            external_id: 7,
            credentials: creds("a", "b"),
            expires_at: Utc::now(),
            capacity: 1,
        },
    )
    .await
    .unwrap_err();

    let constraint = err
        .as_database_error()
        .and_then(|e| e.constraint())
        .map(str::to_string);
    assert_eq!(constraint.as_deref(), Some("uq_systems_external_id"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_mirror_clear_keeps_flag(pool: PgPool) {
    let system = seed_system(&pool, 1, Duration::hours(1)).await;
    let seen = system.updated_at;

    // A change lands between reading the row and clearing the flag.
    SystemRepo::set_allocation(&pool, system.id, 2, 0).await.unwrap();

    assert!(!SystemRepo::clear_mirror_pending(&pool, system.id, seen).await.unwrap());
    let pending = SystemRepo::list_mirror_pending(&pool, 10).await.unwrap();
    assert_eq!(pending.len(), 1);

    let current = &pending[0];
    assert!(SystemRepo::clear_mirror_pending(&pool, current.id, current.updated_at)
        .await
        .unwrap());
    assert!(SystemRepo::list_mirror_pending(&pool, 10).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Automation settings and log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn config_partial_update(pool: PgPool) {
    let before = AutomationConfigRepo::get(&pool).await.unwrap();
    assert!(!before.enabled);

    let after = AutomationConfigRepo::update(
        &pool,
        &UpdateAutomationConfig {
            enabled: Some(true),
            batch_size: Some(12),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(after.enabled);
    assert_eq!(after.batch_size, 12);
    assert_eq!(after.interval_minutes, before.interval_minutes);
    assert_eq!(after.advance_minutes, before.advance_minutes);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn generation_slot_is_claimed_once_per_interval(pool: PgPool) {
    let now = Utc::now();
    assert!(AutomationConfigRepo::claim_generation_slot(&pool, now)
        .await
        .unwrap()
        .is_none());

    AutomationConfigRepo::update(
        &pool,
        &UpdateAutomationConfig {
            enabled: Some(true),
            interval_minutes: Some(60),
            batch_size: Some(4),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(
        AutomationConfigRepo::claim_generation_slot(&pool, now).await.unwrap(),
        Some(4)
    );
    assert!(AutomationConfigRepo::claim_generation_slot(&pool, now + Duration::minutes(30))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        AutomationConfigRepo::claim_generation_slot(&pool, now + Duration::minutes(61))
            .await
            .unwrap(),
        Some(4)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn log_entries_filter_by_system(pool: PgPool) {
    for system_id in [Some(1), Some(2), None] {
        AutomationLogRepo::insert(
            &pool,
            &CreateLogEntry {
                event_type: "system.renewed".to_string(),
                system_id,
                task_id: None,
                payload: json!({}),
            },
        )
        .await
        .unwrap();
    }

    let all = AutomationLogRepo::list(&pool, &LogListQuery::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let one = AutomationLogRepo::list(
        &pool,
        &LogListQuery {
            system_id: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].system_id, Some(2));
}
