//! Applying worker completion reports.
//!
//! The task row is locked for the whole report so a report, a reaper pass
//! and a duplicate report for the same task are applied one at a time.
//! System updates commit in the same transaction as the task transition.

use chrono::Utc;
use rotor_core::credentials::Credentials;
use rotor_core::error::CoreError;
use rotor_core::reports::{classify, ReportOutcome};
use rotor_core::tasks::{state_machine, TaskKind};
use rotor_core::types::{DbId, Timestamp};
use rotor_db::models::status::TaskStatus;
use rotor_db::models::system::NewSystem;
use rotor_db::repositories::{SystemRepo, TaskRepo};
use rotor_events::PlatformEvent;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Capacity of systems created from generation reports.
const GENERATED_SYSTEM_CAPACITY: i32 = 1;

/// Credentials as reported by the worker. Either half may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportedCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

impl From<ReportedCredentials> for Credentials {
    fn from(reported: ReportedCredentials) -> Self {
        Credentials {
            username: reported.username.unwrap_or_default(),
            secret: reported.secret.unwrap_or_default(),
        }
    }
}

/// Body of `POST /api/v1/automation/task-complete`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: DbId,
    pub kind: TaskKind,
    #[serde(default)]
    pub credentials: Option<ReportedCredentials>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub generated: Option<Vec<ReportedCredentials>>,
}

/// What happened to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The report was recorded (success or worker failure).
    Applied,
    /// The task was already terminal; nothing changed.
    Duplicate,
    /// The report claimed success with an unusable payload. The task was
    /// failed and its system left queued.
    Rejected(String),
}

impl CompletionOutcome {
    /// Value of `accepted` in the response.
    pub fn accepted(&self) -> bool {
        !matches!(self, CompletionOutcome::Rejected(_))
    }
}

/// Apply a worker report to its task and, for renewals, to its system.
pub async fn apply_report(state: &AppState, report: TaskReport) -> AppResult<CompletionOutcome> {
    let now = Utc::now();
    let policy = &state.config.policy;

    let mut tx = state.pool.begin().await?;

    let task = TaskRepo::lock(&mut *tx, report.task_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: report.task_id,
        }))?;

    let kind = task.kind()?;
    if kind != report.kind {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Task {} is a {kind} task, not {}",
            task.id, report.kind
        ))));
    }

    if !state_machine::can_transition(task.status_id, TaskStatus::Completed.id()) {
        tracing::info!(
            task_id = task.id,
            %kind,
            status = task.status().map(TaskStatus::as_str),
            "Duplicate report for finished task ignored",
        );
        return Ok(CompletionOutcome::Duplicate);
    }

    let credentials: Option<Credentials> = report.credentials.map(Credentials::from);
    let generated: Option<Vec<Credentials>> = report
        .generated
        .map(|list| list.into_iter().map(Credentials::from).collect());

    let outcome = classify(
        kind,
        credentials.as_ref(),
        generated.as_deref(),
        report.error.as_deref(),
    );

    let mut events = Vec::new();
    let mut mirror = Vec::new();

    let completion = match outcome {
        ReportOutcome::Credentials(creds) if kind == TaskKind::Renewal => {
            let expires_at = policy.renewed_expiry(now);
            TaskRepo::complete(&mut *tx, task.id, &json!({ "expiresAt": expires_at }), now).await?;

            match task.system_id {
                Some(system_id) => {
                    match SystemRepo::apply_renewal(&mut *tx, system_id, &creds, expires_at, now).await? {
                        Some(system) => {
                            tracing::info!(
                                task_id = task.id,
                                system_id,
                                external_id = system.external_id,
                                %expires_at,
                                "System renewed",
                            );
                            events.push(PlatformEvent::system_renewed(system_id, task.id, expires_at));
                            mirror.push(system_id);
                        }
                        None => {
                            tracing::warn!(task_id = task.id, system_id, "Renewed system no longer exists");
                        }
                    }
                }
                None => {
                    tracing::warn!(task_id = task.id, "Renewal report for a task without a system");
                }
            }
            CompletionOutcome::Applied
        }

        ReportOutcome::Credentials(creds) => {
            let ids = create_generated(&mut *tx, std::slice::from_ref(&creds), policy.created_expiry(now)).await?;
            TaskRepo::complete(&mut *tx, task.id, &json!({ "systemIds": ids }), now).await?;
            tracing::info!(task_id = task.id, created = ids.len(), "Generated system recorded");
            events.push(PlatformEvent::systems_generated(task.id, &ids));
            mirror.extend(ids);
            CompletionOutcome::Applied
        }

        ReportOutcome::Generated(list) => {
            let ids = create_generated(&mut *tx, &list, policy.created_expiry(now)).await?;
            TaskRepo::complete(&mut *tx, task.id, &json!({ "systemIds": ids }), now).await?;
            tracing::info!(task_id = task.id, created = ids.len(), "Generated systems recorded");
            events.push(PlatformEvent::systems_generated(task.id, &ids));
            mirror.extend(ids);
            CompletionOutcome::Applied
        }

        ReportOutcome::WorkerError(reason) => {
            TaskRepo::fail(&mut *tx, task.id, &reason, now).await?;
            if kind == TaskKind::Renewal {
                if let Some(system_id) = task.system_id {
                    SystemRepo::record_failure(&mut *tx, system_id, &reason, now).await?;
                }
                tracing::warn!(task_id = task.id, system_id = ?task.system_id, %reason, "Renewal failed");
                events.push(PlatformEvent::renewal_failed(task.system_id, task.id, &reason, false));
            } else {
                tracing::warn!(task_id = task.id, %kind, %reason, "Generation failed");
                events.push(PlatformEvent::generation_failed(task.id, &reason, false));
            }
            CompletionOutcome::Applied
        }

        ReportOutcome::Malformed(reason) => {
            let message = format!("Malformed report: {reason}");
            TaskRepo::fail(&mut *tx, task.id, &message, now).await?;
            if kind == TaskKind::Renewal {
                tracing::warn!(task_id = task.id, system_id = ?task.system_id, %message, "Renewal report rejected");
                events.push(PlatformEvent::renewal_failed(task.system_id, task.id, &message, true));
                if let Some(system_id) = task.system_id {
                    // The system stays queued behind a fresh task.
                    SystemRepo::requeue(&mut *tx, &[system_id]).await?;
                    if let Some(retry) =
                        TaskRepo::enqueue(&mut *tx, TaskKind::Renewal, Some(system_id), &task.payload).await?
                    {
                        tracing::info!(system_id, task_id = retry.id, rejected_task_id = task.id, "Renewal re-queued");
                        events.push(PlatformEvent::renewal_queued(system_id, retry.id, false));
                    }
                }
            } else {
                tracing::warn!(task_id = task.id, %kind, %message, "Generation report rejected");
                events.push(PlatformEvent::generation_failed(task.id, &message, true));
            }
            CompletionOutcome::Rejected(message)
        }
    };

    tx.commit().await?;

    for event in events {
        state.event_bus.publish(event);
    }
    if !mirror.is_empty() {
        state.directory.mirror_ids(&state.pool, &mirror).await;
    }

    Ok(completion)
}

/// Insert one non-reserved system per generated credential pair.
async fn create_generated(
    tx: &mut sqlx::PgConnection,
    generated: &[Credentials],
    expires_at: Timestamp,
) -> AppResult<Vec<DbId>> {
    let mut ids = Vec::with_capacity(generated.len());
    for credentials in generated {
        let external_id = SystemRepo::next_pool_external_id(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::Conflict(
                    "No free external id left for generated systems".into(),
                ))
            })?;

        let system = SystemRepo::insert(
            &mut *tx,
            &NewSystem {
                external_id,
                credentials: credentials.clone(),
                expires_at,
                capacity: GENERATED_SYSTEM_CAPACITY,
            },
        )
        .await?;
        ids.push(system.id);
    }
    Ok(ids)
}
