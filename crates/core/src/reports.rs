//! Classification of worker completion reports.
//!
//! A report is only recorded as a success when its payload is complete for
//! the task kind. Partial credentials must never reach a system row.

use crate::credentials::Credentials;
use crate::tasks::TaskKind;

/// What a completion report means for the task it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// A renewal or single generation produced one credential pair.
    Credentials(Credentials),
    /// A batch generation produced these credential pairs.
    Generated(Vec<Credentials>),
    /// The worker reported that it could not do the work.
    WorkerError(String),
    /// The report claims success but its payload is unusable.
    Malformed(String),
}

impl ReportOutcome {
    /// Whether the task should be marked `completed`.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ReportOutcome::Credentials(_) | ReportOutcome::Generated(_)
        )
    }
}

/// Classify a report for a task of `kind`.
///
/// An `error` always wins: a worker that says it failed is believed even if
/// it also sent a payload.
pub fn classify(
    kind: TaskKind,
    credentials: Option<&Credentials>,
    generated: Option<&[Credentials]>,
    error: Option<&str>,
) -> ReportOutcome {
    if let Some(reason) = error.map(str::trim).filter(|e| !e.is_empty()) {
        return ReportOutcome::WorkerError(reason.to_string());
    }

    match kind {
        TaskKind::Renewal | TaskKind::SingleGeneration => match credentials {
            Some(c) if c.is_complete() => ReportOutcome::Credentials(c.clone()),
            Some(_) => ReportOutcome::Malformed(
                "Report is missing username or secret".to_string(),
            ),
            None => ReportOutcome::Malformed("Report carries no credentials".to_string()),
        },
        TaskKind::BatchGeneration => {
            let list = generated.unwrap_or_default();
            if list.is_empty() {
                return ReportOutcome::Malformed(
                    "Batch report carries no generated credentials".to_string(),
                );
            }
            if let Some(pos) = list.iter().position(|c| !c.is_complete()) {
                return ReportOutcome::Malformed(format!(
                    "Generated credential at index {pos} is missing username or secret"
                ));
            }
            ReportOutcome::Generated(list.to_vec())
        }
    }
}
