//! Event type names broadcast on the event bus and written to the
//! `automation_log` table.

/// A system received fresh credentials from a renewal.
pub const SYSTEM_RENEWED: &str = "system.renewed";

/// Systems were created from a generation report.
pub const SYSTEMS_GENERATED: &str = "systems.generated";

/// Points were redistributed over systems.
pub const POINTS_REDISTRIBUTED: &str = "points.redistributed";

/// A renewal task was queued for a system.
pub const RENEWAL_QUEUED: &str = "renewal.queued";

/// A renewal attempt failed (worker error or malformed report).
pub const RENEWAL_FAILED: &str = "renewal.failed";

/// An operator cleared a system's in-flight renewal.
pub const RENEWAL_CANCELLED: &str = "renewal.cancelled";

/// A generation task was queued.
pub const GENERATION_QUEUED: &str = "generation.queued";

/// A generation attempt failed.
pub const GENERATION_FAILED: &str = "generation.failed";

/// Leased tasks were reclaimed after their lease timed out.
pub const TASKS_REAPED: &str = "tasks.reaped";

/// A system was found in an inconsistent renewal state and reset.
pub const SYSTEM_SELF_HEALED: &str = "system.self_healed";

/// The automation settings were changed.
pub const CONFIG_UPDATED: &str = "automation.config_updated";
