//! Renewal timing policy and due-detection.
//!
//! The detector loop, the completion path and the lease reaper all derive
//! their deadlines from one [`RenewalPolicy`] so the windows stay consistent.

use chrono::Duration;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default minimum gap between two successful renewals of one system.
pub const DEFAULT_RENEWAL_COOLDOWN_MINUTES: i64 = 30;

/// Default wait after a worker-reported failure before retrying.
pub const DEFAULT_FAILURE_COOLDOWN_MINUTES: i64 = 15;

/// Default validity granted by a successful renewal.
pub const DEFAULT_RENEWAL_VALIDITY_HOURS: i64 = 6;

/// Default validity granted to a freshly generated or operator-created system.
pub const DEFAULT_CREATION_VALIDITY_HOURS: i64 = 168;

/// Default time a leased task may stay unreported before it is reclaimed.
pub const DEFAULT_LEASE_TIMEOUT_SECS: i64 = 900;

/// How far in the past placeholder credentials expire.
///
/// Placeholders must already be expired so the detector schedules them on
/// its next tick.
const PLACEHOLDER_EXPIRED_BY_MINUTES: i64 = 1;

// ---------------------------------------------------------------------------
// System renewal states
// ---------------------------------------------------------------------------

/// Renewal state IDs matching `renewal_states` seed data.
pub mod state {
    pub const IDLE: i16 = 1;
    pub const QUEUED: i16 = 2;
    pub const RENEWING: i16 = 3;
    pub const FAILED_COOLDOWN: i16 = 4;
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Timing windows for the renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    /// Lead time before expiry at which a system becomes due.
    pub advance: Duration,
    /// Minimum time since the last successful renewal.
    pub cooldown: Duration,
    /// Wait after a worker-reported failure.
    pub failure_cooldown: Duration,
    /// Validity granted by a successful renewal (short, hours).
    pub renewal_validity: Duration,
    /// Validity granted on creation with real credentials (long, days).
    pub creation_validity: Duration,
    /// Time a leased task may stay unreported.
    pub lease_timeout: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            advance: Duration::minutes(crate::automation::DEFAULT_ADVANCE_MINUTES as i64),
            cooldown: Duration::minutes(DEFAULT_RENEWAL_COOLDOWN_MINUTES),
            failure_cooldown: Duration::minutes(DEFAULT_FAILURE_COOLDOWN_MINUTES),
            renewal_validity: Duration::hours(DEFAULT_RENEWAL_VALIDITY_HOURS),
            creation_validity: Duration::hours(DEFAULT_CREATION_VALIDITY_HOURS),
            lease_timeout: Duration::seconds(DEFAULT_LEASE_TIMEOUT_SECS),
        }
    }
}

impl RenewalPolicy {
    /// Replace the advance window, typically from the runtime automation config.
    pub fn with_advance_minutes(mut self, minutes: i32) -> Self {
        self.advance = Duration::minutes(i64::from(minutes));
        self
    }

    /// Point in time at which a system expiring at `expires_at` becomes due.
    pub fn due_at(&self, expires_at: Timestamp) -> Timestamp {
        expires_at - self.advance
    }

    /// Whether an idle system should get a renewal task now.
    ///
    /// Due iff `now >= expires_at - advance` and the last successful renewal
    /// (if any) is at least `cooldown` old.
    pub fn is_due(
        &self,
        expires_at: Timestamp,
        last_renewed_at: Option<Timestamp>,
        now: Timestamp,
    ) -> bool {
        if now < self.due_at(expires_at) {
            return false;
        }
        match last_renewed_at {
            None => true,
            Some(renewed) => now - renewed >= self.cooldown,
        }
    }

    /// Latest `expires_at` that is due at `now` (ignoring the cooldown).
    pub fn due_cutoff(&self, now: Timestamp) -> Timestamp {
        now + self.advance
    }

    /// Latest `last_renewed_at` outside the cooldown at `now`.
    pub fn cooldown_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.cooldown
    }

    /// Latest `last_failure_at` whose failure cooldown has elapsed at `now`.
    pub fn failure_cooldown_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.failure_cooldown
    }

    /// Latest `leased_at` that counts as abandoned at `now`.
    pub fn lease_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.lease_timeout
    }

    /// New expiry after a successful renewal at `now`.
    pub fn renewed_expiry(&self, now: Timestamp) -> Timestamp {
        now + self.renewal_validity
    }

    /// Expiry for a system created at `now` with real credentials.
    pub fn created_expiry(&self, now: Timestamp) -> Timestamp {
        now + self.creation_validity
    }

    /// Expiry for a system created with placeholder credentials.
    pub fn placeholder_expiry(now: Timestamp) -> Timestamp {
        now - Duration::minutes(PLACEHOLDER_EXPIRED_BY_MINUTES)
    }

    /// Check the windows are usable.
    pub fn validate(&self) -> Result<(), CoreError> {
        let positive = [
            ("renewal validity", self.renewal_validity),
            ("creation validity", self.creation_validity),
            ("lease timeout", self.lease_timeout),
        ];
        for (name, window) in positive {
            if window <= Duration::zero() {
                return Err(CoreError::Validation(format!("{name} must be positive")));
            }
        }
        let non_negative = [
            ("advance window", self.advance),
            ("renewal cooldown", self.cooldown),
            ("failure cooldown", self.failure_cooldown),
        ];
        for (name, window) in non_negative {
            if window < Duration::zero() {
                return Err(CoreError::Validation(format!("{name} must not be negative")));
            }
        }
        Ok(())
    }
}
