//! Runtime automation settings: defaults and validation.
//!
//! The settings live in the `automation_config` singleton row and are
//! editable by operators while the server runs.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults and bounds
// ---------------------------------------------------------------------------

/// Default lead time before expiry at which renewal is scheduled.
pub const DEFAULT_ADVANCE_MINUTES: i32 = 30;

/// Default number of systems requested per batch-generation task.
pub const DEFAULT_BATCH_SIZE: i32 = 5;

/// Default gap between automatic batch-generation tasks. Zero disables them.
pub const DEFAULT_INTERVAL_MINUTES: i32 = 0;

/// Largest batch the worker is asked to generate in one session.
pub const MAX_BATCH_SIZE: i32 = 100;

/// Longest configurable generation interval (one week).
pub const MAX_INTERVAL_MINUTES: i32 = 10_080;

/// Longest configurable advance window (one day).
pub const MAX_ADVANCE_MINUTES: i32 = 1_440;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a batch size.
pub fn validate_batch_size(batch_size: i32) -> Result<(), CoreError> {
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(CoreError::Validation(format!(
            "batchSize must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }
    Ok(())
}

/// Validate a generation interval in minutes.
pub fn validate_interval_minutes(minutes: i32) -> Result<(), CoreError> {
    if !(0..=MAX_INTERVAL_MINUTES).contains(&minutes) {
        return Err(CoreError::Validation(format!(
            "intervalMinutes must be between 0 and {MAX_INTERVAL_MINUTES}"
        )));
    }
    Ok(())
}

/// Validate an advance window in minutes.
pub fn validate_advance_minutes(minutes: i32) -> Result<(), CoreError> {
    if !(0..=MAX_ADVANCE_MINUTES).contains(&minutes) {
        return Err(CoreError::Validation(format!(
            "advanceMinutes must be between 0 and {MAX_ADVANCE_MINUTES}"
        )));
    }
    Ok(())
}

/// Validate the optional fields of a partial config update.
pub fn validate_update(
    batch_size: Option<i32>,
    interval_minutes: Option<i32>,
    advance_minutes: Option<i32>,
) -> Result<(), CoreError> {
    if let Some(v) = batch_size {
        validate_batch_size(v)?;
    }
    if let Some(v) = interval_minutes {
        validate_interval_minutes(v)?;
    }
    if let Some(v) = advance_minutes {
        validate_advance_minutes(v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_update(
            Some(DEFAULT_BATCH_SIZE),
            Some(DEFAULT_INTERVAL_MINUTES),
            Some(DEFAULT_ADVANCE_MINUTES)
        )
        .is_ok());
    }

    #[test]
    fn empty_update_is_valid() {
        assert!(validate_update(None, None, None).is_ok());
    }

    #[test]
    fn zero_batch_rejected() {
        assert!(validate_batch_size(0).is_err());
    }

    #[test]
    fn oversized_batch_rejected() {
        assert!(validate_batch_size(MAX_BATCH_SIZE + 1).is_err());
    }

    #[test]
    fn negative_advance_rejected() {
        assert!(validate_update(None, None, Some(-1)).is_err());
    }

    #[test]
    fn interval_zero_allowed() {
        assert!(validate_interval_minutes(0).is_ok());
    }

    #[test]
    fn interval_over_a_week_rejected() {
        assert!(validate_interval_minutes(MAX_INTERVAL_MINUTES + 1).is_err());
    }
}
