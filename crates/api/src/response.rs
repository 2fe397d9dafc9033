//! Shared response envelope types for API handlers.
//!
//! Resource endpoints use a `{ "data": ... }` envelope. The worker protocol
//! endpoints return their documented shapes unwrapped.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
