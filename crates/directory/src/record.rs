//! The record shape pushed to the directory.

use rotor_core::types::{DbId, Timestamp};
use rotor_db::models::system::System;
use serde::Serialize;

/// One system as the directory sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub external_id: i32,
    pub username: String,
    pub secret: String,
    pub expires_at: Timestamp,
    pub capacity: i32,
    pub reserved: bool,
    pub point_ids: Vec<DbId>,
}

impl DirectoryRecord {
    /// Build the record for `system` with its currently bound points.
    pub fn from_system(system: &System, point_ids: Vec<DbId>) -> Self {
        Self {
            external_id: system.external_id,
            username: system.username.clone(),
            secret: system.secret.clone(),
            expires_at: system.expires_at,
            capacity: system.capacity,
            reserved: system.is_reserved(),
            point_ids,
        }
    }
}
