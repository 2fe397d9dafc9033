//! Domain types and pure logic for the credential renewal scheduler.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! repository layer, the event bus, the directory mirror and the API.

pub mod allocation;
pub mod automation;
pub mod credentials;
pub mod error;
pub mod event_types;
pub mod hashing;
pub mod renewal;
pub mod reports;
pub mod tasks;
pub mod types;
