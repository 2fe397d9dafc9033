//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the requests that create or patch it

pub mod automation;
pub mod distribution;
pub mod point;
pub mod status;
pub mod system;
pub mod task;
