//! Automation engine: the operations shared by HTTP handlers and the
//! background loops.
//!
//! Each operation commits its database work first, then publishes events
//! and mirrors touched systems into the directory.

pub mod completion;
pub mod distribution;
pub mod generation;
pub mod renewal;
