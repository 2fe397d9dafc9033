//! Repository layer: one zero-sized struct per table with async query
//! methods taking a pool, connection or open transaction.

pub mod automation_config_repo;
pub mod automation_log_repo;
pub mod distribution_repo;
pub mod point_repo;
pub mod system_repo;
pub mod task_repo;

pub use automation_config_repo::AutomationConfigRepo;
pub use automation_log_repo::AutomationLogRepo;
pub use distribution_repo::{DistributionError, DistributionRepo};
pub use point_repo::PointRepo;
pub use system_repo::SystemRepo;
pub use task_repo::TaskRepo;
