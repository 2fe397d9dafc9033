pub mod automation;
pub mod systems;
