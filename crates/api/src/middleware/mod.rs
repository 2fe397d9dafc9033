pub mod automation_key;
