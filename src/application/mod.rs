pub mod config_space;
pub mod engine;
pub mod fleet;
pub mod health_tracker;
pub mod positions;
pub mod storage_manager;
