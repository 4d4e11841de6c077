pub mod audit_log;
pub mod connection_directory;
pub mod engine_state_store;
pub mod position_store;
pub mod threshold_repository;
pub mod worker;
