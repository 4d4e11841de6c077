pub mod connection_repo;
pub mod engine_state_repo;
pub mod migrations;
pub mod position_repo;
pub mod threshold_repo;
