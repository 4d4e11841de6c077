pub mod batch;
pub mod command;
pub mod config_space;
pub mod health;
pub mod position_category;
pub mod schedule;
pub mod threshold;
pub mod worker_kind;
