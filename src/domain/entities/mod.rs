pub mod connection;
pub mod engine_state;
pub mod pseudo_position;
