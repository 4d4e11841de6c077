use crate::domain::entities::connection::Connection;
use crate::domain::values::worker_kind::WorkerKind;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// Counts against the worker's error rate; the engine keeps running.
    Transient(String),
    /// Moves the whole engine to `error`.
    Fatal(String),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Transient(msg) => write!(f, "Transient cycle error: {msg}"),
            CycleError::Fatal(msg) => write!(f, "Fatal cycle error: {msg}"),
        }
    }
}

impl std::error::Error for CycleError {}

/// One cyclic worker (indication detection, strategy evaluation, realtime execution).
#[async_trait]
pub trait CycleRunner: Send + Sync {
    fn kind(&self) -> WorkerKind;

    async fn run_cycle(&self, connection: &Connection) -> Result<(), CycleError>;
}

/// Builds the runner for each worker kind of a connection.
pub trait WorkerFactory: Send + Sync {
    fn build(&self, connection: &Connection, kind: WorkerKind) -> Arc<dyn CycleRunner>;
}
