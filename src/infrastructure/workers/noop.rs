use crate::domain::entities::connection::Connection;
use crate::domain::ports::worker::{CycleError, CycleRunner, WorkerFactory};
use crate::domain::values::worker_kind::WorkerKind;
use async_trait::async_trait;
use std::sync::Arc;

/// Completes every cycle immediately. Stands in until exchange-backed workers are wired in.
pub struct NoopWorker {
    kind: WorkerKind,
}

impl NoopWorker {
    pub fn new(kind: WorkerKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CycleRunner for NoopWorker {
    fn kind(&self) -> WorkerKind {
        self.kind
    }

    async fn run_cycle(&self, connection: &Connection) -> Result<(), CycleError> {
        tracing::trace!(connection_id = %connection.id, worker = %self.kind, "noop cycle");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWorkerFactory;

impl WorkerFactory for NoopWorkerFactory {
    fn build(&self, _connection: &Connection, kind: WorkerKind) -> Arc<dyn CycleRunner> {
        Arc::new(NoopWorker::new(kind))
    }
}
