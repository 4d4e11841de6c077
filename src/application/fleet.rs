//! Fleet-wide control over every connection's engine.
//!
//! Bulk commands fan out to one tokio task per targeted connection and fan
//! back in to a `BatchReport`; one connection failing never aborts the rest.

use crate::application::engine::{CommandReceipt, ConnectionEngine, ConnectionHealth, EngineDeps};
use crate::domain::entities::connection::Connection;
use crate::domain::entities::engine_state::{EngineState, EngineStatus};
use crate::domain::error::CoordinatorError;
use crate::domain::ports::audit_log::{AuditEntry, Severity};
use crate::domain::ports::connection_directory::ConnectionDirectory;
use crate::domain::ports::position_store::PositionStore;
use crate::domain::values::batch::{BatchReport, ConnectionOutcome};
use crate::domain::values::command::{EngineCommand, FleetCommand};
use crate::domain::values::health::HealthVerdict;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

const AUDIT_CATEGORY: &str = "fleet";

/// Coarse at-a-glance fleet verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemVerdict {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub connection: Connection,
    /// `"unknown"` when the stored state could not be read.
    pub status: String,
    pub running: bool,
    pub error_message: Option<String>,
    pub health: Option<HealthVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub verdict: SystemVerdict,
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub stopped: usize,
    pub errored: usize,
    pub unreadable: usize,
    pub connections: Vec<ConnectionSummary>,
}

pub struct FleetCoordinator {
    directory: Arc<dyn ConnectionDirectory>,
    positions: Arc<dyn PositionStore>,
    deps: EngineDeps,
    engines: Mutex<HashMap<String, Arc<ConnectionEngine>>>,
}

impl FleetCoordinator {
    pub fn new(
        directory: Arc<dyn ConnectionDirectory>,
        positions: Arc<dyn PositionStore>,
        deps: EngineDeps,
    ) -> Self {
        Self {
            directory,
            positions,
            deps,
            engines: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Arc<ConnectionEngine>>> {
        self.engines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn loaded(&self, id: &str) -> Option<Arc<ConnectionEngine>> {
        self.registry().get(id).cloned()
    }

    fn connection(&self, id: &str) -> Result<Connection, CoordinatorError> {
        self.directory
            .get(id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("Connection not found: {id}")))
    }

    /// The engine for `id`, created on first use.
    pub fn engine(&self, id: &str) -> Result<Arc<ConnectionEngine>, CoordinatorError> {
        if let Some(engine) = self.loaded(id) {
            return Ok(engine);
        }
        let connection = self.connection(id)?;
        self.engine_for(connection)
    }

    fn engine_for(&self, connection: Connection) -> Result<Arc<ConnectionEngine>, CoordinatorError> {
        if let Some(engine) = self.loaded(&connection.id) {
            return Ok(engine);
        }
        // Loaded outside the registry lock; a concurrent loser is discarded.
        let engine = ConnectionEngine::load(connection, self.deps.clone())?;
        let mut registry = self.registry();
        Ok(registry
            .entry(engine.id().to_string())
            .or_insert(engine)
            .clone())
    }

    /// Per-connection command. `Reset` also clears that connection's pseudo positions.
    pub async fn command(&self, id: &str, command: EngineCommand) -> Result<CommandReceipt, CoordinatorError> {
        let engine = self.engine(id)?;
        let is_reset = matches!(command, EngineCommand::Reset);
        let mut receipt = match command {
            EngineCommand::ReportError { worker, message } => engine.report_error(worker, message).await?,
            other => engine.execute(other).await?,
        };
        if is_reset {
            match self.positions.delete_for_connection(id) {
                Ok(deleted) => receipt.positions_deleted = Some(deleted),
                Err(e) => {
                    self.deps.audit.record(
                        AuditEntry::new(
                            Severity::Warning,
                            AUDIT_CATEGORY,
                            "Reset could not remove pseudo positions",
                        )
                        .with("connection_id", id)
                        .with("error", e.to_string()),
                    );
                }
            }
        }
        Ok(receipt)
    }

    /// Current state, without creating an engine.
    pub async fn status(&self, id: &str) -> Result<EngineState, CoordinatorError> {
        if let Some(engine) = self.loaded(id) {
            return Ok(engine.snapshot().await);
        }
        let connection = self.connection(id)?;
        self.stored_state(&connection.id)
    }

    /// Persisted state of an engine not loaded here. Nothing runs for it in this
    /// process, so a stored running/paused status is reported as stopped.
    fn stored_state(&self, id: &str) -> Result<EngineState, CoordinatorError> {
        Ok(match self.deps.store.load(id)? {
            Some(mut state) => {
                state.recover_after_restart(Utc::now());
                state
            }
            None => {
                let mut state = EngineState::new(id);
                state.mark_initialized();
                state
            }
        })
    }

    pub async fn health(&self, id: &str) -> Result<ConnectionHealth, CoordinatorError> {
        if let Some(engine) = self.loaded(id) {
            return Ok(engine.health().await);
        }
        let connection = self.connection(id)?;
        let state = self.stored_state(&connection.id)?;
        Ok(ConnectionHealth::from_state(&state, Utc::now()))
    }

    pub async fn start_all(&self) -> Result<BatchReport, CoordinatorError> {
        self.execute(FleetCommand::StartAll).await
    }

    pub async fn stop_all(&self) -> Result<BatchReport, CoordinatorError> {
        self.execute(FleetCommand::StopAll).await
    }

    pub async fn pause_all(&self) -> Result<BatchReport, CoordinatorError> {
        self.execute(FleetCommand::PauseAll).await
    }

    pub async fn resume_all(&self) -> Result<BatchReport, CoordinatorError> {
        self.execute(FleetCommand::ResumeAll).await
    }

    /// Break-glass: every connection to `error`, regardless of its current state.
    pub async fn emergency_stop(&self) -> Result<BatchReport, CoordinatorError> {
        self.execute(FleetCommand::EmergencyStop).await
    }

    async fn current_status(&self, connection: &Connection) -> Result<EngineStatus, CoordinatorError> {
        if let Some(engine) = self.loaded(&connection.id) {
            return Ok(engine.snapshot().await.status().clone());
        }
        Ok(self.stored_state(&connection.id)?.status().clone())
    }

    /// Which engine command a fleet command maps to for this connection, or why it is skipped.
    async fn plan(
        &self,
        command: FleetCommand,
        connection: &Connection,
    ) -> Result<Result<EngineCommand, String>, CoordinatorError> {
        Ok(match command {
            FleetCommand::StartAll => match connection.skip_reason() {
                Some(reason) => Err(reason.to_string()),
                None => Ok(EngineCommand::Start),
            },
            FleetCommand::StopAll => match self.current_status(connection).await? {
                EngineStatus::Running | EngineStatus::Paused => Ok(EngineCommand::Stop),
                other => Err(format!("engine is {other}")),
            },
            FleetCommand::PauseAll => match self.current_status(connection).await? {
                EngineStatus::Running => Ok(EngineCommand::Pause),
                other => Err(format!("engine is {other}")),
            },
            FleetCommand::ResumeAll => match self.current_status(connection).await? {
                EngineStatus::Paused => Ok(EngineCommand::Resume),
                other => Err(format!("engine is {other}")),
            },
            FleetCommand::EmergencyStop => Ok(EngineCommand::EmergencyStop),
        })
    }

    pub async fn execute(&self, command: FleetCommand) -> Result<BatchReport, CoordinatorError> {
        let connections = self.directory.list()?;
        let mut report = BatchReport::new(command.to_string());

        if command == FleetCommand::EmergencyStop {
            self.deps.audit.record(
                AuditEntry::new(Severity::Critical, AUDIT_CATEGORY, "Emergency stop initiated")
                    .with("connections", connections.len()),
            );
        }

        let mut tasks = JoinSet::new();
        for connection in connections {
            let id = connection.id.clone();
            let engine_command = match self.plan(command, &connection).await {
                Ok(Ok(c)) => c,
                Ok(Err(reason)) => {
                    report.push(id, ConnectionOutcome::Skipped { reason });
                    continue;
                }
                Err(e) => {
                    report.push(id, failed(&e));
                    continue;
                }
            };
            let engine = match self.engine_for(connection) {
                Ok(engine) => engine,
                Err(e) => {
                    report.push(id, failed(&e));
                    continue;
                }
            };
            tasks.spawn(async move {
                let result = engine.execute(engine_command).await;
                (id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(receipt))) => {
                    let outcome = if receipt.applied {
                        ConnectionOutcome::Applied
                    } else {
                        ConnectionOutcome::Unchanged
                    };
                    report.push(id, outcome);
                }
                Ok((id, Err(e))) => report.push(id, failed(&e)),
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Fleet task panicked");
                    report.push(
                        "<unknown>",
                        ConnectionOutcome::Failed {
                            kind: "internal".into(),
                            message: join_error.to_string(),
                        },
                    );
                }
            }
        }

        let report = report.sorted();
        let severity = match (command, report.failed) {
            (FleetCommand::EmergencyStop, _) => Severity::Critical,
            (_, 0) => Severity::Info,
            _ => Severity::Warning,
        };
        self.deps.audit.record(
            AuditEntry::new(severity, AUDIT_CATEGORY, format!("Fleet {command} finished"))
                .with("attempted", report.attempted)
                .with("succeeded", report.succeeded)
                .with("skipped", report.skipped)
                .with("failed", report.failed),
        );

        if report.failed == 0 {
            Ok(report)
        } else if report.succeeded == 0 {
            Err(CoordinatorError::BatchFailed(report))
        } else {
            Err(CoordinatorError::PartialBatchFailure(report))
        }
    }

    pub async fn status_all(&self) -> Result<SystemStatus, CoordinatorError> {
        let connections = self.directory.list()?;
        let now = Utc::now();
        let mut summaries = Vec::with_capacity(connections.len());
        for connection in connections {
            let (state, health) = match self.loaded(&connection.id) {
                Some(engine) => {
                    let health = engine.health().await.overall;
                    (engine.snapshot().await, health)
                }
                None => match self.stored_state(&connection.id) {
                    Ok(state) => {
                        let health = ConnectionHealth::from_state(&state, now).overall;
                        (state, health)
                    }
                    Err(e) => {
                        tracing::warn!(connection_id = %connection.id, error = %e, "Engine state unreadable");
                        summaries.push(ConnectionSummary {
                            status: "unknown".into(),
                            running: false,
                            error_message: None,
                            health: None,
                            read_error: Some(e.to_string()),
                            connection,
                        });
                        continue;
                    }
                },
            };
            summaries.push(ConnectionSummary {
                status: state.status().name().to_string(),
                running: state.running(),
                error_message: state.error_message().map(str::to_string),
                health: Some(health),
                read_error: None,
                connection,
            });
        }

        let count = |name: &str| summaries.iter().filter(|s| s.status == name).count();
        let running = count("running");
        Ok(SystemStatus {
            verdict: if running > 0 {
                SystemVerdict::Running
            } else {
                SystemVerdict::Stopped
            },
            total: summaries.len(),
            running,
            paused: count("paused"),
            stopped: count("stopped") + count("initializing"),
            errored: count("error"),
            unreadable: count("unknown"),
            connections: summaries,
        })
    }

    /// Engines currently loaded in this process.
    pub fn loaded_engines(&self) -> Vec<Arc<ConnectionEngine>> {
        self.registry().values().cloned().collect()
    }
}

fn failed(e: &CoordinatorError) -> ConnectionOutcome {
    ConnectionOutcome::Failed {
        kind: e.kind().to_string(),
        message: e.to_string(),
    }
}
