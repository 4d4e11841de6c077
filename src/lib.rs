pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

use crate::application::config_space;
use crate::application::engine::{CommandReceipt, ConnectionEngine, ConnectionHealth, EngineDeps};
use crate::application::fleet::{FleetCoordinator, SystemStatus};
use crate::application::positions::{NewPosition, PositionUseCase};
use crate::application::storage_manager::{
    CleanupReport, MonitoringState, StorageManager, StorageStats, ThresholdUpdate,
};
use crate::domain::entities::connection::Connection;
use crate::domain::entities::engine_state::EngineState;
use crate::domain::entities::pseudo_position::PseudoPosition;
use crate::domain::error::CoordinatorError;
use crate::domain::ports::audit_log::AuditLog;
use crate::domain::ports::connection_directory::ConnectionDirectory;
use crate::domain::ports::engine_state_store::EngineStateStore;
use crate::domain::ports::position_store::{PositionFilter, PositionStore};
use crate::domain::ports::threshold_repository::ThresholdRepository;
use crate::domain::ports::worker::WorkerFactory;
use crate::domain::values::batch::BatchReport;
use crate::domain::values::command::{EngineCommand, FleetCommand};
use crate::domain::values::config_space::{ConfigurationSpace, SpaceDefinition};
use crate::domain::values::threshold::ThresholdSettings;
use crate::domain::values::worker_kind::WorkerKind;
use crate::infrastructure::config::CoordinatorConfig;
use crate::infrastructure::logging::TracingAuditLog;
use crate::infrastructure::sqlite::connection_repo::SqliteConnectionDirectory;
use crate::infrastructure::sqlite::engine_state_repo::SqliteEngineStateStore;
use crate::infrastructure::sqlite::migrations;
use crate::infrastructure::sqlite::position_repo::SqlitePositionStore;
use crate::infrastructure::sqlite::threshold_repo::SqliteThresholdRepo;
use crate::infrastructure::workers::noop::NoopWorkerFactory;
use std::sync::Arc;

pub struct EngineCoordinator {
    config: CoordinatorConfig,
    directory: Arc<SqliteConnectionDirectory>,
    fleet: FleetCoordinator,
    storage: Arc<StorageManager>,
    positions: PositionUseCase,
}

impl EngineCoordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        Self::with_components(config, Arc::new(NoopWorkerFactory), Arc::new(TracingAuditLog))
    }

    pub fn with_components(
        config: CoordinatorConfig,
        workers: Arc<dyn WorkerFactory>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self, CoordinatorError> {
        // One handle per adapter: engine state and position tables never share a lock.
        let directory = Arc::new(SqliteConnectionDirectory::new(migrations::open(&config.db_path)?));
        let store: Arc<dyn EngineStateStore> =
            Arc::new(SqliteEngineStateStore::new(migrations::open(&config.db_path)?));
        let positions: Arc<dyn PositionStore> =
            Arc::new(SqlitePositionStore::new(migrations::open(&config.db_path)?));
        let thresholds: Arc<dyn ThresholdRepository> =
            Arc::new(SqliteThresholdRepo::new(migrations::open(&config.db_path)?));

        let deps = EngineDeps {
            store,
            audit: audit.clone(),
            workers,
            schedules: config.schedules.clone(),
        };
        let fleet = FleetCoordinator::new(
            directory.clone() as Arc<dyn ConnectionDirectory>,
            positions.clone(),
            deps,
        );
        let storage = Arc::new(StorageManager::new(
            positions.clone(),
            thresholds,
            audit,
            config.thresholds.clone(),
        ));

        let positions = PositionUseCase::new(positions, config.position_cap);
        tracing::debug!(db_path = %config.db_path, "Coordinator initialized");
        Ok(Self {
            config,
            directory,
            fleet,
            storage,
            positions,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // Connections

    pub fn add_connection(&self, connection: Connection) -> Result<Connection, CoordinatorError> {
        if connection.id.trim().is_empty() {
            return Err(CoordinatorError::InvalidInput("connection id must not be empty".into()));
        }
        self.directory.upsert(&connection)?;
        Ok(connection)
    }

    pub fn connections(&self) -> Result<Vec<Connection>, CoordinatorError> {
        self.directory.list()
    }

    // Per-connection engine

    pub fn engine(&self, id: &str) -> Result<Arc<ConnectionEngine>, CoordinatorError> {
        self.fleet.engine(id)
    }

    pub async fn status(&self, id: &str) -> Result<EngineState, CoordinatorError> {
        self.fleet.status(id).await
    }

    pub async fn health(&self, id: &str) -> Result<ConnectionHealth, CoordinatorError> {
        self.fleet.health(id).await
    }

    pub async fn command(&self, id: &str, command: EngineCommand) -> Result<CommandReceipt, CoordinatorError> {
        self.fleet.command(id, command).await
    }

    pub async fn start(&self, id: &str) -> Result<CommandReceipt, CoordinatorError> {
        self.command(id, EngineCommand::Start).await
    }

    pub async fn stop(&self, id: &str) -> Result<CommandReceipt, CoordinatorError> {
        self.command(id, EngineCommand::Stop).await
    }

    pub async fn pause(&self, id: &str) -> Result<CommandReceipt, CoordinatorError> {
        self.command(id, EngineCommand::Pause).await
    }

    pub async fn resume(&self, id: &str) -> Result<CommandReceipt, CoordinatorError> {
        self.command(id, EngineCommand::Resume).await
    }

    pub async fn reset(&self, id: &str) -> Result<CommandReceipt, CoordinatorError> {
        self.command(id, EngineCommand::Reset).await
    }

    pub async fn report_error(
        &self,
        id: &str,
        worker: WorkerKind,
        message: impl Into<String>,
    ) -> Result<CommandReceipt, CoordinatorError> {
        self.command(
            id,
            EngineCommand::ReportError {
                worker,
                message: message.into(),
            },
        )
        .await
    }

    // Fleet

    pub async fn fleet(&self, command: FleetCommand) -> Result<BatchReport, CoordinatorError> {
        self.fleet.execute(command).await
    }

    pub async fn emergency_stop(&self) -> Result<BatchReport, CoordinatorError> {
        self.fleet.emergency_stop().await
    }

    pub async fn status_all(&self) -> Result<SystemStatus, CoordinatorError> {
        self.fleet.status_all().await
    }

    // Storage

    pub fn storage_stats(&self) -> StorageStats {
        self.storage.get_stats()
    }

    pub fn thresholds(&self) -> ThresholdSettings {
        self.storage.settings()
    }

    pub fn configure_thresholds(&self, update: ThresholdUpdate) -> Result<ThresholdSettings, CoordinatorError> {
        self.storage.configure(update)
    }

    pub fn cleanup_now(&self) -> Result<CleanupReport, CoordinatorError> {
        self.storage.cleanup_now()
    }

    /// `None` uses the configured interval.
    pub async fn start_monitoring(&self, interval_secs: Option<u64>) -> MonitoringState {
        self.storage
            .start_monitoring(interval_secs.unwrap_or(self.config.monitor_interval_secs))
            .await
    }

    pub async fn stop_monitoring(&self) -> MonitoringState {
        self.storage.stop_monitoring().await
    }

    pub async fn toggle_monitoring(&self) -> MonitoringState {
        self.storage
            .toggle_monitoring(self.config.monitor_interval_secs)
            .await
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        self.storage.monitoring_state()
    }

    // Configuration space

    pub fn generate_space(&self, definition: &SpaceDefinition) -> Result<ConfigurationSpace, CoordinatorError> {
        config_space::generate(definition)
    }

    pub fn default_space(&self, family: WorkerKind) -> Result<ConfigurationSpace, CoordinatorError> {
        config_space::generate(&config_space::default_definition(family))
    }

    // Pseudo positions

    pub fn record_position(&self, input: NewPosition) -> Result<PseudoPosition, CoordinatorError> {
        self.positions.record(input)
    }

    pub fn update_position_price(&self, id: &str, price: f64) -> Result<PseudoPosition, CoordinatorError> {
        self.positions.update_price(id, price)
    }

    pub fn close_position(&self, id: &str) -> Result<PseudoPosition, CoordinatorError> {
        self.positions.close(id)
    }

    pub fn list_positions(&self, filter: &PositionFilter) -> Result<Vec<PseudoPosition>, CoordinatorError> {
        self.positions.list(filter)
    }

    /// Stop monitoring, stop every live engine and wait for in-flight cycles.
    pub async fn shutdown(&self) {
        self.storage.stop_monitoring().await;
        if let Err(e) = self.fleet.stop_all().await {
            tracing::warn!(error = %e, "Some engines did not stop cleanly");
        }
        for engine in self.fleet.loaded_engines() {
            engine.drain().await;
        }
    }
}
