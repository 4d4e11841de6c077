//! Shared test helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use engine_coordinator::application::engine::{ConnectionEngine, EngineDeps};
use engine_coordinator::application::positions::NewPosition;
use engine_coordinator::domain::entities::connection::Connection;
use engine_coordinator::domain::entities::engine_state::{EngineState, WorkerSet};
use engine_coordinator::domain::error::CoordinatorError;
use engine_coordinator::domain::ports::engine_state_store::EngineStateStore;
use engine_coordinator::domain::ports::worker::{CycleError, CycleRunner, WorkerFactory};
use engine_coordinator::domain::values::position_category::PositionCategory;
use engine_coordinator::domain::values::schedule::WorkerSchedule;
use engine_coordinator::domain::values::worker_kind::WorkerKind;
use engine_coordinator::infrastructure::config::CoordinatorConfig;
use engine_coordinator::infrastructure::logging::MemoryAuditLog;
use engine_coordinator::infrastructure::sqlite::engine_state_repo::SqliteEngineStateStore;
use engine_coordinator::infrastructure::sqlite::migrations;
use engine_coordinator::infrastructure::workers::noop::NoopWorkerFactory;
use engine_coordinator::EngineCoordinator;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub fn memory_config() -> CoordinatorConfig {
    CoordinatorConfig {
        db_path: ":memory:".into(),
        ..CoordinatorConfig::default()
    }
}

pub fn setup() -> (EngineCoordinator, Arc<MemoryAuditLog>) {
    setup_with(memory_config(), Arc::new(NoopWorkerFactory))
}

pub fn setup_with(
    config: CoordinatorConfig,
    workers: Arc<dyn WorkerFactory>,
) -> (EngineCoordinator, Arc<MemoryAuditLog>) {
    let audit = Arc::new(MemoryAuditLog::new());
    let ec = EngineCoordinator::with_components(config, workers, audit.clone()).unwrap();
    (ec, audit)
}

/// Adds `n` enabled connections named conn-0..conn-{n-1}.
pub fn add_connections(ec: &EngineCoordinator, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let id = format!("conn-{i}");
            ec.add_connection(Connection::new(id.clone(), format!("Exchange {i}")))
                .unwrap();
            id
        })
        .collect()
}

pub fn new_position(category: PositionCategory, connection_id: &str) -> NewPosition {
    NewPosition {
        category,
        connection_id: connection_id.to_string(),
        configuration_id: "strategy-000001".into(),
        symbol: "BTCUSDT".into(),
        entry_price: 100.0,
        cost: 1.0,
    }
}

/// SQLite-backed store whose writes can be made to fail, globally or per connection,
/// and whose reads can be made to fail per connection.
pub struct FlakyStore {
    inner: SqliteEngineStateStore,
    fail_all: AtomicBool,
    fail_ids: Mutex<HashSet<String>>,
    unreadable_ids: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteEngineStateStore::new(migrations::open(":memory:").unwrap()),
            fail_all: AtomicBool::new(false),
            fail_ids: Mutex::new(HashSet::new()),
            unreadable_ids: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_for(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_reads_for(&self, id: &str) {
        self.unreadable_ids.lock().unwrap().insert(id.to_string());
    }
}

impl EngineStateStore for FlakyStore {
    fn load(&self, connection_id: &str) -> Result<Option<EngineState>, CoordinatorError> {
        if self.unreadable_ids.lock().unwrap().contains(connection_id) {
            return Err(CoordinatorError::PersistenceFailure("row unreadable".into()));
        }
        self.inner.load(connection_id)
    }

    fn save(&self, state: &EngineState) -> Result<(), CoordinatorError> {
        if self.fail_all.load(Ordering::SeqCst)
            || self.fail_ids.lock().unwrap().contains(&state.connection_id)
        {
            return Err(CoordinatorError::PersistenceFailure("disk unavailable".into()));
        }
        self.inner.save(state)
    }
}

/// Worker whose cycles follow a per-kind script.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Script {
    Succeed,
    Transient,
    Fatal,
    /// Never completes within the schedule timeout.
    Hang,
}

pub struct ScriptedWorker {
    kind: WorkerKind,
    script: Script,
    cycles: Arc<AtomicU64>,
}

#[async_trait]
impl CycleRunner for ScriptedWorker {
    fn kind(&self) -> WorkerKind {
        self.kind
    }

    async fn run_cycle(&self, _connection: &Connection) -> Result<(), CycleError> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Succeed => Ok(()),
            Script::Transient => Err(CycleError::Transient("exchange timeout".into())),
            Script::Fatal => Err(CycleError::Fatal("API key revoked".into())),
            Script::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

pub struct ScriptedFactory {
    pub scripts: WorkerSet<Script>,
    pub cycles: WorkerSet<Arc<AtomicU64>>,
}

impl ScriptedFactory {
    pub fn new(scripts: WorkerSet<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            cycles: WorkerSet::default(),
        })
    }

    pub fn all(script: Script) -> Arc<Self> {
        Self::new(WorkerSet::from_fn(|_| script))
    }

    pub fn cycles(&self, kind: WorkerKind) -> u64 {
        self.cycles.get(kind).load(Ordering::SeqCst)
    }
}

impl WorkerFactory for ScriptedFactory {
    fn build(&self, _connection: &Connection, kind: WorkerKind) -> Arc<dyn CycleRunner> {
        Arc::new(ScriptedWorker {
            kind,
            script: *self.scripts.get(kind),
            cycles: self.cycles.get(kind).clone(),
        })
    }
}

/// A standalone engine over a flaky store, for rollback tests.
pub fn flaky_engine(id: &str) -> (Arc<ConnectionEngine>, Arc<FlakyStore>, Arc<MemoryAuditLog>) {
    let store = Arc::new(FlakyStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let deps = EngineDeps {
        store: store.clone(),
        audit: audit.clone(),
        workers: Arc::new(NoopWorkerFactory),
        schedules: WorkerSet::from_fn(WorkerSchedule::default_for),
    };
    let engine = ConnectionEngine::load(Connection::new(id, id), deps).unwrap();
    (engine, store, audit)
}
