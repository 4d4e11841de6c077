//! Per-connection engine: lifecycle commands, worker tasks and health.
//!
//! Commands on one engine are serialized by its own async mutex. Different
//! engines share nothing, so they proceed in parallel. Workers run as
//! independent tokio tasks, each on its own interval, and observe a `watch`
//! signal only between cycles: a stop takes effect before the next tick and
//! an in-flight cycle always completes and reports.

use crate::application::health_tracker::ComponentHealthTracker;
use crate::domain::entities::connection::Connection;
use crate::domain::entities::engine_state::{EngineState, TransitionOutcome, WorkerSet};
use crate::domain::error::CoordinatorError;
use crate::domain::ports::audit_log::{AuditEntry, AuditLog, Severity};
use crate::domain::ports::engine_state_store::EngineStateStore;
use crate::domain::ports::worker::{CycleError, CycleRunner, WorkerFactory};
use crate::domain::values::command::EngineCommand;
use crate::domain::values::health::{assess, HealthVerdict, WorkerMetrics};
use crate::domain::values::schedule::WorkerSchedule;
use crate::domain::values::worker_kind::WorkerKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const AUDIT_CATEGORY: &str = "engine";

/// Everything an engine needs from the outside. Cheap to clone.
#[derive(Clone)]
pub struct EngineDeps {
    pub store: Arc<dyn EngineStateStore>,
    pub audit: Arc<dyn AuditLog>,
    pub workers: Arc<dyn WorkerFactory>,
    pub schedules: WorkerSet<WorkerSchedule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerSignal {
    Run,
    Pause,
    Halt,
}

struct WorkerPool {
    signal: watch::Sender<WorkerSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn set(&self, signal: WorkerSignal) {
        // No receivers left means every worker already exited.
        let _ = self.signal.send(signal);
    }

    fn halt(self) -> Vec<JoinHandle<()>> {
        self.set(WorkerSignal::Halt);
        self.handles
    }
}

struct Inner {
    state: EngineState,
    pool: Option<WorkerPool>,
    retired: Vec<JoinHandle<()>>,
}

/// Result of one command against one engine.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReceipt {
    pub connection_id: String,
    pub command: String,
    /// `false` when the engine was already in the target state.
    pub applied: bool,
    pub state: EngineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions_deleted: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub verdict: HealthVerdict,
    pub error_rate: f64,
    #[serde(flatten)]
    pub metrics: WorkerMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub connection_id: String,
    pub status: String,
    pub overall: HealthVerdict,
    pub components: WorkerSet<ComponentReport>,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionHealth {
    /// Verdicts from persisted counters alone, for engines not loaded in this process.
    pub fn from_state(state: &EngineState, now: DateTime<Utc>) -> Self {
        let components = WorkerSet::from_fn(|kind| {
            let metrics = state.workers.get(kind).metrics.clone();
            ComponentReport {
                verdict: assess(&metrics, None),
                error_rate: metrics.error_rate(),
                metrics,
            }
        });
        let overall = HealthVerdict::worst(components.iter().map(|(_, c)| c.verdict));
        Self {
            connection_id: state.connection_id.clone(),
            status: state.status().name().to_string(),
            overall,
            components,
            checked_at: now,
        }
    }
}

pub struct ConnectionEngine {
    connection: Connection,
    deps: EngineDeps,
    tracker: ComponentHealthTracker,
    inner: Mutex<Inner>,
}

impl ConnectionEngine {
    /// Load persisted state or create it. A fresh record goes `initializing → stopped`
    /// once written; a record left running by a previous process is normalized to stopped.
    pub fn load(connection: Connection, deps: EngineDeps) -> Result<Arc<Self>, CoordinatorError> {
        let now = Utc::now();
        let state = match deps.store.load(&connection.id)? {
            Some(mut state) => {
                let previous = state.status().name();
                if state.recover_after_restart(now) {
                    deps.store.save(&state)?;
                    deps.audit.record(
                        AuditEntry::new(
                            Severity::Warning,
                            AUDIT_CATEGORY,
                            "Engine recovered as stopped; workers from a previous run are gone",
                        )
                        .with("connection_id", connection.id.as_str())
                        .with("previous_status", previous),
                    );
                }
                state
            }
            None => {
                let mut state = EngineState::new(connection.id.clone());
                state.mark_initialized();
                deps.store.save(&state)?;
                deps.audit.record(
                    AuditEntry::new(Severity::Info, AUDIT_CATEGORY, "Engine state created")
                        .with("connection_id", connection.id.as_str()),
                );
                state
            }
        };

        let tracker = ComponentHealthTracker::new(deps.schedules.clone());
        tracker.restore(&WorkerSet::from_fn(|kind| state.workers.get(kind).metrics.clone()));

        Ok(Arc::new(Self {
            connection,
            deps,
            tracker,
            inner: Mutex::new(Inner {
                state,
                pool: None,
                retired: Vec::new(),
            }),
        }))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn id(&self) -> &str {
        &self.connection.id
    }

    pub async fn snapshot(&self) -> EngineState {
        self.inner.lock().await.state.clone()
    }

    pub async fn start(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::Start).await
    }

    pub async fn stop(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::Stop).await
    }

    pub async fn pause(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::Pause).await
    }

    pub async fn resume(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::Resume).await
    }

    /// Discards all health history for this connection.
    pub async fn reset(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::Reset).await
    }

    pub async fn emergency_stop(self: &Arc<Self>) -> Result<CommandReceipt, CoordinatorError> {
        self.execute(EngineCommand::EmergencyStop).await
    }

    /// Worker-reported failure. Bumps that worker's error counter even if another
    /// worker's message wins the race for the status field.
    pub async fn report_error(
        self: &Arc<Self>,
        worker: WorkerKind,
        message: impl Into<String>,
    ) -> Result<CommandReceipt, CoordinatorError> {
        self.tracker.record_error(worker);
        self.execute(EngineCommand::ReportError {
            worker,
            message: message.into(),
        })
        .await
    }

    pub async fn execute(self: &Arc<Self>, command: EngineCommand) -> Result<CommandReceipt, CoordinatorError> {
        let mut inner = self.inner.lock().await;
        let prior = inner.state.clone();
        let now = Utc::now();

        let outcome = match inner.state.apply(&command, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.deps.audit.record(
                    AuditEntry::new(Severity::Warning, AUDIT_CATEGORY, "Rejected engine command")
                        .with("connection_id", self.id())
                        .with("command", command.name())
                        .with("status", prior.status().name())
                        .with("error", e.to_string()),
                );
                return Err(e);
            }
        };

        if let EngineCommand::ReportError { worker, .. } = &command {
            inner
                .state
                .record_worker(*worker, self.tracker.current_metrics(*worker), now);
        }

        if outcome == TransitionOutcome::Unchanged {
            self.deps.audit.record(
                AuditEntry::new(Severity::Debug, AUDIT_CATEGORY, "Engine already in target state")
                    .with("connection_id", self.id())
                    .with("command", command.name())
                    .with("status", inner.state.status().name()),
            );
            return Ok(self.receipt(&command, false, &inner.state));
        }

        if let Err(e) = self.deps.store.save(&inner.state) {
            inner.state = prior;
            self.deps.audit.record(
                AuditEntry::new(Severity::Error, AUDIT_CATEGORY, "Engine state write failed; rolled back")
                    .with("connection_id", self.id())
                    .with("command", command.name())
                    .with("error", e.to_string()),
            );
            return Err(match e {
                CoordinatorError::PersistenceFailure(_) => e,
                other => CoordinatorError::PersistenceFailure(other.to_string()),
            });
        }

        match &command {
            EngineCommand::Start => {
                self.tracker.mark_running(now);
                Self::retire_pool(&mut inner);
                inner.pool = Some(self.spawn_workers());
            }
            EngineCommand::Resume => {
                self.tracker.mark_running(now);
                if let Some(pool) = &inner.pool {
                    pool.set(WorkerSignal::Run);
                } else {
                    inner.pool = Some(self.spawn_workers());
                }
            }
            EngineCommand::Pause => {
                self.tracker.mark_idle();
                if let Some(pool) = &inner.pool {
                    pool.set(WorkerSignal::Pause);
                }
            }
            EngineCommand::Reset => {
                self.tracker.reset();
                self.tracker.mark_idle();
                Self::retire_pool(&mut inner);
            }
            EngineCommand::Stop | EngineCommand::ReportError { .. } | EngineCommand::EmergencyStop => {
                self.tracker.mark_idle();
                Self::retire_pool(&mut inner);
            }
        }

        let severity = match &command {
            EngineCommand::EmergencyStop => Severity::Critical,
            EngineCommand::ReportError { .. } => Severity::Error,
            EngineCommand::Reset => Severity::Warning,
            _ => Severity::Info,
        };
        let mut entry = AuditEntry::new(severity, AUDIT_CATEGORY, format!("Engine {}", command.name()))
            .with("connection_id", self.id())
            .with("from", prior.status().name())
            .with("to", inner.state.status().name());
        if let EngineCommand::ReportError { worker, message } = &command {
            entry = entry
                .with("worker", worker.to_string())
                .with("message", message.as_str());
        }
        if matches!(command, EngineCommand::Reset) {
            entry = entry
                .with("discarded_cycles", prior.total_cycles())
                .with("discarded_errors", prior.total_errors());
        }
        self.deps.audit.record(entry);

        Ok(self.receipt(&command, true, &inner.state))
    }

    fn receipt(&self, command: &EngineCommand, applied: bool, state: &EngineState) -> CommandReceipt {
        CommandReceipt {
            connection_id: self.id().to_string(),
            command: command.name().to_string(),
            applied,
            state: state.clone(),
            positions_deleted: None,
        }
    }

    fn retire_pool(inner: &mut Inner) {
        if let Some(pool) = inner.pool.take() {
            let handles = pool.halt();
            inner.retired.retain(|h| !h.is_finished());
            inner.retired.extend(handles);
        }
    }

    fn spawn_workers(self: &Arc<Self>) -> WorkerPool {
        let (signal, rx) = watch::channel(WorkerSignal::Run);
        let handles = WorkerKind::ALL
            .into_iter()
            .map(|kind| {
                let runner = self.deps.workers.build(&self.connection, kind);
                let schedule = *self.deps.schedules.get(kind);
                tokio::spawn(run_worker(
                    Arc::downgrade(self),
                    runner,
                    self.connection.clone(),
                    schedule,
                    rx.clone(),
                ))
            })
            .collect();
        WorkerPool { signal, handles }
    }

    /// Wait for halted workers to finish their in-flight cycles.
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut self.inner.lock().await.retired);
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn complete_cycle(
        self: &Arc<Self>,
        kind: WorkerKind,
        elapsed_ms: f64,
        result: Result<(), CycleError>,
        halted: bool,
        epoch: u64,
    ) {
        if self.tracker.epoch() != epoch {
            tracing::debug!(connection_id = %self.id(), worker = %kind, "Discarding cycle result from before reset");
            return;
        }
        let metrics = self.tracker.record_cycle_result(kind, elapsed_ms, result.is_ok());

        match result {
            Ok(()) => {}
            Err(CycleError::Transient(message)) => {
                tracing::warn!(connection_id = %self.id(), worker = %kind, %message, "Worker cycle failed");
            }
            Err(CycleError::Fatal(message)) if !halted => {
                if let Err(e) = self
                    .execute(EngineCommand::ReportError { worker: kind, message })
                    .await
                {
                    tracing::error!(connection_id = %self.id(), worker = %kind, error = %e, "Could not record worker failure");
                }
                return;
            }
            Err(CycleError::Fatal(message)) => {
                tracing::warn!(connection_id = %self.id(), worker = %kind, %message, "Fatal cycle result after halt ignored");
            }
        }

        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.state.record_worker(kind, metrics, now);
        let verdicts = self.tracker.all_health_at(now);
        let overall = HealthVerdict::worst(verdicts.iter().map(|(_, v)| *v));
        inner.state.record_health(&verdicts, overall, now);
        if let Err(e) = self.deps.store.save(&inner.state) {
            tracing::warn!(connection_id = %self.id(), worker = %kind, error = %e, "Could not persist cycle counters");
        }
    }

    pub fn tracker(&self) -> &ComponentHealthTracker {
        &self.tracker
    }

    /// Lazily computed verdicts. Updates the in-memory snapshot; persisted with the next cycle.
    pub async fn health(&self) -> ConnectionHealth {
        let now = Utc::now();
        let verdicts = self.tracker.all_health_at(now);
        let overall = HealthVerdict::worst(verdicts.iter().map(|(_, v)| *v));
        let mut inner = self.inner.lock().await;
        inner.state.record_health(&verdicts, overall, now);
        ConnectionHealth {
            connection_id: self.id().to_string(),
            status: inner.state.status().name().to_string(),
            overall,
            components: WorkerSet::from_fn(|kind| {
                let metrics = self.tracker.current_metrics(kind);
                ComponentReport {
                    verdict: *verdicts.get(kind),
                    error_rate: metrics.error_rate(),
                    metrics,
                }
            }),
            checked_at: now,
        }
    }
}

async fn run_worker(
    engine: Weak<ConnectionEngine>,
    runner: Arc<dyn CycleRunner>,
    connection: Connection,
    schedule: WorkerSchedule,
    mut signal: watch::Receiver<WorkerSignal>,
) {
    let kind = runner.kind();
    let mut ticker = tokio::time::interval(schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(connection_id = %connection.id, worker = %kind, interval_ms = schedule.interval_ms, "Worker started");

    loop {
        tokio::select! {
            changed = signal.changed() => {
                if changed.is_err() || *signal.borrow() == WorkerSignal::Halt {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let current = *signal.borrow();
        match current {
            WorkerSignal::Halt => break,
            WorkerSignal::Pause => continue,
            WorkerSignal::Run => {}
        }
        let Some(engine) = engine.upgrade() else {
            break;
        };

        let epoch = engine.tracker.epoch();
        engine.tracker.record_cycle_start(kind);
        let started = Instant::now();
        let result = match tokio::time::timeout(schedule.timeout(), runner.run_cycle(&connection)).await {
            Ok(result) => result,
            Err(_) => Err(CycleError::Transient(format!(
                "cycle exceeded {} ms timeout",
                schedule.timeout_ms
            ))),
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let halted = *signal.borrow() == WorkerSignal::Halt;
        engine.complete_cycle(kind, elapsed_ms, result, halted, epoch).await;
        if halted {
            break;
        }
    }

    tracing::debug!(connection_id = %connection.id, worker = %kind, "Worker stopped");
}
