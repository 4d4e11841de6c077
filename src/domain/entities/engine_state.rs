//! Per-connection engine state and its transition rules.
//!
//! `EngineStatus` is a closed enum and every command is matched against every
//! status, so an unhandled combination fails to compile. The error message lives
//! inside the `Error` variant and `running` is derived from the status, so a
//! running flag always matches the status and an errored engine always carries
//! a message.

use crate::domain::error::CoordinatorError;
use crate::domain::values::command::{EngineCommand, EMERGENCY_STOP_MESSAGE};
use crate::domain::values::health::{HealthVerdict, WorkerMetrics};
use crate::domain::values::worker_kind::WorkerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EngineStatus {
    Initializing,
    Stopped,
    Running,
    Paused,
    Error { message: String },
}

impl EngineStatus {
    pub fn name(&self) -> &'static str {
        match self {
            EngineStatus::Initializing => "initializing",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Running => "running",
            EngineStatus::Paused => "paused",
            EngineStatus::Error { .. } => "error",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per worker kind. Always total, unlike a map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSet<T> {
    pub indication: T,
    pub strategy: T,
    pub realtime: T,
}

impl<T> WorkerSet<T> {
    pub fn from_fn(mut f: impl FnMut(WorkerKind) -> T) -> Self {
        Self {
            indication: f(WorkerKind::Indication),
            strategy: f(WorkerKind::Strategy),
            realtime: f(WorkerKind::Realtime),
        }
    }

    pub fn get(&self, kind: WorkerKind) -> &T {
        match kind {
            WorkerKind::Indication => &self.indication,
            WorkerKind::Strategy => &self.strategy,
            WorkerKind::Realtime => &self.realtime,
        }
    }

    pub fn get_mut(&mut self, kind: WorkerKind) -> &mut T {
        match kind {
            WorkerKind::Indication => &mut self.indication,
            WorkerKind::Strategy => &mut self.strategy,
            WorkerKind::Realtime => &mut self.realtime,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (WorkerKind, &T)> {
        WorkerKind::ALL.into_iter().map(move |k| (k, self.get(k)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    #[serde(flatten)]
    pub metrics: WorkerMetrics,
    pub health: Option<HealthVerdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Already in the target state; a retried command lands here.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    pub connection_id: String,
    #[serde(flatten)]
    status: EngineStatus,
    running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub prehistoric_loaded: bool,
    pub workers: WorkerSet<WorkerSnapshot>,
    pub overall_health: Option<HealthVerdict>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Flat storage shape. Converted into `EngineState` in one place.
#[derive(Debug, Clone, Default)]
pub struct EngineRecord {
    pub connection_id: String,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub prehistoric_loaded: bool,
    pub workers: WorkerSet<WorkerSnapshot>,
    pub overall_health: Option<HealthVerdict>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EngineState {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            status: EngineStatus::Initializing,
            running: false,
            started_at: None,
            stopped_at: None,
            prehistoric_loaded: false,
            workers: WorkerSet::default(),
            overall_health: None,
            last_health_check: None,
            updated_at: Utc::now(),
        }
    }

    pub fn from_record(record: EngineRecord) -> Result<Self, CoordinatorError> {
        let status = match record.status.as_str() {
            "initializing" => EngineStatus::Initializing,
            "stopped" => EngineStatus::Stopped,
            "running" => EngineStatus::Running,
            "paused" => EngineStatus::Paused,
            "error" => EngineStatus::Error {
                message: record
                    .error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "unspecified error".to_string()),
            },
            other => {
                return Err(CoordinatorError::PersistenceFailure(format!(
                    "unknown engine status '{other}' for connection {}",
                    record.connection_id
                )))
            }
        };
        let mut state = Self {
            connection_id: record.connection_id,
            status: EngineStatus::Initializing,
            running: false,
            started_at: record.started_at,
            stopped_at: record.stopped_at,
            prehistoric_loaded: record.prehistoric_loaded,
            workers: record.workers,
            overall_health: record.overall_health,
            last_health_check: record.last_health_check,
            updated_at: record.updated_at.unwrap_or_else(Utc::now),
        };
        state.set_status(status);
        Ok(state)
    }

    pub fn to_record(&self) -> EngineRecord {
        EngineRecord {
            connection_id: self.connection_id.clone(),
            status: self.status.name().to_string(),
            error_message: self.error_message().map(str::to_string),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            prehistoric_loaded: self.prehistoric_loaded,
            workers: self.workers.clone(),
            overall_health: self.overall_health,
            last_health_check: self.last_health_check,
            updated_at: Some(self.updated_at),
        }
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            EngineStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    fn set_status(&mut self, status: EngineStatus) {
        self.running = matches!(status, EngineStatus::Running);
        self.status = status;
    }

    fn invalid(&self, command: &EngineCommand) -> CoordinatorError {
        CoordinatorError::InvalidTransition {
            from: self.status.name().to_string(),
            command: command.name().to_string(),
        }
    }

    /// `initializing → stopped`, once the first record has been written.
    pub fn mark_initialized(&mut self) {
        if self.status == EngineStatus::Initializing {
            self.set_status(EngineStatus::Stopped);
        }
    }

    /// A record persisted as running/paused by a previous process has no live workers.
    /// Returns `true` if the status was normalized to stopped.
    pub fn recover_after_restart(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            EngineStatus::Running | EngineStatus::Paused => {
                self.set_status(EngineStatus::Stopped);
                self.stopped_at = Some(now);
                self.updated_at = now;
                true
            }
            EngineStatus::Initializing | EngineStatus::Stopped | EngineStatus::Error { .. } => false,
        }
    }

    /// Apply one command. Counters are untouched except by `Reset`.
    pub fn apply(
        &mut self,
        command: &EngineCommand,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoordinatorError> {
        let outcome = match command {
            EngineCommand::Start => match self.status {
                EngineStatus::Stopped | EngineStatus::Error { .. } => {
                    self.set_status(EngineStatus::Running);
                    self.started_at = Some(now);
                    for (_, worker) in self.workers_mut() {
                        worker.health = Some(HealthVerdict::Healthy);
                    }
                    self.overall_health = Some(HealthVerdict::Healthy);
                    TransitionOutcome::Applied
                }
                EngineStatus::Running => TransitionOutcome::Unchanged,
                EngineStatus::Initializing | EngineStatus::Paused => {
                    return Err(self.invalid(command))
                }
            },
            EngineCommand::Stop => match self.status {
                EngineStatus::Running | EngineStatus::Paused => {
                    self.set_status(EngineStatus::Stopped);
                    self.stopped_at = Some(now);
                    TransitionOutcome::Applied
                }
                EngineStatus::Stopped | EngineStatus::Initializing => TransitionOutcome::Unchanged,
                EngineStatus::Error { .. } => return Err(self.invalid(command)),
            },
            EngineCommand::Pause => match self.status {
                EngineStatus::Running => {
                    self.set_status(EngineStatus::Paused);
                    TransitionOutcome::Applied
                }
                EngineStatus::Paused => TransitionOutcome::Unchanged,
                EngineStatus::Initializing | EngineStatus::Stopped | EngineStatus::Error { .. } => {
                    return Err(self.invalid(command))
                }
            },
            EngineCommand::Resume => match self.status {
                EngineStatus::Paused => {
                    self.set_status(EngineStatus::Running);
                    TransitionOutcome::Applied
                }
                EngineStatus::Running => TransitionOutcome::Unchanged,
                EngineStatus::Initializing | EngineStatus::Stopped | EngineStatus::Error { .. } => {
                    return Err(self.invalid(command))
                }
            },
            EngineCommand::Reset => {
                if matches!(self.status, EngineStatus::Running | EngineStatus::Paused) {
                    self.stopped_at = Some(now);
                }
                self.set_status(EngineStatus::Stopped);
                self.workers = WorkerSet::default();
                self.prehistoric_loaded = false;
                self.overall_health = None;
                self.last_health_check = None;
                TransitionOutcome::Applied
            }
            EngineCommand::ReportError { message, .. } => {
                if matches!(self.status, EngineStatus::Running | EngineStatus::Paused) {
                    self.stopped_at = Some(now);
                }
                self.set_status(EngineStatus::Error {
                    message: message.clone(),
                });
                TransitionOutcome::Applied
            }
            EngineCommand::EmergencyStop => {
                if matches!(self.status, EngineStatus::Running | EngineStatus::Paused) {
                    self.stopped_at = Some(now);
                }
                self.set_status(EngineStatus::Error {
                    message: EMERGENCY_STOP_MESSAGE.to_string(),
                });
                TransitionOutcome::Applied
            }
        };
        if outcome == TransitionOutcome::Applied {
            self.updated_at = now;
        }
        Ok(outcome)
    }

    fn workers_mut(&mut self) -> impl Iterator<Item = (WorkerKind, &mut WorkerSnapshot)> {
        let WorkerSet {
            indication,
            strategy,
            realtime,
        } = &mut self.workers;
        [
            (WorkerKind::Indication, indication),
            (WorkerKind::Strategy, strategy),
            (WorkerKind::Realtime, realtime),
        ]
        .into_iter()
    }

    /// Copy one worker's live counters into the persisted snapshot.
    pub fn record_worker(&mut self, kind: WorkerKind, metrics: WorkerMetrics, now: DateTime<Utc>) {
        self.workers.get_mut(kind).metrics = metrics;
        self.updated_at = now;
    }

    /// Store freshly computed verdicts. Overwrites, never accumulates.
    pub fn record_health(
        &mut self,
        verdicts: &WorkerSet<HealthVerdict>,
        overall: HealthVerdict,
        now: DateTime<Utc>,
    ) {
        for (kind, worker) in self.workers_mut() {
            worker.health = Some(*verdicts.get(kind));
        }
        self.overall_health = Some(overall);
        self.last_health_check = Some(now);
    }

    pub fn total_cycles(&self) -> u64 {
        self.workers.iter().map(|(_, w)| w.metrics.cycle_count).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.workers.iter().map(|(_, w)| w.metrics.error_count).sum()
    }
}
