use crate::domain::values::worker_kind::WorkerKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message stored on every connection by an emergency stop.
pub const EMERGENCY_STOP_MESSAGE: &str = "Emergency stop activated by system";

/// Commands against a single connection's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
    Reset,
    ReportError { worker: WorkerKind, message: String },
    EmergencyStop,
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Start => "start",
            EngineCommand::Stop => "stop",
            EngineCommand::Pause => "pause",
            EngineCommand::Resume => "resume",
            EngineCommand::Reset => "reset",
            EngineCommand::ReportError { .. } => "report_error",
            EngineCommand::EmergencyStop => "emergency_stop",
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fleet-wide commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetCommand {
    StartAll,
    StopAll,
    PauseAll,
    ResumeAll,
    EmergencyStop,
}

impl fmt::Display for FleetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetCommand::StartAll => write!(f, "start_all"),
            FleetCommand::StopAll => write!(f, "stop_all"),
            FleetCommand::PauseAll => write!(f, "pause_all"),
            FleetCommand::ResumeAll => write!(f, "resume_all"),
            FleetCommand::EmergencyStop => write!(f, "emergency_stop"),
        }
    }
}

