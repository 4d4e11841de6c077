use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three cyclic workers every engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Indication,
    Strategy,
    Realtime,
}

impl WorkerKind {
    pub const ALL: [WorkerKind; 3] = [WorkerKind::Indication, WorkerKind::Strategy, WorkerKind::Realtime];
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Indication => write!(f, "indication"),
            WorkerKind::Strategy => write!(f, "strategy"),
            WorkerKind::Realtime => write!(f, "realtime"),
        }
    }
}

impl FromStr for WorkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "indication" => Ok(WorkerKind::Indication),
            "strategy" => Ok(WorkerKind::Strategy),
            "realtime" => Ok(WorkerKind::Realtime),
            _ => Err(format!("Unknown worker kind: {s}")),
        }
    }
}
