use crate::domain::values::worker_kind::WorkerKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval/timeout pair for one worker's periodic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSchedule {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl WorkerSchedule {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
        }
    }

    pub fn default_for(kind: WorkerKind) -> Self {
        match kind {
            WorkerKind::Indication => Self::new(1_000, 5_000),
            WorkerKind::Strategy => Self::new(2_000, 10_000),
            WorkerKind::Realtime => Self::new(500, 3_000),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}
