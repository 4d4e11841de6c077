//! Health verdicts for workers and connections.
//!
//! A worker's verdict is derived from its counters on read:
//! - `healthy`: error rate at or below [`HEALTHY_ERROR_RATE`]
//! - `degraded`: error rate above that but at or below [`UNHEALTHY_ERROR_RATE`]
//! - `unhealthy`: error rate above [`UNHEALTHY_ERROR_RATE`], or no successful
//!   cycle within [`MISSED_INTERVALS_UNHEALTHY`] expected intervals
//!
//! A connection's verdict is the worst of its three worker verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Error fraction at or below which a worker is healthy.
pub const HEALTHY_ERROR_RATE: f64 = 0.05;
/// Error fraction above which a worker is unhealthy.
pub const UNHEALTHY_ERROR_RATE: f64 = 0.20;
/// Number of expected intervals without a successful cycle before a running worker is unhealthy.
pub const MISSED_INTERVALS_UNHEALTHY: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthVerdict {
    /// Worst-case reduction: any unhealthy wins, then any degraded.
    pub fn worst<I: IntoIterator<Item = HealthVerdict>>(verdicts: I) -> HealthVerdict {
        verdicts.into_iter().max().unwrap_or(HealthVerdict::Healthy)
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthVerdict::Healthy => write!(f, "healthy"),
            HealthVerdict::Degraded => write!(f, "degraded"),
            HealthVerdict::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

impl FromStr for HealthVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(HealthVerdict::Healthy),
            "degraded" => Ok(HealthVerdict::Degraded),
            "unhealthy" => Ok(HealthVerdict::Unhealthy),
            _ => Err(format!("Unknown health verdict: {s}")),
        }
    }
}

/// Rolling counters for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub cycle_count: u64,
    pub error_count: u64,
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_started_at: Option<DateTime<Utc>>,
}

impl WorkerMetrics {
    pub fn error_rate(&self) -> f64 {
        error_rate(self.cycle_count, self.error_count)
    }
}

/// Timing context for the staleness rule; only meaningful while the engine runs.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    pub expected_interval: Duration,
    /// When the worker was last (re)started.
    pub running_since: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Errors over cycles. Errors reported outside a cycle can outnumber cycles, so the
/// denominator is never below the error count.
pub fn error_rate(cycle_count: u64, error_count: u64) -> f64 {
    let attempts = cycle_count.max(error_count);
    if attempts == 0 {
        0.0
    } else {
        error_count as f64 / attempts as f64
    }
}

/// Verdict from counters alone.
pub fn verdict_from_counters(cycle_count: u64, error_count: u64) -> HealthVerdict {
    let rate = error_rate(cycle_count, error_count);
    if rate > UNHEALTHY_ERROR_RATE {
        HealthVerdict::Unhealthy
    } else if rate > HEALTHY_ERROR_RATE {
        HealthVerdict::Degraded
    } else {
        HealthVerdict::Healthy
    }
}

/// Full component verdict: counters plus the missed-interval rule when timing is known.
pub fn assess(metrics: &WorkerMetrics, liveness: Option<Liveness>) -> HealthVerdict {
    let counters = verdict_from_counters(metrics.cycle_count, metrics.error_count);
    let Some(live) = liveness else {
        return counters;
    };

    let reference = match metrics.last_success_at {
        Some(success) if success > live.running_since => success,
        _ => live.running_since,
    };
    let window = live.expected_interval * MISSED_INTERVALS_UNHEALTHY;
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    if live.now - reference > window {
        HealthVerdict::Unhealthy
    } else {
        counters
    }
}
