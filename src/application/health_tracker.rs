//! In-memory cycle bookkeeping for one engine's three workers.
//!
//! Each worker owns its own slot and lock, so concurrent workers never contend.
//! Verdicts are computed on read.

use crate::domain::entities::engine_state::WorkerSet;
use crate::domain::values::health::{assess, HealthVerdict, Liveness, WorkerMetrics};
use crate::domain::values::schedule::WorkerSchedule;
use crate::domain::values::worker_kind::WorkerKind;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Slot {
    metrics: WorkerMetrics,
}

pub struct ComponentHealthTracker {
    slots: WorkerSet<Mutex<Slot>>,
    schedules: WorkerSet<WorkerSchedule>,
    running_since: Mutex<Option<DateTime<Utc>>>,
    epoch: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ComponentHealthTracker {
    pub fn new(schedules: WorkerSet<WorkerSchedule>) -> Self {
        Self {
            slots: WorkerSet::default(),
            schedules,
            running_since: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Seed counters from a persisted snapshot.
    pub fn restore(&self, metrics: &WorkerSet<WorkerMetrics>) {
        for kind in WorkerKind::ALL {
            lock(self.slots.get(kind)).metrics = metrics.get(kind).clone();
        }
    }

    pub fn record_cycle_start(&self, kind: WorkerKind) {
        lock(self.slots.get(kind)).metrics.last_started_at = Some(Utc::now());
    }

    /// O(1): bumps counters and folds the duration into an incremental mean.
    pub fn record_cycle_result(&self, kind: WorkerKind, duration_ms: f64, succeeded: bool) -> WorkerMetrics {
        let now = Utc::now();
        let mut slot = lock(self.slots.get(kind));
        let m = &mut slot.metrics;
        m.cycle_count += 1;
        if succeeded {
            m.last_success_at = Some(now);
        } else {
            m.error_count += 1;
        }
        m.avg_duration_ms += (duration_ms - m.avg_duration_ms) / m.cycle_count as f64;
        m.last_run_at = Some(now);
        m.clone()
    }

    /// An error reported outside of a cycle result.
    pub fn record_error(&self, kind: WorkerKind) -> WorkerMetrics {
        let mut slot = lock(self.slots.get(kind));
        slot.metrics.error_count += 1;
        slot.metrics.clone()
    }

    pub fn current_metrics(&self, kind: WorkerKind) -> WorkerMetrics {
        lock(self.slots.get(kind)).metrics.clone()
    }

    pub fn all_metrics(&self) -> WorkerSet<WorkerMetrics> {
        WorkerSet::from_fn(|kind| self.current_metrics(kind))
    }

    pub fn current_health(&self, kind: WorkerKind) -> HealthVerdict {
        self.health_at(kind, Utc::now())
    }

    pub fn health_at(&self, kind: WorkerKind, now: DateTime<Utc>) -> HealthVerdict {
        let liveness = (*lock(&self.running_since)).map(|running_since| Liveness {
            expected_interval: self.schedules.get(kind).interval(),
            running_since,
            now,
        });
        assess(&self.current_metrics(kind), liveness)
    }

    pub fn all_health_at(&self, now: DateTime<Utc>) -> WorkerSet<HealthVerdict> {
        WorkerSet::from_fn(|kind| self.health_at(kind, now))
    }

    /// Worst of the three component verdicts.
    pub fn overall_health_at(&self, now: DateTime<Utc>) -> HealthVerdict {
        let all = self.all_health_at(now);
        HealthVerdict::worst(all.iter().map(|(_, v)| *v))
    }

    /// Enables the missed-interval rule from `now`.
    pub fn mark_running(&self, now: DateTime<Utc>) {
        *lock(&self.running_since) = Some(now);
    }

    pub fn mark_idle(&self) {
        *lock(&self.running_since) = None;
    }

    /// Bumped by every reset. A cycle that started in an older epoch must not report.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for kind in WorkerKind::ALL {
            lock(self.slots.get(kind)).metrics = WorkerMetrics::default();
        }
    }

    pub fn schedule(&self, kind: WorkerKind) -> WorkerSchedule {
        *self.schedules.get(kind)
    }
}
