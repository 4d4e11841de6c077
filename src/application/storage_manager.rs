//! Threshold-based storage management for pseudo-position tables.
//!
//! Each category has a base `limit` and a `storage_limit` inflated by the
//! buffer. Monitoring prunes a category only once it crosses the storage
//! limit, and prunes it back down to the base limit. The gap between the two
//! is the hysteresis band that keeps the next tick from pruning again.
//!
//! Pruning touches closed records only, oldest first. This manager uses its
//! own store handle and locks; it never waits on an engine.

use crate::domain::entities::pseudo_position::PositionStatus;
use crate::domain::error::CoordinatorError;
use crate::domain::ports::audit_log::{AuditEntry, AuditLog, Severity};
use crate::domain::ports::position_store::PositionStore;
use crate::domain::ports::threshold_repository::ThresholdRepository;
use crate::domain::values::position_category::PositionCategory;
use crate::domain::values::threshold::{
    PositionTableStats, StorageStatus, ThresholdConfig, ThresholdSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const AUDIT_CATEGORY: &str = "storage";

#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub buffer_percent: u32,
    pub monitoring: bool,
    pub categories: Vec<PositionTableStats>,
    pub checked_at: DateTime<Utc>,
}

impl StorageStats {
    pub fn category(&self, category: PositionCategory) -> Option<&PositionTableStats> {
        self.categories.iter().find(|s| s.category == category)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCleanup {
    pub category: PositionCategory,
    pub limit: u64,
    pub before: Option<u64>,
    pub deleted: u64,
    pub after: Option<u64>,
    /// Still above the base limit because the remainder is active.
    pub blocked_by_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub total_deleted: u64,
    pub failed_categories: usize,
    pub categories: Vec<CategoryCleanup>,
}

/// Partial settings change; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThresholdUpdate {
    pub buffer_percent: Option<u32>,
    #[serde(default)]
    pub limits: BTreeMap<PositionCategory, u64>,
}

/// Owned handle to a running monitor task. Stopping (or dropping) it cancels the
/// loop before its next tick; a tick already in progress finishes.
pub struct MonitorHandle {
    cancel: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    interval_secs: u64,
}

impl MonitorHandle {
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn stop(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let _ = (&mut self.join).await;
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MonitoringState {
    pub enabled: bool,
    pub interval_secs: Option<u64>,
}

pub struct StorageManager {
    positions: Arc<dyn PositionStore>,
    thresholds: Arc<dyn ThresholdRepository>,
    audit: Arc<dyn AuditLog>,
    settings: RwLock<ThresholdSettings>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl StorageManager {
    /// Persisted settings win over `defaults`.
    pub fn new(
        positions: Arc<dyn PositionStore>,
        thresholds: Arc<dyn ThresholdRepository>,
        audit: Arc<dyn AuditLog>,
        defaults: ThresholdSettings,
    ) -> Self {
        let defaults = match defaults.validate() {
            Ok(()) => defaults,
            Err(e) => {
                tracing::warn!(error = %e, "Configured thresholds are invalid; using built-in defaults");
                ThresholdSettings::default()
            }
        };
        let settings = match thresholds.load() {
            Ok(Some(saved)) => saved,
            Ok(None) => defaults,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load threshold settings; using defaults");
                defaults
            }
        };
        Self {
            positions,
            thresholds,
            audit,
            settings: RwLock::new(settings),
            monitor: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> ThresholdSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<MonitorHandle>> {
        self.monitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn configure(&self, update: ThresholdUpdate) -> Result<ThresholdSettings, CoordinatorError> {
        let mut next = self.settings();
        if let Some(buffer) = update.buffer_percent {
            next.buffer_percent = buffer;
        }
        next.limits.extend(update.limits);
        next.validate()?;
        self.thresholds.save(&next)?;

        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();

        let mut entry = AuditEntry::new(Severity::Info, AUDIT_CATEGORY, "Storage thresholds updated")
            .with("buffer_percent", next.buffer_percent);
        for config in next.configs() {
            entry = entry.with(&format!("limit_{}", config.category), config.limit);
        }
        self.audit.record(entry);
        Ok(next)
    }

    fn measure(&self, config: &ThresholdConfig) -> PositionTableStats {
        match self.positions.count(config.category) {
            Ok(count) => PositionTableStats::measured(config, count),
            Err(e) => {
                tracing::warn!(category = %config.category, error = %e, "Position table unreachable");
                PositionTableStats::unreachable(config, e.to_string())
            }
        }
    }

    pub fn get_stats(&self) -> StorageStats {
        let settings = self.settings();
        StorageStats {
            buffer_percent: settings.buffer_percent,
            monitoring: self.monitoring_state().enabled,
            categories: settings.configs().iter().map(|c| self.measure(c)).collect(),
            checked_at: Utc::now(),
        }
    }

    /// Prune one category back to its base limit.
    fn prune(&self, config: &ThresholdConfig) -> Result<CategoryCleanup, CoordinatorError> {
        let before = self.positions.count(config.category)?;
        let mut deleted = 0;
        if before > config.limit {
            deleted = self
                .positions
                .delete_oldest_closed(config.category, before - config.limit)?;
        }
        let after = before.saturating_sub(deleted);
        let blocked_by_active = after > config.limit;

        if deleted > 0 {
            self.audit.record(
                AuditEntry::new(Severity::Info, AUDIT_CATEGORY, "Pruned closed pseudo positions")
                    .with("category", config.category.to_string())
                    .with("before", before)
                    .with("deleted", deleted)
                    .with("after", after)
                    .with("limit", config.limit),
            );
        }
        if blocked_by_active {
            let active = self
                .positions
                .count_by_status(config.category, PositionStatus::Active)
                .ok();
            self.audit.record(
                AuditEntry::new(
                    Severity::Warning,
                    AUDIT_CATEGORY,
                    "Category still above limit; remaining records are active",
                )
                .with("category", config.category.to_string())
                .with("count", after)
                .with("active", active)
                .with("limit", config.limit),
            );
        }

        Ok(CategoryCleanup {
            category: config.category,
            limit: config.limit,
            before: Some(before),
            deleted,
            after: Some(after),
            blocked_by_active,
            error: None,
        })
    }

    fn cleanup(&self, configs: &[ThresholdConfig]) -> CleanupReport {
        let mut report = CleanupReport {
            total_deleted: 0,
            failed_categories: 0,
            categories: Vec::with_capacity(configs.len()),
        };
        for config in configs {
            match self.prune(config) {
                Ok(result) => {
                    report.total_deleted += result.deleted;
                    report.categories.push(result);
                }
                Err(e) => {
                    self.audit.record(
                        AuditEntry::new(Severity::Warning, AUDIT_CATEGORY, "Cleanup failed for category")
                            .with("category", config.category.to_string())
                            .with("error", e.to_string()),
                    );
                    report.failed_categories += 1;
                    report.categories.push(CategoryCleanup {
                        category: config.category,
                        limit: config.limit,
                        before: None,
                        deleted: 0,
                        after: None,
                        blocked_by_active: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        report
    }

    /// Prune every category above its base limit. Errors only if every category failed.
    pub fn cleanup_now(&self) -> Result<CleanupReport, CoordinatorError> {
        let configs = self.settings().configs();
        let report = self.cleanup(&configs);
        if !configs.is_empty() && report.failed_categories == configs.len() {
            let reasons: Vec<String> = report
                .categories
                .iter()
                .filter_map(|c| c.error.as_ref().map(|e| format!("{}: {e}", c.category)))
                .collect();
            return Err(CoordinatorError::PersistenceFailure(format!(
                "cleanup failed for every category ({})",
                reasons.join("; ")
            )));
        }
        Ok(report)
    }

    /// One monitoring pass: measure, then prune categories that crossed their storage limit.
    pub fn monitor_tick(&self) -> (StorageStats, CleanupReport) {
        let stats = self.get_stats();
        let settings = self.settings();
        let critical: Vec<ThresholdConfig> = stats
            .categories
            .iter()
            .filter(|s| s.status == StorageStatus::Critical)
            .map(|s| settings.config_for(s.category))
            .collect();
        for s in &stats.categories {
            if s.status == StorageStatus::Warning {
                tracing::info!(category = %s.category, count = ?s.count, storage_limit = s.storage_limit, "Position table approaching limit");
            }
        }
        let report = self.cleanup(&critical);
        (stats, report)
    }

    /// Spawn the monitor loop. The caller owns the returned handle.
    pub fn spawn_monitor(self: &Arc<Self>, interval_secs: u64) -> MonitorHandle {
        let interval_secs = interval_secs.max(1);
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let manager: Weak<Self> = Arc::downgrade(self);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        // SQLite counts and deletes block; keep them off the async workers.
                        let report = match tokio::task::spawn_blocking(move || manager.monitor_tick().1).await {
                            Ok(report) => report,
                            Err(e) => {
                                tracing::error!(error = %e, "Storage monitor tick panicked");
                                continue;
                            }
                        };
                        if report.total_deleted > 0 || report.failed_categories > 0 {
                            tracing::info!(
                                deleted = report.total_deleted,
                                failed_categories = report.failed_categories,
                                "Storage monitor tick"
                            );
                        }
                    }
                }
            }
            tracing::debug!("Storage monitor stopped");
        });
        MonitorHandle {
            cancel: Some(cancel),
            join,
            interval_secs,
        }
    }

    /// Start (or restart with a new interval) the owned monitor.
    pub async fn start_monitoring(self: &Arc<Self>, interval_secs: u64) -> MonitoringState {
        let previous = self.monitor_slot().take();
        if let Some(previous) = previous {
            previous.stop().await;
        }
        let handle = self.spawn_monitor(interval_secs);
        let interval_secs = handle.interval_secs();
        *self.monitor_slot() = Some(handle);
        self.audit.record(
            AuditEntry::new(Severity::Info, AUDIT_CATEGORY, "Storage monitoring started")
                .with("interval_secs", interval_secs),
        );
        self.monitoring_state()
    }

    pub async fn stop_monitoring(&self) -> MonitoringState {
        let handle = self.monitor_slot().take();
        if let Some(handle) = handle {
            handle.stop().await;
            self.audit.record(AuditEntry::new(
                Severity::Info,
                AUDIT_CATEGORY,
                "Storage monitoring stopped",
            ));
        }
        self.monitoring_state()
    }

    pub async fn toggle_monitoring(self: &Arc<Self>, interval_secs: u64) -> MonitoringState {
        if self.monitoring_state().enabled {
            self.stop_monitoring().await
        } else {
            self.start_monitoring(interval_secs).await
        }
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        let slot = self.monitor_slot();
        match slot.as_ref().filter(|h| !h.is_finished()) {
            Some(handle) => MonitoringState {
                enabled: true,
                interval_secs: Some(handle.interval_secs()),
            },
            None => MonitoringState {
                enabled: false,
                interval_secs: None,
            },
        }
    }
}
