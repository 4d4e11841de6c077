mod common;

use common::{new_position, setup};
use engine_coordinator::application::storage_manager::{StorageManager, ThresholdUpdate};
use engine_coordinator::domain::entities::pseudo_position::{PositionStatus, PseudoPosition};
use engine_coordinator::domain::error::CoordinatorError;
use engine_coordinator::domain::ports::position_store::{PositionFilter, PositionStore};
use engine_coordinator::domain::values::position_category::PositionCategory;
use engine_coordinator::domain::values::threshold::{StorageStatus, ThresholdSettings};
use engine_coordinator::infrastructure::logging::MemoryAuditLog;
use engine_coordinator::infrastructure::sqlite::migrations;
use engine_coordinator::infrastructure::sqlite::position_repo::SqlitePositionStore;
use engine_coordinator::infrastructure::sqlite::threshold_repo::SqliteThresholdRepo;
use engine_coordinator::EngineCoordinator;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Fills `category` with `closed` closed and `active` active records, spread over
/// enough configurations to stay under the per-configuration cap.
fn fill(ec: &EngineCoordinator, category: PositionCategory, closed: usize, active: usize) {
    let input = |i: usize| {
        let mut p = new_position(category, "conn-0");
        p.configuration_id = format!("{category}-{:06}", i % 8);
        p
    };
    for i in 0..closed {
        let p = ec.record_position(input(i)).unwrap();
        ec.close_position(&p.id).unwrap();
    }
    for i in 0..active {
        ec.record_position(input(i)).unwrap();
    }
}

/// Delegates to SQLite except for the categories marked broken.
struct BrokenPositions {
    inner: SqlitePositionStore,
    broken: HashSet<PositionCategory>,
}

impl BrokenPositions {
    fn new(broken: &[PositionCategory]) -> Self {
        Self {
            inner: SqlitePositionStore::new(migrations::open(":memory:").unwrap()),
            broken: broken.iter().copied().collect(),
        }
    }

    fn check(&self, category: PositionCategory) -> Result<(), CoordinatorError> {
        if self.broken.contains(&category) {
            Err(CoordinatorError::PersistenceFailure(format!("{category} table missing")))
        } else {
            Ok(())
        }
    }
}

impl PositionStore for BrokenPositions {
    fn insert(&self, position: &PseudoPosition) -> Result<(), CoordinatorError> {
        self.inner.insert(position)
    }
    fn update_price(&self, id: &str, current_price: f64, profit_factor: f64) -> Result<bool, CoordinatorError> {
        self.inner.update_price(id, current_price, profit_factor)
    }
    fn close(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool, CoordinatorError> {
        self.inner.close(id, closed_at)
    }
    fn get(&self, id: &str) -> Result<Option<PseudoPosition>, CoordinatorError> {
        self.inner.get(id)
    }
    fn list(&self, filter: &PositionFilter) -> Result<Vec<PseudoPosition>, CoordinatorError> {
        self.inner.list(filter)
    }
    fn count(&self, category: PositionCategory) -> Result<u64, CoordinatorError> {
        self.check(category)?;
        self.inner.count(category)
    }
    fn count_by_status(
        &self,
        category: PositionCategory,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError> {
        self.check(category)?;
        self.inner.count_by_status(category, status)
    }
    fn count_by_configuration(
        &self,
        configuration_id: &str,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError> {
        self.inner.count_by_configuration(configuration_id, status)
    }
    fn delete_oldest_closed(&self, category: PositionCategory, max: u64) -> Result<u64, CoordinatorError> {
        self.check(category)?;
        self.inner.delete_oldest_closed(category, max)
    }
    fn delete_for_connection(&self, connection_id: &str) -> Result<u64, CoordinatorError> {
        self.inner.delete_for_connection(connection_id)
    }
}

fn manager(positions: Arc<dyn PositionStore>) -> (Arc<StorageManager>, Arc<MemoryAuditLog>) {
    let audit = Arc::new(MemoryAuditLog::new());
    let thresholds = Arc::new(SqliteThresholdRepo::new(migrations::open(":memory:").unwrap()));
    let manager = StorageManager::new(positions, thresholds, audit.clone(), ThresholdSettings::default());
    (Arc::new(manager), audit)
}

#[test]
fn test_empty_tables_are_optimal() {
    let (ec, _) = setup();
    let stats = ec.storage_stats();
    assert_eq!(stats.categories.len(), PositionCategory::ALL.len());
    for s in &stats.categories {
        assert_eq!(s.count, Some(0));
        assert_eq!(s.storage_limit, 300);
        assert_eq!(s.status, StorageStatus::Optimal);
    }
}

#[test]
fn test_band_boundaries() {
    let (ec, _) = setup();
    fill(&ec, PositionCategory::Main, 0, 240);
    fill(&ec, PositionCategory::Real, 0, 300);
    fill(&ec, PositionCategory::Base, 0, 301);

    let stats = ec.storage_stats();
    assert_eq!(stats.category(PositionCategory::Main).unwrap().status, StorageStatus::Warning);
    assert_eq!(stats.category(PositionCategory::Real).unwrap().status, StorageStatus::Warning);
    let base = stats.category(PositionCategory::Base).unwrap();
    assert_eq!(base.status, StorageStatus::Critical);
    assert!(base.utilization_percent.unwrap() > 100.0);
}

#[test]
fn test_cleanup_prunes_closed_back_to_limit() {
    let (ec, audit) = setup();
    fill(&ec, PositionCategory::Base, 200, 101);

    let report = ec.cleanup_now().unwrap();
    let base = report
        .categories
        .iter()
        .find(|c| c.category == PositionCategory::Base)
        .unwrap();
    assert_eq!(base.before, Some(301));
    assert_eq!(base.deleted, 51);
    assert_eq!(base.after, Some(250));
    assert!(!base.blocked_by_active);
    assert_eq!(report.total_deleted, 51);

    let active = ec
        .list_positions(&PositionFilter {
            category: Some(PositionCategory::Base),
            status: Some(PositionStatus::Active),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(active.len(), 101);
    assert!(audit
        .entries()
        .iter()
        .any(|e| e.category == "storage" && e.message == "Pruned closed pseudo positions"));
}

#[test]
fn test_cleanup_never_deletes_active() {
    let (ec, audit) = setup();
    fill(&ec, PositionCategory::Preset, 10, 300);

    let report = ec.cleanup_now().unwrap();
    let preset = report
        .categories
        .iter()
        .find(|c| c.category == PositionCategory::Preset)
        .unwrap();
    assert_eq!(preset.deleted, 10);
    assert_eq!(preset.after, Some(300));
    assert!(preset.blocked_by_active);
    assert!(!audit.at_severity(engine_coordinator::domain::ports::audit_log::Severity::Warning).is_empty());
}

#[test]
fn test_oldest_closed_go_first() {
    let positions = Arc::new(SqlitePositionStore::new(migrations::open(":memory:").unwrap()));
    let (manager, _) = manager(positions.clone());
    manager
        .configure(ThresholdUpdate {
            buffer_percent: None,
            limits: BTreeMap::from([(PositionCategory::Auto, 2)]),
        })
        .unwrap();

    let base = chrono::Utc::now() - chrono::Duration::hours(1);
    let mut ids = Vec::new();
    for i in 0..4 {
        let mut p = PseudoPosition::new(
            PositionCategory::Auto,
            "conn-0".into(),
            "realtime-000000".into(),
            "ETHUSDT".into(),
            10.0,
            0.0,
        );
        p.created_at = base + chrono::Duration::minutes(i);
        p.close();
        positions.insert(&p).unwrap();
        ids.push(p.id);
    }

    manager.cleanup_now().unwrap();
    let left: HashSet<String> = positions
        .list(&PositionFilter::default())
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(left, HashSet::from([ids[2].clone(), ids[3].clone()]));
}

#[test]
fn test_unreachable_category_reports_unknown() {
    let (manager, _) = manager(Arc::new(BrokenPositions::new(&[PositionCategory::Main])));
    let stats = manager.get_stats();
    let main = stats.category(PositionCategory::Main).unwrap();
    assert_eq!(main.status, StorageStatus::Unknown);
    assert_eq!(main.count, None);
    assert!(main.error.is_some());
    assert_eq!(
        stats.category(PositionCategory::Base).unwrap().status,
        StorageStatus::Optimal
    );

    // one bad category does not fail the whole cleanup
    let report = manager.cleanup_now().unwrap();
    assert_eq!(report.failed_categories, 1);
}

#[test]
fn test_cleanup_fails_when_every_category_fails() {
    let (manager, _) = manager(Arc::new(BrokenPositions::new(&PositionCategory::ALL)));
    let err = manager.cleanup_now().unwrap_err();
    assert_eq!(err.kind(), "persistence_failure");
}

#[test]
fn test_configure_validates_and_persists() {
    let (ec, _) = setup();
    let settings = ec
        .configure_thresholds(ThresholdUpdate {
            buffer_percent: Some(50),
            limits: BTreeMap::from([(PositionCategory::Real, 100)]),
        })
        .unwrap();
    assert_eq!(settings.buffer_percent, 50);
    assert_eq!(settings.config_for(PositionCategory::Real).storage_limit(), 150);
    assert_eq!(settings.config_for(PositionCategory::Base).limit, 250);

    let err = ec
        .configure_thresholds(ThresholdUpdate {
            buffer_percent: Some(900),
            limits: BTreeMap::new(),
        })
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidInput(_)));

    let err = ec
        .configure_thresholds(ThresholdUpdate {
            buffer_percent: None,
            limits: BTreeMap::from([(PositionCategory::Main, 0)]),
        })
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidInput(_)));
    assert_eq!(ec.thresholds().buffer_percent, 50);
}

#[test]
fn test_monitor_tick_only_prunes_critical() {
    let positions = Arc::new(SqlitePositionStore::new(migrations::open(":memory:").unwrap()));
    let (manager, _) = manager(positions.clone());
    for (category, n) in [(PositionCategory::Base, 301), (PositionCategory::Main, 280)] {
        for _ in 0..n {
            let mut p = PseudoPosition::new(category, "c".into(), "cfg".into(), "SOLUSDT".into(), 1.0, 0.0);
            p.close();
            positions.insert(&p).unwrap();
        }
    }

    let (stats, report) = manager.monitor_tick();
    assert_eq!(stats.category(PositionCategory::Main).unwrap().status, StorageStatus::Warning);
    assert_eq!(report.total_deleted, 51);
    assert_eq!(positions.count(PositionCategory::Base).unwrap(), 250);
    // inside the hysteresis band: untouched
    assert_eq!(positions.count(PositionCategory::Main).unwrap(), 280);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_loop_prunes_and_stops() {
    let positions = Arc::new(SqlitePositionStore::new(migrations::open(":memory:").unwrap()));
    let (manager, _) = manager(positions.clone());
    for _ in 0..310 {
        let mut p = PseudoPosition::new(PositionCategory::Optimal, "c".into(), "cfg".into(), "BTCUSDT".into(), 1.0, 0.0);
        p.close();
        positions.insert(&p).unwrap();
    }

    let handle = manager.spawn_monitor(30);
    for _ in 0..100 {
        if positions.count(PositionCategory::Optimal).unwrap() == 250 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(positions.count(PositionCategory::Optimal).unwrap(), 250);
    assert!(!handle.is_finished());

    handle.stop().await;
}

#[tokio::test]
async fn test_toggle_monitoring() {
    let (ec, _) = setup();
    assert!(!ec.monitoring_state().enabled);

    let on = ec.toggle_monitoring().await;
    assert!(on.enabled);
    assert_eq!(on.interval_secs, Some(ec.config().monitor_interval_secs));
    assert!(ec.storage_stats().monitoring);

    let off = ec.toggle_monitoring().await;
    assert!(!off.enabled);

    let custom = ec.start_monitoring(Some(5)).await;
    assert_eq!(custom.interval_secs, Some(5));
    assert!(!ec.stop_monitoring().await.enabled);
}
