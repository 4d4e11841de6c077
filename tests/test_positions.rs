mod common;

use common::{memory_config, new_position, setup, setup_with};
use engine_coordinator::domain::entities::pseudo_position::{PositionStatus, PseudoPosition};
use engine_coordinator::domain::error::CoordinatorError;
use engine_coordinator::domain::ports::position_store::{PositionFilter, PositionStore};
use engine_coordinator::domain::values::config_space::PER_CONFIGURATION_POSITION_CAP;
use engine_coordinator::domain::values::position_category::PositionCategory;
use engine_coordinator::infrastructure::config::CoordinatorConfig;
use engine_coordinator::infrastructure::sqlite::migrations;
use engine_coordinator::infrastructure::sqlite::position_repo::SqlitePositionStore;
use engine_coordinator::infrastructure::workers::noop::NoopWorkerFactory;
use std::sync::Arc;

#[test]
fn test_configuration_cap_rejects_extra_active_record() {
    let (ec, _) = setup();
    for _ in 0..PER_CONFIGURATION_POSITION_CAP {
        ec.record_position(new_position(PositionCategory::Main, "conn-0")).unwrap();
    }

    let err = ec
        .record_position(new_position(PositionCategory::Main, "conn-0"))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidInput(_)));
    let stored = ec.list_positions(&PositionFilter::default()).unwrap();
    assert_eq!(stored.len() as u64, PER_CONFIGURATION_POSITION_CAP);

    // Other configurations have their own cap.
    let mut other = new_position(PositionCategory::Main, "conn-0");
    other.configuration_id = "strategy-000002".into();
    ec.record_position(other).unwrap();
}

#[test]
fn test_closing_frees_a_cap_slot() {
    let config = CoordinatorConfig {
        position_cap: 2,
        ..memory_config()
    };
    let (ec, _) = setup_with(config, Arc::new(NoopWorkerFactory));
    let first = ec.record_position(new_position(PositionCategory::Base, "conn-0")).unwrap();
    ec.record_position(new_position(PositionCategory::Base, "conn-0")).unwrap();
    assert!(ec.record_position(new_position(PositionCategory::Base, "conn-0")).is_err());

    ec.close_position(&first.id).unwrap();
    ec.record_position(new_position(PositionCategory::Base, "conn-0")).unwrap();
}

#[test]
fn test_price_update_and_close() {
    let (ec, _) = setup();
    let p = ec.record_position(new_position(PositionCategory::Real, "conn-0")).unwrap();

    let updated = ec.update_position_price(&p.id, 110.0).unwrap();
    assert_eq!(updated.current_price, 110.0);
    assert!((updated.profit_factor - 1.1).abs() < 1e-9);

    let closed = ec.close_position(&p.id).unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert!(closed.closed_at.is_some());
    // Second close is a no-op.
    assert_eq!(ec.close_position(&p.id).unwrap().status, PositionStatus::Closed);

    let err = ec.update_position_price(&p.id, 120.0).unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidInput(_)));
    assert!(matches!(
        ec.update_position_price("missing", 1.0),
        Err(CoordinatorError::NotFound(_))
    ));
    assert!(matches!(
        ec.update_position_price(&p.id, f64::NAN),
        Err(CoordinatorError::InvalidInput(_))
    ));
}

#[test]
fn test_price_tick_cannot_reopen_closed_record() {
    let store = SqlitePositionStore::new(migrations::open(":memory:").unwrap());
    let mut p = PseudoPosition::new(
        PositionCategory::Auto,
        "conn-0".into(),
        "realtime-000001".into(),
        "ETHUSDT".into(),
        10.0,
        0.0,
    );
    store.insert(&p).unwrap();
    // A tick computed from a copy read before the close lands after it.
    p.update_price(11.0);
    assert!(store.close(&p.id, chrono::Utc::now()).unwrap());
    assert!(!store.update_price(&p.id, p.current_price, p.profit_factor).unwrap());

    let stored = store.get(&p.id).unwrap().unwrap();
    assert_eq!(stored.status, PositionStatus::Closed);
    assert!(stored.closed_at.is_some());
    assert_eq!(stored.current_price, 10.0);
    assert_eq!(
        store.count_by_configuration("realtime-000001", PositionStatus::Active).unwrap(),
        0
    );
}
