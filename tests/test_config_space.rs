mod common;

use common::setup;
use engine_coordinator::domain::error::CoordinatorError;
use engine_coordinator::domain::values::config_space::{SpaceDefinition, PER_CONFIGURATION_POSITION_CAP};
use engine_coordinator::domain::values::worker_kind::WorkerKind;

#[test]
fn test_stock_indication_space() {
    let (ec, _) = setup();
    let space = ec.default_space(WorkerKind::Indication).unwrap();
    // range 3..=30 step 1 (28 values) x direction (2 values)
    assert_eq!(space.cardinality, 56);
    assert_eq!(space.configurations.len(), 56);
    assert_eq!(space.capacity, 56 * PER_CONFIGURATION_POSITION_CAP);
    assert!(space
        .configurations
        .iter()
        .all(|c| c.position_cap == PER_CONFIGURATION_POSITION_CAP));
}

#[test]
fn test_space_from_json_definition() {
    let (ec, _) = setup();
    let definition: SpaceDefinition = serde_json::from_str(
        r#"{
            "family": "strategy",
            "axes": [
                {"name": "takeprofit_factor", "from": 0.5, "to": 3.0, "step": 0.5},
                {"name": "trailing", "values": [0.0, 0.5]}
            ],
            "per_configuration_cap": 100
        }"#,
    )
    .unwrap();

    let space = ec.generate_space(&definition).unwrap();
    assert_eq!(space.cardinality, 12);
    assert_eq!(space.capacity, 1_200);
    let first = &space.configurations[0];
    assert_eq!(first.id, "strategy-000000");
    assert_eq!(first.parameters["takeprofit_factor"], 0.5);
    assert_eq!(first.parameters["trailing"], 0.0);
    assert_eq!(space.configurations[1].parameters["trailing"], 0.5);
    assert_eq!(space.configurations[11].parameters["takeprofit_factor"], 3.0);

    let again = ec.generate_space(&definition).unwrap();
    assert_eq!(space.configurations, again.configurations);
}

#[test]
fn test_default_cap_applies() {
    let (ec, _) = setup();
    let definition: SpaceDefinition = serde_json::from_str(
        r#"{"family": "realtime", "axes": [{"name": "x", "values": [1.0]}]}"#,
    )
    .unwrap();
    let space = ec.generate_space(&definition).unwrap();
    assert_eq!(space.per_configuration_cap, PER_CONFIGURATION_POSITION_CAP);
    assert_eq!(space.cardinality, 1);
}

#[test]
fn test_bad_step_is_invalid_range() {
    let (ec, _) = setup();
    let definition: SpaceDefinition = serde_json::from_str(
        r#"{"family": "indication", "axes": [{"name": "range", "from": 3, "to": 30, "step": 0}]}"#,
    )
    .unwrap();
    let err = ec.generate_space(&definition).unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidRange(_)));
    assert_eq!(err.kind(), "invalid_range");
}
