//! Configuration space expansion.
//!
//! Each axis expands to an ordered list of values; the space is their
//! Cartesian product, enumerated with the last axis varying fastest.
//! Output is fully determined by the input definition.

use crate::domain::error::CoordinatorError;
use crate::domain::values::config_space::{
    Configuration, ConfigurationSpace, ParameterAxis, ParameterRange, SpaceDefinition,
    MAX_CONFIGURATIONS, PER_CONFIGURATION_POSITION_CAP,
};
use crate::domain::values::worker_kind::WorkerKind;
use std::collections::{BTreeMap, HashSet};

const STEP_EPSILON: f64 = 1e-9;

fn round_value(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}

fn validate_range(r: &ParameterRange) -> Result<(), CoordinatorError> {
    if !(r.from.is_finite() && r.to.is_finite() && r.step.is_finite()) {
        return Err(CoordinatorError::InvalidRange(format!(
            "'{}': from/to/step must be finite numbers",
            r.name
        )));
    }
    if r.step <= 0.0 {
        return Err(CoordinatorError::InvalidRange(format!(
            "'{}': step must be positive, got {}",
            r.name, r.step
        )));
    }
    if r.to < r.from {
        return Err(CoordinatorError::InvalidRange(format!(
            "'{}': to ({}) is below from ({})",
            r.name, r.to, r.from
        )));
    }
    Ok(())
}

/// `⌈(to − from) / step⌉ + 1`.
pub fn range_cardinality(r: &ParameterRange) -> Result<u64, CoordinatorError> {
    validate_range(r)?;
    let steps = ((r.to - r.from) / r.step - STEP_EPSILON).ceil().max(0.0);
    if steps >= MAX_CONFIGURATIONS as f64 {
        return Err(CoordinatorError::InvalidRange(format!(
            "'{}': expands to more than {MAX_CONFIGURATIONS} values",
            r.name
        )));
    }
    Ok(steps as u64 + 1)
}

pub fn axis_cardinality(axis: &ParameterAxis) -> Result<u64, CoordinatorError> {
    match axis {
        ParameterAxis::Range(r) => range_cardinality(r),
        ParameterAxis::Values { name, values } => {
            if values.is_empty() {
                return Err(CoordinatorError::InvalidRange(format!(
                    "'{name}': variation list is empty"
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CoordinatorError::InvalidRange(format!(
                    "'{name}': variation values must be finite"
                )));
            }
            Ok(values.len() as u64)
        }
    }
}

fn axis_values(axis: &ParameterAxis) -> Result<Vec<f64>, CoordinatorError> {
    let n = axis_cardinality(axis)?;
    Ok(match axis {
        ParameterAxis::Range(r) => (0..n)
            .map(|i| round_value((r.from + i as f64 * r.step).min(r.to)))
            .collect(),
        ParameterAxis::Values { values, .. } => values.clone(),
    })
}

fn check_names(axes: &[ParameterAxis]) -> Result<(), CoordinatorError> {
    let mut seen = HashSet::new();
    for axis in axes {
        if axis.name().trim().is_empty() {
            return Err(CoordinatorError::InvalidRange("axis name is empty".into()));
        }
        if !seen.insert(axis.name()) {
            return Err(CoordinatorError::InvalidRange(format!(
                "axis '{}' appears more than once",
                axis.name()
            )));
        }
    }
    Ok(())
}

/// Cardinality of the whole space without materializing it.
pub fn space_cardinality(axes: &[ParameterAxis]) -> Result<u64, CoordinatorError> {
    check_names(axes)?;
    axes.iter().try_fold(1u64, |acc, axis| {
        let n = axis_cardinality(axis)?;
        acc.checked_mul(n)
            .filter(|total| *total <= MAX_CONFIGURATIONS)
            .ok_or_else(|| {
                CoordinatorError::InvalidRange(format!(
                    "configuration space exceeds {MAX_CONFIGURATIONS} configurations"
                ))
            })
    })
}

pub fn generate(definition: &SpaceDefinition) -> Result<ConfigurationSpace, CoordinatorError> {
    if definition.per_configuration_cap == 0 {
        return Err(CoordinatorError::InvalidRange(
            "per-configuration cap must be positive".into(),
        ));
    }
    let cardinality = space_cardinality(&definition.axes)?;
    let expanded: Vec<(String, Vec<f64>)> = definition
        .axes
        .iter()
        .map(|axis| Ok((axis.name().to_string(), axis_values(axis)?)))
        .collect::<Result<_, CoordinatorError>>()?;

    let mut configurations = Vec::with_capacity(cardinality as usize);
    let mut cursor = vec![0usize; expanded.len()];
    for index in 0..cardinality {
        let parameters: BTreeMap<String, f64> = expanded
            .iter()
            .zip(&cursor)
            .map(|((name, values), i)| (name.clone(), values[*i]))
            .collect();
        configurations.push(Configuration {
            id: format!("{}-{:06}", definition.family, index),
            parameters,
            position_cap: definition.per_configuration_cap,
        });

        // Odometer increment, last axis fastest.
        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < expanded[pos].1.len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    Ok(ConfigurationSpace {
        family: definition.family,
        cardinality,
        per_configuration_cap: definition.per_configuration_cap,
        capacity: cardinality.saturating_mul(definition.per_configuration_cap),
        configurations,
    })
}

/// Stock parameter spaces for each worker family.
pub fn default_definition(family: WorkerKind) -> SpaceDefinition {
    let axes = match family {
        WorkerKind::Indication => vec![
            ParameterAxis::range("range", 3.0, 30.0, 1.0),
            ParameterAxis::values("direction", vec![-1.0, 1.0]),
        ],
        WorkerKind::Strategy => vec![
            ParameterAxis::range("takeprofit_factor", 0.5, 3.0, 0.5),
            ParameterAxis::range("stoploss_ratio", 0.2, 1.0, 0.2),
        ],
        WorkerKind::Realtime => vec![ParameterAxis::values("trailing", vec![0.0, 0.3, 0.5, 0.8])],
    };
    SpaceDefinition {
        family,
        axes,
        per_configuration_cap: PER_CONFIGURATION_POSITION_CAP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(axes: Vec<ParameterAxis>) -> SpaceDefinition {
        SpaceDefinition {
            family: WorkerKind::Strategy,
            axes,
            per_configuration_cap: PER_CONFIGURATION_POSITION_CAP,
        }
    }

    #[test]
    fn test_integer_range_cardinality() {
        let axis = ParameterAxis::range("r", 3.0, 30.0, 1.0);
        assert_eq!(axis_cardinality(&axis).unwrap(), 28);
    }

    #[test]
    fn test_fractional_range_cardinality() {
        let axis = ParameterAxis::range("tp", 0.5, 3.0, 0.5);
        assert_eq!(axis_cardinality(&axis).unwrap(), 6);
        assert_eq!(
            axis_values(&axis).unwrap(),
            vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0]
        );
    }

    #[test]
    fn test_degenerate_range_has_one_value() {
        let axis = ParameterAxis::range("x", 2.0, 2.0, 0.5);
        assert_eq!(axis_cardinality(&axis).unwrap(), 1);
    }

    #[test]
    fn test_uneven_range_clamps_last_value() {
        let axis = ParameterAxis::range("x", 0.0, 1.0, 0.3);
        let values = axis_values(&axis).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(values, vec![0.0, 0.3, 0.6, 0.9, 1.0]);
    }

    #[test]
    fn test_zero_step_is_invalid() {
        let err = axis_cardinality(&ParameterAxis::range("x", 0.0, 1.0, 0.0)).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidRange(_)));
    }

    #[test]
    fn test_inverted_range_is_invalid() {
        let err = axis_cardinality(&ParameterAxis::range("x", 5.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidRange(_)));
    }

    #[test]
    fn test_duplicate_axis_names_rejected() {
        let d = def(vec![
            ParameterAxis::range("a", 0.0, 1.0, 1.0),
            ParameterAxis::values("a", vec![1.0]),
        ]);
        assert!(generate(&d).is_err());
    }

    #[test]
    fn test_cartesian_order_and_capacity() {
        let d = def(vec![
            ParameterAxis::range("a", 1.0, 2.0, 1.0),
            ParameterAxis::values("b", vec![10.0, 20.0, 30.0]),
        ]);
        let space = generate(&d).unwrap();
        assert_eq!(space.cardinality, 6);
        assert_eq!(space.capacity, 6 * PER_CONFIGURATION_POSITION_CAP);
        assert_eq!(space.configurations[0].parameters["a"], 1.0);
        assert_eq!(space.configurations[0].parameters["b"], 10.0);
        assert_eq!(space.configurations[1].parameters["b"], 20.0);
        assert_eq!(space.configurations[3].parameters["a"], 2.0);
        assert_eq!(space.configurations[5].id, "strategy-000005");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let d = default_definition(WorkerKind::Strategy);
        let a = generate(&d).unwrap();
        let b = generate(&d).unwrap();
        assert_eq!(a.configurations, b.configurations);
    }

    #[test]
    fn test_oversized_space_rejected() {
        let d = def(vec![
            ParameterAxis::range("a", 0.0, 9999.0, 1.0),
            ParameterAxis::range("b", 0.0, 9999.0, 1.0),
        ]);
        assert!(matches!(space_cardinality(&d.axes), Err(CoordinatorError::InvalidRange(_))));
    }
}
