use crate::domain::values::worker_kind::WorkerKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default record cap owned by each configuration. Caps are per configuration, never shared.
pub const PER_CONFIGURATION_POSITION_CAP: u64 = 250;
/// Hard ceiling on how many configurations a single space may expand to.
pub const MAX_CONFIGURATIONS: u64 = 1_000_000;

/// `{from, to, step}` numeric range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub name: String,
    pub from: f64,
    pub to: f64,
    pub step: f64,
}

/// One dimension of a configuration space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterAxis {
    Range(ParameterRange),
    Values { name: String, values: Vec<f64> },
}

impl ParameterAxis {
    pub fn range(name: &str, from: f64, to: f64, step: f64) -> Self {
        ParameterAxis::Range(ParameterRange {
            name: name.to_string(),
            from,
            to,
            step,
        })
    }

    pub fn values(name: &str, values: Vec<f64>) -> Self {
        ParameterAxis::Values {
            name: name.to_string(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParameterAxis::Range(r) => &r.name,
            ParameterAxis::Values { name, .. } => name,
        }
    }
}

/// Input to the generator for one worker family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceDefinition {
    pub family: WorkerKind,
    pub axes: Vec<ParameterAxis>,
    #[serde(default = "default_cap")]
    pub per_configuration_cap: u64,
}

fn default_cap() -> u64 {
    PER_CONFIGURATION_POSITION_CAP
}

/// One concrete parameter tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub id: String,
    pub parameters: BTreeMap<String, f64>,
    pub position_cap: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationSpace {
    pub family: WorkerKind,
    pub cardinality: u64,
    pub per_configuration_cap: u64,
    /// `cardinality × per_configuration_cap`.
    pub capacity: u64,
    pub configurations: Vec<Configuration>,
}
