use crate::domain::error::CoordinatorError;
use crate::domain::values::position_category::PositionCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_CATEGORY_LIMIT: u64 = 250;
pub const DEFAULT_BUFFER_PERCENT: u32 = 20;
/// Upper bound on the buffer; beyond this the hysteresis band stops meaning anything.
pub const MAX_BUFFER_PERCENT: u32 = 500;

/// Utilization below this is optimal.
pub const WARNING_UTILIZATION_PERCENT: f64 = 80.0;
/// Utilization above this is critical.
pub const CRITICAL_UTILIZATION_PERCENT: f64 = 100.0;

/// Per-category base limits plus one global buffer percentage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSettings {
    pub buffer_percent: u32,
    pub limits: BTreeMap<PositionCategory, u64>,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            buffer_percent: DEFAULT_BUFFER_PERCENT,
            limits: PositionCategory::ALL
                .iter()
                .map(|c| (*c, DEFAULT_CATEGORY_LIMIT))
                .collect(),
        }
    }
}

impl ThresholdSettings {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.buffer_percent > MAX_BUFFER_PERCENT {
            return Err(CoordinatorError::InvalidInput(format!(
                "buffer_percent must be at most {MAX_BUFFER_PERCENT}, got {}",
                self.buffer_percent
            )));
        }
        if let Some((category, _)) = self.limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(CoordinatorError::InvalidInput(format!(
                "limit for category '{category}' must be positive"
            )));
        }
        Ok(())
    }

    pub fn config_for(&self, category: PositionCategory) -> ThresholdConfig {
        ThresholdConfig {
            category,
            limit: self.limits.get(&category).copied().unwrap_or(DEFAULT_CATEGORY_LIMIT),
            buffer_percent: self.buffer_percent,
        }
    }

    pub fn configs(&self) -> Vec<ThresholdConfig> {
        PositionCategory::ALL.iter().map(|c| self.config_for(*c)).collect()
    }
}

/// Effective threshold for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdConfig {
    pub category: PositionCategory,
    pub limit: u64,
    pub buffer_percent: u32,
}

impl ThresholdConfig {
    /// `limit × (1 + buffer/100)`, in integer arithmetic so 250 @ 20% is exactly 300.
    pub fn storage_limit(&self) -> u64 {
        self.limit
            .saturating_mul(100 + u64::from(self.buffer_percent))
            / 100
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStatus {
    Optimal,
    Warning,
    Critical,
    Unknown,
}

impl StorageStatus {
    pub fn classify(utilization_percent: f64) -> StorageStatus {
        if utilization_percent > CRITICAL_UTILIZATION_PERCENT {
            StorageStatus::Critical
        } else if utilization_percent >= WARNING_UTILIZATION_PERCENT {
            StorageStatus::Warning
        } else {
            StorageStatus::Optimal
        }
    }
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageStatus::Optimal => write!(f, "optimal"),
            StorageStatus::Warning => write!(f, "warning"),
            StorageStatus::Critical => write!(f, "critical"),
            StorageStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of one category's table at a monitoring tick.
#[derive(Debug, Clone, Serialize)]
pub struct PositionTableStats {
    pub category: PositionCategory,
    /// `None` when the table could not be read.
    pub count: Option<u64>,
    pub limit: u64,
    pub storage_limit: u64,
    pub utilization_percent: Option<f64>,
    pub status: StorageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PositionTableStats {
    pub fn measured(config: &ThresholdConfig, count: u64) -> Self {
        let storage_limit = config.storage_limit();
        let utilization = if storage_limit == 0 {
            0.0
        } else {
            count as f64 / storage_limit as f64 * 100.0
        };
        Self {
            category: config.category,
            count: Some(count),
            limit: config.limit,
            storage_limit,
            utilization_percent: Some(utilization),
            status: StorageStatus::classify(utilization),
            error: None,
        }
    }

    pub fn unreachable(config: &ThresholdConfig, error: String) -> Self {
        Self {
            category: config.category,
            count: None,
            limit: config.limit,
            storage_limit: config.storage_limit(),
            utilization_percent: None,
            status: StorageStatus::Unknown,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(limit: u64, buffer_percent: u32) -> ThresholdConfig {
        ThresholdConfig {
            category: PositionCategory::Base,
            limit,
            buffer_percent,
        }
    }

    #[test]
    fn test_storage_limit_is_exact() {
        assert_eq!(cfg(250, 20).storage_limit(), 300);
        assert_eq!(cfg(250, 0).storage_limit(), 250);
        assert_eq!(cfg(1000, 15).storage_limit(), 1150);
    }

    #[test]
    fn test_bands() {
        let c = cfg(250, 20);
        assert_eq!(PositionTableStats::measured(&c, 0).status, StorageStatus::Optimal);
        assert_eq!(PositionTableStats::measured(&c, 239).status, StorageStatus::Optimal);
        assert_eq!(PositionTableStats::measured(&c, 240).status, StorageStatus::Warning);
        assert_eq!(PositionTableStats::measured(&c, 300).status, StorageStatus::Warning);
        assert_eq!(PositionTableStats::measured(&c, 301).status, StorageStatus::Critical);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut settings = ThresholdSettings::default();
        settings.limits.insert(PositionCategory::Main, 0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_category_falls_back_to_default_limit() {
        let settings = ThresholdSettings {
            buffer_percent: 10,
            limits: BTreeMap::new(),
        };
        assert_eq!(settings.config_for(PositionCategory::Auto).limit, DEFAULT_CATEGORY_LIMIT);
    }
}
