//! Runtime configuration: defaults, overlaid by `ENGINE_*` environment variables.

use crate::domain::entities::engine_state::WorkerSet;
use crate::domain::values::config_space::PER_CONFIGURATION_POSITION_CAP;
use crate::domain::values::schedule::WorkerSchedule;
use crate::domain::values::threshold::ThresholdSettings;
use crate::domain::values::worker_kind::WorkerKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_DB_PATH: &str = "./engine-coordinator.db";
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub db_path: String,
    pub schedules: WorkerSet<WorkerSchedule>,
    pub monitor_interval_secs: u64,
    pub thresholds: ThresholdSettings,
    /// Most active pseudo positions one configuration may hold.
    pub position_cap: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            schedules: WorkerSet::from_fn(WorkerSchedule::default_for),
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            thresholds: ThresholdSettings::default(),
            position_cap: PER_CONFIGURATION_POSITION_CAP,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` onto the defaults. Unparseable values are logged and skipped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("ENGINE_DB").filter(|p| !p.trim().is_empty()) {
            config.db_path = path;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "ENGINE_MONITOR_INTERVAL_SECS").filter(|s| *s > 0) {
            config.monitor_interval_secs = secs;
        }
        if let Some(buffer) = parsed::<u32>(&lookup, "ENGINE_THRESHOLD_BUFFER_PERCENT") {
            let mut thresholds = config.thresholds.clone();
            thresholds.buffer_percent = buffer;
            match thresholds.validate() {
                Ok(()) => config.thresholds = thresholds,
                Err(e) => tracing::warn!(key = "ENGINE_THRESHOLD_BUFFER_PERCENT", error = %e, "Ignoring invalid configuration value"),
            }
        }
        if let Some(cap) = parsed::<u64>(&lookup, "ENGINE_POSITION_CAP").filter(|c| *c > 0) {
            config.position_cap = cap;
        }

        for kind in WorkerKind::ALL {
            let prefix = format!("ENGINE_{}", kind.to_string().to_uppercase());
            let schedule = config.schedules.get_mut(kind);
            if let Some(ms) = parsed::<u64>(&lookup, &format!("{prefix}_INTERVAL_MS")).filter(|ms| *ms > 0) {
                schedule.interval_ms = ms;
            }
            if let Some(ms) = parsed::<u64>(&lookup, &format!("{prefix}_TIMEOUT_MS")).filter(|ms| *ms > 0) {
                schedule.timeout_ms = ms;
            }
        }

        config
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring malformed configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = CoordinatorConfig::from_lookup(|_| None);
        assert_eq!(config, CoordinatorConfig::default());
        assert_eq!(config.schedules.realtime.interval_ms, 500);
        assert_eq!(config.thresholds.buffer_percent, 20);
    }

    #[test]
    fn test_env_overrides() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            ("ENGINE_DB", "/tmp/x.db"),
            ("ENGINE_STRATEGY_INTERVAL_MS", "7500"),
            ("ENGINE_REALTIME_TIMEOUT_MS", "900"),
            ("ENGINE_THRESHOLD_BUFFER_PERCENT", "35"),
            ("ENGINE_POSITION_CAP", "40"),
        ]));
        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.schedules.strategy.interval_ms, 7500);
        assert_eq!(config.schedules.realtime.timeout_ms, 900);
        assert_eq!(config.schedules.indication, WorkerSchedule::default_for(WorkerKind::Indication));
        assert_eq!(config.thresholds.buffer_percent, 35);
        assert_eq!(config.position_cap, 40);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let config = CoordinatorConfig::from_lookup(lookup(&[
            ("ENGINE_MONITOR_INTERVAL_SECS", "soon"),
            ("ENGINE_INDICATION_INTERVAL_MS", "0"),
            ("ENGINE_THRESHOLD_BUFFER_PERCENT", "900"),
            ("ENGINE_POSITION_CAP", "0"),
        ]));
        assert_eq!(config.monitor_interval_secs, DEFAULT_MONITOR_INTERVAL_SECS);
        assert_eq!(config.schedules.indication.interval_ms, 1_000);
        assert_eq!(config.thresholds.buffer_percent, 20);
        assert_eq!(config.position_cap, PER_CONFIGURATION_POSITION_CAP);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"db_path": ":memory:", "monitor_interval_secs": 5}"#).unwrap();
        assert_eq!(config.db_path, ":memory:");
        assert_eq!(config.monitor_interval_secs, 5);
        assert_eq!(config.thresholds, ThresholdSettings::default());
    }
}
