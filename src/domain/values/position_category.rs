use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pseudo-position table categories, each with its own capacity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionCategory {
    Base,
    Main,
    Real,
    Preset,
    Optimal,
    Auto,
}

impl PositionCategory {
    pub const ALL: [PositionCategory; 6] = [
        PositionCategory::Base,
        PositionCategory::Main,
        PositionCategory::Real,
        PositionCategory::Preset,
        PositionCategory::Optimal,
        PositionCategory::Auto,
    ];
}

impl fmt::Display for PositionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionCategory::Base => write!(f, "base"),
            PositionCategory::Main => write!(f, "main"),
            PositionCategory::Real => write!(f, "real"),
            PositionCategory::Preset => write!(f, "preset"),
            PositionCategory::Optimal => write!(f, "optimal"),
            PositionCategory::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for PositionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base" => Ok(PositionCategory::Base),
            "main" => Ok(PositionCategory::Main),
            "real" => Ok(PositionCategory::Real),
            "preset" => Ok(PositionCategory::Preset),
            "optimal" => Ok(PositionCategory::Optimal),
            "auto" => Ok(PositionCategory::Auto),
            _ => Err(format!("Unknown position category: {s}")),
        }
    }
}
