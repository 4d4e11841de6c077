use crate::domain::values::position_category::PositionCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Active => write!(f, "active"),
            PositionStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(PositionStatus::Active),
            "closed" => Ok(PositionStatus::Closed),
            _ => Err(format!("Unknown position status: {s}")),
        }
    }
}

/// A simulated trade record tracked for one configuration. Never a live order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoPosition {
    pub id: String,
    pub category: PositionCategory,
    pub connection_id: String,
    pub configuration_id: String,
    pub symbol: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub cost: f64,
    pub profit_factor: f64,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PseudoPosition {
    pub fn new(
        category: PositionCategory,
        connection_id: String,
        configuration_id: String,
        symbol: String,
        entry_price: f64,
        cost: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            connection_id,
            configuration_id,
            symbol,
            entry_price,
            current_price: entry_price,
            cost,
            profit_factor: 1.0,
            status: PositionStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Realtime tick. Profit factor is current over entry; scoring beyond that lives elsewhere.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        self.profit_factor = if self.entry_price > 0.0 {
            price / self.entry_price
        } else {
            1.0
        };
    }

    pub fn close(&mut self) {
        self.status = PositionStatus::Closed;
        self.closed_at = Some(Utc::now());
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}
