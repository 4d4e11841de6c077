use crate::domain::entities::pseudo_position::{PositionStatus, PseudoPosition};
use crate::domain::error::CoordinatorError;
use crate::domain::ports::position_store::{PositionFilter, PositionStore};
use crate::domain::values::position_category::PositionCategory;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// Fields a worker (or operator) supplies to open a pseudo position.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPosition {
    pub category: PositionCategory,
    pub connection_id: String,
    pub configuration_id: String,
    pub symbol: String,
    pub entry_price: f64,
    #[serde(default)]
    pub cost: f64,
}

pub struct PositionUseCase {
    store: Arc<dyn PositionStore>,
    cap: u64,
    // Held across the cap check and the insert.
    recording: Mutex<()>,
}

impl PositionUseCase {
    /// `cap` is the per-configuration limit on active records.
    pub fn new(store: Arc<dyn PositionStore>, cap: u64) -> Self {
        Self {
            store,
            cap,
            recording: Mutex::new(()),
        }
    }

    /// Rejected with `InvalidInput` once the configuration already holds `cap` active records.
    pub fn record(&self, input: NewPosition) -> Result<PseudoPosition, CoordinatorError> {
        check_price("entry_price", input.entry_price)?;
        let _guard = self.recording.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let active = self
            .store
            .count_by_configuration(&input.configuration_id, PositionStatus::Active)?;
        if active >= self.cap {
            return Err(CoordinatorError::InvalidInput(format!(
                "configuration {} already holds {active} active pseudo positions (cap {})",
                input.configuration_id, self.cap
            )));
        }
        let position = PseudoPosition::new(
            input.category,
            input.connection_id,
            input.configuration_id,
            input.symbol,
            input.entry_price,
            input.cost,
        );
        self.store.insert(&position)?;
        Ok(position)
    }

    fn existing(&self, id: &str) -> Result<PseudoPosition, CoordinatorError> {
        self.store
            .get(id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("Pseudo position not found: {id}")))
    }

    /// Only an active position takes a price. A close racing this tick wins.
    pub fn update_price(&self, id: &str, price: f64) -> Result<PseudoPosition, CoordinatorError> {
        check_price("price", price)?;
        let mut position = self.existing(id)?;
        position.update_price(price);
        if !position.is_active()
            || !self
                .store
                .update_price(id, position.current_price, position.profit_factor)?
        {
            return Err(CoordinatorError::InvalidInput(format!(
                "pseudo position {id} is closed"
            )));
        }
        Ok(position)
    }

    /// Closing an already-closed position is a no-op.
    pub fn close(&self, id: &str) -> Result<PseudoPosition, CoordinatorError> {
        let mut position = self.existing(id)?;
        if position.is_active() {
            position.close();
            if let Some(closed_at) = position.closed_at {
                if !self.store.close(id, closed_at)? {
                    // Closed concurrently; report what was stored.
                    return self.existing(id);
                }
            }
        }
        Ok(position)
    }

    pub fn list(&self, filter: &PositionFilter) -> Result<Vec<PseudoPosition>, CoordinatorError> {
        self.store.list(filter)
    }
}

fn check_price(field: &str, price: f64) -> Result<(), CoordinatorError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidInput(format!(
            "{field} must be positive, got {price}"
        )))
    }
}
