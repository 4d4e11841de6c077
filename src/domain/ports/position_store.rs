use crate::domain::entities::pseudo_position::{PositionStatus, PseudoPosition};
use crate::domain::error::CoordinatorError;
use crate::domain::values::position_category::PositionCategory;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    pub category: Option<PositionCategory>,
    pub connection_id: Option<String>,
    pub status: Option<PositionStatus>,
    pub limit: Option<usize>,
}

/// Count/delete access to pseudo-position tables, keyed by category.
pub trait PositionStore: Send + Sync {
    fn insert(&self, position: &PseudoPosition) -> Result<(), CoordinatorError>;
    /// Price tick on an active record. `Ok(false)` when no active record with `id` exists;
    /// status and `closed_at` are never written here.
    fn update_price(&self, id: &str, current_price: f64, profit_factor: f64) -> Result<bool, CoordinatorError>;
    /// Active to closed. `Ok(false)` when no active record with `id` exists.
    fn close(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool, CoordinatorError>;
    fn get(&self, id: &str) -> Result<Option<PseudoPosition>, CoordinatorError>;
    fn list(&self, filter: &PositionFilter) -> Result<Vec<PseudoPosition>, CoordinatorError>;
    fn count(&self, category: PositionCategory) -> Result<u64, CoordinatorError>;
    fn count_by_status(
        &self,
        category: PositionCategory,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError>;
    fn count_by_configuration(
        &self,
        configuration_id: &str,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError>;
    /// Delete up to `max` closed records of `category`, oldest first. Active records are never touched.
    fn delete_oldest_closed(&self, category: PositionCategory, max: u64) -> Result<u64, CoordinatorError>;
    fn delete_for_connection(&self, connection_id: &str) -> Result<u64, CoordinatorError>;
}
