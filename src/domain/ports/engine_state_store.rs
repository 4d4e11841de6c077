use crate::domain::entities::engine_state::EngineState;
use crate::domain::error::CoordinatorError;

/// Point reads/writes of engine state keyed by connection id.
pub trait EngineStateStore: Send + Sync {
    fn load(&self, connection_id: &str) -> Result<Option<EngineState>, CoordinatorError>;
    fn save(&self, state: &EngineState) -> Result<(), CoordinatorError>;
}
