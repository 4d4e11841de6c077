use crate::domain::entities::connection::Connection;
use crate::domain::error::CoordinatorError;

/// Read-only view of configured exchange connections.
pub trait ConnectionDirectory: Send + Sync {
    fn list(&self) -> Result<Vec<Connection>, CoordinatorError>;
    fn get(&self, id: &str) -> Result<Option<Connection>, CoordinatorError>;
}
