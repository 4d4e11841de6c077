use crate::domain::values::batch::BatchReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: cannot {command} from {from}")]
    InvalidTransition { from: String, command: String },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Partial batch failure: {} of {} connections failed", .0.failed, .0.attempted)]
    PartialBatchFailure(BatchReport),

    #[error("Batch failed: all {} attempted connections failed", .0.attempted)]
    BatchFailed(BatchReport),
}

impl CoordinatorError {
    /// Stable tag for the control surface. Callers branch on this, never on the message.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::InvalidTransition { .. } => "invalid_transition",
            CoordinatorError::InvalidRange(_) => "invalid_range",
            CoordinatorError::InvalidInput(_) => "invalid_input",
            CoordinatorError::PersistenceFailure(_) => "persistence_failure",
            CoordinatorError::PartialBatchFailure(_) => "partial_batch_failure",
            CoordinatorError::BatchFailed(_) => "batch_failed",
        }
    }

    pub fn batch_report(&self) -> Option<&BatchReport> {
        match self {
            CoordinatorError::PartialBatchFailure(r) | CoordinatorError::BatchFailed(r) => Some(r),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoordinatorError {
    fn from(e: rusqlite::Error) -> Self {
        CoordinatorError::PersistenceFailure(e.to_string())
    }
}
