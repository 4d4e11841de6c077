use crate::domain::error::CoordinatorError;
use crate::domain::values::threshold::ThresholdSettings;

pub trait ThresholdRepository: Send + Sync {
    /// `None` when nothing has been configured yet.
    fn load(&self) -> Result<Option<ThresholdSettings>, CoordinatorError>;
    fn save(&self, settings: &ThresholdSettings) -> Result<(), CoordinatorError>;
}
