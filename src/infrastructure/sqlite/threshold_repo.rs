use crate::domain::error::CoordinatorError;
use crate::domain::ports::threshold_repository::ThresholdRepository;
use crate::domain::values::position_category::PositionCategory;
use crate::domain::values::threshold::ThresholdSettings;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct SqliteThresholdRepo {
    conn: Mutex<Connection>,
}

impl SqliteThresholdRepo {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl ThresholdRepository for SqliteThresholdRepo {
    fn load(&self) -> Result<Option<ThresholdSettings>, CoordinatorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        let mut stmt = conn.prepare("SELECT category, base_limit, buffer_percent FROM threshold_config")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut limits = BTreeMap::new();
        let mut buffer_percent = 0;
        for (category, limit, buffer) in rows {
            match category.parse::<PositionCategory>() {
                Ok(c) => {
                    limits.insert(c, limit.max(0) as u64);
                    buffer_percent = buffer.max(0) as u32;
                }
                Err(e) => tracing::warn!(error = %e, "Ignoring threshold row"),
            }
        }
        Ok(Some(ThresholdSettings {
            buffer_percent,
            limits,
        }))
    }

    fn save(&self, settings: &ThresholdSettings) -> Result<(), CoordinatorError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM threshold_config", [])?;
        for config in settings.configs() {
            tx.execute(
                "INSERT INTO threshold_config (category, base_limit, buffer_percent) VALUES (?1, ?2, ?3)",
                params![
                    config.category.to_string(),
                    config.limit as i64,
                    config.buffer_percent as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
