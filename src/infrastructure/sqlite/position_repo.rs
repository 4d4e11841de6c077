use crate::domain::entities::pseudo_position::{PositionStatus, PseudoPosition};
use crate::domain::error::CoordinatorError;
use crate::domain::ports::position_store::{PositionFilter, PositionStore};
use crate::domain::values::position_category::PositionCategory;
use crate::infrastructure::sqlite::migrations::{format_ts, parse_ts};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;

const SELECT_COLS: &str = "id, category, connection_id, configuration_id, symbol, entry_price, current_price, cost, profit_factor, status, created_at, closed_at";

pub struct SqlitePositionStore {
    conn: Mutex<Connection>,
}

impl SqlitePositionStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn row_to_position(row: &rusqlite::Row) -> Result<PseudoPosition, rusqlite::Error> {
        let category_str: String = row.get(1)?;
        let status_str: String = row.get(9)?;
        let created_str: String = row.get(10)?;
        let closed_str: Option<String> = row.get(11)?;

        let category = category_str.parse::<PositionCategory>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?;
        let status = status_str.parse::<PositionStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(PseudoPosition {
            id: row.get(0)?,
            category,
            connection_id: row.get(2)?,
            configuration_id: row.get(3)?,
            symbol: row.get(4)?,
            entry_price: row.get(5)?,
            current_price: row.get(6)?,
            cost: row.get(7)?,
            profit_factor: row.get(8)?,
            status,
            created_at: parse_ts(&created_str).unwrap_or_else(Utc::now),
            closed_at: closed_str.as_deref().and_then(parse_ts),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoordinatorError> {
        self.conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))
    }
}

impl PositionStore for SqlitePositionStore {
    fn insert(&self, position: &PseudoPosition) -> Result<(), CoordinatorError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO pseudo_positions ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
            params![
                position.id,
                position.category.to_string(),
                position.connection_id,
                position.configuration_id,
                position.symbol,
                position.entry_price,
                position.current_price,
                position.cost,
                position.profit_factor,
                position.status.to_string(),
                format_ts(&position.created_at),
                position.closed_at.as_ref().map(format_ts),
            ],
        )
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to add position: {e}")))?;
        Ok(())
    }

    fn update_price(&self, id: &str, current_price: f64, profit_factor: f64) -> Result<bool, CoordinatorError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pseudo_positions SET current_price = ?1, profit_factor = ?2 WHERE id = ?3 AND status = 'active'",
                params![current_price, profit_factor, id],
            )
            .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to update position price: {e}")))?;
        Ok(rows > 0)
    }

    fn close(&self, id: &str, closed_at: DateTime<Utc>) -> Result<bool, CoordinatorError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pseudo_positions SET status = 'closed', closed_at = ?1 WHERE id = ?2 AND status = 'active'",
                params![format_ts(&closed_at), id],
            )
            .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to close position: {e}")))?;
        Ok(rows > 0)
    }

    fn get(&self, id: &str) -> Result<Option<PseudoPosition>, CoordinatorError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLS} FROM pseudo_positions WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], Self::row_to_position)?;
        Ok(rows.next().transpose()?)
    }

    fn list(&self, filter: &PositionFilter) -> Result<Vec<PseudoPosition>, CoordinatorError> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {SELECT_COLS} FROM pseudo_positions WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(category) = filter.category {
            sql.push_str(&format!(" AND category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(category.to_string()));
        }
        if let Some(connection_id) = &filter.connection_id {
            sql.push_str(&format!(" AND connection_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(connection_id.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_values.len() + 1));
            param_values.push(Box::new(limit as i64));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let positions = stmt
            .query_map(params_refs.as_slice(), Self::row_to_position)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions)
    }

    fn count(&self, category: PositionCategory) -> Result<u64, CoordinatorError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pseudo_positions WHERE category = ?1",
            params![category.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn count_by_status(
        &self,
        category: PositionCategory,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pseudo_positions WHERE category = ?1 AND status = ?2",
            params![category.to_string(), status.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn count_by_configuration(
        &self,
        configuration_id: &str,
        status: PositionStatus,
    ) -> Result<u64, CoordinatorError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pseudo_positions WHERE configuration_id = ?1 AND status = ?2",
            params![configuration_id, status.to_string()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn delete_oldest_closed(&self, category: PositionCategory, max: u64) -> Result<u64, CoordinatorError> {
        if max == 0 {
            return Ok(0);
        }
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM pseudo_positions WHERE id IN (
                     SELECT id FROM pseudo_positions
                     WHERE category = ?1 AND status = 'closed'
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?2
                 )",
                params![category.to_string(), max.min(i64::MAX as u64) as i64],
            )
            .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to prune {category}: {e}")))?;
        Ok(deleted as u64)
    }

    fn delete_for_connection(&self, connection_id: &str) -> Result<u64, CoordinatorError> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM pseudo_positions WHERE connection_id = ?1",
                params![connection_id],
            )
            .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to delete positions: {e}")))?;
        Ok(deleted as u64)
    }
}
