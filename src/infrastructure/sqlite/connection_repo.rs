use crate::domain::entities::connection::Connection as ExchangeConnection;
use crate::domain::error::CoordinatorError;
use crate::domain::ports::connection_directory::ConnectionDirectory;
use crate::infrastructure::sqlite::migrations::format_ts;
use rusqlite::{params, Connection};
use std::sync::Mutex;

const SELECT_COLS: &str = "id, name, enabled, active, live_trading";

pub struct SqliteConnectionDirectory {
    conn: Mutex<Connection>,
}

impl SqliteConnectionDirectory {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn row_to_connection(row: &rusqlite::Row) -> Result<ExchangeConnection, rusqlite::Error> {
        Ok(ExchangeConnection {
            id: row.get(0)?,
            name: row.get(1)?,
            enabled: row.get::<_, i64>(2)? != 0,
            active: row.get::<_, i64>(3)? != 0,
            live_trading: row.get::<_, i64>(4)? != 0,
        })
    }

    /// Configuration-side write; the coordinator itself only reads.
    pub fn upsert(&self, connection: &ExchangeConnection) -> Result<(), CoordinatorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        conn.execute(
            "INSERT INTO connections (id, name, enabled, active, live_trading, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, enabled = excluded.enabled,
                 active = excluded.active, live_trading = excluded.live_trading",
            params![
                connection.id,
                connection.name,
                connection.enabled as i64,
                connection.active as i64,
                connection.live_trading as i64,
                format_ts(&chrono::Utc::now()),
            ],
        )
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to save connection: {e}")))?;
        Ok(())
    }
}

impl ConnectionDirectory for SqliteConnectionDirectory {
    fn list(&self) -> Result<Vec<ExchangeConnection>, CoordinatorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLS} FROM connections ORDER BY id"))?;
        let rows = stmt
            .query_map([], Self::row_to_connection)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get(&self, id: &str) -> Result<Option<ExchangeConnection>, CoordinatorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLS} FROM connections WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], Self::row_to_connection)?;
        Ok(rows.next().transpose()?)
    }
}
