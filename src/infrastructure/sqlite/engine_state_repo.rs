use crate::domain::entities::engine_state::{EngineRecord, EngineState};
use crate::domain::error::CoordinatorError;
use crate::domain::ports::engine_state_store::EngineStateStore;
use crate::infrastructure::sqlite::migrations::{format_ts, parse_ts};
use rusqlite::{params, Connection};
use std::sync::Mutex;

const SELECT_COLS: &str = "connection_id, status, error_message, started_at, stopped_at, prehistoric_loaded, workers, overall_health, last_health_check, updated_at";

pub struct SqliteEngineStateStore {
    conn: Mutex<Connection>,
}

impl SqliteEngineStateStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<EngineRecord, rusqlite::Error> {
        let connection_id: String = row.get(0)?;
        let started: Option<String> = row.get(3)?;
        let stopped: Option<String> = row.get(4)?;
        let workers_str: String = row.get(6)?;
        let health_str: Option<String> = row.get(7)?;
        let checked: Option<String> = row.get(8)?;
        let updated: String = row.get(9)?;

        let workers = serde_json::from_str(&workers_str).unwrap_or_else(|e| {
            tracing::warn!(%connection_id, error = %e, "Unreadable worker counters; starting from zero");
            Default::default()
        });

        Ok(EngineRecord {
            status: row.get(1)?,
            error_message: row.get(2)?,
            started_at: started.as_deref().and_then(parse_ts),
            stopped_at: stopped.as_deref().and_then(parse_ts),
            prehistoric_loaded: row.get::<_, i64>(5)? != 0,
            workers,
            overall_health: health_str.and_then(|s| s.parse().ok()),
            last_health_check: checked.as_deref().and_then(parse_ts),
            updated_at: parse_ts(&updated),
            connection_id,
        })
    }
}

impl EngineStateStore for SqliteEngineStateStore {
    fn load(&self, connection_id: &str) -> Result<Option<EngineState>, CoordinatorError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM engine_states WHERE connection_id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![connection_id], Self::row_to_record)?;
        match rows.next().transpose()? {
            Some(record) => Ok(Some(EngineState::from_record(record)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &EngineState) -> Result<(), CoordinatorError> {
        let record = state.to_record();
        let workers = serde_json::to_string(&record.workers)
            .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to encode counters: {e}")))?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| CoordinatorError::PersistenceFailure(e.to_string()))?;
        conn.execute(
            "INSERT INTO engine_states (connection_id, status, running, error_message, started_at, stopped_at, prehistoric_loaded, workers, overall_health, last_health_check, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(connection_id) DO UPDATE SET
                 status = excluded.status, running = excluded.running, error_message = excluded.error_message,
                 started_at = excluded.started_at, stopped_at = excluded.stopped_at,
                 prehistoric_loaded = excluded.prehistoric_loaded, workers = excluded.workers,
                 overall_health = excluded.overall_health, last_health_check = excluded.last_health_check,
                 updated_at = excluded.updated_at",
            params![
                record.connection_id,
                record.status,
                state.running() as i64,
                record.error_message,
                record.started_at.as_ref().map(format_ts),
                record.stopped_at.as_ref().map(format_ts),
                record.prehistoric_loaded as i64,
                workers,
                record.overall_health.map(|h| h.to_string()),
                record.last_health_check.as_ref().map(format_ts),
                format_ts(&state.updated_at),
            ],
        )
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("Failed to save engine state: {e}")))?;
        Ok(())
    }
}
