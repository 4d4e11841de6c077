use crate::domain::error::CoordinatorError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<(), CoordinatorError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS connections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1,
            live_trading INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS engine_states (
            connection_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            running INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            started_at TEXT,
            stopped_at TEXT,
            prehistoric_loaded INTEGER NOT NULL DEFAULT 0,
            workers TEXT NOT NULL DEFAULT '{}',
            overall_health TEXT,
            last_health_check TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pseudo_positions (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            connection_id TEXT NOT NULL,
            configuration_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            entry_price REAL NOT NULL,
            current_price REAL NOT NULL,
            cost REAL NOT NULL DEFAULT 0,
            profit_factor REAL NOT NULL DEFAULT 1,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS threshold_config (
            category TEXT PRIMARY KEY,
            base_limit INTEGER NOT NULL,
            buffer_percent INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_positions_category_status ON pseudo_positions(category, status, created_at);
        CREATE INDEX IF NOT EXISTS idx_positions_connection ON pseudo_positions(connection_id);
        ",
    )
    .map_err(|e| CoordinatorError::PersistenceFailure(format!("Migration failed: {e}")))
}

/// Open a database handle with WAL enabled and the schema in place.
pub fn open(db_path: &str) -> Result<Connection, CoordinatorError> {
    let conn = Connection::open(db_path)
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("DB error: {e}")))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("WAL error: {e}")))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| CoordinatorError::PersistenceFailure(format!("DB error: {e}")))?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Fixed-width timestamps so text ordering matches time ordering.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
