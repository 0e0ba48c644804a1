//! Table definitions
//!
//! The layout version lives in SQLite's `user_version` header field. A fresh
//! file (version 0) gets every table in one transaction; a file written by a
//! newer build is refused rather than read with the wrong layout.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::TerritoryError;

/// Layout written by this build
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), TerritoryError> {
    match user_version(conn)? {
        0 => {
            info!("Creating territory schema v{}", SCHEMA_VERSION);
            create_tables(conn)
        }
        SCHEMA_VERSION => {
            debug!("Territory schema v{} present", SCHEMA_VERSION);
            Ok(())
        }
        found => Err(TerritoryError::Store(format!(
            "database has schema v{}, this build only understands v{}",
            found, SCHEMA_VERSION
        ))),
    }
}

fn user_version(conn: &Connection) -> Result<i32, TerritoryError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| TerritoryError::Store(format!("Failed to read user_version: {}", e)))
}

fn create_tables(conn: &Connection) -> Result<(), TerritoryError> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| TerritoryError::Store(format!("Failed to begin schema transaction: {}", e)))?;

    for (name, ddl) in [
        ("user", USERS_SCHEMA),
        ("territory", TERRITORY_SCHEMA),
        ("index", INDEXES_SCHEMA),
    ] {
        tx.execute_batch(ddl)
            .map_err(|e| TerritoryError::Store(format!("Failed to create {} tables: {}", name, e)))?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| TerritoryError::Store(format!("Failed to set user_version: {}", e)))?;
    tx.commit()
        .map_err(|e| TerritoryError::Store(format!("Failed to commit schema: {}", e)))
}

const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    -- Subject from the identity provider
    external_id TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL REFERENCES users(id),
    duration_seconds REAL NOT NULL,
    distance_meters REAL NOT NULL,
    h3_indexes_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const TERRITORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hexes (
    h3_index INTEGER PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS cell_influences (
    id TEXT PRIMARY KEY NOT NULL,
    h3_index INTEGER NOT NULL REFERENCES hexes(h3_index),
    user_id TEXT NOT NULL REFERENCES users(id),
    score REAL NOT NULL CHECK (score >= 0),
    last_updated TEXT NOT NULL,
    UNIQUE (h3_index, user_id)
);

-- Top-5 projection; top_users_json is ordered best first
CREATE TABLE IF NOT EXISTS cell_leaderboards (
    id TEXT PRIMARY KEY NOT NULL,
    h3_index INTEGER NOT NULL UNIQUE REFERENCES hexes(h3_index),
    top_users_json TEXT NOT NULL DEFAULT '[]'
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_cell_influences_user ON cell_influences(user_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'activities', 'hexes', 'cell_influences', 'cell_leaderboards')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_newer_schema_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();

        let err = init_schema(&conn).unwrap_err();
        assert!(matches!(err, TerritoryError::Store(msg) if msg.contains("v2")));
    }
}
