//! SQLite implementation of the repository traits
//!
//! ## Tables
//!
//! - `users` - internal user records keyed by identity-provider subject
//! - `activities` - append-only activity log, touched cells as JSON
//! - `hexes` - every cell that has ever been touched
//! - `cell_influences` - decaying score per (cell, user)
//! - `cell_leaderboards` - top-5 projection per cell, entries as JSON
//!
//! Statements are serialized through a single connection mutex. Each public
//! store call checks its [`CallContext`] before and after taking the lock.

pub mod schema;
pub mod users;
pub mod activities;
pub mod hexes;
pub mod influences;
pub mod leaderboards;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use h3o::CellIndex;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::TerritoryError;
use crate::store::CallContext;

/// SQLite database backing every store
pub struct TerritoryDb {
    conn: Mutex<Connection>,
}

impl TerritoryDb {
    /// Open or create `territory.db` inside `storage_dir`
    pub fn open(storage_dir: &Path) -> Result<Self, TerritoryError> {
        std::fs::create_dir_all(storage_dir)?;
        let db_path = storage_dir.join("territory.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| TerritoryError::Store(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent readers alongside the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TerritoryError::Store(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TerritoryError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory().map_err(|e| {
            TerritoryError::Store(format!("Failed to open in-memory SQLite: {}", e))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TerritoryError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| TerritoryError::Store(format!("Failed to enable foreign keys: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run `f` against the connection, bounded by `ctx`
    pub fn with_conn<F, T>(&self, ctx: &CallContext, operation: &str, f: F) -> Result<T, TerritoryError>
    where
        F: FnOnce(&Connection) -> Result<T, TerritoryError>,
    {
        ctx.check(operation)?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| TerritoryError::Internal(format!("Lock poisoned: {}", e)))?;
        ctx.check(operation)?;
        f(&conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, TerritoryError> {
        self.with_conn(&CallContext::background(), "stats", |conn| {
            let count = |table: &str| -> Result<u64, TerritoryError> {
                let n: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                    .map_err(|e| TerritoryError::Store(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                user_count: count("users")?,
                activity_count: count("activities")?,
                hex_count: count("hexes")?,
                influence_count: count("cell_influences")?,
                leaderboard_count: count("cell_leaderboards")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub user_count: u64,
    pub activity_count: u64,
    pub hex_count: u64,
    pub influence_count: u64,
    pub leaderboard_count: u64,
}

// =============================================================================
// Column codecs
// =============================================================================

/// H3 indexes never set the top bit, so they fit an INTEGER column as-is
pub(crate) fn cell_to_sql(cell: CellIndex) -> i64 {
    u64::from(cell) as i64
}

pub(crate) fn cell_from_sql(raw: i64) -> Result<CellIndex, TerritoryError> {
    CellIndex::try_from(raw as u64)
        .map_err(|e| TerritoryError::Store(format!("Corrupt h3_index {}: {}", raw, e)))
}

/// Fixed-width RFC 3339 so TEXT ordering matches time ordering
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>, TerritoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| TerritoryError::Store(format!("Corrupt timestamp '{}': {}", raw, e)))
}

pub(crate) fn uuid_from_sql(raw: &str) -> Result<Uuid, TerritoryError> {
    Uuid::parse_str(raw).map_err(|e| TerritoryError::Store(format!("Corrupt id '{}': {}", raw, e)))
}

/// Keep `IN (...)` lists well under SQLite's variable limit
pub(crate) const IN_CHUNK: usize = 500;

pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use h3o::{CellIndex, LatLng, Resolution};
    use uuid::Uuid;

    use super::TerritoryDb;
    use crate::model::User;
    use crate::store::{CallContext, HexStore, UserStore};

    pub fn cell_at(lat: f64, lng: f64) -> CellIndex {
        LatLng::new(lat, lng).unwrap().to_cell(Resolution::Nine)
    }

    pub fn seed_user(db: &TerritoryDb, name: &str) -> User {
        let user = User {
            id: Uuid::new_v4(),
            external_id: format!("ext-{}", name),
            username: name.to_string(),
            created_at: Utc::now(),
        };
        UserStore::insert(db, &CallContext::background(), &user).unwrap();
        user
    }

    pub fn seed_hex(db: &TerritoryDb, cell: CellIndex) {
        HexStore::create(db, &CallContext::background(), cell).unwrap();
    }
}
