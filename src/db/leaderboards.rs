//! Cell leaderboard snapshots

use h3o::CellIndex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{cell_from_sql, cell_to_sql, placeholders, uuid_from_sql, TerritoryDb, IN_CHUNK};
use crate::error::TerritoryError;
use crate::model::{CellLeaderboard, LeaderboardEntry};
use crate::store::{CallContext, LeaderboardStore};

type RawLeaderboard = (String, i64, String);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLeaderboard> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn from_raw((id, h3_index, top_users_json): RawLeaderboard) -> Result<CellLeaderboard, TerritoryError> {
    let top_users: Vec<LeaderboardEntry> = serde_json::from_str(&top_users_json).map_err(|e| {
        TerritoryError::Store(format!("Corrupt top_users_json for {}: {}", h3_index, e))
    })?;

    Ok(CellLeaderboard {
        id: uuid_from_sql(&id)?,
        cell: cell_from_sql(h3_index)?,
        top_users,
    })
}

pub fn get_leaderboard(conn: &Connection, cell: CellIndex) -> Result<Option<CellLeaderboard>, TerritoryError> {
    conn.query_row(
        "SELECT id, h3_index, top_users_json FROM cell_leaderboards WHERE h3_index = ?",
        params![cell_to_sql(cell)],
        read_raw,
    )
    .optional()
    .map_err(|e| TerritoryError::Store(format!("Failed to get leaderboard: {}", e)))?
    .map(from_raw)
    .transpose()
}

/// Leaderboards for the given cells, ordered by h3_index
pub fn get_leaderboards(conn: &Connection, cells: &[CellIndex]) -> Result<Vec<CellLeaderboard>, TerritoryError> {
    let mut results = Vec::new();

    for chunk in cells.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT id, h3_index, top_users_json FROM cell_leaderboards WHERE h3_index IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TerritoryError::Store(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(chunk.iter().map(|c| cell_to_sql(*c))), read_raw)
            .map_err(|e| TerritoryError::Store(format!("Failed to query leaderboards: {}", e)))?;

        for row in rows {
            let raw = row.map_err(|e| TerritoryError::Store(format!("Failed to read row: {}", e)))?;
            results.push(from_raw(raw)?);
        }
    }

    results.sort_by_key(|lb| lb.cell);
    Ok(results)
}

/// Upsert on h3_index
pub fn put_leaderboard(conn: &Connection, leaderboard: &CellLeaderboard) -> Result<(), TerritoryError> {
    let top_users_json = serde_json::to_string(&leaderboard.top_users)?;

    conn.execute(
        "INSERT INTO cell_leaderboards (id, h3_index, top_users_json) VALUES (?, ?, ?)
         ON CONFLICT(h3_index) DO UPDATE SET top_users_json = excluded.top_users_json",
        params![
            leaderboard.id.to_string(),
            cell_to_sql(leaderboard.cell),
            top_users_json,
        ],
    )
    .map_err(|e| {
        TerritoryError::Store(format!("Failed to put leaderboard for {}: {}", leaderboard.cell, e))
    })?;
    Ok(())
}

pub fn scan_leaderboards(
    conn: &Connection,
    visit: &mut dyn FnMut(CellLeaderboard),
) -> Result<(), TerritoryError> {
    let mut stmt = conn
        .prepare("SELECT id, h3_index, top_users_json FROM cell_leaderboards ORDER BY h3_index")
        .map_err(|e| TerritoryError::Store(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map([], read_raw)
        .map_err(|e| TerritoryError::Store(format!("Failed to scan leaderboards: {}", e)))?;

    for row in rows {
        let raw = row.map_err(|e| TerritoryError::Store(format!("Failed to read row: {}", e)))?;
        visit(from_raw(raw)?);
    }

    Ok(())
}

impl LeaderboardStore for TerritoryDb {
    fn get(&self, ctx: &CallContext, cell: CellIndex) -> Result<Option<CellLeaderboard>, TerritoryError> {
        self.with_conn(ctx, "leaderboards.get", |conn| get_leaderboard(conn, cell))
    }

    fn get_many(
        &self,
        ctx: &CallContext,
        cells: &[CellIndex],
    ) -> Result<Vec<CellLeaderboard>, TerritoryError> {
        self.with_conn(ctx, "leaderboards.get_many", |conn| get_leaderboards(conn, cells))
    }

    fn put(&self, ctx: &CallContext, leaderboard: &CellLeaderboard) -> Result<(), TerritoryError> {
        self.with_conn(ctx, "leaderboards.put", |conn| put_leaderboard(conn, leaderboard))
    }

    /// Holds the connection for the whole scan; `visit` must not call back into the store
    fn for_each(
        &self,
        ctx: &CallContext,
        visit: &mut dyn FnMut(CellLeaderboard),
    ) -> Result<(), TerritoryError> {
        self.with_conn(ctx, "leaderboards.for_each", |conn| scan_leaderboards(conn, visit))
    }
}
