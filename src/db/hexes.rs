//! Hex registry

use std::collections::HashSet;

use h3o::CellIndex;
use rusqlite::{params, params_from_iter, Connection};

use super::{cell_from_sql, cell_to_sql, placeholders, TerritoryDb, IN_CHUNK};
use crate::error::TerritoryError;
use crate::store::{CallContext, HexStore};

/// Which of `cells` already have a row
pub fn existing_hexes(conn: &Connection, cells: &[CellIndex]) -> Result<HashSet<CellIndex>, TerritoryError> {
    let mut found = HashSet::new();

    for chunk in cells.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT h3_index FROM hexes WHERE h3_index IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TerritoryError::Store(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map(params_from_iter(chunk.iter().map(|c| cell_to_sql(*c))), |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|e| TerritoryError::Store(format!("Failed to query hexes: {}", e)))?;

        for row in rows {
            let raw = row.map_err(|e| TerritoryError::Store(format!("Failed to read row: {}", e)))?;
            found.insert(cell_from_sql(raw)?);
        }
    }

    Ok(found)
}

/// Insert a hex; returns false if it was already there
pub fn create_hex(conn: &Connection, cell: CellIndex) -> Result<bool, TerritoryError> {
    let rows = conn
        .execute(
            "INSERT OR IGNORE INTO hexes (h3_index) VALUES (?)",
            params![cell_to_sql(cell)],
        )
        .map_err(|e| TerritoryError::Store(format!("Failed to create hex {}: {}", cell, e)))?;

    Ok(rows > 0)
}

impl HexStore for TerritoryDb {
    fn exists_all(
        &self,
        ctx: &CallContext,
        cells: &[CellIndex],
    ) -> Result<HashSet<CellIndex>, TerritoryError> {
        self.with_conn(ctx, "hexes.exists_all", |conn| existing_hexes(conn, cells))
    }

    fn create(&self, ctx: &CallContext, cell: CellIndex) -> Result<bool, TerritoryError> {
        self.with_conn(ctx, "hexes.create", |conn| create_hex(conn, cell))
    }
}
