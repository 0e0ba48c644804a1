//! Per-(cell, user) influence rows

use h3o::CellIndex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{cell_from_sql, cell_to_sql, ts_from_sql, ts_to_sql, uuid_from_sql, TerritoryDb};
use crate::error::TerritoryError;
use crate::model::CellInfluence;
use crate::store::{CallContext, InfluenceStore};

pub fn get_influence(
    conn: &Connection,
    cell: CellIndex,
    user_id: Uuid,
) -> Result<Option<CellInfluence>, TerritoryError> {
    let raw = conn
        .query_row(
            "SELECT id, h3_index, user_id, score, last_updated
             FROM cell_influences WHERE h3_index = ? AND user_id = ?",
            params![cell_to_sql(cell), user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .map_err(|e| TerritoryError::Store(format!("Failed to get influence: {}", e)))?;

    let Some((id, h3_index, user, score, last_updated)) = raw else {
        return Ok(None);
    };

    Ok(Some(CellInfluence {
        id: uuid_from_sql(&id)?,
        cell: cell_from_sql(h3_index)?,
        user_id: uuid_from_sql(&user)?,
        score,
        last_updated: ts_from_sql(&last_updated)?,
    }))
}

/// Upsert on (h3_index, user_id); the row id is kept from the first insert
pub fn put_influence(conn: &Connection, influence: &CellInfluence) -> Result<(), TerritoryError> {
    conn.execute(
        "INSERT INTO cell_influences (id, h3_index, user_id, score, last_updated)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(h3_index, user_id) DO UPDATE SET
         score = excluded.score,
         last_updated = excluded.last_updated",
        params![
            influence.id.to_string(),
            cell_to_sql(influence.cell),
            influence.user_id.to_string(),
            influence.score,
            ts_to_sql(influence.last_updated),
        ],
    )
    .map_err(|e| {
        TerritoryError::Store(format!("Failed to put influence for {}: {}", influence.cell, e))
    })?;
    Ok(())
}

pub fn count_for_user(conn: &Connection, user_id: Uuid) -> Result<u64, TerritoryError> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM cell_influences WHERE user_id = ?",
            params![user_id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| TerritoryError::Store(format!("Failed to count influences: {}", e)))?;
    Ok(n as u64)
}

impl InfluenceStore for TerritoryDb {
    fn get(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<CellInfluence>, TerritoryError> {
        self.with_conn(ctx, "influences.get", |conn| get_influence(conn, cell, user_id))
    }

    fn put(&self, ctx: &CallContext, influence: &CellInfluence) -> Result<(), TerritoryError> {
        self.with_conn(ctx, "influences.put", |conn| put_influence(conn, influence))
    }

    fn count_for_user(&self, ctx: &CallContext, user_id: Uuid) -> Result<u64, TerritoryError> {
        self.with_conn(ctx, "influences.count_for_user", |conn| count_for_user(conn, user_id))
    }
}
