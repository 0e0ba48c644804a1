//! Activity log

use h3o::CellIndex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ts_from_sql, ts_to_sql, uuid_from_sql, TerritoryDb};
use crate::cells;
use crate::error::TerritoryError;
use crate::model::Activity;
use crate::store::{ActivityStore, CallContext};

const SELECT_ACTIVITY: &str = "SELECT id, user_id, duration_seconds, distance_meters, h3_indexes_json, created_at
     FROM activities";

/// JSON column shape: `["8928308280fffff", ...]`
#[derive(Serialize, Deserialize)]
struct CellList(#[serde(with = "cells::as_string_vec")] Vec<CellIndex>);

type RawActivity = (String, String, f64, f64, String, String);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawActivity> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn from_raw(raw: RawActivity) -> Result<Activity, TerritoryError> {
    let (id, user_id, duration, distance, cells_json, created_at) = raw;
    let CellList(cells) = serde_json::from_str(&cells_json)
        .map_err(|e| TerritoryError::Store(format!("Corrupt h3_indexes_json for {}: {}", id, e)))?;

    Ok(Activity {
        id: uuid_from_sql(&id)?,
        user_id: uuid_from_sql(&user_id)?,
        duration,
        distance,
        cells,
        created_at: ts_from_sql(&created_at)?,
    })
}

pub fn insert_activity(conn: &Connection, activity: &Activity) -> Result<(), TerritoryError> {
    let cells_json = serde_json::to_string(&CellList(activity.cells.clone()))?;

    conn.execute(
        "INSERT INTO activities (id, user_id, duration_seconds, distance_meters, h3_indexes_json, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            activity.id.to_string(),
            activity.user_id.to_string(),
            activity.duration,
            activity.distance,
            cells_json,
            ts_to_sql(activity.created_at),
        ],
    )
    .map_err(|e| TerritoryError::Store(format!("Failed to insert activity: {}", e)))?;
    Ok(())
}

pub fn get_activity(conn: &Connection, id: Uuid) -> Result<Option<Activity>, TerritoryError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_ACTIVITY),
        params![id.to_string()],
        read_raw,
    )
    .optional()
    .map_err(|e| TerritoryError::Store(format!("Failed to get activity: {}", e)))?
    .map(from_raw)
    .transpose()
}

pub fn list_for_user(conn: &Connection, user_id: Uuid) -> Result<Vec<Activity>, TerritoryError> {
    let mut stmt = conn
        .prepare(&format!("{} WHERE user_id = ? ORDER BY created_at ASC", SELECT_ACTIVITY))
        .map_err(|e| TerritoryError::Store(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![user_id.to_string()], read_raw)
        .map_err(|e| TerritoryError::Store(format!("Failed to query activities: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| TerritoryError::Store(format!("Failed to read row: {}", e)))?;
        results.push(from_raw(raw)?);
    }

    Ok(results)
}

impl ActivityStore for TerritoryDb {
    fn insert(&self, ctx: &CallContext, activity: &Activity) -> Result<(), TerritoryError> {
        self.with_conn(ctx, "activities.insert", |conn| insert_activity(conn, activity))
    }

    fn get(&self, ctx: &CallContext, id: Uuid) -> Result<Option<Activity>, TerritoryError> {
        self.with_conn(ctx, "activities.get", |conn| get_activity(conn, id))
    }

    fn list_for_user(&self, ctx: &CallContext, user_id: Uuid) -> Result<Vec<Activity>, TerritoryError> {
        self.with_conn(ctx, "activities.list_for_user", |conn| list_for_user(conn, user_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::test_support::{cell_at, seed_user};

    fn activity_for(user_id: Uuid, minutes_ago: i64) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            user_id,
            duration: 1800.0,
            distance: 5000.0,
            cells: vec![cell_at(52.23, 21.01), cell_at(52.24, 21.03)],
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_insert_and_get_round_trips_cells() {
        let db = TerritoryDb::open_in_memory().unwrap();
        let ctx = CallContext::background();
        let user = seed_user(&db, "ania");

        let activity = activity_for(user.id, 0);
        ActivityStore::insert(&db, &ctx, &activity).unwrap();

        let stored = ActivityStore::get(&db, &ctx, activity.id).unwrap().unwrap();
        assert_eq!(stored, activity);
    }

    #[test]
    fn test_list_for_user_is_oldest_first() {
        let db = TerritoryDb::open_in_memory().unwrap();
        let ctx = CallContext::background();
        let ania = seed_user(&db, "ania");
        let bartek = seed_user(&db, "bartek");

        let recent = activity_for(ania.id, 5);
        let older = activity_for(ania.id, 60);
        ActivityStore::insert(&db, &ctx, &recent).unwrap();
        ActivityStore::insert(&db, &ctx, &older).unwrap();
        ActivityStore::insert(&db, &ctx, &activity_for(bartek.id, 1)).unwrap();

        let listed = db.list_for_user(&ctx, ania.id).unwrap();
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), vec![older.id, recent.id]);
    }

    #[test]
    fn test_unknown_user_rejected_by_foreign_key() {
        let db = TerritoryDb::open_in_memory().unwrap();
        let result = ActivityStore::insert(&db, &CallContext::background(), &activity_for(Uuid::new_v4(), 0));
        assert!(matches!(result, Err(TerritoryError::Store(_))));
    }
}
