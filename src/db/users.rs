//! User rows

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ts_from_sql, ts_to_sql, uuid_from_sql, TerritoryDb};
use crate::error::TerritoryError;
use crate::model::User;
use crate::store::{CallContext, UserStore};

type RawUser = (String, String, String, String);

fn from_raw((id, external_id, username, created_at): RawUser) -> Result<User, TerritoryError> {
    Ok(User {
        id: uuid_from_sql(&id)?,
        external_id,
        username,
        created_at: ts_from_sql(&created_at)?,
    })
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<User>, TerritoryError> {
    conn.query_row(
        "SELECT id, external_id, username, created_at FROM users WHERE id = ?",
        params![id.to_string()],
        read_raw,
    )
    .optional()
    .map_err(|e| TerritoryError::Store(format!("Failed to get user: {}", e)))?
    .map(from_raw)
    .transpose()
}

pub fn find_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<User>, TerritoryError> {
    conn.query_row(
        "SELECT id, external_id, username, created_at FROM users WHERE external_id = ?",
        params![external_id],
        read_raw,
    )
    .optional()
    .map_err(|e| TerritoryError::Store(format!("Failed to find user: {}", e)))?
    .map(from_raw)
    .transpose()
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), TerritoryError> {
    conn.execute(
        "INSERT INTO users (id, external_id, username, created_at) VALUES (?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.external_id,
            user.username,
            ts_to_sql(user.created_at),
        ],
    )
    .map_err(|e| TerritoryError::Store(format!("Failed to insert user: {}", e)))?;
    Ok(())
}

impl UserStore for TerritoryDb {
    fn get(&self, ctx: &CallContext, id: Uuid) -> Result<Option<User>, TerritoryError> {
        self.with_conn(ctx, "users.get", |conn| get_user(conn, id))
    }

    fn find_by_external_id(
        &self,
        ctx: &CallContext,
        external_id: &str,
    ) -> Result<Option<User>, TerritoryError> {
        self.with_conn(ctx, "users.find_by_external_id", |conn| {
            find_by_external_id(conn, external_id)
        })
    }

    fn insert(&self, ctx: &CallContext, user: &User) -> Result<(), TerritoryError> {
        self.with_conn(ctx, "users.insert", |conn| insert_user(conn, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seed_user;

    #[test]
    fn test_lookup_by_both_keys() {
        let db = TerritoryDb::open_in_memory().unwrap();
        let ctx = CallContext::background();
        let user = seed_user(&db, "karol");

        assert_eq!(UserStore::get(&db, &ctx, user.id).unwrap(), Some(user.clone()));
        assert_eq!(db.find_by_external_id(&ctx, "ext-karol").unwrap(), Some(user));
        assert!(db.find_by_external_id(&ctx, "ext-nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_external_id_rejected() {
        let db = TerritoryDb::open_in_memory().unwrap();
        let user = seed_user(&db, "karol");
        let twin = User { id: Uuid::new_v4(), ..user };
        let result = UserStore::insert(&db, &CallContext::background(), &twin);
        assert!(matches!(result, Err(TerritoryError::Store(_))));
    }
}
