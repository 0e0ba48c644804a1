//! User service - resolves identity-provider subjects to internal users

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::TerritoryError;
use crate::model::User;
use crate::store::{CallContext, UserStore};

pub struct UserService {
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { users, clock }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, ctx: &CallContext, id: Uuid) -> Result<Option<User>, TerritoryError> {
        self.users.get(ctx, id)
    }

    /// Like [`get`](Self::get) but a missing user is `NotFound`
    pub fn require(&self, ctx: &CallContext, id: Uuid) -> Result<User, TerritoryError> {
        self.users
            .get(ctx, id)?
            .ok_or_else(|| TerritoryError::NotFound(format!("user {}", id)))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Find the user for `external_id`, creating it on first sight.
    ///
    /// An existing user keeps its stored username.
    pub fn ensure_user(
        &self,
        ctx: &CallContext,
        external_id: &str,
        username: &str,
    ) -> Result<User, TerritoryError> {
        let external_id = external_id.trim();
        let username = username.trim();
        if external_id.is_empty() {
            return Err(TerritoryError::Validation("external_id is required".into()));
        }
        if username.is_empty() {
            return Err(TerritoryError::Validation("username is required".into()));
        }

        if let Some(existing) = self.users.find_by_external_id(ctx, external_id)? {
            return Ok(existing);
        }

        let user = User {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            username: username.to_string(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.users.insert(ctx, &user) {
            // Lost a race on the unique external_id; the winner's row is the user
            return match self.users.find_by_external_id(ctx, external_id)? {
                Some(existing) => {
                    debug!(user_id = %existing.id, "User created concurrently");
                    Ok(existing)
                }
                None => Err(e),
            };
        }
        info!(user_id = %user.id, username = %user.username, "Created user");

        Ok(user)
    }
}
