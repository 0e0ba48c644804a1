//! Repository interfaces consumed by the services
//!
//! The services never see a connection or a query language; they talk to
//! these traits. [`crate::db::TerritoryDb`] implements all of them on SQLite.
//!
//! Every call takes a [`CallContext`] so a caller can bound how long it is
//! willing to wait on storage.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use h3o::CellIndex;
use uuid::Uuid;

use crate::error::TerritoryError;
use crate::model::{Activity, CellInfluence, CellLeaderboard, User};

/// Deadline carried through a single logical request
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    /// No deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout) }
    }

    /// Context with `timeout` if one is configured, otherwise unbounded
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::with_timeout).unwrap_or_default()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Timeout` naming `operation` once the deadline has passed
    pub fn check(&self, operation: &str) -> Result<(), TerritoryError> {
        if self.is_expired() {
            return Err(TerritoryError::Timeout(operation.to_string()));
        }
        Ok(())
    }
}

pub trait HexStore: Send + Sync {
    /// Subset of `cells` that already have a hex row
    fn exists_all(
        &self,
        ctx: &CallContext,
        cells: &[CellIndex],
    ) -> Result<HashSet<CellIndex>, TerritoryError>;

    /// Create the hex row; `Ok(false)` when it already existed
    fn create(&self, ctx: &CallContext, cell: CellIndex) -> Result<bool, TerritoryError>;
}

pub trait InfluenceStore: Send + Sync {
    fn get(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<CellInfluence>, TerritoryError>;

    /// Insert or overwrite the row for (cell, user)
    fn put(&self, ctx: &CallContext, influence: &CellInfluence) -> Result<(), TerritoryError>;

    /// Number of cells the user has ever touched
    fn count_for_user(&self, ctx: &CallContext, user_id: Uuid) -> Result<u64, TerritoryError>;
}

pub trait LeaderboardStore: Send + Sync {
    fn get(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
    ) -> Result<Option<CellLeaderboard>, TerritoryError>;

    /// Leaderboards for whichever of `cells` have one
    fn get_many(
        &self,
        ctx: &CallContext,
        cells: &[CellIndex],
    ) -> Result<Vec<CellLeaderboard>, TerritoryError>;

    /// Insert or overwrite the leaderboard for its cell
    fn put(&self, ctx: &CallContext, leaderboard: &CellLeaderboard) -> Result<(), TerritoryError>;

    /// Stream every persisted leaderboard through `visit`
    fn for_each(
        &self,
        ctx: &CallContext,
        visit: &mut dyn FnMut(CellLeaderboard),
    ) -> Result<(), TerritoryError>;
}

pub trait ActivityStore: Send + Sync {
    fn insert(&self, ctx: &CallContext, activity: &Activity) -> Result<(), TerritoryError>;

    fn get(&self, ctx: &CallContext, id: Uuid) -> Result<Option<Activity>, TerritoryError>;

    /// Oldest first
    fn list_for_user(&self, ctx: &CallContext, user_id: Uuid) -> Result<Vec<Activity>, TerritoryError>;
}

pub trait UserStore: Send + Sync {
    fn get(&self, ctx: &CallContext, id: Uuid) -> Result<Option<User>, TerritoryError>;

    fn find_by_external_id(
        &self,
        ctx: &CallContext,
        external_id: &str,
    ) -> Result<Option<User>, TerritoryError>;

    fn insert(&self, ctx: &CallContext, user: &User) -> Result<(), TerritoryError>;
}
