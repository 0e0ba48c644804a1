//! Cell leaderboard service - keeps the top-5 projection of each cell
//!
//! A leaderboard is derived from the influence rows of its cell, but only
//! ever updated for the user who just touched it. Entries of other users
//! keep the score they had when they last synced.

use std::cmp::Ordering;
use std::sync::Arc;

use h3o::{CellIndex, Resolution};
use tracing::debug;
use uuid::Uuid;

use crate::cells::{self, BoundingBox};
use crate::error::TerritoryError;
use crate::model::{CellLeaderboard, LeaderboardEntry, User, LEADERBOARD_SIZE};
use crate::store::{CallContext, InfluenceStore, LeaderboardStore, UserStore};

use super::locks::CellLocks;

/// Higher score first, then whoever reached it earlier, then smaller user id
pub fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.since.cmp(&b.since))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Sort and cut to [`LEADERBOARD_SIZE`]
pub fn rank_entries(entries: &mut Vec<LeaderboardEntry>) {
    entries.sort_by(compare_entries);
    entries.truncate(LEADERBOARD_SIZE);
}

pub struct CellLeaderboardService {
    leaderboards: Arc<dyn LeaderboardStore>,
    influences: Arc<dyn InfluenceStore>,
    users: Arc<dyn UserStore>,
    locks: Arc<CellLocks>,
    resolution: Resolution,
    max_region_cells: usize,
}

impl CellLeaderboardService {
    pub fn new(
        leaderboards: Arc<dyn LeaderboardStore>,
        influences: Arc<dyn InfluenceStore>,
        users: Arc<dyn UserStore>,
        locks: Arc<CellLocks>,
        resolution: Resolution,
        max_region_cells: usize,
    ) -> Self {
        Self {
            leaderboards,
            influences,
            users,
            locks,
            resolution,
            max_region_cells,
        }
    }

    pub fn locks(&self) -> &Arc<CellLocks> {
        &self.locks
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, ctx: &CallContext, cell: CellIndex) -> Result<Option<CellLeaderboard>, TerritoryError> {
        self.leaderboards.get(ctx, cell)
    }

    /// 1-based rank of the user on the cell, `None` when not listed
    pub fn position_of(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<usize>, TerritoryError> {
        Ok(self
            .leaderboards
            .get(ctx, cell)?
            .and_then(|board| board.position_of(user_id)))
    }

    /// Leaderboards of every cell intersecting `bbox`, ordered by cell index.
    ///
    /// Cells nobody has touched have no leaderboard and are left out.
    pub fn region_leaderboards(
        &self,
        ctx: &CallContext,
        bbox: &BoundingBox,
    ) -> Result<Vec<CellLeaderboard>, TerritoryError> {
        let cells: Vec<CellIndex> =
            cells::cells_in_region(bbox, self.resolution, self.max_region_cells)?
                .into_iter()
                .collect();
        debug!(cells = cells.len(), "Region resolved");

        self.leaderboards.get_many(ctx, &cells)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Take the cell lock and bring the user's entry up to date
    pub fn add_or_create(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<usize>, TerritoryError> {
        let user = self.require_user(ctx, user_id)?;
        self.locks.with_lock(cell, || self.sync_user(ctx, cell, &user))
    }

    /// Bring the user's entry up to date; the caller holds the cell lock.
    ///
    /// Returns the user's 1-based position, or `None` when they have no
    /// influence in the cell or did not make the top five.
    pub fn sync(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<usize>, TerritoryError> {
        let user = self.require_user(ctx, user_id)?;
        self.sync_user(ctx, cell, &user)
    }

    pub(crate) fn sync_user(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user: &User,
    ) -> Result<Option<usize>, TerritoryError> {
        let Some(influence) = self.influences.get(ctx, cell, user.id)? else {
            return Ok(None);
        };

        let candidate = LeaderboardEntry {
            user_id: user.id,
            username: user.username.clone(),
            score: influence.score,
            since: influence.last_updated,
        };

        let Some(mut board) = self.leaderboards.get(ctx, cell)? else {
            let board = CellLeaderboard {
                id: Uuid::new_v4(),
                cell,
                top_users: vec![candidate],
            };
            self.leaderboards.put(ctx, &board)?;
            debug!(h3_index = %cell, user_id = %user.id, "Created leaderboard");
            return Ok(Some(1));
        };

        match board.top_users.iter().position(|e| e.user_id == user.id) {
            Some(idx) if board.top_users[idx].score == candidate.score => {
                return Ok(Some(idx + 1));
            }
            Some(idx) => board.top_users[idx] = candidate,
            None => board.top_users.push(candidate),
        }

        rank_entries(&mut board.top_users);

        // Incumbents keep their relative order, so a miss changes nothing worth writing
        let Some(position) = board.position_of(user.id) else {
            debug!(h3_index = %cell, user_id = %user.id, "Did not place on leaderboard");
            return Ok(None);
        };

        self.leaderboards.put(ctx, &board)?;
        debug!(h3_index = %cell, user_id = %user.id, position, "Leaderboard updated");

        Ok(Some(position))
    }

    fn require_user(&self, ctx: &CallContext, user_id: Uuid) -> Result<User, TerritoryError> {
        self.users
            .get(ctx, user_id)?
            .ok_or_else(|| TerritoryError::NotFound(format!("user {}", user_id)))
    }
}
