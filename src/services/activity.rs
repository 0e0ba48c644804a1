//! Activity service - ingestion of recorded activities
//!
//! Validates the request, appends the activity, then walks its cells:
//! register the hex, touch the user's influence, sync the cell leaderboard.
//! Once the activity is stored the request succeeds; per-cell failures are
//! logged and reported back as warnings.

use std::collections::HashSet;
use std::sync::Arc;

use h3o::{CellIndex, Resolution};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cells;
use crate::clock::Clock;
use crate::error::TerritoryError;
use crate::model::{
    Activity, ActivityResponse, CellStage, CellWarning, CreateActivityRequest, User,
    UserActivityStats,
};
use crate::store::{ActivityStore, CallContext, HexStore};

use super::leaderboard::CellLeaderboardService;
use super::ledger::InfluenceLedger;
use super::user::UserService;

pub struct ActivityService {
    activities: Arc<dyn ActivityStore>,
    hexes: Arc<dyn HexStore>,
    users: Arc<UserService>,
    ledger: Arc<InfluenceLedger>,
    leaderboard: Arc<CellLeaderboardService>,
    clock: Arc<dyn Clock>,
    resolution: Resolution,
}

impl ActivityService {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        hexes: Arc<dyn HexStore>,
        users: Arc<UserService>,
        ledger: Arc<InfluenceLedger>,
        leaderboard: Arc<CellLeaderboardService>,
        clock: Arc<dyn Clock>,
        resolution: Resolution,
    ) -> Self {
        Self {
            activities,
            hexes,
            users,
            ledger,
            leaderboard,
            clock,
            resolution,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_activity(&self, ctx: &CallContext, id: Uuid) -> Result<Option<Activity>, TerritoryError> {
        self.activities.get(ctx, id)
    }

    /// Oldest first
    pub fn list_user_activities(
        &self,
        ctx: &CallContext,
        user_id: Uuid,
    ) -> Result<Vec<Activity>, TerritoryError> {
        self.activities.list_for_user(ctx, user_id)
    }

    pub fn user_stats(&self, ctx: &CallContext, user_id: Uuid) -> Result<UserActivityStats, TerritoryError> {
        self.users.require(ctx, user_id)?;

        let activities = self.activities.list_for_user(ctx, user_id)?;
        let hexes_visited = self.ledger.cells_touched(ctx, user_id)?;

        let today = self.clock.now().date_naive();
        let mut weekly_activities = [0u64; 7];
        for activity in &activities {
            let days_ago = (today - activity.created_at.date_naive()).num_days();
            if (0..7).contains(&days_ago) {
                weekly_activities[6 - days_ago as usize] += 1;
            }
        }

        debug!(user_id = %user_id, activities = activities.len(), "Computed user stats");

        Ok(UserActivityStats {
            hexes_visited,
            activities_recorded: activities.len() as u64,
            distance_covered: activities.iter().map(|a| a.distance).sum(),
            weekly_activities,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Record an activity and apply it to every cell it touched.
    ///
    /// Fails without writing anything when the request is invalid or the
    /// user is unknown. After the activity row is written, cell failures only
    /// show up in `warnings`.
    pub fn create_activity(
        &self,
        ctx: &CallContext,
        req: CreateActivityRequest,
    ) -> Result<ActivityResponse, TerritoryError> {
        let cells = self.validate(&req)?;
        let user = self.users.require(ctx, req.user_id)?;

        let activity = Activity {
            id: Uuid::new_v4(),
            user_id: user.id,
            duration: req.duration,
            distance: req.distance,
            cells,
            created_at: self.clock.now(),
        };
        self.activities.insert(ctx, &activity)?;
        info!(
            activity_id = %activity.id,
            user_id = %user.id,
            cells = activity.cells.len(),
            "Activity recorded"
        );

        let mut warnings = Vec::new();
        let ready = self.ensure_hexes(ctx, &activity.cells, &mut warnings);

        // Repeated cells are applied once per occurrence, in request order
        let mut cells_processed = 0;
        for &cell in activity.cells.iter().filter(|c| ready.contains(*c)) {
            match self.apply_cell(ctx, &user, cell) {
                Ok(position) => {
                    cells_processed += 1;
                    debug!(h3_index = %cell, user_id = %user.id, ?position, "Cell applied");
                }
                Err(warning) => {
                    warn!(
                        h3_index = %cell,
                        user_id = %user.id,
                        stage = ?warning.stage,
                        error = %warning.message,
                        "Cell update failed"
                    );
                    warnings.push(warning);
                }
            }
        }

        if !warnings.is_empty() {
            warn!(
                activity_id = %activity.id,
                failed = warnings.len(),
                cells_processed,
                "Activity applied partially"
            );
        }

        Ok(ActivityResponse {
            activity_id: activity.id,
            user_id: activity.user_id,
            duration: activity.duration,
            distance: activity.distance,
            h3_indexes: activity.cells,
            created_at: activity.created_at,
            cells_processed,
            warnings,
        })
    }

    /// Request checks; returns the cells in request order, repeats included
    fn validate(&self, req: &CreateActivityRequest) -> Result<Vec<CellIndex>, TerritoryError> {
        if req.user_id.is_nil() {
            return Err(TerritoryError::Validation("user_id is required".into()));
        }
        if !req.duration.is_finite() || req.duration <= 0.0 {
            return Err(TerritoryError::Validation(format!(
                "duration must be a positive number of seconds, got {}",
                req.duration
            )));
        }
        if !req.distance.is_finite() || req.distance <= 0.0 {
            return Err(TerritoryError::Validation(format!(
                "distance must be a positive number of meters, got {}",
                req.distance
            )));
        }
        if req.h3_indexes.is_empty() {
            return Err(TerritoryError::Validation("h3_indexes must not be empty".into()));
        }

        req.h3_indexes
            .iter()
            .map(|&raw| cells::validate_cell(raw, self.resolution))
            .collect()
    }

    /// Make sure every distinct cell has a hex row; returns the cells that do
    fn ensure_hexes(
        &self,
        ctx: &CallContext,
        cells: &[CellIndex],
        warnings: &mut Vec<CellWarning>,
    ) -> HashSet<CellIndex> {
        let mut distinct = Vec::with_capacity(cells.len());
        let mut seen = HashSet::with_capacity(cells.len());
        for &cell in cells {
            if seen.insert(cell) {
                distinct.push(cell);
            }
        }

        let existing = match self.hexes.exists_all(ctx, &distinct) {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "Hex existence check failed, creating individually");
                HashSet::new()
            }
        };

        let mut ready = HashSet::with_capacity(distinct.len());
        for cell in distinct {
            if existing.contains(&cell) {
                ready.insert(cell);
                continue;
            }

            match self.hexes.create(ctx, cell) {
                Ok(true) => {
                    ready.insert(cell);
                }
                Ok(false) => {
                    debug!(h3_index = %cell, "Hex created concurrently");
                    ready.insert(cell);
                }
                Err(e) => {
                    error!(h3_index = %cell, error = %e, "Failed to create hex");
                    warnings.push(CellWarning {
                        cell,
                        stage: CellStage::Hex,
                        message: e.to_string(),
                    });
                }
            }
        }

        ready
    }

    /// Touch then sync, under the cell lock
    fn apply_cell(
        &self,
        ctx: &CallContext,
        user: &User,
        cell: CellIndex,
    ) -> Result<Option<usize>, CellWarning> {
        let warning = |stage: CellStage, e: TerritoryError| CellWarning {
            cell,
            stage,
            message: e.to_string(),
        };

        self.leaderboard.locks().with_lock(cell, || {
            self.ledger
                .touch(ctx, user.id, cell)
                .map_err(|e| warning(CellStage::Influence, e))?;
            self.leaderboard
                .sync_user(ctx, cell, user)
                .map_err(|e| warning(CellStage::Leaderboard, e))
        })
    }
}
