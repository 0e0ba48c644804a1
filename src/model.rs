//! Entities and wire types
//!
//! Field names follow the JSON contract the mobile client already speaks
//! (`user_id`, `h3_indexes`, `top_users`, ...).

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cells;

/// Maximum entries kept on a cell leaderboard
pub const LEADERBOARD_SIZE: usize = 5;

/// Internal user record, keyed by the identity provider's subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Seconds
    pub duration: f64,
    /// Meters
    pub distance: f64,
    #[serde(rename = "h3_indexes", with = "cells::as_string_vec")]
    pub cells: Vec<CellIndex>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellInfluence {
    pub id: Uuid,
    #[serde(rename = "h3_index", with = "cells::as_string")]
    pub cell: CellIndex,
    pub user_id: Uuid,
    pub score: f64,
    pub last_updated: DateTime<Utc>,
}

/// One ranked user on a cell leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    #[serde(rename = "user_name")]
    pub username: String,
    pub score: f64,
    /// When the entry reached its current score; earlier wins ties
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellLeaderboard {
    pub id: Uuid,
    #[serde(rename = "h3_index", with = "cells::as_string")]
    pub cell: CellIndex,
    pub top_users: Vec<LeaderboardEntry>,
}

impl CellLeaderboard {
    /// 1-based rank of `user_id`, if listed
    pub fn position_of(&self, user_id: Uuid) -> Option<usize> {
        self.top_users
            .iter()
            .position(|entry| entry.user_id == user_id)
            .map(|idx| idx + 1)
    }

    pub fn leader(&self) -> Option<&LeaderboardEntry> {
        self.top_users.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalLeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub top_count: usize,
}

/// Activity as reported by the client; cells arrive as raw 64-bit indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateActivityRequest {
    pub user_id: Uuid,
    pub duration: f64,
    pub distance: f64,
    pub h3_indexes: Vec<u64>,
}

/// Which per-cell step failed during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStage {
    Hex,
    Influence,
    Leaderboard,
}

/// Non-fatal per-cell failure reported back with the activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellWarning {
    #[serde(rename = "h3_index", with = "cells::as_string")]
    pub cell: CellIndex,
    pub stage: CellStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub activity_id: Uuid,
    pub user_id: Uuid,
    pub duration: f64,
    pub distance: f64,
    #[serde(with = "cells::as_string_vec")]
    pub h3_indexes: Vec<CellIndex>,
    pub created_at: DateTime<Utc>,
    /// Cells whose influence and leaderboard were both updated
    pub cells_processed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CellWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivityStats {
    pub hexes_visited: u64,
    pub activities_recorded: u64,
    /// Meters
    pub distance_covered: f64,
    /// Activities per UTC day, oldest first; the last slot is today
    pub weekly_activities: [u64; 7],
}
