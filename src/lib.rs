//! Territory Engine - influence and leaderboards for an H3 hex capture game
//!
//! Players record activities; every H3 cell an activity passes through
//! raises the player's influence there. Influence decays while a player
//! stays away, and each cell keeps a small leaderboard of its strongest
//! players.
//!
//! ## Flow
//!
//! ```text
//! CreateActivityRequest
//!     ↓ validate (cells at the configured resolution)
//! activities          append-only log
//!     ↓ per cell, under the cell lock
//! hexes               register on first sight
//! cell_influences     decay since last touch, then +1.0
//! cell_leaderboards   top 5 by score, earlier arrival wins ties
//! ```
//!
//! Reads: leaderboards inside a bounding box, a user's rank in a cell, and
//! the global ranking of who leads the most cells.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/territory-engine/
//! ├── territory.db           # SQLite (WAL)
//! └── config.toml            # Configuration
//! ```

pub mod cells;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod services;
pub mod store;

// Re-exports
pub use cells::BoundingBox;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::TerritoryDb;
pub use error::{ErrorKind, TerritoryError};
pub use model::{
    Activity, ActivityResponse, CellInfluence, CellLeaderboard, CreateActivityRequest,
    GlobalLeaderboardEntry, LeaderboardEntry, User, UserActivityStats,
};
pub use services::{Services, Stores};
pub use store::CallContext;
