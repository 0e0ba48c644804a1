//! Service layer for territory-engine
//!
//! Services hold the game rules; repositories (`store` traits) only persist.
//!
//! ## Architecture
//!
//! ```text
//! CLI / embedding application
//!     ↓
//! Service Layer (validation, decay, ranking)
//!     ↓
//! Repository traits (store.rs)
//!     ↓
//! SQLite Database (db/*.rs)
//! ```
//!
//! Writes to a cell (influence touch followed by leaderboard sync) run under
//! that cell's lock in [`CellLocks`], shared by every service that writes.

pub mod locks;
pub mod ledger;
pub mod leaderboard;
pub mod global;
pub mod user;
pub mod activity;

pub use activity::ActivityService;
pub use global::GlobalLeaderboardService;
pub use leaderboard::CellLeaderboardService;
pub use ledger::InfluenceLedger;
pub use locks::CellLocks;
pub use user::UserService;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::TerritoryDb;
use crate::error::TerritoryError;
use crate::store::{
    ActivityStore, CallContext, HexStore, InfluenceStore, LeaderboardStore, UserStore,
};

/// Repositories the services are built on
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub activities: Arc<dyn ActivityStore>,
    pub hexes: Arc<dyn HexStore>,
    pub influences: Arc<dyn InfluenceStore>,
    pub leaderboards: Arc<dyn LeaderboardStore>,
}

impl Stores {
    /// Every store backed by the same SQLite database
    pub fn sqlite(db: Arc<TerritoryDb>) -> Self {
        Self {
            users: db.clone(),
            activities: db.clone(),
            hexes: db.clone(),
            influences: db.clone(),
            leaderboards: db,
        }
    }
}

/// Service container for dependency injection
pub struct Services {
    pub users: Arc<UserService>,
    pub ledger: Arc<InfluenceLedger>,
    pub leaderboard: Arc<CellLeaderboardService>,
    pub activity: Arc<ActivityService>,
    pub global: Arc<GlobalLeaderboardService>,
    store_timeout: Option<Duration>,
}

impl Services {
    /// Wire all services over `stores`
    pub fn new(stores: Stores, config: &Config, clock: Arc<dyn Clock>) -> Result<Self, TerritoryError> {
        let resolution = config.h3_resolution()?;
        let locks = Arc::new(CellLocks::new());

        let users = Arc::new(UserService::new(stores.users.clone(), clock.clone()));
        let ledger = Arc::new(InfluenceLedger::new(
            stores.influences.clone(),
            clock.clone(),
            locks.clone(),
        ));
        let leaderboard = Arc::new(CellLeaderboardService::new(
            stores.leaderboards.clone(),
            stores.influences.clone(),
            stores.users.clone(),
            locks,
            resolution,
            config.max_region_cells,
        ));
        let activity = Arc::new(ActivityService::new(
            stores.activities.clone(),
            stores.hexes.clone(),
            users.clone(),
            ledger.clone(),
            leaderboard.clone(),
            clock,
            resolution,
        ));
        let global = Arc::new(GlobalLeaderboardService::new(
            stores.leaderboards,
            config.global_leaderboard_size,
        ));

        Ok(Self {
            users,
            ledger,
            leaderboard,
            activity,
            global,
            store_timeout: config.store_timeout(),
        })
    }

    /// SQLite-backed services on the wall clock
    pub fn open(db: Arc<TerritoryDb>, config: &Config) -> Result<Self, TerritoryError> {
        Self::new(Stores::sqlite(db), config, Arc::new(SystemClock))
    }

    /// Fresh context carrying the configured store deadline
    pub fn call_context(&self) -> CallContext {
        CallContext::from_timeout(self.store_timeout)
    }
}
