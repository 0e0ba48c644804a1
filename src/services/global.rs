//! Global leaderboard - who leads the most cells

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::TerritoryError;
use crate::model::GlobalLeaderboardEntry;
use crate::store::{CallContext, LeaderboardStore};

pub struct GlobalLeaderboardService {
    leaderboards: Arc<dyn LeaderboardStore>,
    default_size: usize,
}

impl GlobalLeaderboardService {
    pub fn new(leaderboards: Arc<dyn LeaderboardStore>, default_size: usize) -> Self {
        Self { leaderboards, default_size }
    }

    /// Top users using the configured size
    pub fn top(&self, ctx: &CallContext) -> Result<Vec<GlobalLeaderboardEntry>, TerritoryError> {
        self.global_top(ctx, self.default_size)
    }

    /// Users ranked by the number of cells they lead.
    ///
    /// Full scan of every leaderboard. Ties go to the smaller username, then
    /// the smaller user id.
    pub fn global_top(
        &self,
        ctx: &CallContext,
        limit: usize,
    ) -> Result<Vec<GlobalLeaderboardEntry>, TerritoryError> {
        let mut tally: HashMap<Uuid, GlobalLeaderboardEntry> = HashMap::new();
        let mut scanned = 0usize;

        self.leaderboards.for_each(ctx, &mut |board| {
            scanned += 1;
            let Some(leader) = board.leader() else {
                return;
            };

            let entry = tally.entry(leader.user_id).or_insert_with(|| GlobalLeaderboardEntry {
                user_id: leader.user_id,
                username: String::new(),
                top_count: 0,
            });
            entry.username.clone_from(&leader.username);
            entry.top_count += 1;
        })?;

        let mut ranked: Vec<GlobalLeaderboardEntry> = tally.into_values().collect();
        ranked.sort_by(|a, b| {
            b.top_count
                .cmp(&a.top_count)
                .then_with(|| a.username.cmp(&b.username))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        ranked.truncate(limit);

        debug!(scanned, leaders = ranked.len(), "Global leaderboard computed");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use h3o::CellIndex;

    use super::*;
    use crate::db::test_support::{cell_at, seed_hex};
    use crate::db::TerritoryDb;
    use crate::model::{CellLeaderboard, LeaderboardEntry};

    fn lead(db: &TerritoryDb, cell: CellIndex, leaders: &[(Uuid, &str)]) {
        seed_hex(db, cell);
        let board = CellLeaderboard {
            id: Uuid::new_v4(),
            cell,
            top_users: leaders
                .iter()
                .enumerate()
                .map(|(i, (user_id, name))| LeaderboardEntry {
                    user_id: *user_id,
                    username: name.to_string(),
                    score: 5.0 - i as f64,
                    since: Utc::now(),
                })
                .collect(),
        };
        LeaderboardStore::put(db, &CallContext::background(), &board).unwrap();
    }

    #[test]
    fn test_counts_only_first_place() {
        let db = Arc::new(TerritoryDb::open_in_memory().unwrap());
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());

        lead(&db, cell_at(52.23, 21.01), &[(x, "x"), (y, "y")]);
        lead(&db, cell_at(50.06, 19.94), &[(x, "x")]);
        lead(&db, cell_at(51.11, 17.03), &[(x, "x"), (y, "y")]);
        lead(&db, cell_at(54.35, 18.65), &[(y, "y"), (x, "x")]);
        lead(&db, cell_at(53.43, 14.55), &[(y, "y")]);

        let global = GlobalLeaderboardService::new(db, 10);
        let top = global.top(&CallContext::background()).unwrap();

        assert_eq!(
            top,
            vec![
                GlobalLeaderboardEntry { user_id: x, username: "x".into(), top_count: 3 },
                GlobalLeaderboardEntry { user_id: y, username: "y".into(), top_count: 2 },
            ]
        );
    }

    #[test]
    fn test_limit_and_username_tie_break() {
        let db = Arc::new(TerritoryDb::open_in_memory().unwrap());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        lead(&db, cell_at(52.23, 21.01), &[(c, "cyryl")]);
        lead(&db, cell_at(50.06, 19.94), &[(a, "ada")]);
        lead(&db, cell_at(51.11, 17.03), &[(b, "bea")]);

        let global = GlobalLeaderboardService::new(db, 10);
        let top = global.global_top(&CallContext::background(), 2).unwrap();

        let names: Vec<_> = top.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["ada", "bea"]);
    }

    #[test]
    fn test_empty_store() {
        let db = Arc::new(TerritoryDb::open_in_memory().unwrap());
        let global = GlobalLeaderboardService::new(db, 10);
        assert!(global.top(&CallContext::background()).unwrap().is_empty());
    }
}
