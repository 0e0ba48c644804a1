//! Cell influence ledger
//!
//! Influence decays lazily: nothing sweeps the table, the decay for the time
//! since the last visit is applied when the user next touches the cell.

use std::sync::Arc;

use h3o::CellIndex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::TerritoryError;
use crate::model::CellInfluence;
use crate::store::{CallContext, InfluenceStore};

use super::locks::CellLocks;

/// Fraction of a score lost per week of absence
pub const DECAY_RATE_PER_WEEK: f64 = 0.1;

pub const HOURS_PER_WEEK: f64 = 24.0 * 7.0;

/// Smallest multiplier applied after a long absence
pub const MULTIPLIER_FLOOR: f64 = 0.1;

/// Score granted per touch
pub const TOUCH_INCREMENT: f64 = 1.0;

/// Multiplier for the old score after `elapsed_hours` without a touch.
///
/// Rounded to one decimal; anything that rounds to zero or below becomes
/// [`MULTIPLIER_FLOOR`], so from ten weeks on 10% of the score survives.
pub fn decay_multiplier(elapsed_hours: f64) -> f64 {
    let elapsed_hours = elapsed_hours.max(0.0);
    let multiplier = 1.0 - DECAY_RATE_PER_WEEK * (elapsed_hours / HOURS_PER_WEEK);
    let multiplier = (multiplier * 10.0).round() / 10.0;
    if multiplier <= 0.0 {
        MULTIPLIER_FLOOR
    } else {
        multiplier
    }
}

pub struct InfluenceLedger {
    influences: Arc<dyn InfluenceStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<CellLocks>,
}

impl InfluenceLedger {
    pub fn new(influences: Arc<dyn InfluenceStore>, clock: Arc<dyn Clock>, locks: Arc<CellLocks>) -> Self {
        Self { influences, clock, locks }
    }

    pub fn get(
        &self,
        ctx: &CallContext,
        cell: CellIndex,
        user_id: Uuid,
    ) -> Result<Option<CellInfluence>, TerritoryError> {
        self.influences.get(ctx, cell, user_id)
    }

    /// Decay-then-increment the user's score in `cell`; returns the new score.
    ///
    /// Does not lock. Callers updating the leaderboard afterwards hold the
    /// cell's lock across both steps.
    pub fn touch(&self, ctx: &CallContext, user_id: Uuid, cell: CellIndex) -> Result<f64, TerritoryError> {
        let now = self.clock.now();

        let influence = match self.influences.get(ctx, cell, user_id)? {
            None => CellInfluence {
                id: Uuid::new_v4(),
                cell,
                user_id,
                score: TOUCH_INCREMENT,
                last_updated: now,
            },
            Some(mut influence) => {
                let elapsed_hours =
                    (now - influence.last_updated).num_milliseconds() as f64 / 3_600_000.0;
                let multiplier = decay_multiplier(elapsed_hours);
                influence.score = influence.score * multiplier + TOUCH_INCREMENT;
                influence.last_updated = now;
                influence
            }
        };

        self.influences.put(ctx, &influence)?;
        debug!(h3_index = %cell, user_id = %user_id, score = influence.score, "Influence touched");

        Ok(influence.score)
    }

    /// Touch each cell under its lock; failures are logged and skipped.
    ///
    /// Returns how many cells were touched successfully.
    pub fn touch_many(&self, ctx: &CallContext, user_id: Uuid, cells: &[CellIndex]) -> usize {
        let mut touched = 0;

        for &cell in cells {
            match self.locks.with_lock(cell, || self.touch(ctx, user_id, cell)) {
                Ok(_) => touched += 1,
                Err(e) => {
                    warn!(h3_index = %cell, user_id = %user_id, error = %e, "Failed to touch influence");
                }
            }
        }

        touched
    }

    /// Number of distinct cells the user has influence in
    pub fn cells_touched(&self, ctx: &CallContext, user_id: Uuid) -> Result<u64, TerritoryError> {
        self.influences.count_for_user(ctx, user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::test_support::{cell_at, seed_hex, seed_user};
    use crate::db::TerritoryDb;

    fn setup() -> (Arc<TerritoryDb>, Arc<ManualClock>, InfluenceLedger) {
        let db = Arc::new(TerritoryDb::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = InfluenceLedger::new(db.clone(), clock.clone(), Arc::new(CellLocks::new()));
        (db, clock, ledger)
    }

    #[test]
    fn test_decay_multiplier_table() {
        assert_eq!(decay_multiplier(0.0), 1.0);
        assert_eq!(decay_multiplier(HOURS_PER_WEEK), 0.9);
        assert_eq!(decay_multiplier(5.0 * HOURS_PER_WEEK), 0.5);
        // 1 - 0.1 * (200/168) = 0.881 -> 0.9
        assert_eq!(decay_multiplier(200.0), 0.9);
    }

    #[test]
    fn test_decay_multiplier_floor_from_ten_weeks() {
        assert_eq!(decay_multiplier(10.0 * HOURS_PER_WEEK), MULTIPLIER_FLOOR);
        assert_eq!(decay_multiplier(10.2 * HOURS_PER_WEEK), MULTIPLIER_FLOOR);
        assert_eq!(decay_multiplier(52.0 * HOURS_PER_WEEK), MULTIPLIER_FLOOR);
    }

    #[test]
    fn test_decay_multiplier_ignores_clock_skew() {
        assert_eq!(decay_multiplier(-48.0), 1.0);
    }

    #[test]
    fn test_first_touch_scores_one() {
        let (db, _clock, ledger) = setup();
        let user = seed_user(&db, "ewa");
        let cell = cell_at(52.23, 21.01);
        seed_hex(&db, cell);

        let ctx = CallContext::background();
        assert_eq!(ledger.touch(&ctx, user.id, cell).unwrap(), 1.0);
        assert_eq!(ledger.get(&ctx, cell, user.id).unwrap().unwrap().score, 1.0);
    }

    #[test]
    fn test_immediate_retouch_adds_one() {
        let (db, _clock, ledger) = setup();
        let user = seed_user(&db, "ewa");
        let cell = cell_at(52.23, 21.01);
        seed_hex(&db, cell);

        let ctx = CallContext::background();
        ledger.touch(&ctx, user.id, cell).unwrap();
        assert_eq!(ledger.touch(&ctx, user.id, cell).unwrap(), 2.0);
        assert_eq!(ledger.touch(&ctx, user.id, cell).unwrap(), 3.0);
    }

    #[test]
    fn test_retouch_after_decay() {
        let (db, clock, ledger) = setup();
        let user = seed_user(&db, "ewa");
        let cell = cell_at(52.23, 21.01);
        seed_hex(&db, cell);
        let ctx = CallContext::background();

        ledger.touch(&ctx, user.id, cell).unwrap();
        ledger.touch(&ctx, user.id, cell).unwrap();

        clock.advance(Duration::weeks(5));
        // 2.0 * 0.5 + 1.0
        assert_eq!(ledger.touch(&ctx, user.id, cell).unwrap(), 2.0);

        clock.advance(Duration::weeks(12));
        // 2.0 * 0.1 + 1.0
        let score = ledger.touch(&ctx, user.id, cell).unwrap();
        assert!((score - 1.2).abs() < 1e-9);

        let stored = ledger.get(&ctx, cell, user.id).unwrap().unwrap();
        assert_eq!(stored.last_updated, clock.now());
    }

    #[test]
    fn test_touch_many_counts_successes_only() {
        let (db, _clock, ledger) = setup();
        let user = seed_user(&db, "ewa");
        let known = cell_at(52.23, 21.01);
        let unregistered = cell_at(50.06, 19.94);
        seed_hex(&db, known);

        let ctx = CallContext::background();
        // No hex row for the second cell, so its insert violates the foreign key
        assert_eq!(ledger.touch_many(&ctx, user.id, &[unregistered, known]), 1);
        assert_eq!(ledger.cells_touched(&ctx, user.id).unwrap(), 1);
    }
}
