//! Integration tests for activity ingestion against an on-disk database
//!
//! Exercises the whole pipeline (validation, hexes, influence, cell and
//! global leaderboards) through `Services`, the same entry point the CLI uses.

use std::sync::Arc;

use chrono::{Duration, Utc};
use h3o::{CellIndex, LatLng, Resolution};
use tempfile::TempDir;
use territory_engine::{
    BoundingBox, CallContext, Clock, Config, CreateActivityRequest, ManualClock, Services, Stores,
    TerritoryDb, User,
};
use uuid::Uuid;

struct Harness {
    services: Arc<Services>,
    clock: Arc<ManualClock>,
    db: Arc<TerritoryDb>,
    _temp: TempDir,
}

/// Services over a fresh database in a temporary directory
fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let config = Config {
        storage_dir: temp.path().to_path_buf(),
        store_timeout_ms: 0,
        ..Default::default()
    };
    let db = Arc::new(TerritoryDb::open(&config.storage_dir).unwrap());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let services = Services::new(Stores::sqlite(db.clone()), &config, clock.clone()).unwrap();

    Harness {
        services: Arc::new(services),
        clock,
        db,
        _temp: temp,
    }
}

fn cell(lat: f64, lng: f64) -> CellIndex {
    LatLng::new(lat, lng).unwrap().to_cell(Resolution::Nine)
}

fn user(h: &Harness, name: &str) -> User {
    h.services
        .users
        .ensure_user(&CallContext::background(), &format!("auth0|{}", name), name)
        .unwrap()
}

fn ingest(services: &Services, user_id: Uuid, cells: &[CellIndex]) {
    let req = CreateActivityRequest {
        user_id,
        duration: 900.0,
        distance: 2500.0,
        h3_indexes: cells.iter().map(|c| u64::from(*c)).collect(),
    };
    let response = services.activity.create_activity(&services.call_context(), req).unwrap();
    assert!(response.warnings.is_empty(), "unexpected warnings: {:?}", response.warnings);
}

#[test]
fn test_request_json_roundtrip_through_ingest() {
    let h = harness();
    let marta = user(&h, "marta");
    let target = cell(52.2297, 21.0122);

    let body = format!(
        r#"{{"user_id":"{}","duration":1200.5,"distance":3400.0,"h3_indexes":[{}]}}"#,
        marta.id,
        u64::from(target)
    );
    let req: CreateActivityRequest = serde_json::from_str(&body).unwrap();
    let response = h
        .services
        .activity
        .create_activity(&CallContext::background(), req)
        .unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["h3_indexes"][0], target.to_string());
    assert_eq!(json["cells_processed"], 1);
    assert!(json.get("warnings").is_none());
}

#[test]
fn test_region_query_returns_only_cells_inside() {
    let h = harness();
    let marta = user(&h, "marta");

    let warsaw = [cell(52.2297, 21.0122), cell(52.2400, 21.0300)];
    let krakow = cell(50.0647, 19.9450);
    ingest(&h.services, marta.id, &[warsaw[0], warsaw[1], krakow]);

    let ctx = CallContext::background();
    let bbox = BoundingBox::new(52.20, 20.98, 52.26, 21.05);
    let boards = h.services.leaderboard.region_leaderboards(&ctx, &bbox).unwrap();

    let mut expected = warsaw.to_vec();
    expected.sort();
    let found: Vec<CellIndex> = boards.iter().map(|b| b.cell).collect();
    assert_eq!(found, expected);
    assert!(boards.iter().all(|b| b.top_users[0].user_id == marta.id));
}

#[test]
fn test_global_leaderboard_from_ingested_activities() {
    let h = harness();
    let x = user(&h, "xavier");
    let y = user(&h, "yara");

    let cells = [
        cell(52.2297, 21.0122),
        cell(50.0647, 19.9450),
        cell(51.1079, 17.0385),
        cell(54.3520, 18.6466),
        cell(53.4285, 14.5528),
    ];

    // X first everywhere it goes, Y takes the last two with a second visit
    ingest(&h.services, x.id, &cells);
    h.clock.advance(Duration::minutes(5));
    ingest(&h.services, y.id, &cells);
    ingest(&h.services, y.id, &cells[3..]);

    let ctx = CallContext::background();
    let top = h.services.global.top(&ctx).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!((top[0].user_id, top[0].top_count), (x.id, 3));
    assert_eq!((top[1].user_id, top[1].top_count), (y.id, 2));
    assert_eq!(top[1].username, "yara");

    assert_eq!(h.services.leaderboard.position_of(&ctx, cells[0], y.id).unwrap(), Some(2));
    assert_eq!(h.services.leaderboard.position_of(&ctx, cells[4], x.id).unwrap(), Some(2));
}

#[test]
fn test_decayed_leader_is_overtaken() {
    let h = harness();
    let old = user(&h, "old-guard");
    let new = user(&h, "newcomer");
    let target = cell(52.2297, 21.0122);

    for _ in 0..3 {
        ingest(&h.services, old.id, &[target]);
    }

    // Twelve weeks later the old score only counts for 10% when refreshed
    h.clock.advance(Duration::weeks(12));
    ingest(&h.services, new.id, &[target]);
    ingest(&h.services, new.id, &[target]);
    ingest(&h.services, old.id, &[target]);

    let ctx = CallContext::background();
    let board = h.services.leaderboard.get(&ctx, target).unwrap().unwrap();
    assert_eq!(board.leader().unwrap().user_id, new.id);
    assert_eq!(board.top_users[0].score, 2.0);
    assert!((board.top_users[1].score - 1.3).abs() < 1e-9);
}

#[test]
fn test_stats_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let config = Config {
        storage_dir: temp.path().to_path_buf(),
        ..Default::default()
    };
    let target = cell(52.2297, 21.0122);

    let user_id = {
        let db = Arc::new(TerritoryDb::open(&config.storage_dir).unwrap());
        let services = Services::open(db, &config).unwrap();
        let marta = services
            .users
            .ensure_user(&CallContext::background(), "auth0|marta", "marta")
            .unwrap();
        ingest(&services, marta.id, &[target]);
        marta.id
    };

    let db = Arc::new(TerritoryDb::open(&config.storage_dir).unwrap());
    let services = Services::open(db.clone(), &config).unwrap();
    let stats = services.activity.user_stats(&CallContext::background(), user_id).unwrap();

    assert_eq!(stats.activities_recorded, 1);
    assert_eq!(stats.hexes_visited, 1);
    assert_eq!(stats.weekly_activities[6], 1);
    assert_eq!(db.stats().unwrap().leaderboard_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activities_do_not_lose_updates() {
    let h = harness();
    let shared = cell(52.2297, 21.0122);
    let other = cell(52.2400, 21.0300);
    let users: Vec<User> = (0..4).map(|i| user(&h, &format!("runner{}", i))).collect();
    const ROUNDS: usize = 20;

    let mut tasks = Vec::new();
    for runner in &users {
        let services = h.services.clone();
        let user_id = runner.id;
        tasks.push(tokio::task::spawn_blocking(move || {
            for _ in 0..ROUNDS {
                ingest(&services, user_id, &[shared, other]);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // The clock never moves, so every touch adds exactly 1.0
    let ctx = CallContext::background();
    for runner in &users {
        let influence = h.services.ledger.get(&ctx, shared, runner.id).unwrap().unwrap();
        assert_eq!(influence.score, ROUNDS as f64);
        assert_eq!(influence.last_updated, h.clock.now());
    }

    for target in [shared, other] {
        let board = h.services.leaderboard.get(&ctx, target).unwrap().unwrap();
        assert_eq!(board.top_users.len(), users.len());
        assert!(board.top_users.iter().all(|e| e.score == ROUNDS as f64));
    }

    let stats = h.db.stats().unwrap();
    assert_eq!(stats.activity_count, (users.len() * ROUNDS) as u64);
    assert_eq!(stats.hex_count, 2);
}
