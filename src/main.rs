//! Territory Engine CLI
//!
//! Drives the engine against a local SQLite database. Results are printed as
//! pretty JSON on stdout, logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Register (or look up) a user
//! territory-engine user --external-id auth0|42 --username marta
//!
//! # Ingest an activity from a file, or from stdin when --file is omitted
//! territory-engine ingest --file activity.json
//!
//! # Leaderboards inside a bounding box
//! territory-engine region --min-lat 52.22 --min-lng 21.00 --max-lat 52.24 --max-lng 21.02
//!
//! # Users leading the most cells
//! territory-engine global --limit 10
//!
//! # A user's rank in one cell
//! territory-engine rank --cell 8928308280fffff --user <uuid>
//!
//! # Activity totals for a user
//! territory-engine stats --user <uuid>
//!
//! # Cell ids along a GPS track, ready for an activity's h3_indexes
//! territory-engine track --file track.json
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use h3o::CellIndex;
use serde::Serialize;
use territory_engine::cells::{self, BoundingBox};
use territory_engine::{Config, CreateActivityRequest, Services, TerritoryDb};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "territory-engine")]
#[command(about = "Influence and leaderboards for H3 hex territory")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "TERRITORY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "TERRITORY_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// H3 resolution cells must be at
    #[arg(long, env = "TERRITORY_RESOLUTION")]
    resolution: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find or create the user for an identity-provider subject
    User {
        #[arg(long)]
        external_id: String,
        #[arg(long)]
        username: String,
    },
    /// Ingest an activity (JSON CreateActivityRequest)
    Ingest {
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Leaderboards of every cell in a bounding box
    Region {
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        min_lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        max_lng: f64,
    },
    /// Users ranked by number of cells led
    Global {
        /// Defaults to the configured size
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rank of a user on a cell leaderboard
    Rank {
        /// H3 index, hex string or 64-bit integer
        #[arg(long)]
        cell: String,
        #[arg(long)]
        user: Uuid,
    },
    /// Activity totals for a user
    Stats {
        #[arg(long)]
        user: Uuid,
    },
    /// Map a GPS track (JSON `[[lat, lng], ...]`) to the cell ids it visits
    Track {
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct RankOutput {
    h3_index: String,
    user_id: Uuid,
    position: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("territory_engine=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        resolution = config.resolution,
        "Starting territory-engine"
    );

    let db = Arc::new(TerritoryDb::open(&config.storage_dir)?);

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if args.config.is_none() && !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let services = Services::open(db, &config)?;
    let ctx = services.call_context();

    match args.command {
        Command::User { external_id, username } => {
            print_json(&services.users.ensure_user(&ctx, &external_id, &username)?)
        }
        Command::Ingest { file } => {
            let req: CreateActivityRequest =
                serde_json::from_str(&read_input(file)?).context("invalid activity JSON")?;
            print_json(&services.activity.create_activity(&ctx, req)?)
        }
        Command::Region { min_lat, min_lng, max_lat, max_lng } => {
            let bbox = BoundingBox::new(min_lat, min_lng, max_lat, max_lng);
            print_json(&services.leaderboard.region_leaderboards(&ctx, &bbox)?)
        }
        Command::Global { limit } => {
            let top = match limit {
                Some(limit) => services.global.global_top(&ctx, limit)?,
                None => services.global.top(&ctx)?,
            };
            print_json(&top)
        }
        Command::Rank { cell, user } => {
            let cell = parse_cell(&cell, &config)?;
            let position = services.leaderboard.position_of(&ctx, cell, user)?;
            print_json(&RankOutput { h3_index: cell.to_string(), user_id: user, position })
        }
        Command::Stats { user } => print_json(&services.activity.user_stats(&ctx, user)?),
        Command::Track { file } => {
            let points: Vec<(f64, f64)> =
                serde_json::from_str(&read_input(file)?).context("invalid track JSON")?;
            let visited = cells::cells_along_track(&points, config.h3_resolution()?)?;
            let h3_indexes: Vec<u64> = visited.into_iter().map(u64::from).collect();
            print_json(&h3_indexes)
        }
    }
}

/// Contents of `file`, or all of stdin
fn read_input(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn parse_cell(raw: &str, config: &Config) -> anyhow::Result<CellIndex> {
    let value = match raw.parse::<u64>() {
        Ok(value) => value,
        Err(_) => u64::from_str_radix(raw.trim_start_matches("0x"), 16)
            .with_context(|| format!("'{}' is not an H3 index", raw))?,
    };
    Ok(cells::validate_cell(value, config.h3_resolution()?)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
