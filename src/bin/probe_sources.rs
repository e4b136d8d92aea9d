//! Probe: fetch every configured source once.
//!
//! Prints, per source:
//! - record count and fetch latency
//! - the top rows as reported upstream (unmasked, local use only)
//!
//! then the combined leaderboard exactly as the API would serve it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use rust_decimal_macros::dec;

use wager_leaderboard::aggregate::aggregate;
use wager_leaderboard::cache::SnapshotCache;
use wager_leaderboard::config::{AppConfig, CONFIG_PATH};
use wager_leaderboard::leaderboard::Leaderboard;
use wager_leaderboard::ranking::sort_by_wager;
use wager_leaderboard::refresh::Refresher;
use wager_leaderboard::reporter;
use wager_leaderboard::sources::{build_sources, http_client};
use wager_leaderboard::types::SourceKey;

#[derive(Parser)]
#[command(name = "probe_sources", about = "Fetch each configured wager source once")]
struct Args {
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Rows to print per source
    #[arg(long, default_value_t = 5)]
    sample: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env()?;
    let client = http_client(Duration::from_secs(config.settings.request_timeout_secs))?;
    let sources = build_sources(&config.sources, &client)?;

    println!("=== Probe: wager sources ===");
    println!();

    let mut fetched = Vec::new();
    for src in &sources {
        println!("--- {} ({}) ---", src.key, src.adapter.describe());
        let start = Instant::now();
        match src.adapter.fetch().await {
            Ok(records) => {
                println!("Records: {}", records.len());
                println!("Latency: {:?}", start.elapsed());
                let players = aggregate(std::slice::from_ref(&records));
                println!("Unique players: {}", players.len());
                for p in sort_by_wager(&players).into_iter().take(args.sample) {
                    println!("  {:<24} {}", p.username, p.total_wager);
                }
                fetched.push(records);
            }
            Err(e) => {
                println!("FAILED after {:?}: {e}", start.elapsed());
                if e.is_timeout() {
                    println!("  (timed out after {}s)", config.settings.request_timeout_secs);
                }
            }
        }
        println!();
    }

    println!("--- combined ---");
    let combined = aggregate(&fetched);
    println!("Unique players across sources: {}", combined.len());
    println!();

    // Run the presenter against a throwaway cache so the probe never
    // touches the real snapshot file.
    let scratch = std::env::temp_dir().join(format!("probe_sources_{}.json", std::process::id()));
    let cache = Arc::new(SnapshotCache::new(&scratch));
    cache.set(SourceKey::All, combined).await;
    let leaderboard = Leaderboard::new(Arc::new(Refresher::new(sources, cache)));
    let response = leaderboard
        .present(SourceKey::All, config.settings.leaderboard_limit, dec!(0))
        .await;
    reporter::report_leaderboard(&response);
    let _ = std::fs::remove_file(&scratch);

    Ok(())
}
