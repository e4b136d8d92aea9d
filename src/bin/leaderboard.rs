use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use wager_leaderboard::cache::SnapshotCache;
use wager_leaderboard::competition::CompetitionStore;
use wager_leaderboard::config::{AppConfig, CONFIG_PATH};
use wager_leaderboard::leaderboard::Leaderboard;
use wager_leaderboard::ranking::prize_table_total;
use wager_leaderboard::refresh::{Refresher, spawn_scheduler};
use wager_leaderboard::server::{AppState, build_router};
use wager_leaderboard::sources::{build_sources, http_client};

#[derive(Parser)]
#[command(name = "leaderboard", about = "Wager competition leaderboard server")]
struct Args {
    /// Path to the TOML config file (optional; defaults apply if missing)
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Address to listen on, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load config
    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env()?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    info!(
        "Loaded config ({} source(s), refresh every {}s)",
        config.sources.len(),
        config.settings.refresh_interval_secs,
    );
    if config.sources.is_empty() {
        warn!("No sources configured, the leaderboard will only serve fallback data");
    }
    if config.competition.prize_pool != prize_table_total() {
        warn!(
            "Configured prize pool {} differs from the placement prizes total {}",
            config.competition.prize_pool,
            prize_table_total()
        );
    }

    let client = http_client(Duration::from_secs(config.settings.request_timeout_secs))
        .context("failed to build http client")?;
    let sources = build_sources(&config.sources, &client).context("invalid source config")?;
    for src in &sources {
        info!("Source `{}`: {}", src.key, src.adapter.describe());
    }

    let cache = Arc::new(SnapshotCache::new(&config.settings.snapshot_path));
    info!("Snapshot file: {}", cache.path().display());
    // Restore before anything can write to the cache
    cache.restore().await;

    let refresher = Arc::new(Refresher::new(sources, cache));
    let competitions = Arc::new(
        CompetitionStore::from_config(&config.competition, Utc::now())
            .context("invalid competition window")?,
    );
    let leaderboard = Arc::new(Leaderboard::new(refresher.clone()));

    // Immediate refresh, then hourly
    let scheduler = spawn_scheduler(
        refresher,
        Duration::from_secs(config.settings.refresh_interval_secs),
    );

    let app = build_router(AppState {
        leaderboard,
        competitions,
        limit: config.settings.leaderboard_limit,
    });
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!("Listening on {}. Press Ctrl+C to stop.", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    scheduler.abort();
    Ok(())
}
