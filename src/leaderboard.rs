use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{PersistenceError, UpstreamError};
use crate::ranking::{placeholder_players, rank_players, reprize};
use crate::refresh::Refresher;
use crate::types::{LeaderboardResponse, Origin, RankedPlayer, SourceKey, SourceSnapshot};

/// Fallback tiers, tried in order until one yields a leaderboard.
pub const FALLBACK_CHAIN: [Origin; 4] = [
    Origin::Live,
    Origin::LastPresented,
    Origin::Persisted,
    Origin::Placeholder,
];

#[derive(Debug, thiserror::Error)]
enum ProviderError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// The last leaderboard handed out for a source.
#[derive(Debug, Clone)]
struct Presented {
    players: Vec<RankedPlayer>,
    total_players: usize,
    last_updated: DateTime<Utc>,
}

/// Builds public leaderboard responses from the snapshot cache.
pub struct Leaderboard {
    refresher: Arc<Refresher>,
    last_presented: RwLock<HashMap<SourceKey, Presented>>,
}

impl Leaderboard {
    pub fn new(refresher: Arc<Refresher>) -> Self {
        Self {
            refresher,
            last_presented: RwLock::new(HashMap::new()),
        }
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// Ranked top-`limit` leaderboard for `key`. Never fails: each tier of
    /// [`FALLBACK_CHAIN`] is tried in turn and the placeholder always answers.
    pub async fn present(
        &self,
        key: SourceKey,
        limit: usize,
        total_prize_pool: Decimal,
    ) -> LeaderboardResponse {
        for origin in FALLBACK_CHAIN {
            match self.provide(origin, key, limit, total_prize_pool).await {
                Ok(Some(response)) => {
                    debug!("Serving `{key}` leaderboard from {origin:?}");
                    return response;
                }
                Ok(None) => {}
                Err(e) => warn!("Leaderboard tier {origin:?} for `{key}` failed: {e}"),
            }
        }
        placeholder(total_prize_pool)
    }

    async fn provide(
        &self,
        origin: Origin,
        key: SourceKey,
        limit: usize,
        total_prize_pool: Decimal,
    ) -> Result<Option<LeaderboardResponse>, ProviderError> {
        match origin {
            Origin::Live => {
                let mut snapshot = self.refresher.cache().get(key).await;
                if snapshot.is_empty() {
                    snapshot = self.refresher.refresh_source(key).await?;
                }
                let response = from_snapshot(&snapshot, limit, total_prize_pool, Origin::Live);
                self.remember(key, &response).await;
                Ok(Some(response))
            }
            Origin::LastPresented => Ok(self.last_presented.read().await.get(&key).map(|p| {
                LeaderboardResponse {
                    players: reprize(&p.players),
                    total_prize_pool,
                    total_players: p.total_players,
                    last_updated: p.last_updated,
                    origin: Origin::LastPresented,
                }
            })),
            Origin::Persisted => Ok(self
                .refresher
                .cache()
                .load_persisted(key)
                .await?
                .filter(|snap| !snap.is_empty())
                .map(|snap| from_snapshot(&snap, limit, total_prize_pool, Origin::Persisted))),
            Origin::Placeholder => Ok(Some(placeholder(total_prize_pool))),
        }
    }

    async fn remember(&self, key: SourceKey, response: &LeaderboardResponse) {
        self.last_presented.write().await.insert(
            key,
            Presented {
                players: response.players.clone(),
                total_players: response.total_players,
                last_updated: response.last_updated,
            },
        );
    }

    /// Forget every cached leaderboard, in memory. Used when a competition resets.
    pub async fn clear(&self) {
        self.last_presented.write().await.clear();
        self.refresher.cache().clear().await;
    }
}

fn from_snapshot(
    snapshot: &SourceSnapshot,
    limit: usize,
    total_prize_pool: Decimal,
    origin: Origin,
) -> LeaderboardResponse {
    LeaderboardResponse {
        players: rank_players(&snapshot.players, limit),
        total_prize_pool,
        total_players: snapshot.players.len(),
        last_updated: snapshot.last_updated_at.unwrap_or_else(Utc::now),
        origin,
    }
}

fn placeholder(total_prize_pool: Decimal) -> LeaderboardResponse {
    let players = placeholder_players();
    LeaderboardResponse {
        total_players: players.len(),
        players,
        total_prize_pool,
        last_updated: Utc::now(),
        origin: Origin::Placeholder,
    }
}
