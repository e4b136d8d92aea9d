use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifies one leaderboard view: the combined view or a single configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKey {
    All,
    Com,
    Us,
}

impl SourceKey {
    /// Every key the cache tracks, combined view first.
    pub const ALL_KEYS: [SourceKey; 3] = [SourceKey::All, SourceKey::Com, SourceKey::Us];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Com => "com",
            Self::Us => "us",
        }
    }

    /// Resolve the `?source=` query parameter. Missing or unknown values
    /// select the combined view.
    pub fn from_query(param: Option<&str>) -> Self {
        match param.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
            Some("com") => Self::Com,
            Some("us") => Self::Us,
            _ => Self::All,
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(username, wager)` pair as reported by an upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWagerRecord {
    pub username: String,
    pub wager_amount: Decimal,
}

impl RawWagerRecord {
    pub fn new(username: impl Into<String>, wager_amount: Decimal) -> Self {
        Self {
            username: username.into(),
            wager_amount,
        }
    }
}

/// A player's wager total summed across every contributing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPlayer {
    pub username: String,
    pub total_wager: Decimal,
}

/// The cached player list for one source at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    pub source: SourceKey,
    pub players: Vec<AggregatedPlayer>,
    /// `None` until the first successful refresh.
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl SourceSnapshot {
    pub fn empty(source: SourceKey) -> Self {
        Self {
            source,
            players: Vec::new(),
            last_updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// A player row as shown publicly: masked name, rank and prize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlayer {
    pub username: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_wager: Decimal,
    pub rank: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub prize: Decimal,
}

/// Which tier of the fallback chain produced a leaderboard response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    Live,
    LastPresented,
    Persisted,
    Placeholder,
}

/// Body of `GET /api/leaderboard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub players: Vec<RankedPlayer>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_prize_pool: Decimal,
    /// Size of the full aggregate, before truncation to the display limit.
    pub total_players: usize,
    pub last_updated: DateTime<Utc>,
    pub origin: Origin,
}

/// The competition period and its advertised prize pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionWindow {
    pub id: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_prize_pool: Decimal,
    pub is_active: bool,
}

/// Per-source outcome of one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceKey,
    pub ok: bool,
    pub records: usize,
    pub players: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a completed refresh cycle, emitted as a JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub timestamp: String,
    pub sources: Vec<SourceReport>,
    pub combined_players: usize,
    pub persisted: bool,
}
