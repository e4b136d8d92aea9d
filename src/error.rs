use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::types::SourceKey;

/// A source adapter could not retrieve or interpret upstream data.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unrecognized payload: {0}")]
    Schema(String),
    #[error("upstream rejected the request: {0}")]
    Rejected(String),
    #[error("no source configured for `{0}`")]
    NotConfigured(SourceKey),
}

impl UpstreamError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

/// The snapshot file could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot file version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CompetitionError {
    #[error("no active competition")]
    NoActiveCompetition,
    #[error("competition ending {days} day(s) after {from} is out of range")]
    DateOutOfRange { from: DateTime<Utc>, days: u64 },
}
