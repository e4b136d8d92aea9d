use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::types::{AggregatedPlayer, SourceKey, SourceSnapshot};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout of the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    snapshots: BTreeMap<SourceKey, SourceSnapshot>,
}

/// Latest aggregated player list per source, backed by a JSON file.
///
/// Snapshots are replaced wholesale: `set` swaps in a new `Arc`, so a reader
/// holding the previous one keeps a consistent view.
pub struct SnapshotCache {
    path: PathBuf,
    snapshots: RwLock<HashMap<SourceKey, Arc<SourceSnapshot>>>,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot for `key`, or an empty one if nothing has been stored.
    pub async fn get(&self, key: SourceKey) -> Arc<SourceSnapshot> {
        self.snapshots
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Arc::new(SourceSnapshot::empty(key)))
    }

    /// Replace the player list for `key` and stamp it with the current time.
    pub async fn set(&self, key: SourceKey, players: Vec<AggregatedPlayer>) -> Arc<SourceSnapshot> {
        let snapshot = Arc::new(SourceSnapshot {
            source: key,
            players,
            last_updated_at: Some(Utc::now()),
        });
        self.snapshots.write().await.insert(key, snapshot.clone());
        snapshot
    }

    /// Drop every in-memory snapshot. The file on disk is left alone.
    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }

    /// Write every tracked snapshot to disk via a temp file and rename.
    pub async fn persist(&self) -> Result<(), PersistenceError> {
        let file = {
            let guard = self.snapshots.read().await;
            SnapshotFile {
                version: SNAPSHOT_VERSION,
                snapshots: guard
                    .iter()
                    .map(|(key, snap)| (*key, SourceSnapshot::clone(snap)))
                    .collect(),
            }
        };
        let payload = serde_json::to_vec_pretty(&file).map_err(|source| PersistenceError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| PersistenceError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|source| PersistenceError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!("Saved leaderboard snapshot to {}", self.path.display());
        Ok(())
    }

    /// Load snapshots from disk, best-effort. Failures are logged and leave
    /// the cache as it was.
    pub async fn restore(&self) -> bool {
        match self.read_file().await {
            Ok(Some(file)) => {
                let count = file.snapshots.len();
                let mut guard = self.snapshots.write().await;
                for (key, snap) in file.snapshots {
                    guard.insert(key, Arc::new(snap));
                }
                info!(
                    "Restored {count} leaderboard snapshot(s) from {}",
                    self.path.display()
                );
                true
            }
            Ok(None) => {
                info!("No leaderboard snapshot at {}", self.path.display());
                false
            }
            Err(e) => {
                warn!("Failed to load leaderboard snapshot: {e}");
                false
            }
        }
    }

    /// Read a single snapshot straight from disk, bypassing memory.
    pub async fn load_persisted(
        &self,
        key: SourceKey,
    ) -> Result<Option<SourceSnapshot>, PersistenceError> {
        Ok(self
            .read_file()
            .await?
            .and_then(|mut file| file.snapshots.remove(&key)))
    }

    async fn read_file(&self) -> Result<Option<SnapshotFile>, PersistenceError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let file: SnapshotFile =
            serde_json::from_slice(&raw).map_err(|source| PersistenceError::Json {
                path: self.path.clone(),
                source,
            })?;
        if file.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::Version {
                found: file.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(Some(file))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
