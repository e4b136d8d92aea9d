use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregate::{aggregate, total_volume};
use crate::cache::SnapshotCache;
use crate::error::UpstreamError;
use crate::reporter;
use crate::sources::ConfiguredSource;
use crate::types::{RawWagerRecord, RefreshReport, SourceKey, SourceReport, SourceSnapshot};

/// Whether a refresh cycle is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// Result of asking for a refresh cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Another cycle was already running; nothing was done.
    Skipped,
    Completed(RefreshReport),
}

/// Resets the refreshing flag when a cycle ends, including on panic.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives source fetches, aggregation and cache writes.
pub struct Refresher {
    sources: Vec<ConfiguredSource>,
    cache: Arc<SnapshotCache>,
    refreshing: AtomicBool,
}

impl Refresher {
    pub fn new(sources: Vec<ConfiguredSource>, cache: Arc<SnapshotCache>) -> Self {
        Self {
            sources,
            cache,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::Acquire) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Fetch every source concurrently. Failures are returned per source.
    async fn fetch_sources<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a ConfiguredSource>,
    ) -> Vec<(SourceKey, Result<Vec<RawWagerRecord>, UpstreamError>)> {
        join_all(sources.into_iter().map(|src| async move {
            let result = src.adapter.fetch().await;
            if let Err(e) = &result {
                warn!("Fetch from {} ({}) failed: {e}", src.key, src.adapter.describe());
            }
            (src.key, result)
        }))
        .await
    }

    /// Run one full refresh cycle unless one is already in flight.
    ///
    /// Each source is aggregated on its own and all sources are aggregated
    /// together for the combined view. A failed source contributes nothing to
    /// the combined view and keeps its previous per-source snapshot. If every
    /// source fails, nothing is written.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Refresh already in progress, skipping");
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard(&self.refreshing);

        let results = self.fetch_sources(&self.sources).await;

        let mut reports = Vec::with_capacity(results.len());
        let mut combined_inputs = Vec::with_capacity(results.len());
        for (key, result) in results {
            match result {
                Ok(records) => {
                    let players = aggregate(std::slice::from_ref(&records));
                    reports.push(SourceReport {
                        source: key,
                        ok: true,
                        records: records.len(),
                        players: players.len(),
                        error: None,
                    });
                    self.cache.set(key, players).await;
                    combined_inputs.push(records);
                }
                Err(e) => {
                    reports.push(SourceReport {
                        source: key,
                        ok: false,
                        records: 0,
                        players: 0,
                        error: Some(e.to_string()),
                    });
                    combined_inputs.push(Vec::new());
                }
            }
        }

        let any_ok = reports.iter().any(|r| r.ok);
        let mut combined_players = 0;
        let mut persisted = false;
        if any_ok {
            let combined = aggregate(&combined_inputs);
            combined_players = combined.len();
            info!(
                "Refreshed combined leaderboard: {} players, {} wagered",
                combined.len(),
                total_volume(&combined)
            );
            self.cache.set(SourceKey::All, combined).await;
            match self.cache.persist().await {
                Ok(()) => persisted = true,
                Err(e) => warn!("Failed to save leaderboard snapshot: {e}"),
            }
        } else if !self.sources.is_empty() {
            warn!("Every source failed, keeping existing snapshots");
        }

        let report = RefreshReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            sources: reports,
            combined_players,
            persisted,
        };
        reporter::report_cycle(&report);
        CycleOutcome::Completed(report)
    }

    /// On-demand fetch + aggregate + cache write for a single view.
    ///
    /// Fails when `key` has no configured source or when every source it
    /// depends on failed.
    pub async fn refresh_source(
        &self,
        key: SourceKey,
    ) -> Result<Arc<SourceSnapshot>, UpstreamError> {
        let selected: Vec<&ConfiguredSource> = self
            .sources
            .iter()
            .filter(|s| key == SourceKey::All || s.key == key)
            .collect();
        if selected.is_empty() {
            return Err(UpstreamError::NotConfigured(key));
        }

        let mut inputs = Vec::with_capacity(selected.len());
        let mut last_err = None;
        for (_, result) in self.fetch_sources(selected).await {
            match result {
                Ok(records) => inputs.push(records),
                Err(e) => last_err = Some(e),
            }
        }
        if inputs.is_empty()
            && let Some(e) = last_err
        {
            return Err(e);
        }

        let players = aggregate(&inputs);
        info!("On-demand refresh of `{key}`: {} players", players.len());
        let snapshot = self.cache.set(key, players).await;
        if let Err(e) = self.cache.persist().await {
            warn!("Failed to save leaderboard snapshot: {e}");
        }
        Ok(snapshot)
    }
}

/// Start the refresh loop: refresh immediately, then every `period`. Each
/// tick runs on its own task so a slow cycle makes the next tick a no-op
/// instead of delaying it.
///
/// Call [`SnapshotCache::restore`] before this and before serving requests;
/// the loop never reads the snapshot file.
pub fn spawn_scheduler(refresher: Arc<Refresher>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            // First tick completes immediately: the startup refresh.
            ticker.tick().await;
            let refresher = refresher.clone();
            tokio::spawn(async move {
                if let CycleOutcome::Completed(report) = refresher.run_cycle().await {
                    let failed = report.sources.iter().filter(|s| !s.ok).count();
                    if failed > 0 {
                        warn!("Refresh cycle finished with {failed} failed source(s)");
                    }
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::WagerSource;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct FixedSource {
        records: Vec<RawWagerRecord>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(records: Vec<(&str, Decimal)>) -> Self {
            Self {
                records: records
                    .into_iter()
                    .map(|(n, w)| RawWagerRecord::new(n, w))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WagerSource for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl WagerSource for FailingSource {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError> {
            Err(UpstreamError::Schema("boom".to_string()))
        }
    }

    /// Blocks in `fetch` until released, to hold a cycle open.
    struct GatedSource {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl WagerSource for GatedSource {
        fn describe(&self) -> String {
            "gated".to_string()
        }

        async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![RawWagerRecord::new("gate", dec!(1))])
        }
    }

    fn source(key: SourceKey, adapter: Arc<dyn WagerSource>) -> ConfiguredSource {
        ConfiguredSource { key, adapter }
    }

    fn totals(snap: &SourceSnapshot) -> Vec<(String, Decimal)> {
        snap.players
            .iter()
            .map(|p| (p.username.clone(), p.total_wager))
            .collect()
    }

    #[tokio::test]
    async fn cycle_writes_each_source_and_combined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        let refresher = Refresher::new(
            vec![
                source(
                    SourceKey::Com,
                    Arc::new(FixedSource::new(vec![("A", dec!(100)), ("B", dec!(50))])),
                ),
                source(
                    SourceKey::Us,
                    Arc::new(FixedSource::new(vec![("A", dec!(30)), ("C", dec!(20))])),
                ),
            ],
            cache.clone(),
        );

        let CycleOutcome::Completed(report) = refresher.run_cycle().await else {
            panic!("cycle skipped");
        };
        assert!(report.persisted);
        assert_eq!(report.combined_players, 3);
        assert_eq!(refresher.state(), RefreshState::Idle);

        assert_eq!(
            totals(&*cache.get(SourceKey::All).await),
            vec![
                ("A".to_string(), dec!(130)),
                ("B".to_string(), dec!(50)),
                ("C".to_string(), dec!(20)),
            ]
        );
        assert_eq!(cache.get(SourceKey::Com).await.players.len(), 2);
        assert_eq!(cache.get(SourceKey::Us).await.players.len(), 2);

        // persisted once at the end of the cycle
        let on_disk = cache.load_persisted(SourceKey::All).await.unwrap().unwrap();
        assert_eq!(on_disk.players.len(), 3);
    }

    #[tokio::test]
    async fn failing_source_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        cache
            .set(
                SourceKey::Us,
                vec![crate::types::AggregatedPlayer {
                    username: "old".to_string(),
                    total_wager: dec!(5),
                }],
            )
            .await;
        let refresher = Refresher::new(
            vec![
                source(
                    SourceKey::Com,
                    Arc::new(FixedSource::new(vec![("A", dec!(10))])),
                ),
                source(SourceKey::Us, Arc::new(FailingSource)),
            ],
            cache.clone(),
        );

        let CycleOutcome::Completed(report) = refresher.run_cycle().await else {
            panic!("cycle skipped");
        };
        let us = report
            .sources
            .iter()
            .find(|s| s.source == SourceKey::Us)
            .unwrap();
        assert!(!us.ok);
        assert!(us.error.as_deref().unwrap().contains("boom"));

        assert_eq!(
            totals(&*cache.get(SourceKey::All).await),
            vec![("A".to_string(), dec!(10))]
        );
        // failed source keeps its last good snapshot
        assert_eq!(cache.get(SourceKey::Us).await.players[0].username, "old");
    }

    #[tokio::test]
    async fn all_sources_failing_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lb.json");
        let cache = Arc::new(SnapshotCache::new(&path));
        let refresher = Refresher::new(
            vec![
                source(SourceKey::Com, Arc::new(FailingSource)),
                source(SourceKey::Us, Arc::new(FailingSource)),
            ],
            cache.clone(),
        );
        let CycleOutcome::Completed(report) = refresher.run_cycle().await else {
            panic!("cycle skipped");
        };
        assert!(!report.persisted);
        assert!(cache.get(SourceKey::All).await.last_updated_at.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        let gate = Arc::new(GatedSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let refresher = Arc::new(Refresher::new(
            vec![source(SourceKey::Com, gate.clone())],
            cache,
        ));

        let first = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.run_cycle().await }
        });
        gate.entered.notified().await;
        assert_eq!(refresher.state(), RefreshState::Refreshing);

        assert!(matches!(refresher.run_cycle().await, CycleOutcome::Skipped));

        gate.release.notify_one();
        assert!(matches!(
            first.await.unwrap(),
            CycleOutcome::Completed(_)
        ));
        assert_eq!(refresher.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn refresh_source_single_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        let com = Arc::new(FixedSource::new(vec![("A", dec!(1)), ("A", dec!(2))]));
        let us = Arc::new(FixedSource::new(vec![("Z", dec!(9))]));
        let refresher = Refresher::new(
            vec![
                source(SourceKey::Com, com.clone()),
                source(SourceKey::Us, us.clone()),
            ],
            cache.clone(),
        );

        let snap = refresher.refresh_source(SourceKey::Com).await.unwrap();
        assert_eq!(totals(&snap), vec![("A".to_string(), dec!(3))]);
        assert_eq!(com.calls.load(Ordering::SeqCst), 1);
        assert_eq!(us.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*cache.get(SourceKey::Com).await, *snap);
    }

    #[tokio::test]
    async fn refresh_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        let refresher = Refresher::new(
            vec![source(SourceKey::Com, Arc::new(FailingSource))],
            cache.clone(),
        );
        assert!(matches!(
            refresher.refresh_source(SourceKey::Us).await,
            Err(UpstreamError::NotConfigured(SourceKey::Us))
        ));
        assert!(matches!(
            refresher.refresh_source(SourceKey::All).await,
            Err(UpstreamError::Schema(_))
        ));
        assert!(cache.get(SourceKey::All).await.last_updated_at.is_none());
    }

    #[tokio::test]
    async fn scheduler_refreshes_on_start_and_interval() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SnapshotCache::new(dir.path().join("lb.json")));
        let src = Arc::new(FixedSource::new(vec![("A", dec!(1))]));
        let refresher = Arc::new(Refresher::new(
            vec![source(SourceKey::Com, src.clone())],
            cache.clone(),
        ));

        let handle = spawn_scheduler(refresher, Duration::from_millis(300));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(SourceKey::All).await.players.len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn scheduler_keeps_newer_in_memory_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lb.json");

        let earlier = SnapshotCache::new(&path);
        earlier
            .set(
                SourceKey::All,
                vec![crate::types::AggregatedPlayer {
                    username: "stale".to_string(),
                    total_wager: dec!(1),
                }],
            )
            .await;
        earlier.persist().await.unwrap();

        // A self-heal landed before the scheduler started.
        let cache = Arc::new(SnapshotCache::new(&path));
        cache
            .set(
                SourceKey::All,
                vec![crate::types::AggregatedPlayer {
                    username: "fresh".to_string(),
                    total_wager: dec!(2),
                }],
            )
            .await;
        let refresher = Arc::new(Refresher::new(
            vec![source(SourceKey::Com, Arc::new(FailingSource))],
            cache.clone(),
        ));

        let handle = spawn_scheduler(refresher, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert_eq!(
            totals(&*cache.get(SourceKey::All).await),
            vec![("fresh".to_string(), dec!(2))]
        );
    }
}
