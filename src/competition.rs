use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CompetitionConfig;
use crate::error::CompetitionError;
use crate::types::CompetitionWindow;

/// Parameters for windows created by a reset.
#[derive(Debug, Clone)]
pub struct CompetitionSettings {
    pub duration_days: u64,
    pub prize_pool: Decimal,
}

impl From<&CompetitionConfig> for CompetitionSettings {
    fn from(config: &CompetitionConfig) -> Self {
        Self {
            duration_days: config.duration_days,
            prize_pool: config.prize_pool,
        }
    }
}

struct Records {
    next_id: u64,
    windows: BTreeMap<u64, CompetitionWindow>,
}

impl Records {
    fn insert(
        &mut self,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        total_prize_pool: Decimal,
    ) -> CompetitionWindow {
        let id = self.next_id;
        self.next_id += 1;
        let window = CompetitionWindow {
            id,
            start_date,
            end_date,
            total_prize_pool,
            is_active: true,
        };
        self.windows.insert(id, window.clone());
        window
    }
}

/// In-memory store of competition windows; at most one is active.
pub struct CompetitionStore {
    settings: CompetitionSettings,
    records: RwLock<Records>,
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Midnight UTC `days` after the day containing `from`.
fn end_after(from: DateTime<Utc>, days: u64) -> Result<DateTime<Utc>, CompetitionError> {
    from.date_naive()
        .checked_add_days(Days::new(days))
        .map(midnight)
        .ok_or(CompetitionError::DateOutOfRange { from, days })
}

impl CompetitionStore {
    /// An empty store. Use [`CompetitionStore::from_config`] to seed the initial window.
    pub fn new(settings: CompetitionSettings) -> Self {
        Self {
            settings,
            records: RwLock::new(Records {
                next_id: 1,
                windows: BTreeMap::new(),
            }),
        }
    }

    /// A store seeded with the configured initial window, relative to `now`
    /// for any date the config leaves out.
    pub fn from_config(
        config: &CompetitionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, CompetitionError> {
        let start = config.start_date.map(midnight).unwrap_or(now);
        let end = match config.end_date {
            Some(date) => midnight(date),
            None => end_after(start, config.duration_days)?,
        };
        let mut records = Records {
            next_id: 1,
            windows: BTreeMap::new(),
        };
        records.insert(start, end, config.prize_pool);
        Ok(Self {
            settings: CompetitionSettings::from(config),
            records: RwLock::new(records),
        })
    }

    pub fn settings(&self) -> &CompetitionSettings {
        &self.settings
    }

    pub async fn current(&self) -> Result<CompetitionWindow, CompetitionError> {
        self.records
            .read()
            .await
            .windows
            .values()
            .find(|w| w.is_active)
            .cloned()
            .ok_or(CompetitionError::NoActiveCompetition)
    }

    /// Deactivate the current window and start a new one at `now`.
    ///
    /// Runs under a single write lock, so concurrent resets each see the
    /// previous reset's window and exactly one window stays active.
    pub async fn reset(&self, now: DateTime<Utc>) -> Result<CompetitionWindow, CompetitionError> {
        let end = end_after(now, self.settings.duration_days)?;
        let mut records = self.records.write().await;
        for window in records.windows.values_mut().filter(|w| w.is_active) {
            window.is_active = false;
            info!("Ended competition {}", window.id);
        }
        let window = records.insert(now, end, self.settings.prize_pool);
        info!(
            "Started competition {} ({} to {}, pool {})",
            window.id, window.start_date, window.end_date, window.total_prize_pool
        );
        Ok(window)
    }
}
