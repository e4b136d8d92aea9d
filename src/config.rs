use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::SourceKey;
use crate::{DEFAULT_SHEET_COM_ID, DEFAULT_SHEET_US_ID, SHEETTOJSON_BASE};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub competition: CompetitionConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Interval in seconds between scheduled refresh cycles.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Per-request timeout for upstream calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Number of ranked rows returned by the leaderboard endpoint.
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: usize,
}

/// Initial competition window and the parameters used by a reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionConfig {
    /// First day of the initial competition (`"YYYY-MM-DD"`). Defaults to today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Last day of the initial competition. Defaults to `start_date + duration_days`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_duration_days")]
    pub duration_days: u64,
    #[serde(default = "default_prize_pool")]
    pub prize_pool: Decimal,
}

/// One configured upstream, bound to a per-source leaderboard slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub key: SourceKey,
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// A spreadsheet exposed through the sheet-to-JSON service.
    Sheet {
        sheet_id: String,
        #[serde(default = "default_sheet_base")]
        base_url: String,
    },
    /// A partner affiliate API returning `{ success, data: { players } }`.
    Affiliate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_refresh_interval() -> u64 {
    60 * 60
}

fn default_request_timeout() -> u64 {
    15
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/leaderboard.json")
}

fn default_leaderboard_limit() -> usize {
    10
}

fn default_duration_days() -> u64 {
    21
}

fn default_prize_pool() -> Decimal {
    dec!(3000)
}

fn default_sheet_base() -> String {
    SHEETTOJSON_BASE.to_string()
}

fn default_sources() -> Vec<SourceEntry> {
    vec![
        SourceEntry {
            key: SourceKey::Com,
            provider: ProviderConfig::Sheet {
                sheet_id: DEFAULT_SHEET_COM_ID.to_string(),
                base_url: default_sheet_base(),
            },
        },
        SourceEntry {
            key: SourceKey::Us,
            provider: ProviderConfig::Sheet {
                sheet_id: DEFAULT_SHEET_US_ID.to_string(),
                base_url: default_sheet_base(),
            },
        },
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            request_timeout_secs: default_request_timeout(),
            snapshot_path: default_snapshot_path(),
            leaderboard_limit: default_leaderboard_limit(),
        }
    }
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            duration_days: default_duration_days(),
            prize_pool: default_prize_pool(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            settings: SettingsConfig::default(),
            competition: CompetitionConfig::default(),
            sources: default_sources(),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Load config from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("LEADERBOARD_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("SNAPSHOT_PATH") {
            self.settings.snapshot_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("REFRESH_INTERVAL_SECS") {
            self.settings.refresh_interval_secs = secs
                .parse()
                .with_context(|| format!("REFRESH_INTERVAL_SECS is not a number: {secs}"))?;
        }

        let sheet_base = lookup("SHEETTOJSON_BASE");
        for entry in &mut self.sources {
            match &mut entry.provider {
                ProviderConfig::Sheet { sheet_id, base_url } => {
                    let id_var = match entry.key {
                        SourceKey::Com => Some("SHEET_COM_ID"),
                        SourceKey::Us => Some("SHEET_US_ID"),
                        SourceKey::All => None,
                    };
                    if let Some(id) = id_var.and_then(&lookup) {
                        *sheet_id = id;
                    }
                    if let Some(base) = &sheet_base {
                        *base_url = base.clone();
                    }
                }
                ProviderConfig::Affiliate { url, api_key } => {
                    if let Some(u) = lookup("AFFILIATE_API_URL") {
                        *url = u;
                    }
                    if let Some(key) = lookup("AFFILIATE_API_KEY") {
                        *api_key = Some(key);
                    }
                }
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.settings.refresh_interval_secs == 0 {
            anyhow::bail!("settings.refresh_interval_secs must be positive");
        }
        if self.settings.request_timeout_secs == 0 {
            anyhow::bail!("settings.request_timeout_secs must be positive");
        }
        if self.settings.leaderboard_limit == 0 {
            anyhow::bail!("settings.leaderboard_limit must be positive");
        }
        for (i, entry) in self.sources.iter().enumerate() {
            if entry.key == SourceKey::All {
                anyhow::bail!("sources[{i}]: `all` is the combined view and cannot be a source");
            }
            if self.sources[..i].iter().any(|e| e.key == entry.key) {
                anyhow::bail!("sources[{i}]: duplicate source key `{}`", entry.key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.settings.refresh_interval_secs, 3600);
        assert_eq!(config.settings.leaderboard_limit, 10);
        assert_eq!(config.competition.duration_days, 21);
        assert_eq!(config.competition.prize_pool, dec!(3000));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].key, SourceKey::Com);
    }

    #[test]
    fn parses_mixed_sources() {
        let config = AppConfig::from_toml(
            r#"
            [settings]
            refresh_interval_secs = 600

            [competition]
            start_date = "2025-09-23"
            end_date = "2025-10-14"
            prize_pool = 1500

            [[sources]]
            key = "com"
            kind = "sheet"
            sheet_id = "abc"

            [[sources]]
            key = "us"
            kind = "affiliate"
            url = "https://partner.example/api/leaderboard"
            "#,
        )
        .unwrap();
        assert_eq!(config.settings.refresh_interval_secs, 600);
        assert_eq!(
            config.competition.start_date,
            NaiveDate::from_ymd_opt(2025, 9, 23)
        );
        assert_eq!(config.competition.prize_pool, dec!(1500));
        assert_eq!(
            config.sources[0].provider,
            ProviderConfig::Sheet {
                sheet_id: "abc".to_string(),
                base_url: SHEETTOJSON_BASE.to_string(),
            }
        );
        assert_eq!(
            config.sources[1].provider,
            ProviderConfig::Affiliate {
                url: "https://partner.example/api/leaderboard".to_string(),
                api_key: None,
            }
        );
    }

    #[test]
    fn rejects_combined_key_as_source() {
        let err = AppConfig::from_toml(
            r#"
            [[sources]]
            key = "all"
            kind = "sheet"
            sheet_id = "abc"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_source_keys() {
        let err = AppConfig::from_toml(
            r#"
            [[sources]]
            key = "com"
            kind = "sheet"
            sheet_id = "a"

            [[sources]]
            key = "com"
            kind = "sheet"
            sheet_id = "b"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn env_overrides_sheet_ids() {
        let vars: HashMap<&str, &str> = [
            ("SHEET_COM_ID", "com-from-env"),
            ("SHEETTOJSON_BASE", "http://localhost:9000"),
            ("REFRESH_INTERVAL_SECS", "120"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.settings.refresh_interval_secs, 120);
        assert_eq!(
            config.sources[0].provider,
            ProviderConfig::Sheet {
                sheet_id: "com-from-env".to_string(),
                base_url: "http://localhost:9000".to_string(),
            }
        );
        // US id untouched, base still overridden
        assert_eq!(
            config.sources[1].provider,
            ProviderConfig::Sheet {
                sheet_id: DEFAULT_SHEET_US_ID.to_string(),
                base_url: "http://localhost:9000".to_string(),
            }
        );
    }

    #[test]
    fn env_rejects_bad_interval() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "REFRESH_INTERVAL_SECS").then(|| "hourly".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = AppConfig::default();
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.sources, config.sources);
        assert_eq!(loaded.server.bind, config.server.bind);
    }
}
