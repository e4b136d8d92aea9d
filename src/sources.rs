use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::config::{ProviderConfig, SourceEntry};
use crate::error::UpstreamError;
use crate::types::{RawWagerRecord, SourceKey};

/// An upstream provider of per-player wager amounts.
#[async_trait]
pub trait WagerSource: Send + Sync {
    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;

    /// Fetch every `(username, wager)` pair the provider currently reports.
    async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError>;
}

/// A source adapter bound to the leaderboard slot it feeds.
#[derive(Clone)]
pub struct ConfiguredSource {
    pub key: SourceKey,
    pub adapter: Arc<dyn WagerSource>,
}

/// Build the shared HTTP client. Every upstream call is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Instantiate adapters for each configured source.
pub fn build_sources(
    entries: &[SourceEntry],
    client: &reqwest::Client,
) -> Result<Vec<ConfiguredSource>, UpstreamError> {
    entries
        .iter()
        .map(|entry| {
            let adapter: Arc<dyn WagerSource> = match &entry.provider {
                ProviderConfig::Sheet { sheet_id, base_url } => Arc::new(SheetSource::new(
                    client.clone(),
                    base_url,
                    sheet_id.clone(),
                )?),
                ProviderConfig::Affiliate { url, api_key } => Arc::new(AffiliateSource::new(
                    client.clone(),
                    url,
                    api_key.clone(),
                )?),
            };
            Ok(ConfiguredSource {
                key: entry.key,
                adapter,
            })
        })
        .collect()
}

/// Parse a wager cell. Numbers are taken as-is; strings are stripped of
/// everything but digits, `.` and `-`, then read up to the first character
/// that no longer continues a number. Anything unparseable is zero.
pub fn parse_wager(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .unwrap_or(Decimal::ZERO)
        }
        Value::String(s) => parse_wager_str(s),
        _ => Decimal::ZERO,
    }
}

pub fn parse_wager_str(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    leading_number(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Longest `-?digits[.digits]` prefix, so `"1.2.3"` reads as `1.2`.
fn leading_number(text: &str) -> Option<Decimal> {
    let digits_len = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());

    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let (int, tail) = rest.split_at(digits_len(rest));
    let frac = tail
        .strip_prefix('.')
        .map(|t| &t[..digits_len(t)])
        .unwrap_or("");
    if int.is_empty() && frac.is_empty() {
        return None;
    }

    let int = if int.is_empty() { "0" } else { int };
    let number = if frac.is_empty() {
        format!("{sign}{int}")
    } else {
        format!("{sign}{int}.{frac}")
    };
    Decimal::from_str(&number).ok()
}

/// Render a username cell as text. Sheets sometimes store numeric handles.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

async fn get_json(request: reqwest::RequestBuilder) -> Result<Value, UpstreamError> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    Ok(resp.json::<Value>().await?)
}

// ── Sheet-to-JSON export ───────────────────────────────────────

/// Columns located in a loosely-structured sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetColumns {
    pub username: String,
    pub wager: String,
}

/// Pick the username and wager columns from `keys`, in preference order.
///
/// Username: `user_name`, `username`, any key containing `user`, then a
/// `name`/`*_name` key that is not an affiliate or campaign name.
/// Wager: a weighted-wager key, `wagered`, then any key containing `wager`.
pub fn discover_columns<S: AsRef<str>>(keys: &[S]) -> Result<SheetColumns, UpstreamError> {
    let lowered: Vec<(&str, String)> = keys
        .iter()
        .map(|k| (k.as_ref(), k.as_ref().to_lowercase()))
        .collect();
    let find = |pred: &dyn Fn(&str) -> bool| {
        lowered
            .iter()
            .find(|(_, lc)| pred(lc.as_str()))
            .map(|(orig, _)| orig.to_string())
    };

    let username = find(&|k| k == "user_name")
        .or_else(|| find(&|k| k == "username"))
        .or_else(|| find(&|k| k.contains("user")))
        .or_else(|| {
            find(&|k| {
                (k == "name" || k.ends_with("_name"))
                    && !k.contains("affiliate")
                    && !k.contains("campaign")
            })
        });
    let wager = find(&|k| k.contains("weighted") && k.contains("wager"))
        .or_else(|| find(&|k| k == "wagered"))
        .or_else(|| find(&|k| k.contains("wager")));

    match (username, wager) {
        (Some(username), Some(wager)) => Ok(SheetColumns { username, wager }),
        _ => Err(UpstreamError::Schema(format!(
            "could not locate username/wager columns among {:?}",
            lowered.iter().map(|(orig, _)| *orig).collect::<Vec<_>>()
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct SheetPayload {
    data: Option<SheetData>,
}

#[derive(Debug, Deserialize)]
struct SheetData {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    data: Vec<Value>,
}

/// Extract wager records from a sheet-to-JSON payload. Only the first sheet is read.
pub fn parse_sheet_payload(payload: Value) -> Result<Vec<RawWagerRecord>, UpstreamError> {
    let payload: SheetPayload = serde_json::from_value(payload)
        .map_err(|e| UpstreamError::Schema(format!("sheet payload: {e}")))?;
    let Some(sheet) = payload.data.and_then(|d| d.sheets.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let rows: Vec<Map<String, Value>> = sheet
        .data
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    let Some(sample) = rows.iter().find(|r| !r.is_empty()) else {
        return Ok(Vec::new());
    };

    // Headers carry the sheet's column order; fall back to the sample row's keys.
    let keys: Vec<&str> = if sheet.headers.is_empty() {
        sample.keys().map(String::as_str).collect()
    } else {
        sheet
            .headers
            .iter()
            .map(String::as_str)
            .filter(|h| sample.contains_key(*h))
            .collect()
    };
    let columns = discover_columns(&keys)?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let username = row.get(&columns.username).map(cell_text)?;
            if username.is_empty() {
                return None;
            }
            let wager = row
                .get(&columns.wager)
                .map(parse_wager)
                .unwrap_or(Decimal::ZERO);
            Some(RawWagerRecord::new(username, wager))
        })
        .collect())
}

/// A Google Sheet read through the sheet-to-JSON export service.
pub struct SheetSource {
    client: reqwest::Client,
    url: Url,
    sheet_id: String,
}

impl SheetSource {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        sheet_id: String,
    ) -> Result<Self, UpstreamError> {
        let base = base_url.trim_end_matches('/');
        let url = Url::parse_with_params(&format!("{base}/api/sheet"), [("id", &sheet_id)])
            .map_err(|e| UpstreamError::Schema(format!("invalid sheet base url {base_url}: {e}")))?;
        Ok(Self {
            client,
            url,
            sheet_id,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl WagerSource for SheetSource {
    fn describe(&self) -> String {
        format!("sheet {}", self.sheet_id)
    }

    async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError> {
        let payload = get_json(self.client.get(self.url.clone())).await?;
        let records = parse_sheet_payload(payload)?;
        debug!("Fetched {} rows from sheet {}", records.len(), self.sheet_id);
        Ok(records)
    }
}

// ── Partner affiliate API ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AffiliatePayload {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<AffiliateData>,
}

#[derive(Debug, Deserialize)]
struct AffiliateData {
    #[serde(default)]
    players: Vec<AffiliatePlayer>,
}

#[derive(Debug, Deserialize)]
struct AffiliatePlayer {
    username: Option<String>,
    #[serde(default)]
    total_wager: Value,
}

/// Extract wager records from an affiliate API payload.
pub fn parse_affiliate_payload(payload: Value) -> Result<Vec<RawWagerRecord>, UpstreamError> {
    let payload: AffiliatePayload = serde_json::from_value(payload)
        .map_err(|e| UpstreamError::Schema(format!("affiliate payload: {e}")))?;
    if !payload.success {
        return Err(UpstreamError::Rejected(
            payload
                .message
                .unwrap_or_else(|| "success=false".to_string()),
        ));
    }
    let data = payload
        .data
        .ok_or_else(|| UpstreamError::Schema("affiliate payload has no `data`".to_string()))?;

    Ok(data
        .players
        .into_iter()
        .filter_map(|p| {
            let username = p.username?.trim().to_string();
            if username.is_empty() {
                return None;
            }
            Some(RawWagerRecord::new(username, parse_wager(&p.total_wager)))
        })
        .collect())
}

/// A partner affiliate leaderboard API.
pub struct AffiliateSource {
    client: reqwest::Client,
    url: Url,
    api_key: Option<String>,
}

impl AffiliateSource {
    pub fn new(
        client: reqwest::Client,
        url: &str,
        api_key: Option<String>,
    ) -> Result<Self, UpstreamError> {
        let url = Url::parse(url)
            .map_err(|e| UpstreamError::Schema(format!("invalid affiliate url {url}: {e}")))?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl WagerSource for AffiliateSource {
    fn describe(&self) -> String {
        format!("affiliate {}", self.url.host_str().unwrap_or("?"))
    }

    async fn fetch(&self) -> Result<Vec<RawWagerRecord>, UpstreamError> {
        let mut req = self.client.get(self.url.clone());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let payload = get_json(req).await?;
        let records = parse_affiliate_payload(payload)?;
        debug!("Fetched {} players from {}", records.len(), self.describe());
        Ok(records)
    }
}
