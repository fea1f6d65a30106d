use crate::config::Settings;
use crate::domain::watchlist::{StoredWatchlist, WatchlistRecord};
use crate::publish::PublishOutcome;
use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct RecentDates {
    dates: Vec<String>,
}

/// HTTP client for the watchlist API.
#[derive(Debug, Clone)]
pub struct WatchlistApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl WatchlistApiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(&settings.api_url)
    }

    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build api http client")?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid WATCHLIST_API_URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("WATCHLIST_API_URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> anyhow::Result<T> {
        let res = req
            .header("content-type", "application/json")
            .send()
            .await
            .context("watchlist api request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read watchlist api response")?;
        if !status.is_success() {
            bail!("HTTP {}: {text}", status.as_u16());
        }

        serde_json::from_str(&text)
            .with_context(|| format!("unexpected watchlist api response: {text}"))
    }

    pub async fn publish(
        &self,
        tickers: &[String],
        as_of: Option<NaiveDate>,
    ) -> anyhow::Result<PublishOutcome> {
        let mut body = json!({ "tickers": tickers });
        if let Some(d) = as_of {
            body["asOf"] = Value::String(d.to_string());
        }
        let url = self.url(&["admin", "fetch-eod"])?;
        self.send(self.http.post(url).body(body.to_string())).await
    }

    pub async fn latest(&self) -> anyhow::Result<StoredWatchlist> {
        let url = self.url(&["watchlists", "latest"])?;
        self.send(self.http.get(url)).await
    }

    pub async fn by_date(&self, date: &str) -> anyhow::Result<StoredWatchlist> {
        let url = self.url(&["watchlists", date])?;
        self.send(self.http.get(url)).await
    }

    pub async fn recent(&self, days: usize) -> anyhow::Result<Vec<String>> {
        let url = self.url(&["watchlists", "recent"])?;
        let out: RecentDates = self
            .send(self.http.get(url).query(&[("days", days)]))
            .await?;
        Ok(out.dates)
    }
}

/// Plain-text rendering of one record: a short header then the ranked rows.
pub fn render_table(record: &WatchlistRecord) -> String {
    let snapshot = &record.snapshot;
    if snapshot.rows.is_empty() {
        return "No rows to display.\n".to_string();
    }

    let cells: Vec<(String, &str, String)> = snapshot
        .rows
        .iter()
        .map(|r| (r.rank.to_string(), r.ticker.as_str(), r.score.to_string()))
        .collect();

    let w_rank = cells.iter().map(|c| c.0.len()).max().unwrap_or(0).max("Rank".len());
    let w_ticker = cells.iter().map(|c| c.1.len()).max().unwrap_or(0).max("Ticker".len());
    let w_score = cells.iter().map(|c| c.2.len()).max().unwrap_or(0).max("Score".len());

    let mut out = String::new();
    out.push_str(&format!("As of: {}\n", snapshot.as_of));
    out.push_str(&format!("Universe: {}\n", snapshot.universe));
    out.push_str(&format!("Model: {}\n\n", snapshot.model_version_id));
    out.push_str(&format!(
        "{:>w_rank$}  {:<w_ticker$}  {:>w_score$}\n",
        "Rank", "Ticker", "Score"
    ));
    out.push_str(&format!(
        "{}  {}  {}\n",
        "-".repeat(w_rank),
        "-".repeat(w_ticker),
        "-".repeat(w_score)
    ));
    for (rank, ticker, score) in &cells {
        out.push_str(&format!(
            "{rank:>w_rank$}  {ticker:<w_ticker$}  {score:>w_score$}\n"
        ));
    }
    out
}
