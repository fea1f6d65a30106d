use crate::config::Settings;
use crate::domain::error::WatchlistError;
use crate::quote::{QuoteResult, QuoteSource};
use anyhow::{anyhow, Context};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// Only the fields needed to pick the latest close. Everything else in the
// payload is kept as raw JSON for the archive.
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Vec<Option<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

/// Yahoo v8 chart endpoint, one month of daily bars per request.
#[derive(Debug, Clone)]
pub struct YahooChartSource {
    http: reqwest::Client,
    base_url: String,
}

impl YahooChartSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.quote_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build quote source http client")?;

        Ok(Self {
            http,
            base_url: settings.quote_base_url.clone(),
        })
    }

    fn chart_url(&self, ticker: &str) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid QUOTE_BASE_URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("QUOTE_BASE_URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooChartSource {
    fn source_name(&self) -> &'static str {
        "yahoo"
    }

    async fn latest_close(&self, ticker: &str) -> anyhow::Result<QuoteResult> {
        let url = self.chart_url(ticker)?;

        let res = self
            .http
            .get(url)
            .query(&[
                ("range", "1mo"),
                ("interval", "1d"),
                ("includePrePost", "false"),
                ("events", "div|split"),
            ])
            .send()
            .await
            .map_err(|e| WatchlistError::upstream(ticker, format!("request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(WatchlistError::upstream(ticker, format!("HTTP {status}")).into());
        }

        let text = res
            .text()
            .await
            .map_err(|e| WatchlistError::upstream(ticker, format!("failed to read body: {e}")))?;
        let raw = serde_json::from_str::<Value>(&text).map_err(|e| {
            WatchlistError::upstream(ticker, format!("response is not valid JSON: {e}"))
        })?;

        let quote = extract_latest_close(ticker, raw)?;
        tracing::debug!(
            ticker,
            close = quote.close,
            source_timestamp = ?quote.source_timestamp,
            "fetched latest close"
        );
        Ok(quote)
    }
}

/// Picks the most recent finite close (and its timestamp) from a chart
/// payload. Fails when the required arrays are absent or hold no usable price.
pub fn extract_latest_close(ticker: &str, raw: Value) -> anyhow::Result<QuoteResult> {
    let envelope = ChartEnvelope::deserialize(&raw).map_err(|e| {
        WatchlistError::upstream(ticker, format!("unexpected chart response shape: {e}"))
    })?;

    let Some(data) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        let detail = match envelope.chart.error {
            Some(ChartError { code, description }) => format!(
                "response missing result ({}: {})",
                code.unwrap_or_default(),
                description.unwrap_or_default()
            ),
            None => "response missing result".to_string(),
        };
        return Err(WatchlistError::upstream(ticker, detail).into());
    };

    let Some(quote) = data.indicators.quote.into_iter().next() else {
        return Err(WatchlistError::upstream(ticker, "response missing indicators.quote[0]").into());
    };

    let latest = quote
        .close
        .iter()
        .copied()
        .enumerate()
        .rev()
        .find_map(|(idx, close)| close.filter(|c| c.is_finite()).map(|c| (idx, c)));

    let Some((idx, close)) = latest else {
        return Err(WatchlistError::upstream(ticker, "no valid close found").into());
    };

    let source_timestamp = data
        .timestamp
        .get(idx)
        .copied()
        .flatten()
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(QuoteResult {
        ticker: ticker.to_string(),
        close,
        source_timestamp,
        raw,
    })
}
