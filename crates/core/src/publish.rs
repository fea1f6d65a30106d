use crate::domain::error::WatchlistError;
use crate::domain::watchlist::{
    rank_scores, StoredWatchlist, WatchlistRecord, WatchlistSnapshot, DEFAULT_TICKERS,
    DEFAULT_UNIVERSE,
};
use crate::quote::{QuoteResult, QuoteSource};
use crate::storage::{raw_quote_key, watchlist_key, ObjectArchive, WatchlistTable};
use crate::time::utc_date::resolve_as_of;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Turns one quote into a ranking score.
pub trait Scorer: Send + Sync {
    fn model_version_id(&self) -> &str;

    fn score(&self, quote: &QuoteResult) -> f64;
}

/// Placeholder model: the score is the close, rounded to 6 decimals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseScorer;

impl Scorer for CloseScorer {
    fn model_version_id(&self) -> &str {
        "demo-yahoo-v0"
    }

    fn score(&self, quote: &QuoteResult) -> f64 {
        (quote.close * 1e6).round() / 1e6
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Anything other than an array reads as absent.
    #[serde(default, deserialize_with = "lenient_tickers")]
    pub tickers: Option<Vec<String>>,
    #[serde(default)]
    pub as_of: Option<String>,
}

fn lenient_tickers<'de, D>(de: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!(
                    "tickers entries must be strings, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub ok: bool,
    pub as_of: NaiveDate,
    pub tickers: Vec<String>,
    pub watchlist_s3_key: String,
}

impl PublishRequest {
    /// Missing or empty list means the default pair.
    pub fn resolve_tickers(&self) -> anyhow::Result<Vec<String>> {
        let tickers = match &self.tickers {
            Some(t) if !t.is_empty() => t.clone(),
            _ => return Ok(DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect()),
        };

        let mut out = Vec::with_capacity(tickers.len());
        for t in tickers {
            let t = t.trim().to_string();
            if t.is_empty() {
                return Err(WatchlistError::InvalidInput("tickers must be non-empty".to_string()).into());
            }
            out.push(t);
        }
        Ok(out)
    }

    pub fn resolve_as_of(&self, now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
        let as_of = self.as_of.as_deref().map(str::trim).filter(|s| !s.is_empty());
        resolve_as_of(as_of, now_utc)
    }
}

/// Fetch, archive, rank and persist one day's watchlist.
#[derive(Clone)]
pub struct Publisher {
    quotes: Arc<dyn QuoteSource>,
    archive: Arc<dyn ObjectArchive>,
    table: Arc<dyn WatchlistTable>,
    scorer: Arc<dyn Scorer>,
    universe: String,
}

impl Publisher {
    pub fn new(
        quotes: Arc<dyn QuoteSource>,
        archive: Arc<dyn ObjectArchive>,
        table: Arc<dyn WatchlistTable>,
    ) -> Self {
        Self {
            quotes,
            archive,
            table,
            scorer: Arc::new(CloseScorer),
            universe: DEFAULT_UNIVERSE.to_string(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_universe(mut self, universe: &str) -> Self {
        self.universe = universe.to_string();
        self
    }

    pub async fn publish(
        &self,
        req: &PublishRequest,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<PublishOutcome> {
        let tickers = req.resolve_tickers()?;
        let as_of = req.resolve_as_of(now_utc)?;

        // Sequential on purpose: the first failing ticker aborts the publish.
        let mut quotes = Vec::with_capacity(tickers.len());
        for ticker in &tickers {
            match self.quotes.latest_close(ticker).await {
                Ok(q) => quotes.push(q),
                Err(err) => {
                    tracing::warn!(%as_of, ticker, error = %err, "quote fetch failed; aborting publish");
                    return Err(err);
                }
            }
        }

        let source = self.quotes.source_name();
        for q in &quotes {
            let key = raw_quote_key(source, as_of, &q.ticker);
            self.archive
                .put_json(&key, &q.raw)
                .await
                .with_context(|| format!("failed to archive raw quote for {}", q.ticker))?;
        }

        let scored = quotes
            .iter()
            .map(|q| (q.ticker.clone(), self.scorer.score(q)))
            .collect();
        let snapshot = WatchlistSnapshot::new(
            as_of,
            &self.universe,
            self.scorer.model_version_id(),
            rank_scores(scored),
        )?;

        let key = watchlist_key(as_of);
        let body = serde_json::to_value(&snapshot).context("serialize watchlist snapshot failed")?;
        self.archive
            .put_json(&key, &body)
            .await
            .context("failed to archive watchlist snapshot")?;

        let item = StoredWatchlist::new(WatchlistRecord {
            snapshot,
            s3_key: key.clone(),
            created_at: now_utc,
        });
        self.table
            .put(&item)
            .await
            .context("failed to store watchlist record")?;

        tracing::info!(%as_of, tickers = tickers.len(), key = %key, "published watchlist");

        Ok(PublishOutcome {
            ok: true,
            as_of,
            tickers,
            watchlist_s3_key: key,
        })
    }
}
