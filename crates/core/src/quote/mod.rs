pub mod yahoo;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Latest usable close for one ticker. Not persisted on its own; `raw` is
/// archived verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResult {
    pub ticker: String,
    pub close: f64,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub raw: Value,
}

#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    /// Path segment used in raw archive keys, e.g. `yahoo`.
    fn source_name(&self) -> &'static str;

    async fn latest_close(&self, ticker: &str) -> anyhow::Result<QuoteResult>;
}
