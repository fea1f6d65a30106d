use crate::domain::error::WatchlistError;
use crate::domain::watchlist::{StoredWatchlist, WATCHLIST_PARTITION};
use crate::storage::WatchlistTable;
use crate::time::utc_date::parse_iso_date;
use std::sync::Arc;

pub const DEFAULT_RECENT_DAYS: usize = 60;
pub const MAX_RECENT_DAYS: usize = 365;

/// Read-only accessors over the watchlist table.
#[derive(Clone)]
pub struct QueryService {
    table: Arc<dyn WatchlistTable>,
}

impl QueryService {
    pub fn new(table: Arc<dyn WatchlistTable>) -> Self {
        Self { table }
    }

    pub async fn get_latest(&self) -> anyhow::Result<StoredWatchlist> {
        self.table
            .query(WATCHLIST_PARTITION, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                WatchlistError::NotFound(
                    "No watchlists found yet. Run POST /admin/fetch-eod.".to_string(),
                )
                .into()
            })
    }

    /// Validates the date before touching the table.
    pub async fn get_by_date(&self, date: &str) -> anyhow::Result<StoredWatchlist> {
        let as_of = parse_iso_date(date)?;
        let sk = as_of.to_string();

        self.table
            .get(WATCHLIST_PARTITION, &sk)
            .await?
            .ok_or_else(|| WatchlistError::NotFound(format!("No watchlist for {sk}")).into())
    }

    pub async fn get_recent_dates(&self, limit: usize) -> anyhow::Result<Vec<String>> {
        let limit = limit.clamp(1, MAX_RECENT_DAYS);
        self.table.query_sort_keys(WATCHLIST_PARTITION, limit).await
    }
}

/// `days` query parameter: numeric values are truncated and clamped to
/// 1..=365, anything unparsable (or absent) means 60.
pub fn parse_recent_limit(raw: Option<&str>) -> usize {
    let parsed = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|n| n.is_finite());

    match parsed {
        Some(n) => n.trunc().clamp(1.0, MAX_RECENT_DAYS as f64) as usize,
        None => DEFAULT_RECENT_DAYS,
    }
}
