pub mod fs;
pub mod memory;
pub mod pg;

use crate::config::{Settings, WatchlistTarget};
use crate::domain::watchlist::StoredWatchlist;
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Archive and table handles, built once and shared by every request.
#[derive(Clone)]
pub struct Backends {
    pub archive: Arc<dyn ObjectArchive>,
    pub table: Arc<dyn WatchlistTable>,
}

impl Backends {
    /// Postgres table; archive on disk when `ARCHIVE_DIR` is set, else Postgres.
    pub fn from_pool(pool: sqlx::PgPool, settings: &Settings, target: &WatchlistTarget) -> Self {
        let archive: Arc<dyn ObjectArchive> = match &settings.archive_dir {
            Some(dir) => Arc::new(fs::FsArchive::new(dir, &target.bucket)),
            None => Arc::new(pg::PgArchive::new(pool.clone(), &target.bucket)),
        };
        let table = Arc::new(pg::PgWatchlistTable::new(pool, &target.table));
        Self { archive, table }
    }

    pub fn in_memory() -> Self {
        Self {
            archive: Arc::new(memory::MemoryArchive::new()),
            table: Arc::new(memory::MemoryWatchlistTable::new()),
        }
    }
}

pub async fn connect(database_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("connect DATABASE_URL failed")?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Write-only object store addressed by hierarchical keys.
#[async_trait::async_trait]
pub trait ObjectArchive: Send + Sync {
    async fn put_json(&self, key: &str, body: &Value) -> anyhow::Result<()>;
}

/// Partition/sort keyed item store.
#[async_trait::async_trait]
pub trait WatchlistTable: Send + Sync {
    /// Upsert on `(pk, sk)`; an existing item is replaced wholesale.
    async fn put(&self, item: &StoredWatchlist) -> anyhow::Result<()>;

    async fn get(&self, pk: &str, sk: &str) -> anyhow::Result<Option<StoredWatchlist>>;

    /// Up to `limit` items of the partition, highest sort key first.
    async fn query(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<StoredWatchlist>>;

    /// Same ordering as `query`, sort keys only.
    async fn query_sort_keys(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<String>>;
}

pub fn raw_quote_key(source: &str, as_of: NaiveDate, ticker: &str) -> String {
    format!("raw/{source}/eod/date={as_of}/ticker={ticker}.json")
}

pub fn watchlist_key(as_of: NaiveDate) -> String {
    format!("watchlists/date={as_of}/watchlist.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_keys_are_namespaced_by_date() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(
            raw_quote_key("yahoo", d, "AAPL"),
            "raw/yahoo/eod/date=2026-01-02/ticker=AAPL.json"
        );
        assert_eq!(watchlist_key(d), "watchlists/date=2026-01-02/watchlist.json");
    }
}
