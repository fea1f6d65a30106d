use crate::domain::watchlist::StoredWatchlist;
use crate::storage::{ObjectArchive, WatchlistTable};
use anyhow::anyhow;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> anyhow::Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// Archive held in process memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    objects: Mutex<BTreeMap<String, Value>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(lock(&self.objects)?.get(key).cloned())
    }

    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(lock(&self.objects)?.keys().cloned().collect())
    }
}

#[async_trait::async_trait]
impl ObjectArchive for MemoryArchive {
    async fn put_json(&self, key: &str, body: &Value) -> anyhow::Result<()> {
        lock(&self.objects)?.insert(key.to_string(), body.clone());
        Ok(())
    }
}

/// Table held in process memory, ordered by `(pk, sk)`.
#[derive(Debug, Default)]
pub struct MemoryWatchlistTable {
    items: Mutex<BTreeMap<(String, String), StoredWatchlist>>,
}

impl MemoryWatchlistTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> anyhow::Result<usize> {
        Ok(lock(&self.items)?.len())
    }

    pub fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len()? == 0)
    }

    fn descending(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<StoredWatchlist>> {
        Ok(lock(&self.items)?
            .iter()
            .rev()
            .filter(|((item_pk, _), _)| item_pk == pk)
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl WatchlistTable for MemoryWatchlistTable {
    async fn put(&self, item: &StoredWatchlist) -> anyhow::Result<()> {
        lock(&self.items)?.insert((item.pk.clone(), item.sk.clone()), item.clone());
        Ok(())
    }

    async fn get(&self, pk: &str, sk: &str) -> anyhow::Result<Option<StoredWatchlist>> {
        Ok(lock(&self.items)?
            .get(&(pk.to_string(), sk.to_string()))
            .cloned())
    }

    async fn query(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<StoredWatchlist>> {
        self.descending(pk, limit)
    }

    async fn query_sort_keys(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<String>> {
        Ok(self
            .descending(pk, limit)?
            .into_iter()
            .map(|item| item.sk)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::watchlist::{
        rank_scores, WatchlistRecord, WatchlistSnapshot, DEFAULT_UNIVERSE,
    };
    use chrono::{NaiveDate, Utc};

    fn item(date: &str, score: f64) -> StoredWatchlist {
        let as_of = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let snapshot = WatchlistSnapshot::new(
            as_of,
            DEFAULT_UNIVERSE,
            "v0",
            rank_scores(vec![("AAPL".to_string(), score)]),
        )
        .unwrap();
        StoredWatchlist::new(WatchlistRecord {
            snapshot,
            s3_key: format!("watchlists/date={date}/watchlist.json"),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn query_is_descending_and_limited() {
        let table = MemoryWatchlistTable::new();
        for d in ["2026-01-02", "2026-01-05", "2025-12-31"] {
            table.put(&item(d, 1.0)).await.unwrap();
        }

        let keys = table.query_sort_keys("WATCHLIST", 2).await.unwrap();
        assert_eq!(keys, ["2026-01-05", "2026-01-02"]);
        assert!(table.query("OTHER", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_replaces_existing_item() {
        let table = MemoryWatchlistTable::new();
        table.put(&item("2026-01-02", 1.0)).await.unwrap();
        table.put(&item("2026-01-02", 2.0)).await.unwrap();

        assert_eq!(table.len().unwrap(), 1);
        let got = table.get("WATCHLIST", "2026-01-02").await.unwrap().unwrap();
        assert_eq!(got.record.snapshot.rows[0].score, 2.0);
    }
}
