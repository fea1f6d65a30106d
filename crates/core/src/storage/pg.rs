use crate::domain::watchlist::StoredWatchlist;
use crate::storage::{ObjectArchive, WatchlistTable, JSON_CONTENT_TYPE};
use anyhow::Context;
use serde_json::Value;

/// Archive objects kept in Postgres, one row per `(bucket, key)`.
#[derive(Debug, Clone)]
pub struct PgArchive {
    pool: sqlx::PgPool,
    bucket: String,
}

impl PgArchive {
    pub fn new(pool: sqlx::PgPool, bucket: &str) -> Self {
        Self {
            pool,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectArchive for PgArchive {
    async fn put_json(&self, key: &str, body: &Value) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO archive_objects (bucket, key, content_type, body, written_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (bucket, key) DO UPDATE \
               SET content_type = EXCLUDED.content_type, body = EXCLUDED.body, written_at = EXCLUDED.written_at",
        )
        .persistent(false)
        .bind(&self.bucket)
        .bind(key)
        .bind(JSON_CONTENT_TYPE)
        .bind(body)
        .execute(&self.pool)
        .await
        .with_context(|| format!("archive put failed (bucket={}, key={key})", self.bucket))?;

        tracing::debug!(bucket = %self.bucket, key, "archived object");
        Ok(())
    }
}

/// Watchlist items in Postgres. `table_name` keeps logically separate tables
/// apart inside the one physical table.
#[derive(Debug, Clone)]
pub struct PgWatchlistTable {
    pool: sqlx::PgPool,
    table_name: String,
}

impl PgWatchlistTable {
    pub fn new(pool: sqlx::PgPool, table_name: &str) -> Self {
        Self {
            pool,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl WatchlistTable for PgWatchlistTable {
    async fn put(&self, item: &StoredWatchlist) -> anyhow::Result<()> {
        let doc = serde_json::to_value(item).context("serialize watchlist item failed")?;

        sqlx::query(
            "INSERT INTO watchlist_items (table_name, pk, sk, item, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (table_name, pk, sk) DO UPDATE \
               SET item = EXCLUDED.item, updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(&self.table_name)
        .bind(&item.pk)
        .bind(&item.sk)
        .bind(doc)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "upsert watchlist_items failed (table={}, pk={}, sk={})",
                self.table_name, item.pk, item.sk
            )
        })?;

        Ok(())
    }

    async fn get(&self, pk: &str, sk: &str) -> anyhow::Result<Option<StoredWatchlist>> {
        let doc: Option<Value> = sqlx::query_scalar(
            "SELECT item FROM watchlist_items \
             WHERE table_name = $1 AND pk = $2 AND sk = $3",
        )
        .persistent(false)
        .bind(&self.table_name)
        .bind(pk)
        .bind(sk)
        .fetch_optional(&self.pool)
        .await
        .context("select watchlist_items failed")?;

        doc.map(decode_item).transpose()
    }

    async fn query(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<StoredWatchlist>> {
        let docs: Vec<Value> = sqlx::query_scalar(
            "SELECT item FROM watchlist_items \
             WHERE table_name = $1 AND pk = $2 \
             ORDER BY sk DESC \
             LIMIT $3",
        )
        .persistent(false)
        .bind(&self.table_name)
        .bind(pk)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("query watchlist_items failed")?;

        docs.into_iter().map(decode_item).collect()
    }

    async fn query_sort_keys(&self, pk: &str, limit: usize) -> anyhow::Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT sk FROM watchlist_items \
             WHERE table_name = $1 AND pk = $2 \
             ORDER BY sk DESC \
             LIMIT $3",
        )
        .persistent(false)
        .bind(&self.table_name)
        .bind(pk)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("query watchlist_items sort keys failed")?;

        Ok(keys)
    }
}

fn decode_item(doc: Value) -> anyhow::Result<StoredWatchlist> {
    serde_json::from_value(doc).context("stored watchlist item has unexpected shape")
}
