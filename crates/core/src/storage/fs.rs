use crate::storage::ObjectArchive;
use anyhow::{ensure, Context};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Archive on the local filesystem at `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    pub fn new(archive_dir: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            root: archive_dir.as_ref().join(bucket),
        }
    }

    pub fn object_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        ensure!(
            !key.is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_))),
            "archive key must be a relative path without `..`: {key}"
        );
        Ok(self.root.join(rel))
    }
}

#[async_trait::async_trait]
impl ObjectArchive for FsArchive {
    async fn put_json(&self, key: &str, body: &Value) -> anyhow::Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let bytes = serde_json::to_vec(body).context("serialize archive object failed")?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        tracing::debug!(path = %path.display(), "archived object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn writes_under_bucket_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsArchive::new(dir.path(), "watchlist-bucket");
        let key = "raw/yahoo/eod/date=2026-01-02/ticker=AAPL.json";

        archive.put_json(key, &json!({"chart": {}})).await.unwrap();
        archive.put_json(key, &json!({"chart": {"v": 2}})).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("watchlist-bucket").join(key)).unwrap();
        let v: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(v, json!({"chart": {"v": 2}}));
    }

    #[test]
    fn rejects_keys_escaping_the_bucket() {
        let archive = FsArchive::new("/tmp/archive", "b");
        assert!(archive.object_path("../etc/passwd").is_err());
        assert!(archive.object_path("/abs/key.json").is_err());
        assert!(archive.object_path("").is_err());
        assert!(archive.object_path("watchlists/date=2026-01-02/watchlist.json").is_ok());
    }
}
