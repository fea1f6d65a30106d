use anyhow::ensure;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Every watchlist lives under this single partition; the sort key is the date.
pub const WATCHLIST_PARTITION: &str = "WATCHLIST";

pub const DEFAULT_UNIVERSE: &str = "S&P 1500 (TEST: AAPL+GOOG)";
pub const DEFAULT_TICKERS: [&str; 2] = ["AAPL", "GOOG"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistRow {
    pub rank: u32,
    pub ticker: String,
    pub score: f64,
}

/// The published ranking for one date, as written to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistSnapshot {
    pub as_of: NaiveDate,
    pub universe: String,
    pub model_version_id: String,
    pub top_n: usize,
    pub rows: Vec<WatchlistRow>,
}

/// A snapshot plus the serving metadata kept in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRecord {
    #[serde(flatten)]
    pub snapshot: WatchlistSnapshot,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

/// Table item: the record with its partition and sort keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWatchlist {
    pub pk: String,
    pub sk: String,
    #[serde(flatten)]
    pub record: WatchlistRecord,
}

impl StoredWatchlist {
    pub fn new(record: WatchlistRecord) -> Self {
        Self {
            pk: WATCHLIST_PARTITION.to_string(),
            sk: record.snapshot.as_of.to_string(),
            record,
        }
    }
}

impl WatchlistSnapshot {
    pub fn new(
        as_of: NaiveDate,
        universe: &str,
        model_version_id: &str,
        rows: Vec<WatchlistRow>,
    ) -> anyhow::Result<Self> {
        let snapshot = Self {
            as_of,
            universe: universe.to_string(),
            model_version_id: model_version_id.to_string(),
            top_n: rows.len(),
            rows,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.rows.len() == self.top_n,
            "topN mismatch: topN={}, rows={}",
            self.top_n,
            self.rows.len()
        );

        for (idx, row) in self.rows.iter().enumerate() {
            let expected = idx as u32 + 1;
            ensure!(
                row.rank == expected,
                "rank gap at position {idx}: expected {expected}, got {}",
                row.rank
            );
            ensure!(!row.ticker.trim().is_empty(), "ticker must be non-empty");
            ensure!(
                row.score.is_finite(),
                "score must be finite (ticker={})",
                row.ticker
            );
        }

        for pair in self.rows.windows(2) {
            ensure!(
                pair[0].score >= pair[1].score,
                "rows not sorted by descending score: {} ({}) before {} ({})",
                pair[0].ticker,
                pair[0].score,
                pair[1].ticker,
                pair[1].score
            );
        }

        Ok(())
    }
}

/// Sorts by descending score and assigns ranks 1..=N. The sort is stable, so
/// equal scores keep their input order.
pub fn rank_scores(mut scored: Vec<(String, f64)>) -> Vec<WatchlistRow> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .enumerate()
        .map(|(idx, (ticker, score))| WatchlistRow {
            rank: idx as u32 + 1,
            ticker,
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
    }

    #[test]
    fn ranks_by_descending_score() {
        let rows = rank_scores(vec![
            ("GOOG".to_string(), 140.0),
            ("MSFT".to_string(), 410.5),
            ("AAPL".to_string(), 150.0),
        ]);
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.as_str()).collect();
        let ranks: Vec<_> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(tickers, ["MSFT", "AAPL", "GOOG"]);
        assert_eq!(ranks, [1, 2, 3]);
    }

    #[test]
    fn ties_keep_input_order() {
        let rows = rank_scores(vec![
            ("ZZZ".to_string(), 10.0),
            ("AAA".to_string(), 20.0),
            ("MMM".to_string(), 10.0),
        ]);
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, ["AAA", "ZZZ", "MMM"]);
    }

    #[test]
    fn validate_rejects_rank_gaps_and_unsorted_rows() {
        let mut snapshot = WatchlistSnapshot::new(
            as_of(),
            DEFAULT_UNIVERSE,
            "v0",
            rank_scores(vec![("A".to_string(), 2.0), ("B".to_string(), 1.0)]),
        )
        .unwrap();

        snapshot.rows[1].rank = 3;
        assert!(snapshot.validate().is_err());

        snapshot.rows[1].rank = 2;
        snapshot.rows[1].score = 5.0;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn stored_item_serializes_with_keys_and_camel_case_fields() {
        let snapshot = WatchlistSnapshot::new(
            as_of(),
            DEFAULT_UNIVERSE,
            "demo-yahoo-v0",
            rank_scores(vec![("AAPL".to_string(), 150.0)]),
        )
        .unwrap();
        let record = WatchlistRecord {
            snapshot,
            s3_key: "watchlists/date=2026-01-02/watchlist.json".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 2, 21, 0, 0).unwrap(),
        };

        let v = serde_json::to_value(StoredWatchlist::new(record.clone())).unwrap();
        assert_eq!(v["pk"], json!("WATCHLIST"));
        assert_eq!(v["sk"], json!("2026-01-02"));
        assert_eq!(v["asOf"], json!("2026-01-02"));
        assert_eq!(v["modelVersionId"], json!("demo-yahoo-v0"));
        assert_eq!(v["topN"], json!(1));
        assert_eq!(v["s3Key"], json!("watchlists/date=2026-01-02/watchlist.json"));
        assert_eq!(v["rows"][0], json!({"rank": 1, "ticker": "AAPL", "score": 150.0}));

        let back: StoredWatchlist = serde_json::from_value(v).unwrap();
        assert_eq!(back.record, record);
    }
}
