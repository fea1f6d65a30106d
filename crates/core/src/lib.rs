pub mod client;
pub mod domain;
pub mod publish;
pub mod query;
pub mod quote;
pub mod router;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::error::WatchlistError;

    pub const DEFAULT_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
    pub const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub watchlist_bucket: Option<String>,
        pub watchlist_table: Option<String>,
        pub database_url: Option<String>,
        pub archive_dir: Option<String>,
        pub sentry_dsn: Option<String>,
        pub quote_base_url: String,
        pub quote_timeout_secs: u64,
        pub api_url: String,
        pub port: u16,
    }

    /// Where publishes write to: archive bucket plus table name.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct WatchlistTarget {
        pub bucket: String,
        pub table: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                watchlist_bucket: non_empty_var("WATCHLIST_BUCKET"),
                watchlist_table: non_empty_var("WATCHLIST_TABLE"),
                database_url: non_empty_var("DATABASE_URL"),
                archive_dir: non_empty_var("ARCHIVE_DIR"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                quote_base_url: non_empty_var("QUOTE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_QUOTE_BASE_URL.to_string()),
                quote_timeout_secs: non_empty_var("QUOTE_TIMEOUT_SECS")
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_QUOTE_TIMEOUT_SECS),
                api_url: non_empty_var("WATCHLIST_API_URL")
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                port: non_empty_var("PORT")
                    .and_then(|s| s.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_PORT),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url.as_deref().ok_or_else(|| {
                WatchlistError::ConfigurationMissing("DATABASE_URL is required".to_string()).into()
            })
        }

        pub fn require_watchlist_target(&self) -> anyhow::Result<WatchlistTarget> {
            match (&self.watchlist_bucket, &self.watchlist_table) {
                (Some(bucket), Some(table)) => Ok(WatchlistTarget {
                    bucket: bucket.clone(),
                    table: table.clone(),
                }),
                _ => Err(WatchlistError::ConfigurationMissing(
                    "Missing WATCHLIST_BUCKET or WATCHLIST_TABLE env vars".to_string(),
                )
                .into()),
            }
        }
    }

    fn non_empty_var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.trim().is_empty())
    }

}
