use std::fmt;

/// Failure kinds the router maps to specific HTTP statuses. Anything that is
/// not one of these travels as a plain `anyhow::Error` and becomes a 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchlistError {
    ConfigurationMissing(String),
    UpstreamFetch { ticker: String, detail: String },
    InvalidInput(String),
    NotFound(String),
}

impl WatchlistError {
    pub fn upstream(ticker: &str, detail: impl Into<String>) -> Self {
        Self::UpstreamFetch {
            ticker: ticker.to_string(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for WatchlistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationMissing(msg) => write!(f, "{msg}"),
            Self::UpstreamFetch { ticker, detail } => {
                write!(f, "quote fetch failed for {ticker}: {detail}")
            }
            Self::InvalidInput(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for WatchlistError {}

/// Finds the first typed failure anywhere in the context chain.
pub fn classify(err: &anyhow::Error) -> Option<&WatchlistError> {
    err.chain().find_map(|cause| cause.downcast_ref::<WatchlistError>())
}
