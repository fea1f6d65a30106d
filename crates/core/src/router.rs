use crate::domain::error::{classify as classify_error, WatchlistError};
use crate::publish::{PublishRequest, Publisher};
use crate::query::{parse_recent_limit, QueryService};
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const CORS_HEADERS: [(&str, &str); 5] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET,POST,OPTIONS"),
    ("Access-Control-Allow-Headers", "content-type,authorization"),
    ("Access-Control-Max-Age", "86400"),
    ("Content-Type", "application/json"),
];

/// Transport-neutral inbound request.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl ApiResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: CORS_HEADERS.to_vec(),
            body: body.to_string(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: CORS_HEADERS.to_vec(),
            body: String::new(),
        }
    }

    #[cfg(test)]
    pub fn body_json(&self) -> anyhow::Result<Value> {
        serde_json::from_str(&self.body).context("response body is not JSON")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Health,
    Publish,
    Latest,
    Recent,
    ByDate(String),
}

#[derive(Debug, Clone, Copy)]
enum PathPattern {
    Any,
    Exact(&'static str),
    /// Exactly one non-empty segment after the prefix.
    Segment(&'static str),
}

impl PathPattern {
    fn capture<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self {
            Self::Any => Some(path),
            Self::Exact(p) => (path == *p).then_some(path),
            Self::Segment(prefix) => path
                .strip_prefix(prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/')),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RouteKind {
    Preflight,
    Health,
    Publish,
    Latest,
    Recent,
    ByDate,
}

// Evaluated top to bottom; the first match wins, so the fixed `latest` and
// `recent` paths must precede the date segment.
const ROUTES: &[(&str, PathPattern, RouteKind)] = &[
    ("OPTIONS", PathPattern::Any, RouteKind::Preflight),
    ("GET", PathPattern::Exact("/healthz"), RouteKind::Health),
    ("POST", PathPattern::Exact("/admin/fetch-eod"), RouteKind::Publish),
    ("GET", PathPattern::Exact("/watchlists/latest"), RouteKind::Latest),
    ("GET", PathPattern::Exact("/watchlists/recent"), RouteKind::Recent),
    ("GET", PathPattern::Segment("/watchlists/"), RouteKind::ByDate),
];

pub fn classify(method: &str, path: &str) -> Option<Route> {
    ROUTES.iter().find_map(|(m, pattern, kind)| {
        if !method.eq_ignore_ascii_case(m) {
            return None;
        }
        let captured = pattern.capture(path)?;
        Some(match kind {
            RouteKind::Preflight => Route::Preflight,
            RouteKind::Health => Route::Health,
            RouteKind::Publish => Route::Publish,
            RouteKind::Latest => Route::Latest,
            RouteKind::Recent => Route::Recent,
            RouteKind::ByDate => Route::ByDate(captured.to_string()),
        })
    })
}

/// Maps a failed dispatch to its JSON response.
pub fn error_response(err: &anyhow::Error) -> ApiResponse {
    match classify_error(err) {
        Some(WatchlistError::InvalidInput(msg)) => ApiResponse::json(400, &json!({ "message": msg })),
        Some(WatchlistError::NotFound(msg)) => ApiResponse::json(404, &json!({ "message": msg })),
        Some(WatchlistError::ConfigurationMissing(msg)) => {
            ApiResponse::json(500, &json!({ "message": msg }))
        }
        _ => ApiResponse::json(
            500,
            &json!({ "message": "Server error", "error": format!("{err:#}") }),
        ),
    }
}

#[derive(Clone)]
struct Services {
    publisher: Publisher,
    query: QueryService,
}

/// Why the API could not be wired up at startup.
#[derive(Debug, Clone)]
enum Degraded {
    Configuration(String),
    Backend(String),
}

/// Request handler over injected backends. Built once at startup.
#[derive(Clone)]
pub struct WatchlistApi {
    services: Result<Services, Degraded>,
}

impl WatchlistApi {
    pub fn new(publisher: Publisher, query: QueryService) -> Self {
        Self {
            services: Ok(Services { publisher, query }),
        }
    }

    /// Every request fails with this configuration message.
    pub fn unconfigured(message: impl Into<String>) -> Self {
        Self {
            services: Err(Degraded::Configuration(message.into())),
        }
    }

    /// Configuration was fine but a backend could not be reached; every
    /// request is a server error carrying `detail`.
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            services: Err(Degraded::Backend(detail.into())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.services.is_ok()
    }

    pub async fn handle(&self, req: &ApiRequest) -> ApiResponse {
        match self.dispatch(req).await {
            Ok(resp) => resp,
            Err(err) => error_response(&err),
        }
    }

    /// Like `handle`, but hands failures back so the caller can report them.
    pub async fn dispatch(&self, req: &ApiRequest) -> anyhow::Result<ApiResponse> {
        let services = match &self.services {
            Ok(services) => services,
            Err(Degraded::Configuration(msg)) => {
                return Err(WatchlistError::ConfigurationMissing(msg.clone()).into())
            }
            Err(Degraded::Backend(detail)) => {
                return Err(anyhow!("backends unavailable: {detail}"))
            }
        };

        let Some(route) = classify(&req.method, &req.path) else {
            return Ok(ApiResponse::json(
                404,
                &json!({ "message": "Not Found", "method": req.method, "path": req.path }),
            ));
        };

        tracing::debug!(method = %req.method, path = %req.path, ?route, "dispatch");

        match route {
            Route::Preflight => Ok(ApiResponse::no_content()),
            Route::Health => Ok(ApiResponse::json(200, &json!("ok"))),
            Route::Publish => {
                let body = parse_publish_body(req.body.as_deref())?;
                let outcome = services.publisher.publish(&body, Utc::now()).await?;
                Ok(ApiResponse::json(200, &serde_json::to_value(outcome)?))
            }
            Route::Latest => {
                let item = services.query.get_latest().await?;
                Ok(ApiResponse::json(200, &serde_json::to_value(item)?))
            }
            Route::Recent => {
                let limit = parse_recent_limit(req.query.get("days").map(String::as_str));
                let dates = services.query.get_recent_dates(limit).await?;
                Ok(ApiResponse::json(200, &json!({ "dates": dates })))
            }
            Route::ByDate(date) => {
                let item = services.query.get_by_date(&date).await?;
                Ok(ApiResponse::json(200, &serde_json::to_value(item)?))
            }
        }
    }
}

fn parse_publish_body(body: Option<&str>) -> anyhow::Result<PublishRequest> {
    match body.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => serde_json::from_str(s).context("invalid JSON request body"),
        None => Ok(PublishRequest::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::tests::StubQuotes;
    use crate::storage::memory::{MemoryArchive, MemoryWatchlistTable};
    use crate::storage::WatchlistTable;
    use std::sync::Arc;

    fn build_api(quotes: StubQuotes) -> (WatchlistApi, Arc<MemoryWatchlistTable>) {
        let table = Arc::new(MemoryWatchlistTable::new());
        let publisher = Publisher::new(
            Arc::new(quotes),
            Arc::new(MemoryArchive::new()),
            table.clone(),
        );
        let query = QueryService::new(table.clone());
        (WatchlistApi::new(publisher, query), table)
    }

    fn req(method: &str, path: &str) -> ApiRequest {
        ApiRequest {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn publish_req(body: Value) -> ApiRequest {
        ApiRequest {
            body: Some(body.to_string()),
            ..req("POST", "/admin/fetch-eod")
        }
    }

    #[test]
    fn route_table_classification() {
        assert_eq!(classify("OPTIONS", "/anything/at/all"), Some(Route::Preflight));
        assert_eq!(classify("POST", "/admin/fetch-eod"), Some(Route::Publish));
        assert_eq!(classify("GET", "/watchlists/latest"), Some(Route::Latest));
        assert_eq!(classify("get", "/watchlists/recent"), Some(Route::Recent));
        assert_eq!(
            classify("GET", "/watchlists/2026-01-02"),
            Some(Route::ByDate("2026-01-02".to_string()))
        );
        assert_eq!(classify("GET", "/watchlists/"), None);
        assert_eq!(classify("GET", "/watchlists/2026-01-02/extra"), None);
        assert_eq!(classify("GET", "/admin/fetch-eod"), None);
        assert_eq!(classify("DELETE", "/watchlists/latest"), None);
    }

    #[tokio::test]
    async fn end_to_end_publish_then_read() {
        let (api, _) = build_api(StubQuotes::new(&[("AAPL", 150.00), ("GOOG", 140.00)]));

        let resp = api
            .handle(&publish_req(json!({"tickers": ["AAPL", "GOOG"], "asOf": "2026-01-02"})))
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body_json().unwrap(),
            json!({
                "ok": true,
                "asOf": "2026-01-02",
                "tickers": ["AAPL", "GOOG"],
                "watchlistS3Key": "watchlists/date=2026-01-02/watchlist.json"
            })
        );

        let latest = api.handle(&req("GET", "/watchlists/latest")).await;
        assert_eq!(latest.status, 200);
        let v = latest.body_json().unwrap();
        assert_eq!(
            v["rows"],
            json!([
                {"rank": 1, "ticker": "AAPL", "score": 150.0},
                {"rank": 2, "ticker": "GOOG", "score": 140.0}
            ])
        );
        assert_eq!(v["sk"], json!("2026-01-02"));

        let by_date = api.handle(&req("GET", "/watchlists/2026-01-02")).await;
        assert_eq!(by_date.status, 200);
        assert_eq!(by_date.body_json().unwrap(), v);
    }

    #[tokio::test]
    async fn failed_fetch_is_a_server_error_without_a_record() {
        let (api, table) = build_api(StubQuotes::new(&[("AAPL", 150.0)]));

        let resp = api
            .handle(&publish_req(json!({"tickers": ["AAPL", "GOOG"], "asOf": "2026-01-02"})))
            .await;
        assert_eq!(resp.status, 500);
        let v = resp.body_json().unwrap();
        assert_eq!(v["message"], json!("Server error"));
        assert_eq!(
            v["error"],
            json!("quote fetch failed for GOOG: HTTP 404 Not Found")
        );
        assert!(table.get("WATCHLIST", "2026-01-02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_errors_map_to_statuses() {
        let (api, _) = build_api(StubQuotes::default());

        let latest = api.handle(&req("GET", "/watchlists/latest")).await;
        assert_eq!(latest.status, 404);
        assert!(latest.body_json().unwrap()["message"].is_string());

        let bad = api.handle(&req("GET", "/watchlists/2024-13-40")).await;
        assert_eq!(bad.status, 400);
        let bad = api.handle(&req("GET", "/watchlists/foo")).await;
        assert_eq!(bad.status, 400);

        let missing = api.handle(&req("GET", "/watchlists/2024-01-01")).await;
        assert_eq!(missing.status, 404);
        assert_eq!(
            missing.body_json().unwrap(),
            json!({"message": "No watchlist for 2024-01-01"})
        );
    }

    #[tokio::test]
    async fn recent_days_are_clamped() {
        let (api, _) = build_api(StubQuotes::new(&[("AAPL", 1.0)]));
        for d in ["2026-01-01", "2026-01-02", "2026-01-03"] {
            let resp = api
                .handle(&publish_req(json!({"tickers": ["AAPL"], "asOf": d})))
                .await;
            assert_eq!(resp.status, 200);
        }

        let mut huge = req("GET", "/watchlists/recent");
        huge.query.insert("days".to_string(), "9999".to_string());
        let mut max = req("GET", "/watchlists/recent");
        max.query.insert("days".to_string(), "365".to_string());
        let huge = api.handle(&huge).await;
        assert_eq!(huge, api.handle(&max).await);
        assert_eq!(
            huge.body_json().unwrap(),
            json!({"dates": ["2026-01-03", "2026-01-02", "2026-01-01"]})
        );

        let mut two = req("GET", "/watchlists/recent");
        two.query.insert("days".to_string(), "2".to_string());
        assert_eq!(
            api.handle(&two).await.body_json().unwrap(),
            json!({"dates": ["2026-01-03", "2026-01-02"]})
        );
    }

    #[tokio::test]
    async fn preflight_unmatched_and_cors() {
        let (api, _) = build_api(StubQuotes::default());

        let pre = api.handle(&req("OPTIONS", "/watchlists/latest")).await;
        assert_eq!(pre.status, 204);
        assert!(pre.body.is_empty());
        assert!(pre
            .headers
            .contains(&("Access-Control-Allow-Origin", "*")));

        let nf = api.handle(&req("PUT", "/nope")).await;
        assert_eq!(nf.status, 404);
        assert_eq!(
            nf.body_json().unwrap(),
            json!({"message": "Not Found", "method": "PUT", "path": "/nope"})
        );
        assert_eq!(nf.headers, CORS_HEADERS.to_vec());
    }

    #[tokio::test]
    async fn malformed_body_is_a_server_error() {
        let (api, table) = build_api(StubQuotes::new(&[("AAPL", 1.0)]));
        let resp = api
            .handle(&ApiRequest {
                body: Some("{not json".to_string()),
                ..req("POST", "/admin/fetch-eod")
            })
            .await;
        assert_eq!(resp.status, 500);
        assert!(resp.body_json().unwrap()["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid JSON request body"));
        assert!(table.is_empty().unwrap());
    }

    #[tokio::test]
    async fn unconfigured_api_fails_every_request() {
        let api = WatchlistApi::unconfigured("Missing WATCHLIST_BUCKET or WATCHLIST_TABLE env vars");
        assert!(!api.is_configured());

        for (m, p) in [("OPTIONS", "/x"), ("GET", "/watchlists/latest"), ("GET", "/nope")] {
            let resp = api.handle(&req(m, p)).await;
            assert_eq!(resp.status, 500);
            assert_eq!(
                resp.body_json().unwrap(),
                json!({"message": "Missing WATCHLIST_BUCKET or WATCHLIST_TABLE env vars"})
            );
        }
    }

    #[tokio::test]
    async fn unavailable_api_reports_the_cause() {
        let api = WatchlistApi::unavailable("connect DATABASE_URL failed: connection refused");
        assert!(!api.is_configured());

        let resp = api.handle(&req("GET", "/watchlists/latest")).await;
        assert_eq!(resp.status, 500);
        assert_eq!(
            resp.body_json().unwrap(),
            json!({
                "message": "Server error",
                "error": "backends unavailable: connect DATABASE_URL failed: connection refused"
            })
        );
    }

    #[tokio::test]
    async fn non_array_tickers_publish_the_default_pair() {
        let (api, table) = build_api(StubQuotes::new(&[("AAPL", 150.0), ("GOOG", 140.0)]));

        let resp = api
            .handle(&publish_req(json!({"tickers": "AAPL", "asOf": "2026-01-02"})))
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body_json().unwrap()["tickers"], json!(["AAPL", "GOOG"]));
        assert_eq!(table.len().unwrap(), 1);
    }
}
