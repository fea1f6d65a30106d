use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlist_core::config::Settings;
use watchlist_core::domain::error::{classify, WatchlistError};
use watchlist_core::publish::Publisher;
use watchlist_core::query::QueryService;
use watchlist_core::quote::yahoo::YahooChartSource;
use watchlist_core::router::{error_response, ApiRequest, ApiResponse, WatchlistApi};
use watchlist_core::storage::Backends;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let api = match build_api(&settings).await {
        Ok(api) => api,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            degraded_api(&e)
        }
    };

    let state = AppState { api };
    let configured = state.api.is_configured();

    let app = Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, configured, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_api(settings: &Settings) -> anyhow::Result<WatchlistApi> {
    // Configuration is checked first so its message is what degraded mode reports.
    let target = settings.require_watchlist_target()?;
    let db_url = settings.require_database_url()?;

    let pool = watchlist_core::storage::connect(db_url).await?;
    let backends = Backends::from_pool(pool, settings, &target);
    let quotes = Arc::new(YahooChartSource::from_settings(settings)?);

    let publisher = Publisher::new(quotes, backends.archive.clone(), backends.table.clone());
    let query = QueryService::new(backends.table);

    tracing::info!(bucket = %target.bucket, table = %target.table, "backends ready");
    Ok(WatchlistApi::new(publisher, query))
}

// Missing configuration keeps its own message; anything else (an unreachable
// database, a bad quote URL) is served as a server error with the full cause.
fn degraded_api(err: &anyhow::Error) -> WatchlistApi {
    let detail = format!("{err:#}");
    match classify(err) {
        Some(WatchlistError::ConfigurationMissing(msg)) => {
            tracing::error!(error = %detail, "configuration missing; starting API in degraded mode");
            WatchlistApi::unconfigured(msg.clone())
        }
        _ => {
            tracing::error!(error = %detail, "backends unavailable; starting API in degraded mode");
            WatchlistApi::unavailable(detail)
        }
    }
}

#[derive(Clone)]
struct AppState {
    api: WatchlistApi,
}

// Every request goes through the watchlist router's own route table.
async fn handle(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let body = (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned());

    let req = ApiRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
        body,
    };

    let resp = match state.api.dispatch(&req).await {
        Ok(resp) => resp,
        Err(err) => {
            let resp = error_response(&err);
            if resp.status >= 500 {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(method = %req.method, path = %req.path, error = %format!("{err:#}"), "request failed");
            }
            resp
        }
    };

    into_http(resp)
}

fn into_http(resp: ApiResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, resp.body).into_response();
    for (name, value) in resp.headers {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            out.headers_mut()
                .insert(name, HeaderValue::from_static(value));
        }
    }
    out
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
