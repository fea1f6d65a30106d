use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlist_core::client::{render_table, WatchlistApiClient};
use watchlist_core::config::Settings;
use watchlist_core::publish::{PublishRequest, Publisher};
use watchlist_core::query::{QueryService, DEFAULT_RECENT_DAYS};
use watchlist_core::quote::yahoo::YahooChartSource;
use watchlist_core::storage::Backends;
use watchlist_core::time::utc_date::parse_iso_date;

#[derive(Debug, Parser)]
#[command(name = "watchlist_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch EOD closes, rank them and publish the watchlist.
    Publish {
        /// As-of date (YYYY-MM-DD). Defaults to today's UTC date.
        #[arg(long)]
        as_of_date: Option<String>,

        /// Comma-separated tickers. Defaults to AAPL,GOOG.
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,

        /// Publish into in-memory stores instead of the configured backends.
        #[arg(long)]
        dry_run: bool,

        /// Ask the running API to publish instead of publishing in-process.
        #[arg(long, conflicts_with = "dry_run")]
        via_api: bool,
    },

    /// Print the latest watchlist from the API.
    Latest,

    /// Print the watchlist for one date from the API.
    Show { date: String },

    /// List recently published dates from the API.
    Recent {
        #[arg(long, default_value_t = DEFAULT_RECENT_DAYS)]
        days: usize,
    },
}

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

    let args = Args::parse();

    let res = match args.command {
        Command::Publish {
            as_of_date,
            tickers,
            via_api: true,
            ..
        } => publish_via_api(&settings, as_of_date.as_deref(), &tickers).await,
        Command::Publish {
            as_of_date,
            tickers,
            dry_run,
            via_api: false,
        } => run_publish(&settings, as_of_date, tickers, dry_run).await,
        Command::Latest => {
            let client = WatchlistApiClient::from_settings(&settings)?;
            let item = client.latest().await?;
            print!("{}", render_table(&item.record));
            Ok(())
        }
        Command::Show { date } => {
            let client = WatchlistApiClient::from_settings(&settings)?;
            let item = client.by_date(&date).await?;
            print!("{}", render_table(&item.record));
            Ok(())
        }
        Command::Recent { days } => {
            let client = WatchlistApiClient::from_settings(&settings)?;
            for d in client.recent(days).await? {
                println!("{d}");
            }
            Ok(())
        }
    };

    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker command failed");
    }
    res
}

async fn run_publish(
    settings: &Settings,
    as_of_date: Option<String>,
    tickers: Vec<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let backends = if dry_run {
        Backends::in_memory()
    } else {
        let target = settings.require_watchlist_target()?;
        let db_url = settings.require_database_url()?;
        let pool = watchlist_core::storage::connect(db_url).await?;
        Backends::from_pool(pool, settings, &target)
    };

    let quotes = Arc::new(YahooChartSource::from_settings(settings)?);
    let publisher = Publisher::new(quotes, backends.archive.clone(), backends.table.clone());
    let query = QueryService::new(backends.table);

    let req = PublishRequest {
        tickers: Some(tickers),
        as_of: as_of_date,
    };
    let outcome = publisher.publish(&req, chrono::Utc::now()).await?;

    tracing::info!(
        as_of = %outcome.as_of,
        dry_run,
        key = %outcome.watchlist_s3_key,
        "publish finished"
    );

    let item = query
        .get_by_date(&outcome.as_of.to_string())
        .await
        .context("published watchlist not readable")?;
    print!("{}", render_table(&item.record));
    Ok(())
}

async fn publish_via_api(
    settings: &Settings,
    as_of_date: Option<&str>,
    tickers: &[String],
) -> anyhow::Result<()> {
    // Validate locally so a typo never reaches the API.
    let as_of = as_of_date.map(parse_iso_date).transpose()?;

    let client = WatchlistApiClient::from_settings(settings)?;
    let outcome = client.publish(tickers, as_of).await?;
    tracing::info!(as_of = %outcome.as_of, key = %outcome.watchlist_s3_key, "publish requested via api");

    let item = client.by_date(&outcome.as_of.to_string()).await?;
    print!("{}", render_table(&item.record));
    Ok(())
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
