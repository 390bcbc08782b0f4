use anyhow::Context;
use clap::{Parser, Subcommand};
use codepocalypse_core::config::Settings;
use codepocalypse_core::domain::metric::MetricReading;
use codepocalypse_core::domain::readings::ReadingSource;
use codepocalypse_core::ingest::alternatives::AlternativeClient;
use codepocalypse_core::ingest::bls_api::BlsApiClient;
use codepocalypse_core::ingest::bls_page::BlsPageScraper;
use codepocalypse_core::ingest::fred::FredClient;
use codepocalypse_core::ingest::indeed::IndeedScraper;
use codepocalypse_core::ingest::PrimaryMetricSource;
use codepocalypse_core::reconcile::{SnapshotEngine, Sources};
use codepocalypse_core::report::{MonthlyReport, WagerParties};
use codepocalypse_core::storage::lock::MonthLock;
use codepocalypse_core::storage::Durability;
use codepocalypse_core::time::month::{self, MonthKey};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod store;

#[derive(Debug, Parser)]
#[command(name = "codepocalypse_worker")]
struct Args {
    /// Where snapshots are kept.
    #[arg(long, value_enum, default_value_t = store::Backend::File, global = true)]
    backend: store::Backend,

    /// Clock override (RFC 3339 or YYYY-MM-DD). Defaults to the real UTC clock.
    #[arg(long, global = true)]
    now: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh if this month is due, then print the current view.
    Run,
    /// Run a refresh cycle for the current month regardless of the date.
    Refresh {
        /// Fetch and assemble the snapshot without writing it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Current snapshot and summary.
    Status,
    /// Time series of every recorded month.
    Chart,
    /// Monthly wager report.
    Report {
        /// Plain-text rendering instead of JSON.
        #[arg(long)]
        text: bool,
    },
    /// Scrape the employment page once.
    FetchPrimary {
        /// Parse a saved page instead of fetching.
        #[arg(long)]
        mock_html: Option<PathBuf>,
        /// Append the reading to the store's reading log.
        #[arg(long)]
        record: bool,
    },
    /// Scrape the job board's search results once.
    FetchIndeed {
        /// Parse a saved page instead of fetching.
        #[arg(long)]
        mock_html: Option<PathBuf>,
        /// Append the reading to the store's reading log.
        #[arg(long)]
        record: bool,
    },
    /// Latest and previous logged reading per source, with direction.
    Readings,
    /// Query the official statistics API.
    FetchOfficial {
        /// Include period-over-period trend analysis.
        #[arg(long)]
        analysis: bool,
        #[arg(long)]
        start_year: Option<i32>,
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Query the economic indicator series.
    FetchIndicators {
        /// Restrict observations to one month (YYYY-MM).
        #[arg(long)]
        month: Option<String>,
    },
    /// Query the job-board sources.
    FetchAlternatives,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(args, &settings).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

async fn run(args: Args, settings: &Settings) -> anyhow::Result<()> {
    let now = month::resolve_now(args.now.as_deref(), chrono::Utc::now())?;
    let command = args.command.unwrap_or(Command::Run);

    match command {
        Command::FetchPrimary { mock_html, record } => {
            let scraper = BlsPageScraper::from_settings(settings)?;
            let reading = match read_mock(mock_html.as_deref()).await? {
                Some(html) => scraper.fetch_primary_metric(false, Some(&html)).await?,
                None => scraper.current_reading().await?,
            };
            emit_reading(args.backend, settings, now, ReadingSource::Bls, reading, record).await
        }
        Command::FetchIndeed { mock_html, record } => {
            let scraper = IndeedScraper::from_settings(settings)?;
            let reading = match read_mock(mock_html.as_deref()).await? {
                Some(html) => scraper.fetch_job_count(false, Some(&html)).await?,
                None => scraper.current_count().await?,
            };
            emit_reading(args.backend, settings, now, ReadingSource::Indeed, reading, record).await
        }
        Command::Readings => {
            let (engine, _) = open_engine(args.backend, settings).await?;
            print_json(&engine.reading_trends().await?)
        }
        Command::FetchOfficial {
            analysis,
            start_year,
            end_year,
        } => {
            let client = BlsApiClient::from_settings(settings)?;
            let series = client.fetch_employment_data(start_year, end_year).await?;
            if analysis {
                let analysis = series.analyze();
                print_json(&serde_json::json!({ "series": series, "analysis": analysis }))
            } else {
                print_json(&series)
            }
        }
        Command::FetchIndicators { month } => {
            let target = month.as_deref().map(str::parse::<MonthKey>).transpose()?;
            let client = FredClient::from_settings(settings)?;
            let set = client.fetch_economic_indicators(target).await?;
            print_json(&set)
        }
        Command::FetchAlternatives => {
            let client = AlternativeClient::from_settings(settings)?;
            print_json(&client.fetch_alternative_estimate().await)
        }
        Command::Run => refresh(args.backend, settings, now, RefreshMode::IfDue).await,
        Command::Refresh { dry_run: true } => refresh(args.backend, settings, now, RefreshMode::DryRun).await,
        Command::Refresh { dry_run: false } => refresh(args.backend, settings, now, RefreshMode::Forced).await,
        Command::Status => {
            let (engine, _) = open_engine(args.backend, settings).await?;
            let current = engine.current_snapshot(now).await?;
            let summary = engine.summary(now).await?;
            print_json(&serde_json::json!({ "current": current, "summary": summary }))
        }
        Command::Chart => {
            let (engine, _) = open_engine(args.backend, settings).await?;
            print_json(&engine.chart_series().await?)
        }
        Command::Report { text } => {
            let (engine, _) = open_engine(args.backend, settings).await?;
            let view = engine.current_snapshot(now).await?;
            let report = MonthlyReport::build(&view, &WagerParties::from_settings(settings));
            if text {
                print!("{}", report.render_text());
                Ok(())
            } else {
                print_json(&report)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    IfDue,
    Forced,
    DryRun,
}

async fn open_engine(
    backend: store::Backend,
    settings: &Settings,
) -> anyhow::Result<(SnapshotEngine, Option<sqlx::PgPool>)> {
    let opened = store::open(backend, settings).await?;
    tracing::info!(backend = opened.store.name(), durability = ?opened.store.durability(), "store opened");
    if opened.store.durability() == Durability::Ephemeral {
        tracing::warn!("memory backend selected; nothing will outlive this process");
    }
    let engine = SnapshotEngine::new(opened.store, Sources::from_settings(settings)?);
    Ok((engine, opened.pool))
}

async fn refresh(
    backend: store::Backend,
    settings: &Settings,
    now: chrono::DateTime<chrono::Utc>,
    mode: RefreshMode,
) -> anyhow::Result<()> {
    let (engine, pool) = open_engine(backend, settings).await?;
    let month = MonthKey::of(now);

    // Postgres runs can overlap across processes; the month lock serializes them.
    let lock = match &pool {
        Some(pool) if mode != RefreshMode::DryRun => match MonthLock::try_acquire(pool, month).await? {
            Some(lock) => Some(lock),
            None => {
                tracing::warn!(%month, "month lock not acquired; another run in progress");
                return Ok(());
            }
        },
        _ => None,
    };

    let outcome = match mode {
        RefreshMode::IfDue => engine.run_if_due(now).await,
        RefreshMode::Forced => engine.refresh(now).await.map(Some),
        RefreshMode::DryRun => engine.dry_run(now).await.map(Some),
    };

    if let Some(lock) = lock {
        if let Err(err) = lock.release().await {
            tracing::warn!(error = %err, "failed to release month lock");
        }
    }

    match outcome? {
        Some(report) => print_json(&report),
        None => print_json(&engine.current_snapshot(now).await?),
    }
}

async fn read_mock(path: Option<&Path>) -> anyhow::Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(html))
}

/// Prints the reading; with `record`, logs it first and prints the trends too.
async fn emit_reading(
    backend: store::Backend,
    settings: &Settings,
    now: chrono::DateTime<chrono::Utc>,
    source: ReadingSource,
    reading: MetricReading,
    record: bool,
) -> anyhow::Result<()> {
    if !record {
        return print_json(&reading);
    }
    let (engine, _) = open_engine(backend, settings).await?;
    let trends = engine.record_reading(source, &reading, now).await?;
    print_json(&serde_json::json!({ "reading": reading, "trends": trends }))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "codepocalypse_worker",
            "refresh",
            "--dry-run",
            "--backend",
            "memory",
            "--now",
            "2025-09-01",
        ])
        .unwrap();
        assert_eq!(args.backend, store::Backend::Memory);
        assert_eq!(args.now.as_deref(), Some("2025-09-01"));
        assert!(matches!(args.command, Some(Command::Refresh { dry_run: true })));
    }

    #[test]
    fn defaults_to_run_on_file_backend() {
        let args = Args::try_parse_from(["codepocalypse_worker"]).unwrap();
        assert_eq!(args.backend, store::Backend::File);
        assert!(args.command.is_none());
    }

    #[test]
    fn parses_board_scrape_with_record() {
        let args = Args::try_parse_from([
            "codepocalypse_worker",
            "fetch-indeed",
            "--mock-html",
            "page.html",
            "--record",
        ])
        .unwrap();
        match args.command {
            Some(Command::FetchIndeed { mock_html: Some(path), record: true }) => {
                assert_eq!(path, PathBuf::from("page.html"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let args = Args::try_parse_from(["codepocalypse_worker", "readings"]).unwrap();
        assert!(matches!(args.command, Some(Command::Readings)));
    }

    #[test]
    fn indicator_month_must_be_a_month_key() {
        let args = Args::try_parse_from(["codepocalypse_worker", "fetch-indicators", "--month", "2025-06"]).unwrap();
        match args.command {
            Some(Command::FetchIndicators { month: Some(m) }) => assert!(m.parse::<MonthKey>().is_ok()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
