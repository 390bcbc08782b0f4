use crate::config::Settings;
use crate::domain::indicators::TrendDirection;
use crate::domain::metric::{MetricReading, Provenance};
use crate::domain::readings::{ReadingSource, ReadingTrends, RecordedReading};
use crate::domain::snapshot::{
    AlternativeSummary, ChartPoint, IndicatorSummary, MonthlySnapshot, Outcome, PrimaryMetric,
    BASELINE_EMPLOYMENT,
};
use crate::ingest::alternatives::AlternativeClient;
use crate::ingest::bls_api::BlsApiClient;
use crate::ingest::bls_page::{self, BlsPageScraper};
use crate::ingest::fred::FredClient;
use crate::ingest::{AlternativeSource, IndicatorSource, OfficialStatisticsSource, PrimaryMetricSource};
use crate::storage::{Durability, StorageBackend, StoreDocument};
use crate::time::month::{self, MonthKey};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::Instrument;

pub mod backfill;

/// Summary trend: a change-from-baseline move of more than this across the
/// last three snapshots counts as a direction.
const TREND_THRESHOLD: i64 = 5_000;
const TREND_WINDOW: usize = 3;

/// The four upstreams the engine folds into a snapshot.
#[derive(Clone)]
pub struct Sources {
    pub primary: Arc<dyn PrimaryMetricSource>,
    pub official: Arc<dyn OfficialStatisticsSource>,
    pub indicators: Arc<dyn IndicatorSource>,
    pub alternatives: Arc<dyn AlternativeSource>,
}

impl Sources {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            primary: Arc::new(BlsPageScraper::from_settings(settings)?),
            official: Arc::new(BlsApiClient::from_settings(settings)?),
            indicators: Arc::new(FredClient::from_settings(settings)?),
            alternatives: Arc::new(AlternativeClient::from_settings(settings)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub run_id: uuid::Uuid,
    pub snapshot: MonthlySnapshot,
    /// False for dry runs.
    pub persisted: bool,
    pub replaced_existing: bool,
    pub durability: Durability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentView {
    pub snapshot: Option<MonthlySnapshot>,
    pub age_in_days: Option<i64>,
    pub next_update_due: DateTime<Utc>,
    pub durability: Durability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSummary {
    pub total_months: usize,
    /// `None` when nothing has been recorded.
    pub current_outcome: Option<Outcome>,
    pub avg_monthly_change: i64,
    pub trend_direction: TrendDirection,
    pub next_update_due: DateTime<Utc>,
}

/// Folds the fetchers into one snapshot per month and owns the store.
///
/// Every read and write goes through one critical section (load, mutate,
/// save) so concurrent callers in the process cannot interleave.
pub struct SnapshotEngine {
    store: Arc<dyn StorageBackend>,
    sources: Sources,
    baseline: i64,
    backfill: bool,
    backfilled: OnceCell<()>,
    guard: Mutex<()>,
}

impl SnapshotEngine {
    pub fn new(store: Arc<dyn StorageBackend>, sources: Sources) -> Self {
        Self {
            store,
            sources,
            baseline: BASELINE_EMPLOYMENT,
            backfill: true,
            backfilled: OnceCell::new(),
            guard: Mutex::new(()),
        }
    }

    pub fn without_backfill(mut self) -> Self {
        self.backfill = false;
        self
    }

    pub fn durability(&self) -> Durability {
        self.store.durability()
    }

    /// True only on the first day of a month that has no snapshot yet.
    pub async fn should_refresh(&self, now: DateTime<Utc>) -> anyhow::Result<bool> {
        if !month::is_refresh_day(now) {
            return Ok(false);
        }
        let document = self.load().await?;
        Ok(!document.has_month(MonthKey::of(now)))
    }

    pub async fn run_if_due(&self, now: DateTime<Utc>) -> anyhow::Result<Option<RefreshReport>> {
        if !self.should_refresh(now).await? {
            tracing::info!(month = %MonthKey::of(now), "refresh not due");
            return Ok(None);
        }
        self.refresh(now).await.map(Some)
    }

    /// Runs a full cycle for `now`'s month and persists the result. Fetch
    /// failures never abort the cycle; only storage errors and writes to a
    /// finalized month do.
    pub async fn refresh(&self, now: DateTime<Utc>) -> anyhow::Result<RefreshReport> {
        self.run_cycle(now, true).await
    }

    /// Same cycle as [`refresh`](Self::refresh) without touching the store.
    pub async fn dry_run(&self, now: DateTime<Utc>) -> anyhow::Result<RefreshReport> {
        self.run_cycle(now, false).await
    }

    async fn run_cycle(&self, now: DateTime<Utc>, persist: bool) -> anyhow::Result<RefreshReport> {
        let run_id = uuid::Uuid::new_v4();
        let month = MonthKey::of(now);
        let span = tracing::info_span!("refresh", %run_id, %month, persist);

        async move {
            let snapshot = self.collect_snapshot(now).await;
            tracing::info!(
                count = snapshot.primary_metric.count,
                provenance = snapshot.primary_metric.provenance.as_str(),
                outcome = ?snapshot.comparison.outcome,
                health_score = snapshot.indicators.health_score,
                "snapshot assembled"
            );

            if !persist {
                return Ok::<_, anyhow::Error>(RefreshReport {
                    run_id,
                    snapshot,
                    persisted: false,
                    replaced_existing: false,
                    durability: self.durability(),
                });
            }

            self.ensure_backfilled().await?;
            let _held = self.guard.lock().await;
            let mut document = self.load_unguarded().await?;
            let replaced_existing = document.has_month(month);
            document
                .upsert(snapshot.clone())
                .with_context(|| format!("refresh for {month} not persisted"))?;
            document.stamp(now);
            document.readings.record(
                ReadingSource::Bls,
                RecordedReading::from_primary(&snapshot.primary_metric, now),
            );
            self.store
                .save(&document)
                .await
                .with_context(|| format!("failed to save store via {} backend", self.store.name()))?;

            tracing::info!(replaced_existing, total_months = document.data.len(), "snapshot persisted");
            Ok(RefreshReport {
                run_id,
                snapshot,
                persisted: true,
                replaced_existing,
                durability: self.durability(),
            })
        }
        .instrument(span)
        .await
    }

    /// Primary chain and indicators run concurrently; neither can fail the
    /// cycle.
    pub async fn collect_snapshot(&self, now: DateTime<Utc>) -> MonthlySnapshot {
        let ((primary, alternative), indicators) =
            tokio::join!(self.resolve_primary(), self.resolve_indicators());

        let mut snapshot = MonthlySnapshot::new(now, primary, indicators, self.baseline);
        snapshot.alternative = alternative;
        snapshot
    }

    async fn resolve_primary(&self) -> (PrimaryMetric, Option<AlternativeSummary>) {
        let scraped = match self.sources.primary.current_reading().await {
            Ok(reading) => reading,
            Err(err) => {
                tracing::warn!(source = self.sources.primary.source_name(), error = %err, "primary source unusable; continuing fallback chain");
                bls_page::static_fallback()
            }
        };
        if scraped.provenance.is_live() {
            return (PrimaryMetric::from(&scraped), None);
        }

        match self.sources.official.employment_series().await {
            Ok(series) if !series.is_fallback() => {
                let reading = series.reading();
                tracing::info!(count = reading.value, period = %reading.as_of_period, "using official API figure");
                return (PrimaryMetric::from(&reading), None);
            }
            Ok(series) => {
                tracing::warn!(
                    error = series.metadata.error.as_deref().unwrap_or_default(),
                    "official API returned its fallback record"
                );
            }
            Err(err) => {
                tracing::warn!(source = self.sources.official.source_name(), error = %err, "official API unusable");
            }
        }

        let estimate = self.sources.alternatives.alternative_estimate().await;
        tracing::warn!(
            total_estimate = estimate.total_estimate,
            "primary and official sources exhausted; keeping static baseline with job-board estimate attached"
        );
        (static_primary(&scraped), Some(estimate.summary()))
    }

    async fn resolve_indicators(&self) -> IndicatorSummary {
        match self.sources.indicators.economic_indicators(None).await {
            Ok(set) => IndicatorSummary::from(&set),
            Err(err) => {
                tracing::warn!(source = self.sources.indicators.source_name(), error = %err, "indicators unavailable; using stand-in");
                IndicatorSummary::stand_in()
            }
        }
    }

    pub async fn current_snapshot(&self, now: DateTime<Utc>) -> anyhow::Result<CurrentView> {
        let document = self.load().await?;
        let snapshot = document.latest().cloned();
        Ok(CurrentView {
            age_in_days: snapshot.as_ref().map(|s| month::age_in_days(s.observed_at, now)),
            snapshot,
            next_update_due: next_update_due(&document, now),
            durability: self.durability(),
        })
    }

    pub async fn summary(&self, now: DateTime<Utc>) -> anyhow::Result<DataSummary> {
        let document = self.load().await?;
        Ok(summarize(&document, now))
    }

    pub async fn chart_series(&self) -> anyhow::Result<Vec<ChartPoint>> {
        let document = self.load().await?;
        Ok(document.data.iter().map(MonthlySnapshot::chart_point).collect())
    }

    /// Appends a raw reading to the per-source log and returns the updated
    /// trends. Snapshots are untouched.
    pub async fn record_reading(
        &self,
        source: ReadingSource,
        reading: &MetricReading,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ReadingTrends> {
        self.ensure_backfilled().await?;
        let _held = self.guard.lock().await;
        let mut document = self.load_unguarded().await?;
        document
            .readings
            .record(source, RecordedReading::from_reading(reading, now));
        self.store
            .save(&document)
            .await
            .with_context(|| format!("failed to save {} reading via {} backend", source.as_str(), self.store.name()))?;
        tracing::info!(source = source.as_str(), count = reading.value, "reading recorded");
        Ok(document.readings.trends())
    }

    pub async fn reading_trends(&self) -> anyhow::Result<ReadingTrends> {
        Ok(self.load().await?.readings.trends())
    }

    /// Loads the document, seeding history on this instance's first access.
    async fn load(&self) -> anyhow::Result<StoreDocument> {
        self.ensure_backfilled().await?;
        let _held = self.guard.lock().await;
        self.load_unguarded().await
    }

    async fn load_unguarded(&self) -> anyhow::Result<StoreDocument> {
        let document = self
            .store
            .load()
            .await
            .with_context(|| format!("failed to load store via {} backend", self.store.name()))?;
        Ok(document.unwrap_or_else(StoreDocument::empty))
    }

    async fn ensure_backfilled(&self) -> anyhow::Result<()> {
        if !self.backfill {
            return Ok(());
        }
        self.backfilled
            .get_or_try_init(|| async {
                let _held = self.guard.lock().await;
                let mut document = self.load_unguarded().await?;
                let added = backfill::apply(&mut document, self.baseline);
                if added > 0 {
                    if document.next_update_due.is_none() {
                        document.next_update_due = document
                            .latest()
                            .map(|s| month::next_refresh_due(s.observed_at));
                    }
                    self.store.save(&document).await.context("failed to save backfilled history")?;
                    tracing::info!(added, "historical months backfilled");
                }
                Ok::<(), anyhow::Error>(())
            })
            .await?;
        Ok(())
    }
}

/// The exhausted chain keeps the baseline constant, tagged as a fallback.
fn static_primary(scraped: &MetricReading) -> PrimaryMetric {
    if scraped.provenance == Provenance::StaticFallback {
        return PrimaryMetric::from(scraped);
    }
    PrimaryMetric::from(&bls_page::static_fallback())
}

fn next_update_due(document: &StoreDocument, now: DateTime<Utc>) -> DateTime<Utc> {
    document
        .next_update_due
        .unwrap_or_else(|| month::next_refresh_due(now))
}

/// Halves round toward positive infinity, so -0.5 becomes 0.
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

fn summarize(document: &StoreDocument, now: DateTime<Utc>) -> DataSummary {
    let data = &document.data;
    let next_update_due = next_update_due(document, now);

    let Some(current) = document.latest() else {
        return DataSummary {
            total_months: 0,
            current_outcome: None,
            avg_monthly_change: 0,
            trend_direction: TrendDirection::Stable,
            next_update_due,
        };
    };

    let total: i64 = data.iter().map(|s| s.comparison.change_from_baseline).sum();
    let avg_monthly_change = round_half_up(total as f64 / data.len() as f64);

    let recent = &data[data.len().saturating_sub(TREND_WINDOW)..];
    let trend_direction = match (recent.first(), recent.last()) {
        (Some(first), Some(last)) if recent.len() >= 2 => {
            let delta = last.comparison.change_from_baseline - first.comparison.change_from_baseline;
            if delta > TREND_THRESHOLD {
                TrendDirection::Up
            } else if delta < -TREND_THRESHOLD {
                TrendDirection::Down
            } else {
                TrendDirection::Stable
            }
        }
        _ => TrendDirection::Stable,
    };

    DataSummary {
        total_months: data.len(),
        current_outcome: Some(current.comparison.outcome),
        avg_monthly_change,
        trend_direction,
        next_update_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicators::{
        EconomicIndicatorSet, IndicatorSeries, Observation, SeriesMetadata,
    };
    use crate::error::TrackerError;
    use crate::ingest::alternatives::{AlternativeEstimate, SourceCount};
    use crate::ingest::bls_api::OfficialSeries;
    use crate::storage::MemoryStore;
    use chrono::{NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePrimary {
        reading: Result<MetricReading, TrackerError>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PrimaryMetricSource for FakePrimary {
        fn source_name(&self) -> &'static str {
            "fake_primary"
        }

        async fn current_reading(&self) -> Result<MetricReading, TrackerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reading.clone()
        }
    }

    struct FakeOfficial {
        series: Result<OfficialSeries, TrackerError>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OfficialStatisticsSource for FakeOfficial {
        fn source_name(&self) -> &'static str {
            "fake_official"
        }

        async fn employment_series(&self) -> Result<OfficialSeries, TrackerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.series.clone()
        }
    }

    struct FakeIndicators(Result<EconomicIndicatorSet, TrackerError>);

    #[async_trait::async_trait]
    impl IndicatorSource for FakeIndicators {
        fn source_name(&self) -> &'static str {
            "fake_indicators"
        }

        async fn economic_indicators(
            &self,
            _target_month: Option<MonthKey>,
        ) -> Result<EconomicIndicatorSet, TrackerError> {
            self.0.clone()
        }
    }

    struct FakeAlternatives {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AlternativeSource for FakeAlternatives {
        async fn alternative_estimate(&self) -> AlternativeEstimate {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AlternativeEstimate::from_sources(vec![SourceCount {
                name: "Remote OK API".to_string(),
                count: 1_200,
                timestamp: Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
                provenance: Provenance::Live,
            }])
        }
    }

    struct Harness {
        primary: Arc<FakePrimary>,
        official: Arc<FakeOfficial>,
        alternatives: Arc<FakeAlternatives>,
        engine: SnapshotEngine,
    }

    fn series(values: &[f64]) -> IndicatorSeries {
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, &value)| Observation {
                date: NaiveDate::from_ymd_opt(2025, 8 - i as u32, 1).unwrap(),
                value,
            })
            .collect();
        let meta = SeriesMetadata {
            series_id: "TEST".to_string(),
            title: "test".to_string(),
            source: "test".to_string(),
            units: "Thousands of Persons".to_string(),
            frequency: "Monthly".to_string(),
            last_updated: String::new(),
        };
        IndicatorSeries::from_observations(observations, meta).unwrap()
    }

    fn indicator_set() -> EconomicIndicatorSet {
        EconomicIndicatorSet::new(
            series(&[2440.0, 2431.2]),
            series(&[1358.0, 1400.0]),
            series(&[159_500.0, 159_400.0]),
        )
    }

    fn harness(
        primary: Result<MetricReading, TrackerError>,
        official: Result<OfficialSeries, TrackerError>,
        indicators: Result<EconomicIndicatorSet, TrackerError>,
        backfill: bool,
    ) -> Harness {
        let primary = Arc::new(FakePrimary {
            reading: primary,
            calls: AtomicUsize::new(0),
        });
        let official = Arc::new(FakeOfficial {
            series: official,
            calls: AtomicUsize::new(0),
        });
        let alternatives = Arc::new(FakeAlternatives {
            calls: AtomicUsize::new(0),
        });
        let sources = Sources {
            primary: primary.clone(),
            official: official.clone(),
            indicators: Arc::new(FakeIndicators(indicators)),
            alternatives: alternatives.clone(),
        };
        let mut engine = SnapshotEngine::new(Arc::new(MemoryStore::new()), sources);
        if !backfill {
            engine = engine.without_backfill();
        }
        Harness {
            primary,
            official,
            alternatives,
            engine,
        }
    }

    fn sept(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, day, hour, 0, 0).unwrap()
    }

    fn live(count: i64) -> Result<MetricReading, TrackerError> {
        Ok(MetricReading::live(count, "2024", "BLS Live Data"))
    }

    fn official_ok(count: i64) -> Result<OfficialSeries, TrackerError> {
        let mut s = OfficialSeries::fallback("X", "", sept(1, 0));
        s.metadata.api_status = "REQUEST_SUCCEEDED".to_string();
        s.metadata.error = None;
        s.metadata.source = "Bureau of Labor Statistics (BLS) API v2.0".to_string();
        s.current.employment = count;
        s.current.year = "2024".to_string();
        Ok(s)
    }

    fn official_fallback() -> Result<OfficialSeries, TrackerError> {
        Ok(OfficialSeries::fallback("X", "HTTP 503", sept(1, 0)))
    }

    #[tokio::test]
    async fn live_scrape_short_circuits_the_chain() {
        let h = harness(live(1_710_000), official_ok(1), Ok(indicator_set()), false);
        let report = h.engine.refresh(sept(1, 6)).await.unwrap();

        assert_eq!(report.snapshot.primary_metric.provenance, Provenance::Live);
        assert_eq!(report.snapshot.comparison.change_from_baseline, 17_900);
        assert_eq!(report.snapshot.comparison.outcome, Outcome::PartyA);
        assert_eq!(report.snapshot.indicators.provenance, Provenance::Live);
        assert_eq!(report.snapshot.indicators.job_openings, Some(1358.0));
        assert_eq!(report.snapshot.indicators.tech_employment_trend, Some(TrendDirection::Up));
        assert!(report.snapshot.alternative.is_none());
        assert_eq!(h.official.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.alternatives.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scrape_fallback_uses_official_figure() {
        let scraped = Ok(bls_page::static_fallback());
        let h = harness(scraped, official_ok(1_656_880), Ok(indicator_set()), false);
        let report = h.engine.refresh(sept(1, 6)).await.unwrap();

        let pm = &report.snapshot.primary_metric;
        assert_eq!(pm.provenance, Provenance::OfficialApiFallback);
        assert_eq!(pm.count, 1_656_880);
        assert_eq!(report.snapshot.comparison.outcome, Outcome::PartyB);
        assert_eq!(h.alternatives.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_is_static_tie_with_alternative_attached() {
        let h = harness(
            Ok(bls_page::static_fallback()),
            official_fallback(),
            Err(TrackerError::upstream("fred", "series PAYEMS: HTTP 500")),
            false,
        );
        let report = h.engine.refresh(sept(1, 6)).await.unwrap();
        let snap = &report.snapshot;

        assert_eq!(snap.primary_metric.provenance, Provenance::StaticFallback);
        assert_eq!(snap.primary_metric.count, 1_692_100);
        assert_eq!(snap.comparison.change_from_baseline, 0);
        assert_eq!(snap.comparison.outcome, Outcome::Tie);
        assert_eq!(snap.alternative.as_ref().unwrap().total_estimate, 1_200);
        assert_eq!(snap.indicators, IndicatorSummary::stand_in());
        assert_eq!(h.official.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn configuration_errors_do_not_stop_the_cycle() {
        let h = harness(
            Err(TrackerError::configuration("Must provide live=true or mock content")),
            Err(TrackerError::configuration("BLS API key is required.")),
            Err(TrackerError::configuration("FRED_API_KEY is not configured")),
            false,
        );
        let report = h.engine.refresh(sept(1, 6)).await.unwrap();
        assert_eq!(report.snapshot.primary_metric.provenance, Provenance::StaticFallback);
        assert_eq!(report.snapshot.comparison.outcome, Outcome::Tie);
        assert_eq!(h.primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.alternatives.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn same_month_refresh_replaces_instead_of_duplicating() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        let first = h.engine.refresh(sept(1, 6)).await.unwrap();
        assert!(!first.replaced_existing);
        let second = h.engine.refresh(sept(1, 18)).await.unwrap();
        assert!(second.replaced_existing);
        assert_ne!(first.run_id, second.run_id);

        let chart = h.engine.chart_series().await.unwrap();
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].date, sept(1, 18));
    }

    #[tokio::test]
    async fn refresh_is_due_only_on_first_day_of_a_missing_month() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        assert!(!h.engine.should_refresh(sept(2, 0)).await.unwrap());
        assert!(h.engine.should_refresh(sept(1, 0)).await.unwrap());

        let report = h.engine.run_if_due(sept(1, 6)).await.unwrap();
        assert!(report.is_some());
        assert!(!h.engine.should_refresh(sept(1, 12)).await.unwrap());
        assert!(h.engine.run_if_due(sept(1, 12)).await.unwrap().is_none());
        assert_eq!(h.primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn earlier_month_cannot_be_rewritten() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        h.engine.refresh(sept(1, 6)).await.unwrap();
        let aug = Utc.with_ymd_and_hms(2025, 8, 1, 6, 0, 0).unwrap();
        let err = h.engine.refresh(aug).await.unwrap_err();
        assert!(format!("{err:#}").contains("2025-08"));
        assert_eq!(h.engine.chart_series().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_logs_primary_reading_and_board_counts_are_kept_apart() {
        use crate::domain::readings::ReadingTrend;

        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        h.engine.refresh(sept(1, 6)).await.unwrap();

        let trends = h.engine.reading_trends().await.unwrap();
        assert_eq!(trends.bls.current.as_ref().map(|r| r.count), Some(1_700_000));
        assert_eq!(trends.bls.trend, ReadingTrend::NoData);
        assert_eq!(trends.indeed.trend, ReadingTrend::NoData);

        let board = MetricReading {
            value: 12_345,
            as_of_period: "2025-09-02".to_string(),
            provenance: Provenance::Live,
            source: "Indeed".to_string(),
            note: None,
        };
        h.engine.record_reading(ReadingSource::Indeed, &board, sept(2, 6)).await.unwrap();
        let estimated = MetricReading {
            value: 750,
            provenance: Provenance::Estimated,
            ..board.clone()
        };
        let trends = h
            .engine
            .record_reading(ReadingSource::Indeed, &estimated, sept(3, 6))
            .await
            .unwrap();
        assert_eq!(trends.indeed.trend, ReadingTrend::Down);
        assert_eq!(
            trends.indeed.current.as_ref().map(|r| r.provenance),
            Some(Provenance::Estimated)
        );

        let chart = h.engine.chart_series().await.unwrap();
        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].actual, 1_700_000);
    }

    #[tokio::test]
    async fn dry_run_leaves_store_untouched() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        let report = h.engine.dry_run(sept(1, 6)).await.unwrap();
        assert!(!report.persisted);
        assert!(h.engine.chart_series().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_store_reports_no_data_with_next_due() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), false);
        let now = sept(14, 9);

        let view = h.engine.current_snapshot(now).await.unwrap();
        assert!(view.snapshot.is_none());
        assert!(view.age_in_days.is_none());
        assert_eq!(view.next_update_due, Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());

        let summary = h.engine.summary(now).await.unwrap();
        assert_eq!(summary.total_months, 0);
        assert_eq!(summary.current_outcome, None);
        assert_eq!(summary.avg_monthly_change, 0);
        assert_eq!(summary.trend_direction, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn backfill_seeds_history_on_first_access() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), true);
        let now = Utc.with_ymd_and_hms(2025, 8, 10, 0, 0, 0).unwrap();

        let view = h.engine.current_snapshot(now).await.unwrap();
        let snap = view.snapshot.unwrap();
        assert_eq!(snap.month.to_string(), "2025-07");
        assert_eq!(view.age_in_days, Some(26));
        assert_eq!(view.next_update_due, Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap());

        let summary = h.engine.summary(now).await.unwrap();
        assert_eq!(summary.total_months, 2);
        assert_eq!(summary.current_outcome, Some(Outcome::PartyB));
        assert_eq!(summary.avg_monthly_change, -17_610);
        assert_eq!(summary.trend_direction, TrendDirection::Down);
    }

    #[test]
    fn average_change_rounds_halves_up() {
        use crate::storage::tests::snapshot_at;

        let mut doc = StoreDocument::empty();
        doc.upsert(snapshot_at(Utc.with_ymd_and_hms(2025, 8, 1, 6, 0, 0).unwrap(), BASELINE_EMPLOYMENT - 1))
            .unwrap();
        doc.upsert(snapshot_at(sept(1, 6), BASELINE_EMPLOYMENT)).unwrap();
        assert_eq!(summarize(&doc, sept(2, 0)).avg_monthly_change, 0);

        doc.upsert(snapshot_at(Utc.with_ymd_and_hms(2025, 10, 1, 6, 0, 0).unwrap(), BASELINE_EMPLOYMENT - 2))
            .unwrap();
        assert_eq!(summarize(&doc, sept(2, 0)).avg_monthly_change, -1);

        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.6), -3);
    }

    #[tokio::test]
    async fn refresh_after_backfill_appends_new_month() {
        let h = harness(live(1_700_000), official_ok(1), Ok(indicator_set()), true);
        h.engine.refresh(sept(1, 6)).await.unwrap();

        let chart = h.engine.chart_series().await.unwrap();
        let months: Vec<String> = chart.iter().map(|p| p.month.to_string()).collect();
        assert_eq!(months, vec!["2025-06", "2025-07", "2025-09"]);

        let summary = h.engine.summary(sept(1, 7)).await.unwrap();
        // 0 -> +7,900 across the last three
        assert_eq!(summary.trend_direction, TrendDirection::Up);
        assert_eq!(summary.current_outcome, Some(Outcome::PartyA));
        assert_eq!(summary.next_update_due, Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap());
    }
}
