use crate::config::Settings;
use crate::domain::indicators::{EconomicIndicatorSet, IndicatorSeries, Observation, SeriesMetadata};
use crate::error::TrackerError;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::{decode_json, read_success_body, IndicatorSource};
use crate::time::month::MonthKey;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

const SOURCE: &str = "fred";

pub const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org/fred";

/// Computer systems design employment, monthly.
pub const TECH_EMPLOYMENT_SERIES: &str = "CES6054150001";
/// Job openings in professional and business services, monthly.
pub const JOB_OPENINGS_SERIES: &str = "JTS540099JOL";
/// Total nonfarm employment, monthly.
pub const TOTAL_EMPLOYMENT_SERIES: &str = "PAYEMS";

const OBSERVATION_LIMIT: usize = IndicatorSeries::MAX_HISTORY;
const SOURCE_LABEL: &str = "Federal Reserve Economic Data (FRED)";
const MISSING_VALUE: &str = ".";

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    seriess: Vec<FredSeries>,
}

#[derive(Debug, Deserialize)]
struct FredSeries {
    id: String,
    title: String,
    #[serde(default)]
    frequency: String,
    #[serde(default)]
    units: String,
    #[serde(default)]
    last_updated: String,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Option<Vec<FredObservation>>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Debug, Clone)]
pub struct FredClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    retry: RetryPolicy,
}

impl FredClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = crate::ingest::http_client("FRED_TIMEOUT_SECS")?;
        let base_url = std::env::var("FRED_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let retries = crate::config::env_or("FRED_RETRIES", 2u32);

        Ok(Self {
            http,
            api_key: settings.fred_api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::exponential(retries, Duration::from_millis(500)),
        })
    }

    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::once(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetches the three series concurrently and derives the health score.
    /// Any failing series fails the whole set.
    pub async fn fetch_economic_indicators(
        &self,
        target_month: Option<MonthKey>,
    ) -> Result<EconomicIndicatorSet, TrackerError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TrackerError::configuration("FRED_API_KEY is not configured"))?;

        tracing::info!(target_month = ?target_month.map(|m| m.to_string()), "fetching FRED indicators");

        let (tech, openings, total) = tokio::try_join!(
            self.fetch_series(key, TECH_EMPLOYMENT_SERIES, target_month),
            self.fetch_series(key, JOB_OPENINGS_SERIES, target_month),
            self.fetch_series(key, TOTAL_EMPLOYMENT_SERIES, target_month),
        )?;

        let set = EconomicIndicatorSet::new(tech, openings, total);
        tracing::info!(
            tech_employment = set.tech_employment.current.value,
            job_openings = set.job_openings.current.value,
            health_score = set.health_score.score,
            band = set.health_score.description.as_str(),
            "FRED indicators fetched"
        );
        Ok(set)
    }

    async fn fetch_series(
        &self,
        key: &str,
        series_id: &'static str,
        target_month: Option<MonthKey>,
    ) -> Result<IndicatorSeries, TrackerError> {
        let result = async {
            let meta = self
                .retry
                .run(SOURCE, |_| self.fetch_metadata(key, series_id))
                .await?;
            let observations = self
                .retry
                .run(SOURCE, |_| self.fetch_observations(key, series_id, target_month))
                .await?;
            series_from_parts(meta, observations)
        }
        .await;

        result.map_err(|err| {
            if err.is_configuration() {
                err
            } else {
                TrackerError::upstream(SOURCE, format!("series {series_id}: {err}"))
            }
        })
    }

    async fn fetch_metadata(&self, key: &str, series_id: &str) -> Result<FredSeries, TrackerError> {
        let res = self
            .http
            .get(format!("{}/series", self.base_url))
            .query(&[("series_id", series_id), ("api_key", key), ("file_type", "json")])
            .send()
            .await;
        let text = read_success_body(SOURCE, res).await?;
        let parsed: SeriesResponse = decode_json(SOURCE, &text)?;
        parsed
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::parse(SOURCE, format!("No series found for ID: {series_id}")))
    }

    async fn fetch_observations(
        &self,
        key: &str,
        series_id: &str,
        target_month: Option<MonthKey>,
    ) -> Result<Vec<FredObservation>, TrackerError> {
        let limit = OBSERVATION_LIMIT.to_string();
        let mut query: Vec<(&str, String)> = vec![
            ("series_id", series_id.to_string()),
            ("api_key", key.to_string()),
            ("file_type", "json".to_string()),
            ("limit", limit),
            ("sort_order", "desc".to_string()),
        ];
        if let Some(month) = target_month {
            query.push(("observation_start", month.first_day().to_string()));
            query.push(("observation_end", month.last_day().to_string()));
        }

        let res = self
            .http
            .get(format!("{}/series/observations", self.base_url))
            .query(&query)
            .send()
            .await;
        let text = read_success_body(SOURCE, res).await?;
        let parsed: ObservationsResponse = decode_json(SOURCE, &text)?;
        parsed.observations.ok_or_else(|| {
            TrackerError::parse(SOURCE, format!("No observations found for series: {series_id}"))
        })
    }
}

#[async_trait::async_trait]
impl IndicatorSource for FredClient {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn economic_indicators(
        &self,
        target_month: Option<MonthKey>,
    ) -> Result<EconomicIndicatorSet, TrackerError> {
        self.fetch_economic_indicators(target_month).await
    }
}

/// Drops missing (".") values and builds the newest-first series.
fn series_from_parts(
    meta: FredSeries,
    raw: Vec<FredObservation>,
) -> Result<IndicatorSeries, TrackerError> {
    let mut observations = Vec::with_capacity(raw.len());
    for obs in raw {
        if obs.value.trim() == MISSING_VALUE {
            continue;
        }
        let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
            TrackerError::parse(SOURCE, format!("bad observation date {:?}: {e}", obs.date))
        })?;
        let value: f64 = obs.value.trim().parse().map_err(|_| {
            TrackerError::parse(SOURCE, format!("bad observation value {:?} on {}", obs.value, obs.date))
        })?;
        observations.push(Observation { date, value });
    }

    let metadata = SeriesMetadata {
        series_id: meta.id,
        title: meta.title,
        source: SOURCE_LABEL.to_string(),
        units: meta.units,
        frequency: meta.frequency,
        last_updated: meta.last_updated,
    };

    IndicatorSeries::from_observations(observations, metadata)
        .ok_or_else(|| TrackerError::parse(SOURCE, "No valid observations found"))
}
