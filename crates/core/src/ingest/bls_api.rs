use crate::config::Settings;
use crate::domain::indicators::{Trend, TrendDirection};
use crate::domain::metric::{MetricReading, Provenance};
use crate::domain::snapshot::BASELINE_EMPLOYMENT;
use crate::error::TrackerError;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::{decode_json, read_success_body, OfficialStatisticsSource};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SOURCE: &str = "bls_api";

pub const DEFAULT_BASE_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data/";
/// National employment estimate for software developers (SOC 15-1252).
pub const DEFAULT_SERIES_ID: &str = "OEUS000000015125200000003";
pub const SUCCESS_STATUS: &str = "REQUEST_SUCCEEDED";
pub const FALLBACK_STATUS: &str = "FALLBACK_USED";

const CLIENT_UA: &str = "Codepocalypse-Tracker/1.0";
const LIVE_SOURCE_LABEL: &str = "Bureau of Labor Statistics (BLS) API v2.0";
const FALLBACK_SOURCE_LABEL: &str = "BLS Fallback Data (2023 Official Statistics)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialPoint {
    pub year: String,
    pub period: String,
    /// Head count; the API reports thousands.
    pub employment: i64,
    /// Raw value as reported.
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub footnotes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialMetadata {
    pub series_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    pub source: String,
    pub last_updated: DateTime<Utc>,
    pub api_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialSeries {
    pub current: OfficialPoint,
    /// Newest first, as the API returns it.
    pub historical: Vec<OfficialPoint>,
    pub trend: Trend,
    pub metadata: OfficialMetadata,
}

impl OfficialSeries {
    /// The canned 2023 record returned when the API cannot be used.
    pub fn fallback(series_id: &str, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        let point = OfficialPoint {
            year: "2023".to_string(),
            period: "Annual".to_string(),
            employment: BASELINE_EMPLOYMENT,
            value: "1692.1".to_string(),
            footnotes: Vec::new(),
        };
        Self {
            current: point.clone(),
            historical: vec![point],
            trend: Trend::unknown(),
            metadata: OfficialMetadata {
                series_id: series_id.to_string(),
                series_title: None,
                source: FALLBACK_SOURCE_LABEL.to_string(),
                last_updated: now,
                api_status: FALLBACK_STATUS.to_string(),
                error: Some(error.into()),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata.api_status == FALLBACK_STATUS
    }

    /// The newest point as a reading tagged as the secondary source.
    pub fn reading(&self) -> MetricReading {
        let provenance = if self.is_fallback() {
            Provenance::StaticFallback
        } else {
            Provenance::OfficialApiFallback
        };
        MetricReading {
            value: self.current.employment,
            as_of_period: self.current.year.clone(),
            provenance,
            source: self.metadata.source.clone(),
            note: self.metadata.error.clone(),
        }
    }

    /// Period-over-period statistics across the historical list.
    pub fn analyze(&self) -> TrendAnalysis {
        let points = &self.historical;
        if points.len() < 2 {
            return TrendAnalysis {
                trend: Prediction::InsufficientData,
                avg_yearly_change: 0.0,
                volatility: 0.0,
                prediction: "Cannot predict with limited data".to_string(),
                confidence: AnalysisConfidence::Low,
            };
        }

        let changes: Vec<f64> = points
            .windows(2)
            .map(|w| {
                let (current, previous) = (w[0].employment as f64, w[1].employment as f64);
                if previous != 0.0 {
                    (current - previous) / previous * 100.0
                } else {
                    0.0
                }
            })
            .collect();

        let n = changes.len() as f64;
        let avg = changes.iter().sum::<f64>() / n;
        let volatility = (changes.iter().map(|c| (c - avg).powi(2)).sum::<f64>() / n).sqrt();

        let trend = if avg > 2.0 {
            Prediction::Growing
        } else if avg < -2.0 {
            Prediction::Declining
        } else {
            Prediction::Stable
        };

        let confidence = if volatility < 5.0 {
            AnalysisConfidence::High
        } else if volatility < 10.0 {
            AnalysisConfidence::Medium
        } else {
            AnalysisConfidence::Low
        };

        TrendAnalysis {
            trend,
            avg_yearly_change: avg,
            volatility,
            prediction: format!(
                "Based on {} years of data, software developer employment is {}",
                points.len(),
                trend.as_str()
            ),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Growing,
    Declining,
    Stable,
    InsufficientData,
}

impl Prediction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growing => "growing",
            Self::Declining => "declining",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub trend: Prediction,
    pub avg_yearly_change: f64,
    pub volatility: f64,
    pub prediction: String,
    pub confidence: AnalysisConfidence,
}

#[derive(Debug, Deserialize)]
struct BlsResponse {
    status: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results", default)]
    results: Option<BlsResults>,
}

#[derive(Debug, Deserialize)]
struct BlsResults {
    #[serde(default)]
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    #[serde(rename = "seriesID")]
    series_id: String,
    #[serde(default)]
    catalog: Option<BlsCatalog>,
    #[serde(default)]
    data: Vec<BlsDataPoint>,
}

#[derive(Debug, Deserialize)]
struct BlsCatalog {
    #[serde(default)]
    series_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlsDataPoint {
    year: String,
    #[serde(rename = "periodName")]
    period_name: String,
    value: String,
    #[serde(default)]
    footnotes: Vec<BlsFootnote>,
}

#[derive(Debug, Deserialize)]
struct BlsFootnote {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct ObservationsRequest<'a> {
    seriesid: [&'a str; 1],
    startyear: String,
    endyear: String,
    catalog: bool,
    calculations: bool,
    annualaverage: bool,
    registrationkey: &'a str,
}

#[derive(Debug, Clone)]
pub struct BlsApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    series_id: String,
    retry: RetryPolicy,
}

impl BlsApiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = crate::ingest::http_client("BLS_API_TIMEOUT_SECS")?;
        let base_url = std::env::var("BLS_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let retries = crate::config::env_or("BLS_API_RETRIES", 2u32);

        Ok(Self {
            http,
            api_key: settings.bls_api_key.clone(),
            base_url,
            series_id: DEFAULT_SERIES_ID.to_string(),
            retry: RetryPolicy::exponential(retries, Duration::from_secs(1)),
        })
    }

    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            series_id: DEFAULT_SERIES_ID.to_string(),
            retry: RetryPolicy::once(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_key(&self) -> Result<&str, TrackerError> {
        self.api_key.as_deref().ok_or_else(|| {
            TrackerError::configuration(
                "BLS API key is required. Please set BLS_API_KEY environment variable.",
            )
        })
    }

    /// Caller-facing wrapper over [`fetch_official_series`](Self::fetch_official_series):
    /// upstream and parse failures come back as the canned fallback record.
    /// A missing key still propagates.
    pub async fn fetch_employment_data(
        &self,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Result<OfficialSeries, TrackerError> {
        match self
            .fetch_official_series(&self.series_id, start_year, end_year)
            .await
        {
            Ok(series) => Ok(series),
            Err(err) if err.is_configuration() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, series_id = %self.series_id, "BLS API failed; using 2023 fallback record");
                Ok(OfficialSeries::fallback(&self.series_id, err.to_string(), Utc::now()))
            }
        }
    }

    pub async fn fetch_official_series(
        &self,
        series_id: &str,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Result<OfficialSeries, TrackerError> {
        let key = self.api_key()?;
        let this_year = Utc::now().year();
        let start_year = start_year.unwrap_or(this_year - 3);
        let end_year = end_year.unwrap_or(this_year);

        tracing::info!(series_id, start_year, end_year, "fetching BLS series");

        let title = self
            .retry
            .run(SOURCE, |_| self.fetch_catalog(series_id, key))
            .await?;

        let body = ObservationsRequest {
            seriesid: [series_id],
            startyear: start_year.to_string(),
            endyear: end_year.to_string(),
            catalog: false,
            calculations: true,
            annualaverage: true,
            registrationkey: key,
        };
        let response = self
            .retry
            .run(SOURCE, |_| self.post_observations(&body))
            .await?;

        series_from_response(series_id, title, response, Utc::now())
    }

    async fn fetch_catalog(&self, series_id: &str, key: &str) -> Result<Option<String>, TrackerError> {
        let url = format!("{}{}", self.base_url, series_id);
        let res = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, CLIENT_UA)
            .query(&[("registrationkey", key), ("catalog", "true"), ("latest", "true")])
            .send()
            .await;
        let text = read_success_body(SOURCE, res).await?;
        let parsed: BlsResponse = decode_json(SOURCE, &text)?;
        ensure_succeeded(&parsed)?;

        Ok(parsed
            .results
            .and_then(|r| r.series.into_iter().next())
            .and_then(|s| s.catalog)
            .and_then(|c| c.series_title))
    }

    async fn post_observations(&self, body: &ObservationsRequest<'_>) -> Result<BlsResponse, TrackerError> {
        let res = self
            .http
            .post(&self.base_url)
            .header(reqwest::header::USER_AGENT, CLIENT_UA)
            .json(body)
            .send()
            .await;
        let text = read_success_body(SOURCE, res).await?;
        decode_json(SOURCE, &text)
    }
}

#[async_trait::async_trait]
impl OfficialStatisticsSource for BlsApiClient {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn employment_series(&self) -> Result<OfficialSeries, TrackerError> {
        self.fetch_employment_data(None, None).await
    }
}

fn ensure_succeeded(res: &BlsResponse) -> Result<(), TrackerError> {
    if res.status == SUCCESS_STATUS {
        return Ok(());
    }
    let message = if res.message.is_empty() {
        "Unknown error".to_string()
    } else {
        res.message.join("; ")
    };
    Err(TrackerError::upstream(
        SOURCE,
        format!("BLS API error ({}): {message}", res.status),
    ))
}

fn series_from_response(
    series_id: &str,
    title: Option<String>,
    response: BlsResponse,
    now: DateTime<Utc>,
) -> Result<OfficialSeries, TrackerError> {
    ensure_succeeded(&response)?;
    let status = response.status.clone();

    let series = response
        .results
        .and_then(|r| r.series.into_iter().next())
        .filter(|s| !s.data.is_empty())
        .ok_or_else(|| TrackerError::parse(SOURCE, "No employment data found in BLS response"))?;

    let historical = series
        .data
        .into_iter()
        .map(point_from_raw)
        .collect::<Result<Vec<_>, _>>()?;

    let current = historical[0].clone();
    let trend = match historical.get(1) {
        Some(previous) => Trend::between(current.employment as f64, previous.employment as f64),
        None => Trend::unknown(),
    };
    if trend.direction != TrendDirection::Stable {
        tracing::debug!(series_id, direction = ?trend.direction, "BLS series moved");
    }

    Ok(OfficialSeries {
        current,
        historical,
        trend,
        metadata: OfficialMetadata {
            series_id: series_id.to_string(),
            series_title: title.or(Some(series.series_id)),
            source: LIVE_SOURCE_LABEL.to_string(),
            last_updated: now,
            api_status: status,
            error: None,
        },
    })
}

fn point_from_raw(raw: BlsDataPoint) -> Result<OfficialPoint, TrackerError> {
    let thousands: f64 = raw.value.trim().replace(',', "").parse().map_err(|_| {
        TrackerError::parse(SOURCE, format!("non-numeric value {:?} for {}", raw.value, raw.year))
    })?;
    Ok(OfficialPoint {
        year: raw.year,
        period: raw.period_name,
        employment: (thousands * 1000.0).round() as i64,
        value: raw.value,
        footnotes: raw.footnotes.into_iter().filter_map(|f| f.text).collect(),
    })
}
