use crate::domain::indicators::EconomicIndicatorSet;
use crate::domain::metric::MetricReading;
use crate::error::TrackerError;
use crate::time::month::MonthKey;
use anyhow::Context;
use std::time::Duration;

pub mod alternatives;
pub mod bls_api;
pub mod bls_page;
pub mod fred;
pub mod html;
pub mod indeed;
pub mod retry;

use alternatives::AlternativeEstimate;
use bls_api::OfficialSeries;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Scraped employment count. Implementations never fail at runtime: they
/// return a tagged fallback reading instead. The only error is a
/// configuration error.
#[async_trait::async_trait]
pub trait PrimaryMetricSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn current_reading(&self) -> Result<MetricReading, TrackerError>;
}

/// Official statistics API, used when the scrape only produced a fallback.
/// Upstream failures come back as the canned fallback series; a missing
/// credential is returned as an error.
#[async_trait::async_trait]
pub trait OfficialStatisticsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn employment_series(&self) -> Result<OfficialSeries, TrackerError>;
}

/// All-or-nothing: any failing series fails the whole set.
#[async_trait::async_trait]
pub trait IndicatorSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn economic_indicators(
        &self,
        target_month: Option<MonthKey>,
    ) -> Result<EconomicIndicatorSet, TrackerError>;
}

/// Last-resort job-board aggregate. Infallible by construction.
#[async_trait::async_trait]
pub trait AlternativeSource: Send + Sync {
    async fn alternative_estimate(&self) -> AlternativeEstimate;
}

/// Shared client construction: every upstream gets a hard timeout.
pub fn http_client(timeout_env_key: &str) -> anyhow::Result<reqwest::Client> {
    let timeout_secs = crate::config::env_or(timeout_env_key, DEFAULT_TIMEOUT_SECS);
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .with_context(|| format!("failed to build http client ({timeout_env_key}={timeout_secs})"))
}

/// Reads a response body, mapping non-2xx statuses and transport failures to
/// `Upstream` errors tagged with `source_name`.
pub(crate) async fn read_success_body(
    source_name: &'static str,
    res: Result<reqwest::Response, reqwest::Error>,
) -> Result<String, TrackerError> {
    let res = res.map_err(|e| TrackerError::upstream(source_name, format!("request failed: {e}")))?;
    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| TrackerError::upstream(source_name, format!("failed to read body: {e}")))?;
    if !status.is_success() {
        return Err(TrackerError::upstream(
            source_name,
            format!("HTTP {status}: {}", truncate(&text, 200)),
        ));
    }
    Ok(text)
}

/// Decodes a JSON body into its schema type, reporting mismatches as `Parse`.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    source_name: &'static str,
    text: &str,
) -> Result<T, TrackerError> {
    serde_json::from_str::<T>(text).map_err(|e| {
        TrackerError::parse(
            source_name,
            format!("unexpected response shape: {e}; body: {}", truncate(text, 200)),
        )
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
