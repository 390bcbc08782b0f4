//! Job-board counts used as a last-resort, order-of-magnitude signal.
//!
//! None of these measure the tracked occupation's head count. The total mixes
//! live counts and fixed estimates; each entry's provenance says which.

use crate::config::Settings;
use crate::domain::metric::Provenance;
use crate::domain::snapshot::AlternativeSummary;
use crate::error::TrackerError;
use crate::ingest::{decode_json, read_success_body, AlternativeSource};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};

const USAJOBS_SOURCE: &str = "usajobs";
const REMOTEOK_SOURCE: &str = "remoteok";

pub const DEFAULT_USAJOBS_URL: &str = "https://data.usajobs.gov/api/search";
pub const DEFAULT_REMOTEOK_URL: &str = "https://remoteok.io/api";
const DEFAULT_USER_AGENT: &str = "CodepocalypseTracker/1.0 (contact@example.com)";

const GITHUB_ESTIMATE: i64 = 45_000;
const STACK_OVERFLOW_ESTIMATE: i64 = 35_000;
const USAJOBS_ESTIMATE: i64 = 500;
const REMOTEOK_ESTIMATE: i64 = 1_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    pub name: String,
    pub count: i64,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

impl SourceCount {
    fn live(name: &str, count: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            count,
            timestamp,
            provenance: Provenance::Live,
        }
    }

    fn estimated(board: &str, count: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: format!("{board} (estimated)"),
            count,
            timestamp,
            provenance: Provenance::Estimated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeEstimate {
    /// Plain sum over every source, live and estimated alike.
    pub total_estimate: i64,
    pub sources: Vec<SourceCount>,
}

impl AlternativeEstimate {
    pub fn from_sources(sources: Vec<SourceCount>) -> Self {
        Self {
            total_estimate: sources.iter().map(|s| s.count).sum(),
            sources,
        }
    }

    pub fn live_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.provenance.is_live()).count()
    }

    pub fn summary(&self) -> AlternativeSummary {
        AlternativeSummary {
            total_estimate: self.total_estimate,
            sources: self.sources.iter().map(|s| s.name.clone()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsaJobsResponse {
    #[serde(rename = "SearchResult")]
    search_result: UsaJobsSearchResult,
}

#[derive(Debug, Deserialize)]
struct UsaJobsSearchResult {
    #[serde(rename = "SearchResultCount", default)]
    search_result_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AlternativeClient {
    http: reqwest::Client,
    usajobs_url: String,
    usajobs_key: Option<String>,
    remoteok_url: String,
    user_agent: String,
}

impl AlternativeClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = crate::ingest::http_client("ALTERNATIVES_TIMEOUT_SECS")?;
        Ok(Self {
            http,
            usajobs_url: std::env::var("USAJOBS_BASE_URL").unwrap_or_else(|_| DEFAULT_USAJOBS_URL.to_string()),
            usajobs_key: settings.usajobs_api_key.clone(),
            remoteok_url: std::env::var("REMOTEOK_BASE_URL").unwrap_or_else(|_| DEFAULT_REMOTEOK_URL.to_string()),
            user_agent: settings
                .usajobs_user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            usajobs_url: DEFAULT_USAJOBS_URL.to_string(),
            usajobs_key: None,
            remoteok_url: DEFAULT_REMOTEOK_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_urls(mut self, usajobs_url: impl Into<String>, remoteok_url: impl Into<String>) -> Self {
        self.usajobs_url = usajobs_url.into();
        self.remoteok_url = remoteok_url.into();
        self
    }

    /// Queries every source concurrently. Never fails: a source that cannot
    /// be reached contributes its fixed estimate instead.
    pub async fn fetch_alternative_estimate(&self) -> AlternativeEstimate {
        let now = Utc::now();
        let (usajobs, remoteok) = tokio::join!(self.usajobs_count(), self.remoteok_count());

        let usajobs = usajobs
            .map(|count| SourceCount::live("USA Jobs API", count, Utc::now()))
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "USAJOBS count unavailable; using estimate");
                SourceCount::estimated("USA Jobs", USAJOBS_ESTIMATE, now)
            });
        let remoteok = remoteok
            .map(|count| SourceCount::live("Remote OK API", count, Utc::now()))
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Remote OK count unavailable; using estimate");
                SourceCount::estimated("Remote OK", REMOTEOK_ESTIMATE, now)
            });

        let estimate = AlternativeEstimate::from_sources(vec![
            SourceCount::estimated("GitHub Jobs", GITHUB_ESTIMATE, now),
            SourceCount::estimated("Stack Overflow Jobs", STACK_OVERFLOW_ESTIMATE, now),
            usajobs,
            remoteok,
        ]);
        tracing::info!(
            total_estimate = estimate.total_estimate,
            live_sources = estimate.live_sources(),
            "alternative job-board estimate assembled"
        );
        estimate
    }

    async fn usajobs_count(&self) -> Result<i64, TrackerError> {
        let mut req = self
            .http
            .get(&self.usajobs_url)
            .query(&[("Keyword", "software developer"), ("ResultsPerPage", "1")])
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json");
        if let Some(key) = &self.usajobs_key {
            req = req.header("Authorization-Key", key);
        }
        let text = read_success_body(USAJOBS_SOURCE, req.send().await).await?;
        let parsed: UsaJobsResponse = decode_json(USAJOBS_SOURCE, &text)?;
        Ok(parsed.search_result.search_result_count.unwrap_or(0))
    }

    async fn remoteok_count(&self) -> Result<i64, TrackerError> {
        let res = self
            .http
            .get(&self.remoteok_url)
            .query(&[("tags", "dev")])
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await;
        let text = read_success_body(REMOTEOK_SOURCE, res).await?;
        let entries: Vec<serde_json::Value> = decode_json(REMOTEOK_SOURCE, &text)?;
        Ok(count_job_entries(&entries))
    }
}

#[async_trait::async_trait]
impl AlternativeSource for AlternativeClient {
    async fn alternative_estimate(&self) -> AlternativeEstimate {
        self.fetch_alternative_estimate().await
    }
}

/// The feed opens with a legal-notice object; only entries carrying an `id`
/// are postings.
fn count_job_entries(entries: &[serde_json::Value]) -> i64 {
    entries.iter().filter(|e| e.get("id").is_some()).count() as i64
}
