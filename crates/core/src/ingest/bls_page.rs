use crate::config::Settings;
use crate::domain::metric::{MetricReading, Provenance};
use crate::domain::snapshot::BASELINE_EMPLOYMENT;
use crate::error::TrackerError;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::{html, read_success_body, PrimaryMetricSource};
use anyhow::Context;
use chrono::Datelike;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::OnceLock;
use std::time::Duration;

const SOURCE: &str = "bls_page";

pub const DEFAULT_URLS: [&str; 3] = [
    "https://www.bls.gov/oes/current/oes151252.htm",
    "https://www.bls.gov/oes/2023/may/oes151252.htm",
    "https://www.bls.gov/oes/tables.htm",
];

/// Parsed counts at or below this are parse errors, not real data.
pub const PLAUSIBILITY_FLOOR: i64 = 100_000;

pub const FALLBACK_PERIOD: &str = "2023";
const FALLBACK_SOURCE: &str = "BLS Official Data (2023)";
const FALLBACK_NOTE: &str = "Using official BLS employment statistics from O*NET database";

const GENERIC_PAGE_MARKER: &str = "Occupational Employment and Wage Statistics (OEWS) Tables";
const TOPIC_MARKER: &str = "Software Developer";

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Scrapes the occupational employment page for the software-developer count.
#[derive(Debug, Clone)]
pub struct BlsPageScraper {
    http: reqwest::Client,
    urls: Vec<String>,
    retry: RetryPolicy,
    live: bool,
    mock_html: Option<String>,
}

impl BlsPageScraper {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = crate::ingest::http_client("BLS_PAGE_TIMEOUT_SECS")?;

        let urls = std::env::var("BLS_PAGE_URLS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_URLS.iter().map(|u| u.to_string()).collect());

        let mock_html = match settings.mock_html_path.as_deref() {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read TRACKER_MOCK_HTML_PATH={path}"))?,
            ),
            None => None,
        };

        let retries = crate::config::env_or("BLS_PAGE_RETRIES", 3u32);
        let delay_ms = crate::config::env_or("BLS_PAGE_RETRY_DELAY_MS", 2000u64);

        Ok(Self {
            http,
            urls,
            retry: RetryPolicy::linear(retries, Duration::from_millis(delay_ms)),
            live: settings.live,
            mock_html,
        })
    }

    pub fn new(http: reqwest::Client, urls: Vec<String>) -> Self {
        Self {
            http,
            urls,
            retry: RetryPolicy::linear(3, Duration::from_secs(2)),
            live: true,
            mock_html: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mode(mut self, live: bool, mock_html: Option<String>) -> Self {
        self.live = live;
        self.mock_html = mock_html;
        self
    }

    /// Live mode walks the candidate URLs; otherwise `mock_content` is parsed
    /// with the same rules. Runtime failures always end in a
    /// `StaticFallback` reading; the only error is calling without either
    /// live mode or mock content.
    pub async fn fetch_primary_metric(
        &self,
        live: bool,
        mock_content: Option<&str>,
    ) -> Result<MetricReading, TrackerError> {
        let current_year = chrono::Utc::now().year();

        if !live {
            let Some(content) = mock_content else {
                return Err(TrackerError::configuration("Must provide live=true or mock content"));
            };
            return Ok(match parse_employment_page(content, current_year) {
                Ok(reading) => reading,
                Err(err) => {
                    tracing::warn!(error = %err, "mock content did not parse; using static fallback");
                    static_fallback()
                }
            });
        }

        for url in &self.urls {
            let page = self
                .retry
                .run(SOURCE, |attempt| self.fetch_page(url, attempt))
                .await;

            let html = match page {
                Ok(html) => html,
                Err(err) => {
                    tracing::warn!(%url, error = %err, "candidate URL exhausted; trying next");
                    continue;
                }
            };

            match parse_employment_page(&html, current_year) {
                Ok(reading) => {
                    tracing::info!(%url, count = reading.value, period = %reading.as_of_period, "scraped employment count");
                    return Ok(reading);
                }
                Err(err) => {
                    tracing::warn!(%url, error = %err, "page fetched but no plausible employment count; trying next");
                }
            }
        }

        tracing::warn!(
            urls = self.urls.len(),
            "BLS scraping failed on every candidate URL; using official 2023 figure"
        );
        Ok(static_fallback())
    }

    async fn fetch_page(&self, url: &str, attempt: u32) -> Result<String, TrackerError> {
        tracing::debug!(%url, attempt, "fetching BLS page");
        let res = self.http.get(url).headers(browser_headers()).send().await;
        let text = read_success_body(SOURCE, res).await?;

        if looks_like_generic_index(&text) {
            return Err(TrackerError::upstream(
                SOURCE,
                "redirected to the generic OEWS tables page",
            ));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl PrimaryMetricSource for BlsPageScraper {
    fn source_name(&self) -> &'static str {
        SOURCE
    }

    async fn current_reading(&self) -> Result<MetricReading, TrackerError> {
        self.fetch_primary_metric(self.live, self.mock_html.as_deref())
            .await
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers
}

pub fn looks_like_generic_index(html: &str) -> bool {
    html.contains(GENERIC_PAGE_MARKER) && !html.contains(TOPIC_MARKER)
}

/// The fixed official figure, clearly tagged as a fallback.
pub fn static_fallback() -> MetricReading {
    MetricReading {
        value: BASELINE_EMPLOYMENT,
        as_of_period: FALLBACK_PERIOD.to_string(),
        provenance: Provenance::StaticFallback,
        source: FALLBACK_SOURCE.to_string(),
        note: Some(FALLBACK_NOTE.to_string()),
    }
}

/// Extracts the employment count from the page.
///
/// The first cell of every table row is scanned for the `Employment (1)`
/// heading; the next such cell holding a plausible number is the count.
/// Failing that, the first row labelled "employment" supplies its second
/// cell. Anything at or below [`PLAUSIBILITY_FLOOR`] is rejected.
pub fn parse_employment_page(html: &str, current_year: i32) -> Result<MetricReading, TrackerError> {
    let rows = html::all_rows(html);
    if rows.is_empty() {
        return Err(TrackerError::parse(SOURCE, "no table rows found"));
    }

    let count = scan_after_heading(&rows)
        .or_else(|| employment_row_value(&rows))
        .ok_or_else(|| TrackerError::parse(SOURCE, "no plausible employment count in tables"))?;

    let period = html::first_element_text(html, "h1")
        .and_then(|h1| year_re().find(&h1).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| current_year.to_string());

    Ok(MetricReading::live(count, period, "BLS Live Data")
        .with_note("Current BLS employment statistics from live scraping"))
}

fn scan_after_heading(rows: &[Vec<String>]) -> Option<i64> {
    let mut found_heading = false;
    for cell in rows.iter().filter_map(|r| r.first()) {
        if employment_heading_re().is_match(cell) {
            found_heading = true;
            continue;
        }
        if !found_heading {
            continue;
        }
        let Some(m) = number_re().find(cell) else {
            continue;
        };
        if let Some(count) = digits_value(m.as_str()).filter(|&c| c > PLAUSIBILITY_FLOOR) {
            return Some(count);
        }
    }
    None
}

fn employment_row_value(rows: &[Vec<String>]) -> Option<i64> {
    let row = rows
        .iter()
        .find(|r| r.first().is_some_and(|c| c.to_ascii_lowercase().contains("employment")))?;
    let value = digits_value(row.get(1)?)?;
    if value > PLAUSIBILITY_FLOOR {
        Some(value)
    } else {
        tracing::warn!(value, "employment row value below plausibility floor");
        None
    }
}

/// Digits only, so "1,656,880" and "1 656 880" both parse.
fn digits_value(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok()
}

fn employment_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)employment\s*\(1\)").expect("static regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d,]+").expect("static regex"))
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{Comparison, Outcome};

    const MOCK_PAGE: &str = r#"
<!DOCTYPE html>
<html>
<head><title>BLS Mock Data</title></head>
<body>
<h1>Software Developers, Applications and Systems Software 2024</h1>
<table>
<tr><th>Statistic</th><th>Value</th></tr>
<tr><td>Employment, 2024</td><td>1,534,000</td></tr>
<tr><td>Location quotient</td><td>1.23</td></tr>
</table>
</body>
</html>
"#;

    const OES_PAGE: &str = r#"
<html><body>
<h1>Occupational Employment and Wages, May 2024</h1>
<h2>15-1252 Software Developers</h2>
<table class="regular">
<thead><tr><th>Employment (1)</th><th>Employment RSE (3)</th><th>Mean hourly wage</th></tr></thead>
<tbody><tr><td>1,656,880</td><td>0.6 %</td><td>$69.50</td></tr></tbody>
</table>
</body></html>
"#;

    fn scraper() -> BlsPageScraper {
        BlsPageScraper::new(reqwest::Client::new(), Vec::new())
    }

    #[test]
    fn parses_heading_then_number_layout() {
        let r = parse_employment_page(OES_PAGE, 2030).unwrap();
        assert_eq!(r.value, 1_656_880);
        assert_eq!(r.as_of_period, "2024");
        assert_eq!(r.provenance, Provenance::Live);
    }

    #[test]
    fn parses_labelled_row_layout() {
        let r = parse_employment_page(MOCK_PAGE, 2030).unwrap();
        assert_eq!(r.value, 1_534_000);
        assert_eq!(r.as_of_period, "2024");
    }

    #[test]
    fn defaults_period_to_current_year() {
        let html = "<table><tr><td>Employment</td><td>1,700,000</td></tr></table>";
        let r = parse_employment_page(html, 2031).unwrap();
        assert_eq!(r.as_of_period, "2031");
    }

    #[test]
    fn rejects_values_at_or_below_floor() {
        let low = "<table><tr><td>Employment</td><td>90,000</td></tr></table>";
        assert!(parse_employment_page(low, 2030).is_err());
        let edge = "<table><tr><td>Employment</td><td>100,000</td></tr></table>";
        assert!(parse_employment_page(edge, 2030).is_err());
    }

    #[test]
    fn detects_generic_index_redirect() {
        let generic = "<h1>Occupational Employment and Wage Statistics (OEWS) Tables</h1>";
        assert!(looks_like_generic_index(generic));
        let specific = "<h1>Occupational Employment and Wage Statistics (OEWS) Tables</h1>Software Developers";
        assert!(!looks_like_generic_index(specific));
    }

    #[tokio::test]
    async fn mock_mode_parses_content() {
        let r = scraper().fetch_primary_metric(false, Some(MOCK_PAGE)).await.unwrap();
        assert_eq!(r.value, 1_534_000);
        assert!(r.provenance.is_live());
    }

    #[tokio::test]
    async fn low_parse_falls_back_to_static_constant() {
        let html = "<h1>2024</h1><table><tr><td>Employment (1)</td></tr><tr><td>99,999</td></tr>\
                    <tr><td>Employment</td><td>42</td></tr></table>";
        let r = scraper().fetch_primary_metric(false, Some(html)).await.unwrap();
        assert_eq!(r.provenance, Provenance::StaticFallback);
        assert_eq!(r.value, BASELINE_EMPLOYMENT);
    }

    #[tokio::test]
    async fn empty_or_tableless_content_falls_back() {
        for html in ["", "<html><body><p>maintenance</p></body></html>", "<table><tr><td>Wages</td><td>1</td></tr></table>"] {
            let r = scraper().fetch_primary_metric(false, Some(html)).await.unwrap();
            assert_eq!(r.provenance, Provenance::StaticFallback, "html={html:?}");
        }
    }

    #[tokio::test]
    async fn requires_live_or_mock_content() {
        let err = scraper().fetch_primary_metric(false, None).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn exhausted_urls_yield_static_fallback_and_tie() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let scraper = BlsPageScraper::new(
            http,
            vec![
                "http://127.0.0.1:9/oes/current/oes151252.htm".to_string(),
                "http://127.0.0.1:9/oes/tables.htm".to_string(),
            ],
        )
        .with_retry(RetryPolicy::linear(3, Duration::ZERO));

        let r = scraper.fetch_primary_metric(true, None).await.unwrap();
        assert_eq!(r.provenance, Provenance::StaticFallback);
        assert_eq!(r.value, 1_692_100);

        let c = Comparison::against(BASELINE_EMPLOYMENT, r.value);
        assert_eq!(c.outcome, Outcome::Tie);
    }
}
