use crate::config::Settings;
use crate::domain::metric::{MetricReading, Provenance};
use crate::error::TrackerError;
use crate::ingest::html::{self, Selector};
use crate::ingest::read_success_body;
use crate::ingest::retry::RetryPolicy;
use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, DNT, REFERER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use std::sync::OnceLock;
use std::time::Duration;

const SOURCE: &str = "indeed";
const SOURCE_LABEL: &str = "Indeed";

pub const DEFAULT_SEARCH_URL: &str =
    "https://www.indeed.com/jobs?q=software+developer&l=United+States&sort=date";
pub const SEARCH_TERMS: &str = "software developer";
pub const LOCATION: &str = "United States";

/// One results page of cards stands for roughly this many postings.
const JOBS_PER_CARD: i64 = 50;

/// Rotated per attempt.
const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/121.0",
];

#[derive(Debug, Clone, Copy)]
enum Pick {
    First,
    Last,
}

/// Count displays in the order they are tried. The pagination entry is the
/// last `.np` on the page.
const COUNT_SELECTORS: [(Selector<'static>, Pick); 5] = [
    (Selector::Attr("data-testid", "job-count-total"), Pick::First),
    (Selector::Attr("data-testid", "searchCountPages"), Pick::First),
    (Selector::Class("jobsearch-JobCountAndSortPane-jobCount"), Pick::First),
    (Selector::Attr("id", "searchCountPages"), Pick::First),
    (Selector::Class("np"), Pick::Last),
];

const CARD_SELECTORS: [Selector<'static>; 3] = [
    Selector::Attr("data-testid", "job-title"),
    Selector::Class("jobTitle"),
    Selector::Class("slider_item"),
];

/// Scrapes the job board's search results for the software-developer
/// posting count.
#[derive(Debug, Clone)]
pub struct IndeedScraper {
    http: reqwest::Client,
    search_url: String,
    retry: RetryPolicy,
    live: bool,
    mock_html: Option<String>,
}

impl IndeedScraper {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = crate::ingest::http_client("INDEED_TIMEOUT_SECS")?;
        let search_url =
            std::env::var("INDEED_SEARCH_URL").unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string());

        let mock_html = match settings.mock_html_path.as_deref() {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read TRACKER_MOCK_HTML_PATH={path}"))?,
            ),
            None => None,
        };

        let retries = crate::config::env_or("INDEED_RETRIES", 3u32);
        let delay_ms = crate::config::env_or("INDEED_RETRY_DELAY_MS", 3000u64);

        Ok(Self {
            http,
            search_url,
            retry: RetryPolicy::linear(retries, Duration::from_millis(delay_ms)),
            live: settings.live,
            mock_html,
        })
    }

    pub fn new(http: reqwest::Client, search_url: impl Into<String>) -> Self {
        Self {
            http,
            search_url: search_url.into(),
            retry: RetryPolicy::linear(3, Duration::from_secs(3)),
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

    /// Uses the scraper's configured live flag and mock page.
    pub async fn current_count(&self) -> Result<MetricReading, TrackerError> {
        self.fetch_job_count(self.live, self.mock_html.as_deref()).await
    }

    /// Unlike the labor-statistics scrape there is no constant to fall back
    /// on: exhausted retries surface as `Upstream`, an unreadable page as
    /// `Parse`.
    pub async fn fetch_job_count(
        &self,
        live: bool,
        mock_html: Option<&str>,
    ) -> Result<MetricReading, TrackerError> {
        let now = Utc::now();

        if !live {
            let Some(html) = mock_html else {
                return Err(TrackerError::configuration("Must provide live=true or mock content"));
            };
            return parse_job_count(html, now, &self.search_url);
        }

        let html = self
            .retry
            .run(SOURCE, |attempt| self.fetch_page(attempt))
            .await?;
        let reading = parse_job_count(&html, now, &self.search_url)?;
        tracing::info!(
            count = reading.value,
            provenance = reading.provenance.as_str(),
            "scraped job-board count"
        );
        Ok(reading)
    }

    async fn fetch_page(&self, attempt: u32) -> Result<String, TrackerError> {
        let user_agent = USER_AGENTS[(attempt.saturating_sub(1) as usize) % USER_AGENTS.len()];
        tracing::debug!(url = %self.search_url, attempt, "fetching job-board search page");
        let res = self
            .http
            .get(&self.search_url)
            .headers(browser_headers(user_agent))
            .send()
            .await;
        read_success_body(SOURCE, res).await
    }
}

fn browser_headers(user_agent: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.indeed.com/"));
    headers
}

/// Reads the posting count from a search results page.
///
/// Count displays are tried in order and the largest number in the first
/// one holding digits wins ("Page 1 of 300" reads as 300). Without one, the
/// job cards on the page are scaled up to an estimate. Last comes a
/// "N jobs" / "N results" phrase anywhere in the body.
pub fn parse_job_count(
    html: &str,
    observed_at: DateTime<Utc>,
    search_url: &str,
) -> Result<MetricReading, TrackerError> {
    let period = observed_at.format("%Y-%m-%d").to_string();
    let note = |how: String| format!("\"{SEARCH_TERMS}\" in {LOCATION}: {how} ({search_url})");

    if let Some((count, selector)) = count_display(html).filter(|&(count, _)| count > 0) {
        tracing::debug!(count, ?selector, "count display found");
        return Ok(MetricReading::live(count, period, SOURCE_LABEL)
            .with_note(note("result count display".to_string())));
    }

    let cards = html::count_matching(html, &CARD_SELECTORS);
    if cards > 0 {
        let count = cards as i64 * JOBS_PER_CARD;
        tracing::debug!(cards, count, "no count display; estimating from job cards");
        return Ok(MetricReading {
            value: count,
            as_of_period: period,
            provenance: Provenance::Estimated,
            source: SOURCE_LABEL.to_string(),
            note: Some(note(format!("estimated from {cards} job cards"))),
        });
    }

    let body = html::first_element_text(html, "body").unwrap_or_else(|| html::cell_text(html));
    if let Some(count) = results_phrase_re()
        .captures(&body)
        .and_then(|c| c.get(1))
        .and_then(|m| digits_value(m.as_str()))
        .filter(|&c| c > 0)
    {
        return Ok(MetricReading::live(count, period, SOURCE_LABEL)
            .with_note(note("result count in page text".to_string())));
    }

    let headings = ["h1", "h2", "h3"]
        .iter()
        .filter_map(|tag| html::first_element_text(html, tag))
        .collect::<Vec<_>>();
    tracing::warn!(?headings, bytes = html.len(), "no job count on search page");
    Err(TrackerError::parse(
        SOURCE,
        "Could not find job count on Indeed page. Page may have changed structure or been blocked.",
    ))
}

/// First count display whose text holds any number, with its largest number.
fn count_display(html: &str) -> Option<(i64, Selector<'static>)> {
    for (selector, pick) in COUNT_SELECTORS {
        let texts = html::select_text(html, selector);
        let text = match pick {
            Pick::First => texts.into_iter().find(|t| !t.is_empty()),
            Pick::Last => texts.into_iter().rev().find(|t| !t.is_empty()),
        };
        let Some(text) = text else {
            continue;
        };
        if let Some(max) = number_re()
            .find_iter(&text)
            .filter_map(|m| digits_value(m.as_str()))
            .max()
        {
            return Some((max, selector));
        }
    }
    None
}

fn digits_value(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok()
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\d,]+").expect("static regex"))
}

fn results_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})*)\s*(?:jobs?|results?)").expect("static regex")
    })
}
