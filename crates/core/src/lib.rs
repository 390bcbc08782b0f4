pub mod domain;
pub mod error;
pub mod ingest;
pub mod reconcile;
pub mod report;
pub mod storage;
pub mod time;

pub mod config {
    use crate::error::TrackerError;

    const DEFAULT_STORE_PATH: &str = "data/monthly-bet-data.json";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub bls_api_key: Option<String>,
        pub fred_api_key: Option<String>,
        pub usajobs_api_key: Option<String>,
        pub usajobs_user_agent: Option<String>,
        pub store_path: String,
        pub live: bool,
        pub mock_html_path: Option<String>,
        pub party_a: String,
        pub party_b: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                bls_api_key: non_empty_var("BLS_API_KEY"),
                fred_api_key: non_empty_var("FRED_API_KEY"),
                usajobs_api_key: non_empty_var("USAJOBS_API_KEY"),
                usajobs_user_agent: non_empty_var("USAJOBS_USER_AGENT"),
                store_path: non_empty_var("TRACKER_STORE_PATH")
                    .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
                live: parse_bool(std::env::var("TRACKER_LIVE").ok().as_deref()).unwrap_or(true),
                mock_html_path: non_empty_var("TRACKER_MOCK_HTML_PATH"),
                party_a: non_empty_var("TRACKER_PARTY_A").unwrap_or_else(|| "Shawn".to_string()),
                party_b: non_empty_var("TRACKER_PARTY_B").unwrap_or_else(|| "Mark".to_string()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .ok_or_else(|| TrackerError::configuration("DATABASE_URL is required").into())
        }

        pub fn require_bls_api_key(&self) -> Result<&str, TrackerError> {
            self.bls_api_key.as_deref().ok_or_else(|| {
                TrackerError::configuration(
                    "BLS API key is required. Please set BLS_API_KEY environment variable.",
                )
            })
        }

        pub fn require_fred_api_key(&self) -> Result<&str, TrackerError> {
            self.fred_api_key
                .as_deref()
                .ok_or_else(|| TrackerError::configuration("FRED_API_KEY is not configured"))
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub(crate) fn parse_bool(v: Option<&str>) -> Option<bool> {
        match v?.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Reads a numeric tuning knob, falling back to `default` when unset or malformed.
    pub(crate) fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_live_flag_variants() {
            assert_eq!(parse_bool(Some("TRUE")), Some(true));
            assert_eq!(parse_bool(Some(" off ")), Some(false));
            assert_eq!(parse_bool(Some("maybe")), None);
            assert_eq!(parse_bool(None), None);
        }
    }
}
