use std::fmt;

/// Failure taxonomy shared by every upstream fetcher.
///
/// `Configuration` is never retried. `Upstream` and `Parse` are retried by
/// the fetcher's [`RetryPolicy`](crate::ingest::retry::RetryPolicy) and then
/// either absorbed into a tagged fallback or propagated, depending on the
/// source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error (source={source_name}): {detail}")]
    Upstream {
        source_name: &'static str,
        detail: String,
    },

    #[error("parse error (source={source_name}): {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },
}

impl TrackerError {
    pub fn configuration(detail: impl fmt::Display) -> Self {
        Self::Configuration(detail.to_string())
    }

    pub fn upstream(source_name: &'static str, detail: impl fmt::Display) -> Self {
        Self::Upstream {
            source_name,
            detail: detail.to_string(),
        }
    }

    pub fn parse(source_name: &'static str, detail: impl fmt::Display) -> Self {
        Self::Parse {
            source_name,
            detail: detail.to_string(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_transient(&self) -> bool {
        !self.is_configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_source() {
        let err = TrackerError::upstream("fred", "HTTP 503");
        assert_eq!(err.to_string(), "upstream error (source=fred): HTTP 503");
        assert!(err.is_transient());
    }

    #[test]
    fn configuration_is_not_transient() {
        let err = TrackerError::configuration("BLS_API_KEY is required");
        assert!(err.is_configuration());
        assert!(!err.is_transient());
    }
}
