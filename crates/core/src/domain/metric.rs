use serde::{Deserialize, Serialize};

/// Where a number came from. Consumers must not treat anything other than
/// `Live` as equal-confidence data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    OfficialApiFallback,
    StaticFallback,
    Estimated,
}

impl Provenance {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::OfficialApiFallback => "official_api_fallback",
            Self::StaticFallback => "static_fallback",
            Self::Estimated => "estimated",
        }
    }
}

/// One source's observation of the tracked employment count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: i64,
    pub as_of_period: String,
    pub provenance: Provenance,
    pub source: String,
    pub note: Option<String>,
}

impl MetricReading {
    pub fn live(value: i64, as_of_period: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            value,
            as_of_period: as_of_period.into(),
            provenance: Provenance::Live,
            source: source.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
