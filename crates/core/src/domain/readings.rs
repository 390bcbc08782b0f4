use crate::domain::metric::{MetricReading, Provenance};
use crate::domain::snapshot::PrimaryMetric;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sources whose raw readings are kept alongside the monthly snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    Bls,
    Indeed,
}

impl ReadingSource {
    /// Oldest entries are dropped beyond this many per source.
    pub fn retention(self) -> usize {
        match self {
            Self::Bls => 100,
            Self::Indeed => 1_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bls => "bls",
            Self::Indeed => "indeed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedReading {
    pub recorded_at: DateTime<Utc>,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RecordedReading {
    pub fn from_reading(reading: &MetricReading, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            count: reading.value,
            period: Some(reading.as_of_period.clone()),
            provenance: reading.provenance,
            note: reading.note.clone(),
        }
    }

    pub fn from_primary(metric: &PrimaryMetric, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            count: metric.count,
            period: metric.period.clone(),
            provenance: metric.provenance,
            note: metric.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingTrend {
    Up,
    Down,
    Stable,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTrend {
    pub current: Option<RecordedReading>,
    pub previous: Option<RecordedReading>,
    pub trend: ReadingTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingTrends {
    pub bls: SourceTrend,
    pub indeed: SourceTrend,
}

/// Append-only per-source reading log, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingHistory {
    #[serde(default)]
    pub bls: Vec<RecordedReading>,
    #[serde(default)]
    pub indeed: Vec<RecordedReading>,
}

impl ReadingHistory {
    pub fn is_empty(&self) -> bool {
        self.bls.is_empty() && self.indeed.is_empty()
    }

    pub fn series(&self, source: ReadingSource) -> &[RecordedReading] {
        match source {
            ReadingSource::Bls => &self.bls,
            ReadingSource::Indeed => &self.indeed,
        }
    }

    pub fn record(&mut self, source: ReadingSource, reading: RecordedReading) {
        let series = match source {
            ReadingSource::Bls => &mut self.bls,
            ReadingSource::Indeed => &mut self.indeed,
        };
        series.push(reading);
        let excess = series.len().saturating_sub(source.retention());
        series.drain(..excess);
    }

    pub fn latest(&self, source: ReadingSource) -> Option<&RecordedReading> {
        self.series(source).last()
    }

    /// Readings recorded within `[start, end]`.
    pub fn in_range(
        &self,
        source: ReadingSource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<&RecordedReading> {
        self.series(source)
            .iter()
            .filter(|r| r.recorded_at >= start && r.recorded_at <= end)
            .collect()
    }

    pub fn trends(&self) -> ReadingTrends {
        ReadingTrends {
            bls: self.trend_of(ReadingSource::Bls),
            indeed: self.trend_of(ReadingSource::Indeed),
        }
    }

    fn trend_of(&self, source: ReadingSource) -> SourceTrend {
        let series = self.series(source);
        let current = series.last().cloned();
        let previous = series.len().checked_sub(2).and_then(|i| series.get(i)).cloned();
        let trend = match (&current, &previous) {
            (Some(c), Some(p)) => match c.count.cmp(&p.count) {
                std::cmp::Ordering::Greater => ReadingTrend::Up,
                std::cmp::Ordering::Less => ReadingTrend::Down,
                std::cmp::Ordering::Equal => ReadingTrend::Stable,
            },
            _ => ReadingTrend::NoData,
        };
        SourceTrend {
            current,
            previous,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(day: u32, count: i64) -> RecordedReading {
        RecordedReading {
            recorded_at: Utc.with_ymd_and_hms(2025, 9, day, 6, 0, 0).unwrap(),
            count,
            period: None,
            provenance: Provenance::Live,
            note: None,
        }
    }

    #[test]
    fn trend_needs_two_readings() {
        let mut h = ReadingHistory::default();
        assert_eq!(h.trends().bls.trend, ReadingTrend::NoData);

        h.record(ReadingSource::Indeed, reading(1, 12_000));
        let t = h.trends();
        assert_eq!(t.indeed.trend, ReadingTrend::NoData);
        assert_eq!(t.indeed.current.as_ref().map(|r| r.count), Some(12_000));
        assert!(t.indeed.previous.is_none());

        h.record(ReadingSource::Indeed, reading(2, 11_500));
        assert_eq!(h.trends().indeed.trend, ReadingTrend::Down);
        h.record(ReadingSource::Indeed, reading(3, 11_500));
        assert_eq!(h.trends().indeed.trend, ReadingTrend::Stable);
        h.record(ReadingSource::Indeed, reading(4, 11_501));
        assert_eq!(h.trends().indeed.trend, ReadingTrend::Up);
        assert_eq!(h.trends().bls.trend, ReadingTrend::NoData);
    }

    #[test]
    fn retention_drops_oldest() {
        let mut h = ReadingHistory::default();
        for i in 0..105 {
            h.record(ReadingSource::Bls, reading(1, i));
        }
        assert_eq!(h.bls.len(), 100);
        assert_eq!(h.bls.first().map(|r| r.count), Some(5));
        assert_eq!(h.latest(ReadingSource::Bls).map(|r| r.count), Some(104));
    }

    #[test]
    fn range_is_inclusive() {
        let mut h = ReadingHistory::default();
        for day in 1..=5 {
            h.record(ReadingSource::Indeed, reading(day, day as i64));
        }
        let start = Utc.with_ymd_and_hms(2025, 9, 2, 6, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 9, 4, 6, 0, 0).unwrap();
        let counts: Vec<i64> = h
            .in_range(ReadingSource::Indeed, start, end)
            .iter()
            .map(|r| r.count)
            .collect();
        assert_eq!(counts, vec![2, 3, 4]);
    }

    #[test]
    fn trend_serializes_snake_case() {
        assert_eq!(serde_json::to_value(ReadingTrend::NoData).unwrap(), "no_data");
        assert_eq!(serde_json::to_value(ReadingSource::Indeed).unwrap(), "indeed");
    }
}
