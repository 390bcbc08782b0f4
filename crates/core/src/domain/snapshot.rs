use crate::domain::indicators::{EconomicIndicatorSet, TrendDirection};
use crate::domain::metric::{MetricReading, Provenance};
use crate::time::month::MonthKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Official 2023 software-developer employment count; the wager's zero point.
pub const BASELINE_EMPLOYMENT: i64 = 1_692_100;

/// Which side of the wager is ahead. `PartyA` bet on growth, `PartyB` on decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    PartyA,
    PartyB,
    Tie,
}

impl Outcome {
    pub fn from_change(change_from_baseline: i64) -> Self {
        match change_from_baseline.signum() {
            1 => Self::PartyA,
            -1 => Self::PartyB,
            _ => Self::Tie,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub baseline: i64,
    pub change_from_baseline: i64,
    pub percent_change_from_baseline: f64,
    pub outcome: Outcome,
}

impl Comparison {
    pub fn against(baseline: i64, count: i64) -> Self {
        let change_from_baseline = count - baseline;
        let percent_change_from_baseline = if baseline != 0 {
            change_from_baseline as f64 / baseline as f64 * 100.0
        } else {
            0.0
        };
        Self {
            baseline,
            change_from_baseline,
            percent_change_from_baseline,
            outcome: Outcome::from_change(change_from_baseline),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryMetric {
    pub count: i64,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<&MetricReading> for PrimaryMetric {
    fn from(r: &MetricReading) -> Self {
        Self {
            count: r.value,
            provenance: r.provenance,
            period: Some(r.as_of_period.clone()),
            source: Some(r.source.clone()),
        }
    }
}

/// Reduced indicator shape kept on a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSummary {
    pub tech_employment: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_openings: Option<f64>,
    pub health_score: u8,
    /// Period-over-period direction of tech employment; absent for stand-ins
    /// and snapshots recorded before it was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_employment_trend: Option<TrendDirection>,
    pub provenance: Provenance,
}

impl IndicatorSummary {
    pub const STAND_IN_TECH_EMPLOYMENT: f64 = 2431.2;

    /// Used when the indicator fetch fails: last known tech employment and
    /// the neutral base health score.
    pub fn stand_in() -> Self {
        Self {
            tech_employment: Self::STAND_IN_TECH_EMPLOYMENT,
            job_openings: None,
            health_score: crate::domain::indicators::HEALTH_BASE_SCORE as u8,
            tech_employment_trend: None,
            provenance: Provenance::StaticFallback,
        }
    }
}

impl From<&EconomicIndicatorSet> for IndicatorSummary {
    fn from(set: &EconomicIndicatorSet) -> Self {
        Self {
            tech_employment: set.tech_employment.current.value,
            job_openings: Some(set.job_openings.current.value),
            health_score: set.health_score.score,
            tech_employment_trend: Some(set.tech_employment.trend.direction),
            provenance: Provenance::Live,
        }
    }
}

/// Job-board aggregate attached when neither the scrape nor the official API
/// produced a usable count. Order-of-magnitude signal only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeSummary {
    pub total_estimate: i64,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySnapshot {
    pub month: MonthKey,
    pub observed_at: DateTime<Utc>,
    pub primary_metric: PrimaryMetric,
    pub indicators: IndicatorSummary,
    pub comparison: Comparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<AlternativeSummary>,
}

impl MonthlySnapshot {
    pub fn new(
        observed_at: DateTime<Utc>,
        primary_metric: PrimaryMetric,
        indicators: IndicatorSummary,
        baseline: i64,
    ) -> Self {
        let comparison = Comparison::against(baseline, primary_metric.count);
        Self {
            month: MonthKey::of(observed_at),
            observed_at,
            primary_metric,
            indicators,
            comparison,
            alternative: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        !self.primary_metric.provenance.is_live()
    }

    pub fn chart_point(&self) -> ChartPoint {
        ChartPoint {
            month: self.month,
            date: self.observed_at,
            baseline: self.comparison.baseline,
            actual: self.primary_metric.count,
            change: self.comparison.change_from_baseline,
            percent_change: self.comparison.percent_change_from_baseline,
            outcome: self.comparison.outcome,
            provenance: self.primary_metric.provenance,
        }
    }
}

/// Read-only projection of a snapshot for time-series display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub month: MonthKey,
    pub date: DateTime<Utc>,
    pub baseline: i64,
    pub actual: i64,
    pub change: i64,
    pub percent_change: f64,
    pub outcome: Outcome,
    pub provenance: Provenance,
}
