use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Moves of 0.1% or less either way count as flat.
pub const STABLE_THRESHOLD_PCT: f64 = 0.1;

pub const HEALTH_BASE_SCORE: i32 = 50;
const TECH_WEIGHT: i32 = 20;
const OPENINGS_WEIGHT: i32 = 15;
const TOTAL_WEIGHT: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn from_percent_change(percent_change: f64) -> Self {
        if percent_change.abs() <= STABLE_THRESHOLD_PCT {
            Self::Stable
        } else if percent_change > 0.0 {
            Self::Up
        } else {
            Self::Down
        }
    }

    fn signed(self, weight: i32) -> i32 {
        match self {
            Self::Up => weight,
            Self::Down => -weight,
            Self::Stable => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
}

impl Trend {
    pub fn unknown() -> Self {
        Self {
            direction: TrendDirection::Stable,
            change: None,
            percent_change: None,
        }
    }

    /// Period-over-period trend; a zero `previous` yields a 0% change.
    pub fn between(current: f64, previous: f64) -> Self {
        let change = current - previous;
        let percent_change = if previous != 0.0 {
            change / previous * 100.0
        } else {
            0.0
        };
        Self {
            direction: TrendDirection::from_percent_change(percent_change),
            change: Some(change),
            percent_change: Some(percent_change),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series_id: String,
    pub title: String,
    pub source: String,
    pub units: String,
    pub frequency: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub current: Observation,
    pub trend: Trend,
    /// Newest first, at most [`MAX_HISTORY`](Self::MAX_HISTORY) entries.
    pub historical: Vec<Observation>,
    pub metadata: SeriesMetadata,
}

impl IndicatorSeries {
    pub const MAX_HISTORY: usize = 12;

    /// Builds a series from raw observations in any order. Returns `None`
    /// when there is nothing to report.
    pub fn from_observations(
        mut observations: Vec<Observation>,
        metadata: SeriesMetadata,
    ) -> Option<Self> {
        observations.sort_by(|a, b| b.date.cmp(&a.date));
        let current = *observations.first()?;
        let previous = observations.get(1).copied().unwrap_or(current);
        observations.truncate(Self::MAX_HISTORY);

        Some(Self {
            current,
            trend: Trend::between(current.value, previous.value),
            historical: observations,
            metadata,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthBand {
    pub fn for_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Excellent,
            70..=79 => Self::Good,
            50..=69 => Self::Fair,
            30..=49 => Self::Poor,
            _ => Self::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: u8,
    pub description: HealthBand,
    pub factors: Vec<String>,
}

impl HealthScore {
    /// Additive score from the three trend directions, before clamping.
    pub fn raw_score(tech: TrendDirection, openings: TrendDirection, total: TrendDirection) -> i32 {
        HEALTH_BASE_SCORE
            + tech.signed(TECH_WEIGHT)
            + openings.signed(OPENINGS_WEIGHT)
            + total.signed(TOTAL_WEIGHT)
    }

    pub fn from_trends(tech: &Trend, openings: &Trend, total: &Trend) -> Self {
        let raw = Self::raw_score(tech.direction, openings.direction, total.direction);
        let score = raw.clamp(0, 100) as u8;

        let factors = vec![
            factor(tech, "Tech employment", "rising", "declining"),
            factor(openings, "Job openings", "increasing", "decreasing"),
            factor(total, "Overall economy", "growing", "contracting"),
        ];

        Self {
            score,
            description: HealthBand::for_score(score),
            factors,
        }
    }
}

fn factor(trend: &Trend, subject: &str, up_verb: &str, down_verb: &str) -> String {
    let pct = trend.percent_change.unwrap_or(0.0);
    match trend.direction {
        TrendDirection::Up => format!("{subject} {up_verb} (+{pct:.1}%)"),
        TrendDirection::Down => format!("{subject} {down_verb} ({pct:.1}%)"),
        TrendDirection::Stable => format!("{subject} stable"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicIndicatorSet {
    pub tech_employment: IndicatorSeries,
    pub job_openings: IndicatorSeries,
    pub total_employment: IndicatorSeries,
    pub health_score: HealthScore,
}

impl EconomicIndicatorSet {
    pub fn new(
        tech_employment: IndicatorSeries,
        job_openings: IndicatorSeries,
        total_employment: IndicatorSeries,
    ) -> Self {
        let health_score = HealthScore::from_trends(
            &tech_employment.trend,
            &job_openings.trend,
            &total_employment.trend,
        );
        Self {
            tech_employment,
            job_openings,
            total_employment,
            health_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TrendDirection; 3] = [TrendDirection::Up, TrendDirection::Down, TrendDirection::Stable];

    fn trend(direction: TrendDirection) -> Trend {
        let pct = match direction {
            TrendDirection::Up => 0.5,
            TrendDirection::Down => -0.5,
            TrendDirection::Stable => 0.0,
        };
        Trend {
            direction,
            change: Some(pct),
            percent_change: Some(pct),
        }
    }

    fn expected_band(score: u8) -> &'static str {
        if score >= 80 {
            "Excellent"
        } else if score >= 70 {
            "Good"
        } else if score >= 50 {
            "Fair"
        } else if score >= 30 {
            "Poor"
        } else {
            "Critical"
        }
    }

    #[test]
    fn health_score_covers_all_direction_combinations() {
        let mut seen = 0;
        for tech in ALL {
            for openings in ALL {
                for total in ALL {
                    let hs = HealthScore::from_trends(&trend(tech), &trend(openings), &trend(total));
                    let weight = |d: TrendDirection, w: i32| match d {
                        TrendDirection::Up => w,
                        TrendDirection::Down => -w,
                        TrendDirection::Stable => 0,
                    };
                    let raw = 50 + weight(tech, 20) + weight(openings, 15) + weight(total, 15);
                    assert_eq!(HealthScore::raw_score(tech, openings, total), raw);
                    assert_eq!(hs.score as i32, raw.clamp(0, 100));
                    assert!(hs.score <= 100);
                    assert_eq!(hs.description.as_str(), expected_band(hs.score));
                    assert_eq!(hs.factors.len(), 3);
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 27);
    }

    #[test]
    fn all_up_is_excellent_hundred() {
        let up = trend(TrendDirection::Up);
        let hs = HealthScore::from_trends(&up, &up, &up);
        assert_eq!(hs.score, 100);
        assert_eq!(hs.description, HealthBand::Excellent);
        assert_eq!(hs.factors[0], "Tech employment rising (+0.5%)");
    }

    #[test]
    fn all_down_is_critical_zero() {
        let down = trend(TrendDirection::Down);
        let hs = HealthScore::from_trends(&down, &down, &down);
        assert_eq!(hs.score, 0);
        assert_eq!(hs.description, HealthBand::Critical);
        assert_eq!(hs.factors[1], "Job openings decreasing (-0.5%)");
        assert_eq!(hs.factors[2], "Overall economy contracting (-0.5%)");
    }

    #[test]
    fn stability_threshold_is_inclusive() {
        assert_eq!(TrendDirection::from_percent_change(0.1), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_percent_change(-0.1), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_percent_change(0.1001), TrendDirection::Up);
        assert_eq!(Trend::between(1000.5, 1000.0).direction, TrendDirection::Stable);
        assert_eq!(Trend::between(999.5, 1000.0).direction, TrendDirection::Stable);
        assert_eq!(Trend::between(1002.0, 1000.0).direction, TrendDirection::Up);
        assert_eq!(Trend::between(998.0, 1000.0).direction, TrendDirection::Down);
        assert_eq!(Trend::between(1000.0, 1000.0).direction, TrendDirection::Stable);
    }

    #[test]
    fn zero_previous_is_flat() {
        let t = Trend::between(42.0, 0.0);
        assert_eq!(t.percent_change, Some(0.0));
        assert_eq!(t.direction, TrendDirection::Stable);
    }

    #[test]
    fn series_sorts_newest_first_and_caps_history() {
        let meta = SeriesMetadata {
            series_id: "PAYEMS".to_string(),
            title: "All Employees, Total Nonfarm".to_string(),
            source: "test".to_string(),
            units: "Thousands of Persons".to_string(),
            frequency: "Monthly".to_string(),
            last_updated: String::new(),
        };
        let obs: Vec<Observation> = (1..=14)
            .map(|m| Observation {
                date: NaiveDate::from_ymd_opt(2024 + (m - 1) / 12, ((m - 1) % 12 + 1) as u32, 1).unwrap(),
                value: 100.0 + m as f64,
            })
            .collect();

        let s = IndicatorSeries::from_observations(obs, meta.clone()).unwrap();
        assert_eq!(s.current.value, 114.0);
        assert_eq!(s.historical.len(), 12);
        assert_eq!(s.historical[11].value, 103.0);
        assert_eq!(s.trend.direction, TrendDirection::Up);

        assert!(IndicatorSeries::from_observations(Vec::new(), meta).is_none());
    }
}
