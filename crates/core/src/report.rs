//! Monthly wager report built from the engine's current view.

use crate::config::Settings;
use crate::domain::indicators::TrendDirection;
use crate::domain::metric::Provenance;
use crate::domain::snapshot::Outcome;
use crate::reconcile::CurrentView;
use crate::time::month::MonthKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Moves beyond this many percent from the baseline are called with high
/// confidence.
const HIGH_CONFIDENCE_PCT: f64 = 2.0;
/// Count moves within this many percent of the baseline read as stable.
const COUNT_TREND_PCT: f64 = 1.0;

/// Display names for the two sides of the wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WagerParties {
    /// Bet on growth.
    pub party_a: String,
    /// Bet on decline.
    pub party_b: String,
}

impl Default for WagerParties {
    fn default() -> Self {
        Self {
            party_a: "Shawn".to_string(),
            party_b: "Mark".to_string(),
        }
    }
}

impl WagerParties {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            party_a: settings.party_a.clone(),
            party_b: settings.party_b.clone(),
        }
    }

    pub fn leader(&self, outcome: Outcome) -> Option<&str> {
        match outcome {
            Outcome::PartyA => Some(&self.party_a),
            Outcome::PartyB => Some(&self.party_b),
            Outcome::Tie => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    High,
    Low,
    InsufficientData,
}

impl Confidence {
    /// No snapshot, or an exact tie, leaves nothing to be confident about.
    pub fn for_change(outcome: Option<Outcome>, percent_change: f64) -> Self {
        match outcome {
            None | Some(Outcome::Tie) => Self::InsufficientData,
            Some(_) if percent_change.abs() > HIGH_CONFIDENCE_PCT => Self::High,
            Some(_) => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Low => "Low",
            Self::InsufficientData => "Insufficient data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub month: Option<MonthKey>,
    pub observed_at: Option<DateTime<Utc>>,
    pub age_in_days: Option<i64>,
    pub outcome: Option<Outcome>,
    /// Leading party's name, `None` when tied or without data.
    pub leader: Option<String>,
    pub confidence: Confidence,
    pub count: Option<i64>,
    pub baseline: Option<i64>,
    pub change: i64,
    pub percent_change: f64,
    /// Direction of the count against the baseline.
    pub trend: TrendDirection,
    pub provenance: Option<Provenance>,
    /// Set whenever the count is not a live reading.
    pub fallback_notice: Option<String>,
    pub health_score: Option<u8>,
    pub tech_employment: Option<f64>,
    pub tech_employment_trend: Option<TrendDirection>,
    pub job_openings: Option<f64>,
    pub alternative_total: Option<i64>,
    pub alternative_sources: Vec<String>,
    pub next_update_due: DateTime<Utc>,
}

impl MonthlyReport {
    pub fn build(view: &CurrentView, parties: &WagerParties) -> Self {
        let Some(snap) = view.snapshot.as_ref() else {
            return Self {
                month: None,
                observed_at: None,
                age_in_days: None,
                outcome: None,
                leader: None,
                confidence: Confidence::InsufficientData,
                count: None,
                baseline: None,
                change: 0,
                percent_change: 0.0,
                trend: TrendDirection::Stable,
                provenance: None,
                fallback_notice: None,
                health_score: None,
                tech_employment: None,
                tech_employment_trend: None,
                job_openings: None,
                alternative_total: None,
                alternative_sources: Vec::new(),
                next_update_due: view.next_update_due,
            };
        };

        let cmp = &snap.comparison;
        let provenance = snap.primary_metric.provenance;
        let fallback_notice = (!provenance.is_live()).then(|| fallback_notice(provenance));

        Self {
            month: Some(snap.month),
            observed_at: Some(snap.observed_at),
            age_in_days: view.age_in_days,
            outcome: Some(cmp.outcome),
            leader: parties.leader(cmp.outcome).map(str::to_string),
            confidence: Confidence::for_change(Some(cmp.outcome), cmp.percent_change_from_baseline),
            count: Some(snap.primary_metric.count),
            baseline: Some(cmp.baseline),
            change: cmp.change_from_baseline,
            percent_change: cmp.percent_change_from_baseline,
            trend: count_trend(cmp.percent_change_from_baseline),
            provenance: Some(provenance),
            fallback_notice,
            health_score: Some(snap.indicators.health_score),
            tech_employment: Some(snap.indicators.tech_employment),
            tech_employment_trend: snap.indicators.tech_employment_trend,
            job_openings: snap.indicators.job_openings,
            alternative_total: snap.alternative.as_ref().map(|a| a.total_estimate),
            alternative_sources: snap
                .alternative
                .as_ref()
                .map(|a| a.sources.clone())
                .unwrap_or_default(),
            next_update_due: view.next_update_due,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        self.write_report(&mut out).ok();
        out
    }

    fn write_report(&self, out: &mut String) -> fmt::Result {
        let Some(month) = self.month else {
            writeln!(out, "Codepocalypse Tracker monthly report")?;
            writeln!(out, "No data recorded yet.")?;
            return writeln!(out, "Next update due: {}", self.next_update_due.format("%Y-%m-%d"));
        };

        writeln!(out, "Codepocalypse Tracker monthly report: {month}")?;
        match &self.leader {
            Some(name) => writeln!(out, "{name} is leading ({} confidence)", self.confidence.as_str().to_lowercase())?,
            None => writeln!(out, "Status: Tied")?,
        }
        if let Some(count) = self.count {
            writeln!(
                out,
                "Software developer employment: {} ({} jobs, {:+.2}% vs baseline, trend {})",
                group_thousands(count),
                signed_thousands(self.change),
                self.percent_change,
                trend_label(self.trend)
            )?;
        }
        if let Some(notice) = &self.fallback_notice {
            writeln!(out, "Note: {notice}")?;
        }
        if let Some(score) = self.health_score {
            write!(out, "Economic health score: {score}/100")?;
            if let Some(trend) = self.tech_employment_trend {
                write!(out, " (tech employment trend {})", trend_label(trend))?;
            }
            writeln!(out)?;
        }
        if let Some(total) = self.alternative_total {
            writeln!(
                out,
                "Job-board estimate: {} ({})",
                group_thousands(total),
                self.alternative_sources.join(", ")
            )?;
        }
        writeln!(out, "Next update due: {}", self.next_update_due.format("%Y-%m-%d"))
    }
}

/// Beyond one percent either side of the baseline the count has a direction.
fn count_trend(percent_change: f64) -> TrendDirection {
    if percent_change > COUNT_TREND_PCT {
        TrendDirection::Up
    } else if percent_change < -COUNT_TREND_PCT {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    }
}

fn trend_label(trend: TrendDirection) -> &'static str {
    match trend {
        TrendDirection::Up => "up",
        TrendDirection::Down => "down",
        TrendDirection::Stable => "stable",
    }
}

fn fallback_notice(provenance: Provenance) -> String {
    match provenance {
        Provenance::OfficialApiFallback => {
            "live scrape failed; figure comes from the official statistics API".to_string()
        }
        Provenance::StaticFallback => {
            "live sources unavailable; showing the fixed 2023 official figure".to_string()
        }
        Provenance::Estimated => "figure is an estimate".to_string(),
        Provenance::Live => String::new(),
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn signed_thousands(n: i64) -> String {
    if n >= 0 {
        format!("+{}", group_thousands(n))
    } else {
        group_thousands(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{
        AlternativeSummary, IndicatorSummary, MonthlySnapshot, PrimaryMetric, BASELINE_EMPLOYMENT,
    };
    use crate::storage::Durability;
    use chrono::TimeZone;

    fn view(count: i64, provenance: Provenance) -> CurrentView {
        let observed_at = Utc.with_ymd_and_hms(2025, 9, 1, 6, 0, 0).unwrap();
        let mut snap = MonthlySnapshot::new(
            observed_at,
            PrimaryMetric {
                count,
                provenance,
                period: None,
                source: None,
            },
            IndicatorSummary::stand_in(),
            BASELINE_EMPLOYMENT,
        );
        if provenance == Provenance::StaticFallback {
            snap.alternative = Some(AlternativeSummary {
                total_estimate: 82_000,
                sources: vec!["GitHub Jobs (estimated)".to_string(), "Remote OK API".to_string()],
            });
        }
        CurrentView {
            snapshot: Some(snap),
            age_in_days: Some(3),
            next_update_due: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            durability: Durability::Durable,
        }
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(Confidence::for_change(Some(Outcome::PartyB), -2.08), Confidence::High);
        assert_eq!(Confidence::for_change(Some(Outcome::PartyA), 2.0), Confidence::Low);
        assert_eq!(Confidence::for_change(Some(Outcome::Tie), 0.0), Confidence::InsufficientData);
        assert_eq!(Confidence::for_change(None, 5.0), Confidence::InsufficientData);
    }

    #[test]
    fn decline_names_party_b_with_high_confidence() {
        let report = MonthlyReport::build(&view(1_656_880, Provenance::Live), &WagerParties::default());
        assert_eq!(report.leader.as_deref(), Some("Mark"));
        assert_eq!(report.confidence, Confidence::High);
        assert!(report.fallback_notice.is_none());

        let text = report.render_text();
        assert!(text.contains("Mark is leading (high confidence)"));
        assert!(text.contains("1,656,880 (-35,220 jobs, -2.08% vs baseline, trend down)"));
    }

    #[test]
    fn count_trend_uses_one_percent_band() {
        assert_eq!(count_trend(1.0), TrendDirection::Stable);
        assert_eq!(count_trend(-1.0), TrendDirection::Stable);
        assert_eq!(count_trend(1.01), TrendDirection::Up);
        assert_eq!(count_trend(-2.08), TrendDirection::Down);
    }

    #[test]
    fn carries_tech_employment_trend() {
        let mut v = view(1_700_000, Provenance::Live);
        if let Some(snap) = v.snapshot.as_mut() {
            snap.indicators.health_score = 65;
            snap.indicators.tech_employment_trend = Some(TrendDirection::Up);
        }
        let report = MonthlyReport::build(&v, &WagerParties::default());
        assert_eq!(report.trend, TrendDirection::Stable);
        assert_eq!(report.tech_employment_trend, Some(TrendDirection::Up));
        assert_eq!(report.leader.as_deref(), Some("Shawn"));
        assert_eq!(report.confidence, Confidence::Low);

        let text = report.render_text();
        assert!(text.contains("trend stable"));
        assert!(text.contains("Economic health score: 65/100 (tech employment trend up)"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trend"], "stable");
        assert_eq!(json["techEmploymentTrend"], "up");
    }

    #[test]
    fn static_fallback_carries_notice_and_alternative() {
        let parties = WagerParties {
            party_a: "Ada".to_string(),
            party_b: "Grace".to_string(),
        };
        let report = MonthlyReport::build(&view(BASELINE_EMPLOYMENT, Provenance::StaticFallback), &parties);
        assert_eq!(report.leader, None);
        assert_eq!(report.confidence, Confidence::InsufficientData);
        assert!(report.fallback_notice.as_deref().unwrap().contains("2023"));
        assert_eq!(report.alternative_total, Some(82_000));

        let text = report.render_text();
        assert!(text.contains("Status: Tied"));
        assert!(text.contains("Job-board estimate: 82,000"));
    }

    #[test]
    fn empty_view_renders_no_data() {
        let view = CurrentView {
            snapshot: None,
            age_in_days: None,
            next_update_due: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            durability: Durability::Ephemeral,
        };
        let report = MonthlyReport::build(&view, &WagerParties::default());
        assert_eq!(report.confidence, Confidence::InsufficientData);
        assert_eq!(report.trend, TrendDirection::Stable);
        assert!(report.tech_employment_trend.is_none());
        let text = report.render_text();
        assert!(text.contains("No data recorded yet."));
        assert!(text.contains("2025-10-01"));
    }

    #[test]
    fn groups_digits() {
        assert_eq!(group_thousands(1_692_100), "1,692,100");
        assert_eq!(group_thousands(-35_220), "-35,220");
        assert_eq!(group_thousands(500), "500");
        assert_eq!(signed_thousands(17_900), "+17,900");
    }
}
