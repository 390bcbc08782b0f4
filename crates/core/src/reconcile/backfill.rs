use crate::domain::metric::Provenance;
use crate::domain::snapshot::{IndicatorSummary, MonthlySnapshot, PrimaryMetric};
use crate::storage::StoreDocument;
use chrono::{TimeZone, Utc};

const SEED_TECH_EMPLOYMENT: f64 = 2431.2;
const SEED_JOB_OPENINGS: f64 = 1358.0;
const SEED_HEALTH_SCORE: u8 = 15;
const JULY_2025_COUNT: i64 = 1_656_880;

/// Months recorded before automated tracking began: June 2025 (the wager's
/// starting point, at the baseline) and the July 2025 scrape.
pub fn seed_snapshots(baseline: i64) -> Vec<MonthlySnapshot> {
    let indicators = IndicatorSummary {
        tech_employment: SEED_TECH_EMPLOYMENT,
        job_openings: Some(SEED_JOB_OPENINGS),
        health_score: SEED_HEALTH_SCORE,
        tech_employment_trend: None,
        provenance: Provenance::Live,
    };

    let june = MonthlySnapshot::new(
        Utc.with_ymd_and_hms(2025, 6, 6, 0, 0, 0).single().unwrap_or_default(),
        PrimaryMetric {
            count: baseline,
            provenance: Provenance::StaticFallback,
            period: None,
            source: None,
        },
        indicators.clone(),
        baseline,
    );
    let july = MonthlySnapshot::new(
        Utc.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).single().unwrap_or_default(),
        PrimaryMetric {
            count: JULY_2025_COUNT,
            provenance: Provenance::Live,
            period: None,
            source: None,
        },
        indicators,
        baseline,
    );
    vec![june, july]
}

/// Inserts each seed whose month is absent. Returns how many were added.
pub fn apply(document: &mut StoreDocument, baseline: i64) -> usize {
    let mut added = 0;
    for seed in seed_snapshots(baseline) {
        if document.insert_if_absent(seed) {
            added += 1;
        }
    }
    added
}
