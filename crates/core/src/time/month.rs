use anyhow::Context;
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Calendar month key rendered as `YYYY-MM`.
///
/// Stored as the first day of the month so ordering and arithmetic come from
/// `NaiveDate`. All month boundaries are evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        anyhow::ensure!((1..=12).contains(&month), "month must be 1..=12 (got {month})");
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .with_context(|| format!("invalid month {year}-{month:02}"))
    }

    pub fn of(now: DateTime<Utc>) -> Self {
        Self::containing(now.date_naive())
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().0.pred_opt().unwrap_or(self.0)
    }

    pub fn next(&self) -> Self {
        self.0
            .checked_add_months(Months::new(1))
            .map(Self)
            .unwrap_or(*self)
    }

    /// Midnight UTC on the first day of the month.
    pub fn start_utc(&self) -> DateTime<Utc> {
        match self.0.and_hms_opt(0, 0, 0) {
            Some(naive) => Utc.from_utc_datetime(&naive),
            None => DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for MonthKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .with_context(|| format!("month key must be YYYY-MM (got {s:?})"))?;
        anyhow::ensure!(
            y.len() == 4 && m.len() == 2,
            "month key must be YYYY-MM (got {s:?})"
        );
        let year = y.parse::<i32>().with_context(|| format!("invalid year in {s:?}"))?;
        let month = m.parse::<u32>().with_context(|| format!("invalid month in {s:?}"))?;
        Self::new(year, month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Refreshes only ever happen on the first day of a month.
pub fn is_refresh_day(now: DateTime<Utc>) -> bool {
    now.day() == 1
}

pub fn next_refresh_due(now: DateTime<Utc>) -> DateTime<Utc> {
    MonthKey::of(now).next().start_utc()
}

/// Whole days elapsed since `observed_at`; never negative.
pub fn age_in_days(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - observed_at).num_days().max(0)
}

/// Resolves the clock used by a run: an explicit RFC 3339 timestamp, a bare
/// `YYYY-MM-DD` (midnight UTC), or the real clock.
pub fn resolve_now(now_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let Some(s) = now_arg.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now_utc);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("--now must be RFC 3339 or YYYY-MM-DD (got {s:?})"))?;
    let naive = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
    Ok(Utc.from_utc_datetime(&naive))
}
