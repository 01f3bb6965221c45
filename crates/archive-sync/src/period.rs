//! Archive periods: one remote month-bucket of games.

use std::fmt;

use chrono::{Datelike, NaiveDate};

/// (year, month) of an archive period. Ordering is chronological and matches
/// the lexicographic order of the `YYYY/MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub month: u32,
}

impl PeriodKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Key from an archive URL ending in `.../games/YYYY/MM`.
    pub fn from_url(url: &str) -> Option<Self> {
        let mut parts = url.trim_end_matches('/').rsplit('/');
        let month = parts.next()?.parse().ok()?;
        let year = parts.next()?.parse().ok()?;
        Self::new(year, month)
    }

    /// Parse the persisted `YYYY/MM` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('/')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
    }

    /// Whether any day of this month falls inside `[from, to]`.
    pub fn overlaps(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
        let (Some(first), Some(last)) = (self.first_day(), self.last_day()) else {
            return false;
        };
        from.map_or(true, |f| last >= f) && to.map_or(true, |t| first <= t)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}", self.year, self.month)
    }
}

/// A discovered archive period and its listing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePeriod {
    pub key: PeriodKey,
    pub url: String,
}

impl ArchivePeriod {
    pub fn from_url(url: &str) -> Option<Self> {
        Some(Self {
            key: PeriodKey::from_url(url)?,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint returning the month's games as PGN text.
    pub fn pgn_url(&self) -> String {
        format!("{}/pgn", self.url)
    }
}
