//! Optional date-range and time-class filtering of fetched games.

use std::collections::HashMap;

use chess_core::time_control::{self, TimeClass};
use chrono::NaiveDate;

use crate::period::PeriodKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub time_class: Option<TimeClass>,
}

impl GameFilter {
    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some() || self.time_class.is_some()
    }

    /// Periods entirely outside the date range are never requested.
    pub fn includes_period(&self, key: PeriodKey) -> bool {
        key.overlaps(self.from, self.to)
    }

    /// Whether a game with these tags passes the filter. With a date range
    /// set, games without a readable `Date` tag are dropped; with a time
    /// class set, so are games without a readable `TimeControl`.
    pub fn keep_game(&self, headers: &HashMap<String, String>) -> bool {
        if self.from.is_some() || self.to.is_some() {
            let Some(date) = headers
                .get("Date")
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y.%m.%d").ok())
            else {
                return false;
            };
            if self.from.is_some_and(|f| date < f) || self.to.is_some_and(|t| date > t) {
                return false;
            }
        }

        if let Some(wanted) = self.time_class {
            let class = headers
                .get("TimeControl")
                .and_then(|tc| time_control::categorize(tc));
            if class != Some(wanted) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(date: &str, tc: &str) -> HashMap<String, String> {
        HashMap::from([
            ("Date".to_string(), date.to_string()),
            ("TimeControl".to_string(), tc.to_string()),
        ])
    }

    #[test]
    fn test_inactive_keeps_everything() {
        let filter = GameFilter::default();
        assert!(!filter.is_active());
        assert!(filter.keep_game(&HashMap::new()));
    }

    #[test]
    fn test_date_range() {
        let filter = GameFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 10),
            to: NaiveDate::from_ymd_opt(2024, 3, 20),
            time_class: None,
        };
        assert!(filter.keep_game(&headers("2024.03.10", "600")));
        assert!(filter.keep_game(&headers("2024.03.20", "600")));
        assert!(!filter.keep_game(&headers("2024.03.21", "600")));
        assert!(!filter.keep_game(&headers("????.??.??", "600")));
        assert!(filter.includes_period(PeriodKey::new(2024, 3).unwrap()));
        assert!(!filter.includes_period(PeriodKey::new(2024, 4).unwrap()));
    }

    #[test]
    fn test_time_class() {
        let filter = GameFilter {
            time_class: Some(TimeClass::Blitz),
            ..Default::default()
        };
        assert!(filter.keep_game(&headers("2024.03.10", "300+2")));
        assert!(!filter.keep_game(&headers("2024.03.10", "60")));
        assert!(!filter.keep_game(&headers("2024.03.10", "-")));
    }
}
