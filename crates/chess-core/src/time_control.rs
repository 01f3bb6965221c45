//! Time control descriptors (`"300+2"`, `"3|2"`, `"600"`, `"1/86400"`) and
//! the Chess.com speed categories derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const DAILY_MINUTES: u64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeClass {
    Bullet,
    Blitz,
    Rapid,
    Classical,
    Daily,
}

impl TimeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeClass::Bullet => "bullet",
            TimeClass::Blitz => "blitz",
            TimeClass::Rapid => "rapid",
            TimeClass::Classical => "classical",
            TimeClass::Daily => "daily",
        }
    }

    fn title(self) -> &'static str {
        match self {
            TimeClass::Bullet => "Bullet",
            TimeClass::Blitz => "Blitz",
            TimeClass::Rapid => "Rapid",
            TimeClass::Classical => "Classical",
            TimeClass::Daily => "Daily",
        }
    }
}

impl fmt::Display for TimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullet" => Ok(TimeClass::Bullet),
            "blitz" => Ok(TimeClass::Blitz),
            "rapid" => Ok(TimeClass::Rapid),
            "classical" => Ok(TimeClass::Classical),
            "daily" | "correspondence" => Ok(TimeClass::Daily),
            other => Err(format!("unknown time class: {other}")),
        }
    }
}

/// Parsed time control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    pub base_secs: u64,
    pub increment_secs: u64,
    /// Correspondence descriptor (`moves/seconds`, e.g. `1/86400`).
    pub per_move: bool,
}

impl TimeControl {
    pub fn parse(descriptor: &str) -> Option<Self> {
        let s = descriptor.trim();
        if s.is_empty() || s == "-" || s == "?" {
            return None;
        }

        if let Some((moves, secs)) = s.split_once('/') {
            moves.trim().parse::<u32>().ok()?;
            return Some(Self {
                base_secs: secs.trim().parse().ok()?,
                increment_secs: 0,
                per_move: true,
            });
        }

        if let Some((base, inc)) = s.split_once('+') {
            return Some(Self {
                base_secs: base.trim().parse().ok()?,
                increment_secs: inc.trim().parse().ok()?,
                per_move: false,
            });
        }

        // Chess.com's "3|2": minutes | seconds
        if let Some((base_min, inc)) = s.split_once('|') {
            let minutes: u64 = base_min.trim().parse().ok()?;
            return Some(Self {
                base_secs: minutes.checked_mul(60)?,
                increment_secs: inc.trim().parse().ok()?,
                per_move: false,
            });
        }

        Some(Self {
            base_secs: s.parse().ok()?,
            increment_secs: 0,
            per_move: false,
        })
    }

    /// Category by base time alone, the way Chess.com buckets games.
    pub fn class(&self) -> TimeClass {
        let minutes = self.base_secs as f64 / 60.0;
        if self.per_move || minutes >= DAILY_MINUTES as f64 {
            TimeClass::Daily
        } else if minutes < 3.0 {
            TimeClass::Bullet
        } else if minutes < 10.0 {
            TimeClass::Blitz
        } else if minutes < 30.0 {
            TimeClass::Rapid
        } else {
            TimeClass::Classical
        }
    }
}

/// Category of a raw descriptor; `None` when it cannot be parsed.
pub fn categorize(descriptor: &str) -> Option<TimeClass> {
    TimeControl::parse(descriptor).map(|tc| tc.class())
}

/// Human label such as `5min +2sec (Blitz)`. Unparseable descriptors are
/// returned unchanged; an empty one is `Unknown`.
pub fn format_time_control(descriptor: &str) -> String {
    if descriptor.trim().is_empty() {
        return crate::game_data::UNKNOWN.to_string();
    }
    let Some(tc) = TimeControl::parse(descriptor) else {
        return descriptor.to_string();
    };
    if tc.per_move {
        let days = tc.base_secs / 86_400;
        return format!("{days} day(s) per move ({})", TimeClass::Daily.title());
    }

    let minutes = tc.base_secs / 60;
    let seconds = tc.base_secs % 60;
    let mut parts = Vec::new();
    if minutes > 0 {
        parts.push(format!("{minutes}min"));
    }
    if seconds > 0 || minutes == 0 {
        parts.push(format!("{seconds}sec"));
    }
    let mut label = parts.join(" ");
    if tc.increment_secs > 0 {
        label.push_str(&format!(" +{}sec", tc.increment_secs));
    }
    label.push_str(&format!(" ({})", tc.class().title()));
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("60"), Some(TimeClass::Bullet));
        assert_eq!(categorize("120+1"), Some(TimeClass::Bullet));
        assert_eq!(categorize("180+2"), Some(TimeClass::Blitz));
        assert_eq!(categorize("300+2"), Some(TimeClass::Blitz));
        assert_eq!(categorize("3|2"), Some(TimeClass::Blitz));
        assert_eq!(categorize("600"), Some(TimeClass::Rapid));
        assert_eq!(categorize("1800"), Some(TimeClass::Classical));
        assert_eq!(categorize("1/86400"), Some(TimeClass::Daily));
        assert_eq!(categorize("Unknown"), None);
        assert_eq!(categorize(""), None);
    }

    #[test]
    fn test_format_time_control() {
        assert_eq!(format_time_control("300+2"), "5min +2sec (Blitz)");
        assert_eq!(format_time_control("90"), "1min 30sec (Bullet)");
        assert_eq!(format_time_control("30"), "30sec (Bullet)");
        assert_eq!(format_time_control("weird"), "weird");
        assert_eq!(format_time_control(""), "Unknown");
    }

    #[test]
    fn test_minutes_overflow_is_unparseable() {
        let huge = format!("{}|0", u64::MAX / 60 + 1);
        assert_eq!(TimeControl::parse(&huge), None);
        assert_eq!(format_time_control(&huge), huge);
        assert_eq!(TimeControl::parse("3|2").map(|tc| tc.base_secs), Some(180));
    }

    #[test]
    fn test_time_class_from_str() {
        assert_eq!("Blitz".parse::<TimeClass>(), Ok(TimeClass::Blitz));
        assert!("hyper".parse::<TimeClass>().is_err());
    }
}
