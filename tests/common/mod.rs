#![allow(dead_code)]

use std::time::Duration;

use archive_sync::RatePolicy;

pub const BASE: &str = "https://api.test/pub/player";

/// One archive-formatted game with a short, legal movetext.
pub fn game(site: &str, date: &str, white: &str, black: &str, result: &str, eco: &str) -> String {
    format!(
        "[Event \"Live Chess\"]\n[Site \"{site}\"]\n[Date \"{date}\"]\n[White \"{white}\"]\n[Black \"{black}\"]\n[Result \"{result}\"]\n[ECO \"{eco}\"]\n[TimeControl \"600\"]\n\n1. e4 e5 2. Nf3 Nc6 {result}\n\n"
    )
}

pub fn archives_url(username: &str) -> String {
    format!("{BASE}/{username}/games/archives")
}

pub fn period_url(username: &str, year: i32, month: u32) -> String {
    format!("{BASE}/{username}/games/{year}/{month:02}")
}

pub fn pgn_url(username: &str, year: i32, month: u32) -> String {
    format!("{}/pgn", period_url(username, year, month))
}

/// Archive listing body for the given `(year, month)` periods.
pub fn listing(username: &str, periods: &[(i32, u32)]) -> String {
    let urls: Vec<String> = periods
        .iter()
        .map(|(y, m)| format!("\"{}\"", period_url(username, *y, *m)))
        .collect();
    format!("{{\"archives\": [{}]}}", urls.join(","))
}

/// Pacing short enough for tests but still measurable.
pub fn fast_rate() -> RatePolicy {
    RatePolicy {
        request_delay: Duration::from_millis(5),
        rate_limit_backoff: Duration::from_millis(5),
        max_retries: 1,
    }
}
