use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{HttpTransport, ReqwestTransport};
use crate::config::RatePolicy;
use crate::error::SyncError;
use crate::period::ArchivePeriod;

pub const API_BASE: &str = "https://api.chess.com/pub/player";

/// Identifying User-Agent: tool, tracked user and a contact address.
pub fn user_agent(username: &str, contact: &str) -> String {
    format!("Chessy Downloader (username: {username}; contact: {contact})")
}

#[derive(Deserialize)]
struct ArchiveList {
    #[serde(default)]
    archives: Vec<String>,
}

pub struct ChessComClient<T = ReqwestTransport> {
    transport: T,
    rate: RatePolicy,
    base_url: String,
    /// Earliest instant the next period request may start
    next_slot: Mutex<Option<Instant>>,
}

impl ChessComClient<ReqwestTransport> {
    pub fn new(username: &str, contact: &str, rate: RatePolicy) -> Result<Self, SyncError> {
        let transport = ReqwestTransport::new(&user_agent(username, contact))?;
        Ok(Self::with_transport(transport, rate))
    }
}

impl<T: HttpTransport> ChessComClient<T> {
    pub fn with_transport(transport: T, rate: RatePolicy) -> Self {
        Self {
            transport,
            rate,
            base_url: API_BASE.to_string(),
            next_slot: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn archives_url(&self, username: &str) -> String {
        format!("{}/{}/games/archives", self.base_url, username)
    }

    /// Fetch the list of monthly archives, oldest first.
    ///
    /// A body that is not the expected JSON is logged and yields no periods.
    /// Transport failures and non-success statuses are returned as errors.
    pub async fn list_periods(&self, username: &str) -> Result<Vec<ArchivePeriod>, SyncError> {
        let url = self.archives_url(username);
        let resp = self.transport.get(&url).await?;

        if !resp.is_success() {
            return Err(SyncError::Status {
                url,
                status: resp.status,
            });
        }

        let list: ArchiveList = match serde_json::from_str(&resp.body) {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "Invalid JSON in archive listing");
                return Ok(Vec::new());
            }
        };

        let mut periods: Vec<ArchivePeriod> = list
            .archives
            .iter()
            .filter_map(|u| {
                let period = ArchivePeriod::from_url(u);
                if period.is_none() {
                    warn!(url = u.as_str(), "Skipping unrecognized archive URL");
                }
                period
            })
            .collect();
        periods.sort_by_key(|p| p.key);
        Ok(periods)
    }

    /// Fetch one period's PGN text; `None` when it is not available.
    ///
    /// Every attempt waits for the minimum inter-request delay. A 429 sleeps
    /// for the rate-limit backoff before retrying; 5xx and transport errors
    /// retry right after the pacing delay. Other statuses give up at once.
    pub async fn fetch_period(&self, period: &ArchivePeriod) -> Option<String> {
        let url = period.pgn_url();
        let mut attempt = 0u32;

        loop {
            self.pace().await;

            let retry_after = match self.transport.get(&url).await {
                Ok(resp) if resp.is_success() => {
                    info!(period = %period.key, bytes = resp.body.len(), "Downloaded PGNs");
                    return Some(resp.body);
                }
                Ok(resp) if resp.status == 429 => {
                    warn!(
                        period = %period.key,
                        backoff_secs = self.rate.rate_limit_backoff.as_secs_f64(),
                        "Rate limit exceeded"
                    );
                    self.rate.rate_limit_backoff
                }
                Ok(resp) if resp.status >= 500 => {
                    warn!(period = %period.key, status = resp.status, "Server error");
                    Duration::ZERO
                }
                Ok(resp) => {
                    error!(period = %period.key, status = resp.status, "Failed to fetch PGNs");
                    return None;
                }
                Err(e) => {
                    warn!(period = %period.key, error = %e, "Request error");
                    Duration::ZERO
                }
            };

            if attempt >= self.rate.max_retries {
                error!(period = %period.key, attempts = attempt + 1, "Giving up on period");
                return None;
            }
            attempt += 1;
            if !retry_after.is_zero() {
                tokio::time::sleep(retry_after).await;
            }
        }
    }

    /// Wait until the next request slot, then reserve the following one.
    async fn pace(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            tokio::time::sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.rate.request_delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::ScriptedTransport;
    use crate::period::PeriodKey;

    const BASE: &str = "https://api.test/pub/player";

    fn fast_rate() -> RatePolicy {
        RatePolicy {
            request_delay: Duration::from_millis(40),
            rate_limit_backoff: Duration::from_millis(10),
            max_retries: 1,
        }
    }

    fn period(month: u32) -> ArchivePeriod {
        ArchivePeriod::from_url(&format!("{BASE}/alice/games/2024/{month:02}")).unwrap()
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(
            user_agent("alice", "a@example.com"),
            "Chessy Downloader (username: alice; contact: a@example.com)"
        );
    }

    #[tokio::test]
    async fn test_list_periods_sorted() {
        let body = format!(
            r#"{{"archives": ["{BASE}/alice/games/2024/02", "{BASE}/alice/games/2023/11", "bogus"]}}"#
        );
        let transport = ScriptedTransport::new().respond(&format!("{BASE}/alice/games/archives"), 200, &body);
        let client = ChessComClient::with_transport(transport, fast_rate()).with_base_url(BASE);

        let periods = client.list_periods("alice").await.unwrap();
        let keys: Vec<PeriodKey> = periods.iter().map(|p| p.key).collect();
        assert_eq!(keys, vec![PeriodKey::new(2023, 11).unwrap(), PeriodKey::new(2024, 2).unwrap()]);
    }

    #[tokio::test]
    async fn test_list_periods_malformed_json_is_empty() {
        let transport = ScriptedTransport::new().respond(&format!("{BASE}/alice/games/archives"), 200, "<html>");
        let client = ChessComClient::with_transport(transport, fast_rate()).with_base_url(BASE);
        assert!(client.list_periods("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_periods_http_error() {
        let client = ChessComClient::with_transport(ScriptedTransport::new(), fast_rate()).with_base_url(BASE);
        let err = client.list_periods("alice").await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let p = period(3);
        let transport = ScriptedTransport::new()
            .respond(&p.pgn_url(), 429, "")
            .respond(&p.pgn_url(), 200, "[Event \"x\"]\n\n1. e4 1-0\n");
        let client = ChessComClient::with_transport(transport, fast_rate());

        let text = client.fetch_period(&p).await;
        assert_eq!(text.as_deref(), Some("[Event \"x\"]\n\n1. e4 1-0\n"));

        let times = client.transport().call_times(&p.pgn_url());
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let p = period(4);
        let transport = ScriptedTransport::new().respond(&p.pgn_url(), 429, "");
        let client = ChessComClient::with_transport(transport, fast_rate());

        assert_eq!(client.fetch_period(&p).await, None);
        assert_eq!(client.transport().call_times(&p.pgn_url()).len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let p = period(5);
        let transport = ScriptedTransport::new().respond(&p.pgn_url(), 403, "");
        let client = ChessComClient::with_transport(transport, fast_rate());

        assert_eq!(client.fetch_period(&p).await, None);
        assert_eq!(client.transport().call_times(&p.pgn_url()).len(), 1);
    }
}
