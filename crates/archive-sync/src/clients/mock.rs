//! Scripted transport for tests: canned responses per URL, with a log of
//! every request and when it was made.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{HttpTransport, TransportResponse};
use crate::error::SyncError;

#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<TransportResponse>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `url`. Queued responses are served in order; the
    /// last one keeps being served once the queue is down to it. Unscripted
    /// URLs answer 404.
    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(TransportResponse::new(status, body));
        self
    }

    /// Replace everything scripted for `url`.
    pub fn set(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), VecDeque::from([TransportResponse::new(status, body)]));
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_times(&self, url: &str) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter(|(u, _)| u == url)
            .map(|(_, at)| at)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let mut responses = self.responses.lock().unwrap();
        let response = match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| TransportResponse::new(404, "")))
    }
}
