//! One synchronization pass: discover periods, fetch those newer than the
//! watermark, drop games already archived, append, then advance the
//! watermark.

use std::path::PathBuf;

use chess_core::pgn;
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::clients::chess_com::ChessComClient;
use crate::clients::{HttpTransport, ReqwestTransport};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::filter::GameFilter;
use crate::period::{ArchivePeriod, PeriodKey};
use crate::store::{self, ArchiveStore};

#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Text appended to the archive in this pass (empty if nothing new)
    pub new_text: String,
    /// Archive byte offset where `new_text` starts
    pub base_offset: u64,
    /// Game units in `new_text`
    pub games_added: usize,
    /// Watermark after the pass
    pub watermark: Option<PeriodKey>,
    /// Every period the listing returned
    pub periods: Vec<ArchivePeriod>,
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub delta_file: Option<PathBuf>,
}

impl SyncOutcome {
    pub fn has_new_games(&self) -> bool {
        self.games_added > 0
    }
}

pub struct Synchronizer<T = ReqwestTransport> {
    client: ChessComClient<T>,
    store: ArchiveStore,
    username: String,
    workers: usize,
}

impl Synchronizer<ReqwestTransport> {
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = ChessComClient::new(&config.username, &config.contact_email, config.rate.clone())?;
        let store = ArchiveStore::new(&config.games_dir, &config.username);
        Ok(Self::new(client, store, &config.username, config.workers))
    }
}

impl<T: HttpTransport> Synchronizer<T> {
    pub fn new(client: ChessComClient<T>, store: ArchiveStore, username: &str, workers: usize) -> Self {
        Self {
            client,
            store,
            username: username.to_string(),
            workers: workers.max(1),
        }
    }

    pub fn client(&self) -> &ChessComClient<T> {
        &self.client
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub async fn sync(&self, filter: &GameFilter) -> Result<SyncOutcome, SyncError> {
        self.sync_as_of(filter, Local::now().date_naive()).await
    }

    /// Run one pass as if today were `today`.
    ///
    /// Network failures never fail the pass; only archive store errors do,
    /// and in that case the watermark is left where it was.
    pub async fn sync_as_of(&self, filter: &GameFilter, today: NaiveDate) -> Result<SyncOutcome, SyncError> {
        info!(username = %self.username, "Checking for new games");

        let watermark = self.store.watermark()?;
        let mut outcome = SyncOutcome {
            watermark,
            ..Default::default()
        };

        outcome.periods = match self.client.list_periods(&self.username).await {
            Ok(periods) => periods,
            Err(e) => {
                error!(error = %e, "Error fetching archives");
                return Ok(outcome);
            }
        };

        let pending: Vec<&ArchivePeriod> = outcome
            .periods
            .iter()
            .filter(|p| {
                let fresh = watermark.map_or(true, |w| p.key > w);
                if !fresh {
                    info!(period = %p.key, "Skipping already downloaded archive");
                }
                fresh && filter.includes_period(p.key)
            })
            .collect();
        outcome.skipped = outcome.periods.len() - pending.len();

        let mut fetched: Vec<(PeriodKey, Option<String>)> = stream::iter(pending)
            .map(|p| async move { (p.key, self.client.fetch_period(p).await) })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        fetched.sort_by_key(|(key, _)| *key);

        let archive = self.store.read_archive()?;
        let mut known = ArchiveStore::known_games(&archive);
        let mut new_text = String::new();
        if !archive.is_empty() && !archive.ends_with("\n\n") {
            new_text.push_str(if archive.ends_with('\n') { "\n" } else { "\n\n" });
        }

        for (key, text) in &fetched {
            let Some(text) = text else {
                outcome.failed += 1;
                continue;
            };
            outcome.fetched += 1;

            for unit in pgn::split_games(text) {
                if !unit.is_terminated() {
                    warn!(period = %key, offset = unit.offset, "Dropping unterminated game");
                    continue;
                }
                if !filter.keep_game(&unit.headers()) {
                    continue;
                }
                if !known.insert(store::game_identity(&unit)) {
                    continue;
                }
                new_text.push_str(unit.text);
                new_text.push_str("\n\n");
                outcome.games_added += 1;
            }
        }

        if outcome.games_added > 0 {
            outcome.base_offset = self.store.append(&new_text)?;
            let event_tags = new_text.matches("[Event \"").count();
            info!(games = outcome.games_added, event_tags, "Added games to archive");

            match self.store.write_delta(&new_text, today) {
                Ok(path) => outcome.delta_file = Some(path),
                Err(e) => warn!(error = %e, "Could not write delta file"),
            }
            outcome.new_text = new_text;
        } else {
            info!("No new games found");
        }

        if !filter.is_active() {
            if let Some(key) = completed_through(&fetched, PeriodKey::containing(today)) {
                outcome.watermark = Some(self.store.advance_watermark(key)?);
            }
        }

        Ok(outcome)
    }
}

/// Newest period that can be marked done: fetched successfully, every
/// earlier fetched period succeeded too, and strictly before `current`.
fn completed_through(fetched: &[(PeriodKey, Option<String>)], current: PeriodKey) -> Option<PeriodKey> {
    fetched
        .iter()
        .take_while(|(key, text)| *key < current && text.is_some())
        .map(|(key, _)| *key)
        .last()
}
