//! Incremental Chess.com archive synchronization: period discovery,
//! rate-paced fetching with 429 backoff, watermark tracking and the
//! append-only raw archive store.

pub mod clients;
pub mod config;
pub mod error;
pub mod filter;
pub mod period;
pub mod store;
pub mod sync;

pub use clients::chess_com::ChessComClient;
pub use clients::{HttpTransport, ReqwestTransport, TransportResponse};
pub use config::{RatePolicy, SyncConfig};
pub use error::SyncError;
pub use filter::GameFilter;
pub use period::{ArchivePeriod, PeriodKey};
pub use store::ArchiveStore;
pub use sync::{SyncOutcome, Synchronizer};
