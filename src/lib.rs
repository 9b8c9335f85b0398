//! TideCache offline worker - the caching layer behind the TideCache
//! beach-cleanup community app.
//!
//! The crate provides two cooperating pieces:
//!
//! - a [`cache::CacheManager`] that owns a single versioned cache bucket,
//!   pre-populates it with the static asset manifest on install, answers GET
//!   requests cache-first with network fallback, and purges stale buckets on
//!   activation;
//! - a [`sync::SyncQueue`] that durably records signups attempted while
//!   offline and replays them against the API when a sync trigger fires.
//!
//! Everything is tied together by [`worker::Worker`], which dispatches the
//! host runtime's install/activate/fetch/sync/push events to the two
//! subsystems. The host's network stack is abstracted behind the
//! [`fetch::Fetch`] trait so the whole lifecycle can be driven in tests
//! without a server.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod push;
pub mod sync;
pub mod worker;

pub use cache::{CacheManager, FetchDecision, WorkerState};
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use fetch::{Destination, Fetch, FetchError, HttpFetcher, Method, Request, Response};
pub use push::{ClickOutcome, Notification, PushPayload};
pub use sync::{ActionKind, PendingAction, SyncQueue};
pub use worker::Worker;
