//! Worker error taxonomy.
//!
//! Failures are handled at the boundary where they occur: install aborts and
//! keeps the previous version active, fetch failures degrade to fallback
//! content, sync failures leave actions queued, and cache writes are
//! best-effort. None of these propagate to the page as unhandled errors.

use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Manifest fetch incomplete - install aborted, previous version stays
    #[error("install failed: {0}")]
    Install(#[source] anyhow::Error),

    /// Stale-bucket cleanup or bucket takeover failed during activation
    #[error("activation failed: {0}")]
    Activate(#[source] anyhow::Error),

    /// Network unreachable while serving a request
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A replay submission failed; the action stays queued for next trigger
    #[error("sync replay failed for action {id}: {source}")]
    Sync {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Best-effort cache population failed; logged and ignored
    #[error("cache write failed for {url}: {source}")]
    CacheWrite {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}
