//! Versioned cache buckets and the cache-first fetch strategy.
//!
//! A bucket is a named on-disk store of response snapshots keyed by request
//! identity (method + URL). Exactly one bucket is current per running
//! version; `CacheManager` populates it from the static manifest at install
//! time, purges prior-version buckets at activation, and answers GET
//! requests cache-first with network fallback.

pub mod bucket;
pub mod manager;

pub use bucket::{Bucket, Snapshot};
pub use manager::{CacheManager, FetchDecision, WorkerState};
