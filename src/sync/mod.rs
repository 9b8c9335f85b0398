//! Background-sync queue for offline signups.
//!
//! Event and newsletter signups attempted while offline are recorded
//! durably and replayed against the API when a sync trigger fires. Replay
//! is best-effort and at-least-once: the server is assumed to handle
//! idempotent submissions.

pub mod queue;

pub use queue::{ActionKind, PendingAction, SyncQueue};
