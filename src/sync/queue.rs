//! Durable pending-action store and replay.
//!
//! Actions live as one JSON file each under `<cache_root>/pending/`, keyed
//! by a generated id, so they survive restarts. An action is removed only
//! after the server acknowledges its replay with a 2xx.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::fetch::{Fetch, Request};

/// Directory under the cache root holding pending-action files
const PENDING_DIR: &str = "pending";

/// The protected write operations the queue can record. Each kind doubles
/// as a sync trigger tag, so replay runs per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "event-signup")]
    EventSignup,
    #[serde(rename = "newsletter-signup")]
    NewsletterSignup,
}

impl ActionKind {
    /// Submission endpoint, joined onto the API base URL
    pub fn endpoint(&self) -> &'static str {
        match self {
            ActionKind::EventSignup => "/api/events/signup",
            ActionKind::NewsletterSignup => "/api/newsletter/signup",
        }
    }

    /// The sync trigger tag this kind answers to
    pub fn tag(&self) -> &'static str {
        match self {
            ActionKind::EventSignup => "event-signup",
            ActionKind::NewsletterSignup => "newsletter-signup",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "event-signup" => Some(ActionKind::EventSignup),
            "newsletter-signup" => Some(ActionKind::NewsletterSignup),
            _ => None,
        }
    }
}

/// A signup recorded while the network was unreachable. The payload is
/// opaque to the queue; it is posted back to the server as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct SyncQueue {
    dir: PathBuf,
}

impl SyncQueue {
    pub fn new(cache_root: &Path) -> Result<Self> {
        let dir = cache_root.join(PENDING_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create pending directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn action_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Record an action for later replay. Returns the stored action with
    /// its generated id.
    pub fn enqueue(&self, kind: ActionKind, payload: serde_json::Value) -> Result<PendingAction> {
        let action = PendingAction {
            id: generate_id(),
            kind,
            payload,
            created_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&action)?;
        std::fs::write(self.action_path(&action.id), contents)
            .with_context(|| format!("Failed to persist pending action {}", action.id))?;
        debug!(id = %action.id, tag = kind.tag(), "queued offline action");
        Ok(action)
    }

    /// All pending actions of one kind, oldest first. Unreadable entries
    /// are skipped with a warning rather than blocking the rest.
    pub fn pending(&self, kind: ActionKind) -> Result<Vec<PendingAction>> {
        let mut actions = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list pending directory {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable pending action");
                    continue;
                }
            };
            match serde_json::from_str::<PendingAction>(&contents) {
                Ok(action) if action.kind == kind => actions.push(action),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable pending action");
                }
            }
        }
        actions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(actions)
    }

    /// Remove an acknowledged action, reporting whether it existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.action_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove pending action {id}"))?;
        Ok(true)
    }

    /// Replay every pending action of one kind against the API. Each item
    /// is attempted independently: a 2xx acknowledgement removes it, any
    /// failure leaves it queued for the next trigger. Errors are logged and
    /// swallowed - the queue never raises to its caller.
    pub async fn replay<F: Fetch>(&self, kind: ActionKind, fetcher: &F, api_base_url: &str) {
        let actions = match self.pending(kind) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(tag = kind.tag(), error = %e, "could not read pending actions");
                return;
            }
        };
        if actions.is_empty() {
            debug!(tag = kind.tag(), "no pending actions to replay");
            return;
        }

        let url = format!("{}{}", api_base_url.trim_end_matches('/'), kind.endpoint());
        info!(tag = kind.tag(), count = actions.len(), "replaying pending actions");

        for action in actions {
            let request = Request::post_json(url.clone(), action.payload.clone());
            let outcome = match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => Ok(()),
                Ok(response) => Err(anyhow!("server answered status {}", response.status)),
                Err(e) => Err(anyhow!(e)),
            };

            match outcome {
                Ok(()) => {
                    info!(id = %action.id, tag = kind.tag(), "action synced");
                    if let Err(e) = self.remove(&action.id) {
                        warn!(id = %action.id, error = %e, "failed to remove synced action");
                    }
                }
                Err(source) => {
                    let err = WorkerError::Sync {
                        id: action.id.clone(),
                        source,
                    };
                    warn!(error = %err, "action left queued for next trigger");
                }
            }
        }
    }
}

/// Random 128-bit hex id for a pending action
fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
