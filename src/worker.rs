//! Worker event dispatch.
//!
//! `Worker` is the application-state object the host runtime drives: it
//! owns the config, the cache manager, and the sync queue, and exposes one
//! handler per host event. Handlers are independent invocations with no
//! implicit ordering between them; install and activate are awaited to
//! completion by the host before traffic is intercepted, and fetch handlers
//! may run concurrently against the shared bucket.

use anyhow::Result;
use tracing::{info, warn};

use crate::cache::{CacheManager, FetchDecision, WorkerState};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::fetch::{Fetch, Request};
use crate::push::{self, ClickOutcome, Notification, PushPayload};
use crate::sync::{ActionKind, SyncQueue};

pub struct Worker<F: Fetch> {
    config: WorkerConfig,
    fetcher: F,
    cache: CacheManager,
    queue: SyncQueue,
}

impl<F: Fetch> Worker<F> {
    pub fn new(config: WorkerConfig, fetcher: F) -> Result<Self> {
        let cache = CacheManager::new(config.clone())?;
        let queue = SyncQueue::new(&config.cache_root)?;
        info!(version = %config.version, "worker loaded");
        Ok(Self {
            config,
            fetcher,
            cache,
            queue,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.cache.state()
    }

    /// The queue, for the page controller to record offline submissions
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Install event: populate the static manifest atomically.
    pub async fn handle_install(&mut self) -> Result<(), WorkerError> {
        self.cache.install(&self.fetcher).await
    }

    /// Activate event: purge stale buckets, start intercepting.
    pub async fn handle_activate(&mut self) -> Result<(), WorkerError> {
        self.cache.activate()
    }

    /// Fetch event: answer from cache or network, degrade when offline.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDecision {
        self.cache.handle_fetch(request, &self.fetcher).await
    }

    /// Sync event: replay pending actions for the tagged kind. Unknown tags
    /// are logged and ignored; replay itself never raises.
    pub async fn handle_sync(&self, tag: &str) {
        match ActionKind::from_tag(tag) {
            Some(kind) => {
                self.queue
                    .replay(kind, &self.fetcher, &self.config.api_base_url)
                    .await;
            }
            None => {
                warn!(tag, "ignoring sync trigger with unknown tag");
            }
        }
    }

    /// Push event: build the notification to display.
    pub fn handle_push(&self, raw: Option<&[u8]>) -> Notification {
        Notification::from_payload(PushPayload::parse(raw))
    }

    /// Notification click: resolve the navigation target, if any.
    pub fn handle_notification_click(&self, action: &str) -> ClickOutcome {
        push::dispatch_click(action)
    }
}
