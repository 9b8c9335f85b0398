//! Cache lifecycle and fetch strategy.
//!
//! `CacheManager` walks the worker through its lifecycle: install populates
//! a staging bucket with the static manifest (all-or-nothing), activate
//! purges every prior-version bucket and starts intercepting, and fetch
//! answers GET requests cache-first with network fallback. A request never
//! sees an error from here - interception either passes the request through
//! or produces some response, degraded if necessary.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::bucket::{self, Bucket, Snapshot};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::fetch::{Destination, Fetch, Method, Request, Response};

/// Body of the synthesized offline placeholder for non-navigation requests
const OFFLINE_MESSAGE: &str = "Offline - Please check your connection";

/// Worker lifecycle. Interception only happens while `Active`; a worker
/// replaced by a newer version goes `Superseded` and stops responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Superseded,
}

/// Outcome of fetch interception: either the request is not ours to handle
/// and goes to the network untouched, or we produce the response.
#[derive(Debug)]
pub enum FetchDecision {
    PassThrough,
    Respond(Response),
}

impl FetchDecision {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, FetchDecision::PassThrough)
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchDecision::Respond(response) => Some(response),
            FetchDecision::PassThrough => None,
        }
    }
}

pub struct CacheManager {
    config: WorkerConfig,
    /// Parsed origin, compared against request URLs for the basic-response check
    origin: Url,
    /// Absolute manifest URLs; the allow-list for cross-origin interception
    manifest: HashSet<String>,
    state: WorkerState,
    bucket: Option<Bucket>,
}

impl CacheManager {
    /// Create a manager for the configured version. If this version's bucket
    /// already exists on disk (a restart after a completed install), it is
    /// reopened and the worker starts out waiting to activate.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let origin = Url::parse(&config.origin)
            .with_context(|| format!("Invalid origin {}", config.origin))?;
        let manifest: HashSet<String> = config.manifest_urls().into_iter().collect();

        let (bucket, state) = if Bucket::exists(&config.cache_root, &config.bucket_name()) {
            let bucket = Bucket::open(&config.cache_root, &config.bucket_name())?;
            (Some(bucket), WorkerState::Waiting)
        } else {
            (None, WorkerState::Installing)
        };

        Ok(Self {
            config,
            origin,
            manifest,
            state,
            bucket,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn bucket(&self) -> Option<&Bucket> {
        self.bucket.as_ref()
    }

    /// Install: fetch every manifest URL into a staging bucket and commit it
    /// as the current bucket. Any failed fetch aborts the whole install and
    /// leaves no bucket for this version - the previous version stays
    /// current. On success the worker skips waiting for old tabs to close.
    pub async fn install<F: Fetch>(&mut self, fetcher: &F) -> Result<(), WorkerError> {
        let name = self.config.bucket_name();
        info!(bucket = %name, "installing");
        self.state = WorkerState::Installing;

        let staging = Bucket::staging(&self.config.cache_root, &name)
            .map_err(WorkerError::Install)?;

        let requests: Vec<Request> = self
            .config
            .manifest_urls()
            .into_iter()
            .map(Request::get)
            .collect();
        let results = futures::future::join_all(requests.iter().map(|r| fetcher.fetch(r))).await;

        for (request, result) in requests.iter().zip(results) {
            let response = match result {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    let _ = staging.discard();
                    return Err(WorkerError::Install(anyhow!(
                        "manifest fetch for {} returned status {}",
                        request.url,
                        response.status
                    )));
                }
                Err(e) => {
                    let _ = staging.discard();
                    return Err(WorkerError::Install(
                        anyhow!(e).context(format!("manifest fetch for {} failed", request.url)),
                    ));
                }
            };

            if let Err(e) = staging.put(request, &Snapshot::of(&response)) {
                let _ = staging.discard();
                return Err(WorkerError::Install(e));
            }
            debug!(url = %request.url, "cached static asset");
        }

        let bucket = staging
            .commit(&self.config.cache_root, &name)
            .map_err(WorkerError::Install)?;
        self.bucket = Some(bucket);
        self.state = WorkerState::Waiting;
        info!(bucket = %name, "installation complete, skipping waiting");
        Ok(())
    }

    /// Activate: delete every bucket of this app whose name is not the
    /// current version, then start intercepting for all open pages.
    pub fn activate(&mut self) -> Result<(), WorkerError> {
        let name = self.config.bucket_name();
        info!(bucket = %name, "activating");

        if self.bucket.is_none() {
            if Bucket::exists(&self.config.cache_root, &name) {
                self.bucket = Some(
                    Bucket::open(&self.config.cache_root, &name).map_err(WorkerError::Activate)?,
                );
            } else {
                return Err(WorkerError::Activate(anyhow!(
                    "no installed bucket named {name}"
                )));
            }
        }

        let stale = bucket::list_app_buckets(&self.config.cache_root, &self.config.bucket_prefix())
            .map_err(WorkerError::Activate)?;
        for old in stale.iter().filter(|n| **n != name) {
            info!(bucket = %old, "deleting old cache");
            bucket::delete_bucket(&self.config.cache_root, old).map_err(WorkerError::Activate)?;
        }

        self.state = WorkerState::Active;
        info!(bucket = %name, "activation complete, claiming clients");
        Ok(())
    }

    /// Mark this worker replaced by a newer version. It stops intercepting.
    pub fn supersede(&mut self) {
        self.state = WorkerState::Superseded;
    }

    /// Fetch interception. GET requests for the origin (or allow-listed
    /// manifest assets) are answered cache-first; a miss goes to the
    /// network, and a network failure degrades to the cached shell page for
    /// navigations or a plain-text 503 for anything else.
    pub async fn handle_fetch<F: Fetch>(&self, request: &Request, fetcher: &F) -> FetchDecision {
        if self.state != WorkerState::Active {
            return FetchDecision::PassThrough;
        }
        if request.method != Method::Get {
            return FetchDecision::PassThrough;
        }
        let Some(bucket) = self.bucket.as_ref() else {
            return FetchDecision::PassThrough;
        };

        let same_origin = self.is_same_origin(&request.url);
        if !same_origin && !self.manifest.contains(&request.url) {
            return FetchDecision::PassThrough;
        }

        // Cache-first: a hit is served verbatim, no freshness check
        match bucket.matches(request) {
            Ok(Some(snapshot)) => {
                debug!(url = %request.url, "serving from cache");
                return FetchDecision::Respond(snapshot.into_response());
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "cache lookup failed, treating as miss");
            }
        }

        match fetcher.fetch(request).await {
            Ok(response) => {
                // Only successful basic (same-origin) responses are cached;
                // the stored copy is a clone, the live one returns to the page
                if response.is_success() && same_origin {
                    if let Err(e) = bucket.put(request, &Snapshot::of(&response)) {
                        let err = WorkerError::CacheWrite {
                            url: request.url.clone(),
                            source: e,
                        };
                        warn!(error = %err, "best-effort cache population failed");
                    } else {
                        debug!(url = %request.url, "caching new resource");
                    }
                }
                FetchDecision::Respond(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "fetch failed, serving fallback");
                if request.destination == Destination::Document {
                    let shell = Request::get(self.config.shell_absolute_url());
                    if let Ok(Some(snapshot)) = bucket.matches(&shell) {
                        return FetchDecision::Respond(snapshot.into_response());
                    }
                }
                FetchDecision::Respond(Response::plain_text(503, OFFLINE_MESSAGE))
            }
        }
    }

    fn is_same_origin(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.origin() == self.origin.origin(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::fetch::testing::FakeFetcher;

    const ORIGIN: &str = "https://tidecache.app";

    fn test_config(root: &Path) -> WorkerConfig {
        WorkerConfig {
            app_name: "tidecache".to_string(),
            version: "1.0.0".to_string(),
            origin: ORIGIN.to_string(),
            cache_root: root.to_path_buf(),
            static_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/css/styles.css".to_string(),
                "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js".to_string(),
            ],
            shell_url: "/index.html".to_string(),
            api_base_url: ORIGIN.to_string(),
        }
    }

    fn fetcher_with_manifest(config: &WorkerConfig) -> FakeFetcher {
        let fetcher = FakeFetcher::new();
        for url in config.manifest_urls() {
            let body = format!("asset {url}");
            fetcher.route_get(&url, Response::plain_text(200, &body));
        }
        fetcher
    }

    async fn installed_manager(root: &Path) -> (CacheManager, FakeFetcher) {
        let config = test_config(root);
        let fetcher = fetcher_with_manifest(&config);
        let mut manager = CacheManager::new(config).unwrap();
        manager.install(&fetcher).await.unwrap();
        manager.activate().unwrap();
        (manager, fetcher)
    }

    #[tokio::test]
    async fn install_populates_every_manifest_url() {
        let root = tempfile::tempdir().unwrap();
        let (manager, _) = installed_manager(root.path()).await;

        let bucket = manager.bucket().unwrap();
        for url in manager.config.manifest_urls() {
            let found = bucket.matches(&Request::get(&url)).unwrap();
            assert!(found.is_some(), "manifest url {url} missing after install");
        }
    }

    #[tokio::test]
    async fn failed_manifest_fetch_aborts_install_atomically() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.static_manifest = vec!["/".to_string(), "/a.css".to_string()];

        let fetcher = FakeFetcher::new();
        fetcher.route_get(&config.absolute_url("/"), Response::plain_text(200, "<html>"));
        fetcher.fail("GET", &config.absolute_url("/a.css"));

        let mut manager = CacheManager::new(config).unwrap();
        let result = manager.install(&fetcher).await;
        assert!(matches!(result, Err(WorkerError::Install(_))));
        assert_eq!(manager.state(), WorkerState::Installing);

        // No bucket created or retained as current
        let names = bucket::list_app_buckets(root.path(), "tidecache-").unwrap();
        assert!(names.is_empty(), "leftover buckets: {names:?}");
    }

    #[tokio::test]
    async fn non_success_manifest_response_aborts_install() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.static_manifest = vec!["/missing.css".to_string()];

        // No route: the fake answers 404
        let fetcher = FakeFetcher::new();
        let mut manager = CacheManager::new(config).unwrap();
        assert!(manager.install(&fetcher).await.is_err());
        assert!(bucket::list_app_buckets(root.path(), "tidecache-")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn activation_purges_prior_version_buckets() {
        let root = tempfile::tempdir().unwrap();

        let v1 = test_config(root.path());
        let fetcher = fetcher_with_manifest(&v1);
        let mut m1 = CacheManager::new(v1).unwrap();
        m1.install(&fetcher).await.unwrap();
        m1.activate().unwrap();

        let mut v2 = test_config(root.path());
        v2.version = "2.0.0".to_string();
        let fetcher2 = fetcher_with_manifest(&v2);
        let mut m2 = CacheManager::new(v2).unwrap();
        m2.install(&fetcher2).await.unwrap();
        m2.activate().unwrap();

        let names = bucket::list_app_buckets(root.path(), "tidecache-").unwrap();
        assert_eq!(names, vec!["tidecache-v2.0.0"]);
    }

    #[tokio::test]
    async fn cached_get_never_touches_network() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let url = format!("{ORIGIN}/css/styles.css");
        let installs = fetcher.call_count("GET", &url);

        let decision = manager.handle_fetch(&Request::get(&url), &fetcher).await;
        let response = decision.into_response().expect("should be intercepted");
        assert_eq!(response.text(), format!("asset {url}"));
        assert_eq!(fetcher.call_count("GET", &url), installs);
    }

    #[tokio::test]
    async fn uncached_get_fetches_once_then_serves_from_cache() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let url = format!("{ORIGIN}/js/map.js");
        fetcher.route_get(&url, Response::plain_text(200, "map code"));

        let first = manager.handle_fetch(&Request::get(&url), &fetcher).await;
        assert_eq!(first.into_response().unwrap().text(), "map code");
        assert_eq!(fetcher.call_count("GET", &url), 1);

        let second = manager.handle_fetch(&Request::get(&url), &fetcher).await;
        assert_eq!(second.into_response().unwrap().text(), "map code");
        assert_eq!(fetcher.call_count("GET", &url), 1, "second hit must come from cache");
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let url = format!("{ORIGIN}/api/weather");
        fetcher.route_get(&url, Response::plain_text(500, "boom"));

        let first = manager.handle_fetch(&Request::get(&url), &fetcher).await;
        assert_eq!(first.into_response().unwrap().status, 500);
        let second = manager.handle_fetch(&Request::get(&url), &fetcher).await;
        assert_eq!(second.into_response().unwrap().status, 500);
        assert_eq!(fetcher.call_count("GET", &url), 2);
    }

    #[tokio::test]
    async fn offline_navigation_falls_back_to_cached_shell() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;
        fetcher.set_offline(true);

        let shell_url = format!("{ORIGIN}/index.html");
        let request = Request::navigation(format!("{ORIGIN}/events"));
        let response = manager
            .handle_fetch(&request, &fetcher)
            .await
            .into_response()
            .unwrap();
        assert_eq!(response.text(), format!("asset {shell_url}"));
    }

    #[tokio::test]
    async fn offline_resource_gets_plain_text_placeholder() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;
        fetcher.set_offline(true);

        let request = Request::get(format!("{ORIGIN}/js/uncached.js"));
        let response = manager
            .handle_fetch(&request, &fetcher)
            .await
            .into_response()
            .unwrap();
        assert!(!response.is_success());
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.text(), OFFLINE_MESSAGE);
    }

    #[tokio::test]
    async fn non_get_requests_pass_through() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let request = Request::post_json(
            format!("{ORIGIN}/api/events/signup"),
            serde_json::json!({"event_id": 7}),
        );
        assert!(manager.handle_fetch(&request, &fetcher).await.is_pass_through());
        assert_eq!(fetcher.call_count("POST", &format!("{ORIGIN}/api/events/signup")), 0);
    }

    #[tokio::test]
    async fn unlisted_cross_origin_requests_pass_through() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let request = Request::get("https://api.weather.example/forecast");
        assert!(manager.handle_fetch(&request, &fetcher).await.is_pass_through());
    }

    #[tokio::test]
    async fn allow_listed_cdn_asset_is_served_from_cache() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        let url = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
        let installs = fetcher.call_count("GET", url);
        let response = manager
            .handle_fetch(&Request::get(url), &fetcher)
            .await
            .into_response()
            .expect("allow-listed asset should be intercepted");
        assert!(response.is_success());
        assert_eq!(fetcher.call_count("GET", url), installs);
    }

    #[tokio::test]
    async fn cross_origin_responses_are_not_cached_at_runtime() {
        let root = tempfile::tempdir().unwrap();
        let (manager, fetcher) = installed_manager(root.path()).await;

        // Allow-listed but evicted entry: delete it, refetch twice
        let url = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
        manager.bucket().unwrap().delete(&Request::get(url)).unwrap();
        fetcher.route_get(url, Response::plain_text(200, "leaflet"));

        manager.handle_fetch(&Request::get(url), &fetcher).await;
        manager.handle_fetch(&Request::get(url), &fetcher).await;
        // Non-basic responses are never stored, so both hits go to the network
        assert_eq!(fetcher.call_count("GET", url), 2);
    }

    #[tokio::test]
    async fn no_interception_before_activation_or_after_supersede() {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(root.path());
        let fetcher = fetcher_with_manifest(&config);
        let mut manager = CacheManager::new(config).unwrap();
        manager.install(&fetcher).await.unwrap();

        let request = Request::get(format!("{ORIGIN}/css/styles.css"));
        assert!(manager.handle_fetch(&request, &fetcher).await.is_pass_through());

        manager.activate().unwrap();
        assert!(!manager.handle_fetch(&request, &fetcher).await.is_pass_through());

        manager.supersede();
        assert!(manager.handle_fetch(&request, &fetcher).await.is_pass_through());
    }

    #[tokio::test]
    async fn activate_without_install_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = CacheManager::new(test_config(root.path())).unwrap();
        assert!(matches!(manager.activate(), Err(WorkerError::Activate(_))));
    }

    #[tokio::test]
    async fn reopening_an_installed_version_starts_waiting() {
        let root = tempfile::tempdir().unwrap();
        let (_, _) = installed_manager(root.path()).await;

        // Same version, fresh process: the committed bucket is picked up
        let manager = CacheManager::new(test_config(root.path())).unwrap();
        assert_eq!(manager.state(), WorkerState::Waiting);
        assert!(manager.bucket().is_some());
    }
}
