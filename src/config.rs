//! Worker configuration.
//!
//! This module holds the static configuration the worker is deployed with:
//! the app identity and version (which together name the cache bucket), the
//! origin it serves, the static asset manifest cached at install time, and
//! the API base URL the sync queue replays against.
//!
//! Configuration is stored at `~/.config/tidecache/worker.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths and bucket naming
const APP_NAME: &str = "tidecache";

/// Config file name
const CONFIG_FILE: &str = "worker.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// App identifier, the prefix of every cache bucket name
    pub app_name: String,
    /// Deployed version string, e.g. "1.0.0"
    pub version: String,
    /// Origin the app is served from; requests elsewhere are cross-origin
    pub origin: String,
    /// Root directory holding cache buckets and the pending-action queue
    pub cache_root: PathBuf,
    /// URLs guaranteed present in the bucket after install (app shell + CDN
    /// assets). Same-origin entries may be root-relative.
    pub static_manifest: Vec<String>,
    /// Page served when an offline navigation request misses the network
    pub shell_url: String,
    /// Base URL for signup replay, joined with each action kind's endpoint
    pub api_base_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            version: "1.0.0".to_string(),
            origin: "https://tidecache.app".to_string(),
            cache_root: default_cache_root(),
            static_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/css/styles.css".to_string(),
                "/js/app.js".to_string(),
                "/manifest.json".to_string(),
                "https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700&display=swap".to_string(),
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css".to_string(),
                "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css".to_string(),
                "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js".to_string(),
            ],
            shell_url: "/index.html".to_string(),
            api_base_url: "https://tidecache.app".to_string(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Bucket name for the running version: `<app>-v<version>`
    pub fn bucket_name(&self) -> String {
        format!("{}-v{}", self.app_name, self.version)
    }

    /// Prefix shared by every bucket this app has ever created
    pub fn bucket_prefix(&self) -> String {
        format!("{}-", self.app_name)
    }

    /// Resolve a possibly root-relative URL against the configured origin
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.origin.trim_end_matches('/'), url)
        } else {
            url.to_string()
        }
    }

    /// The static manifest with every entry resolved to an absolute URL
    pub fn manifest_urls(&self) -> Vec<String> {
        self.static_manifest
            .iter()
            .map(|u| self.absolute_url(u))
            .collect()
    }

    /// Absolute URL of the offline shell page
    pub fn shell_absolute_url(&self) -> String {
        self.absolute_url(&self.shell_url)
    }
}
