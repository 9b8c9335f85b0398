//! On-disk cache bucket.
//!
//! Each bucket is a directory under the cache root named `<app>-v<version>`.
//! Entries are one JSON file per request identity, written atomically via a
//! temp-file rename so concurrent writers of the same key settle on
//! last-write-wins with no torn reads. Installs populate a staging directory
//! first and commit it with a single rename, which is what makes the
//! manifest all-or-nothing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::fetch::{Request, Response};

/// Suffix for a bucket still being populated by install
const STAGING_SUFFIX: &str = ".staging";

/// A stored response snapshot: status, headers, body, and when it was
/// cached. Served verbatim on a hit - no freshness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn of(response: &Response) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    pub fn into_response(self) -> Response {
        Response::new(self.status, self.headers, self.body)
    }
}

/// A named cache bucket rooted at `<cache_root>/<name>`.
#[derive(Debug)]
pub struct Bucket {
    name: String,
    dir: PathBuf,
}

impl Bucket {
    /// Open (creating if needed) the bucket with the given name.
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create bucket directory {}", dir.display()))?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Open a staging bucket for an in-progress install. The staging
    /// directory always starts empty; a previous aborted install is wiped.
    pub fn staging(root: &Path, name: &str) -> Result<Self> {
        let staging_name = format!("{name}{STAGING_SUFFIX}");
        let dir = root.join(&staging_name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear stale staging {}", dir.display()))?;
        }
        Self::open(root, &staging_name)
    }

    /// Commit a staging bucket under its final name. A leftover bucket of
    /// the same name (a reinstall) is replaced.
    pub fn commit(self, root: &Path, name: &str) -> Result<Self> {
        let target = root.join(name);
        if target.exists() {
            std::fs::remove_dir_all(&target)
                .with_context(|| format!("Failed to replace bucket {}", target.display()))?;
        }
        std::fs::rename(&self.dir, &target)
            .with_context(|| format!("Failed to commit bucket {}", target.display()))?;
        debug!(bucket = name, "bucket committed");
        Ok(Self {
            name: name.to_string(),
            dir: target,
        })
    }

    /// Throw away a staging bucket after a failed install.
    pub fn discard(self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir)
            .with_context(|| format!("Failed to discard bucket {}", self.dir.display()))?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a bucket directory with this name exists under the root.
    pub fn exists(root: &Path, name: &str) -> bool {
        root.join(name).is_dir()
    }

    fn entry_path(&self, request: &Request) -> PathBuf {
        let digest = Sha256::digest(request.identity().as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    /// Store a snapshot under the request identity.
    pub fn put(&self, request: &Request, snapshot: &Snapshot) -> Result<()> {
        let path = self.entry_path(request);
        let contents = serde_json::to_vec(snapshot)
            .with_context(|| format!("Failed to serialize snapshot for {}", request.url))?;

        // Write-then-rename keeps concurrent readers off half-written entries
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &contents)
            .with_context(|| format!("Failed to write cache entry for {}", request.url))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to place cache entry for {}", request.url))?;
        Ok(())
    }

    /// Look up the stored snapshot for a request identity.
    pub fn matches(&self, request: &Request) -> Result<Option<Snapshot>> {
        let path = self.entry_path(request);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)
            .with_context(|| format!("Failed to read cache entry for {}", request.url))?;
        let snapshot: Snapshot = serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse cache entry for {}", request.url))?;
        Ok(Some(snapshot))
    }

    /// Remove the entry for a request identity, reporting whether one existed.
    pub fn delete(&self, request: &Request) -> Result<bool> {
        let path = self.entry_path(request);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete cache entry for {}", request.url))?;
        Ok(true)
    }
}

/// All bucket names under the root carrying the app prefix, staging
/// directories included.
pub fn list_app_buckets(root: &Path, prefix: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !root.exists() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("Failed to list cache root {}", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Delete a bucket directory by name.
pub fn delete_bucket(root: &Path, name: &str) -> Result<()> {
    let dir = root.join(name);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete bucket {}", dir.display()))?;
    }
    Ok(())
}
