//! Content-addressed resource cache.
//!
//! Every remote blob lands in one directory under a name derived from its URL
//! (or, for page mirrors, from the item key). A non-empty file at that name is
//! a permanent hit. Bodies are streamed into a sibling `.part` file and renamed
//! into place once complete, so an interrupted download never looks cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use sha2::Digest as _;
use tokio::fs;

use crate::error::FetchError;
use crate::http::{CopyError, HttpFetcher};

/// Drops the query string and fragment: everything from the first `?` or `#`.
pub fn canonicalize(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(end) => &url[..end],
        None => url,
    }
}

/// Substring after the final `.` of the canonical URL, if it names a file
/// suffix rather than part of the host or an earlier path segment.
pub fn extension(url: &str) -> Option<&str> {
    let canonical = canonicalize(url);
    let (_, ext) = canonical.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext)
}

/// Cache file name for `url`: hex sha256 of the canonical URL plus extension.
pub fn cache_key(url: &str) -> String {
    let canonical = canonicalize(url);
    let digest = sha2::Sha256::digest(canonical.as_bytes());
    let hash = hex::encode(digest);
    match extension(url) {
        Some(ext) => format!("{hash}.{ext}"),
        None => hash,
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Already on disk; no network traffic.
    Hit,
    /// Downloaded and committed during this call.
    Stored { bytes: u64 },
    /// Transient failure; nothing was committed.
    Unavailable(FetchError),
}

impl FetchOutcome {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug)]
pub struct ResourceCache {
    root: PathBuf,
    http: HttpFetcher,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResourceCache {
    pub fn new(root: impl Into<PathBuf>, http: HttpFetcher) -> Self {
        Self {
            root: root.into(),
            http,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Fetches a shared resource under its content-addressed name.
    pub async fn fetch_url(&self, url: &str) -> anyhow::Result<FetchOutcome> {
        self.fetch(canonicalize(url), &cache_key(url)).await
    }

    /// Ensures `file_name` holds the body of `url`.
    ///
    /// Callers racing on the same `file_name` are serialized; whoever loses
    /// the race sees the winner's file and returns [`FetchOutcome::Hit`].
    /// Only filesystem failures are returned as `Err`.
    pub async fn fetch(&self, url: &str, file_name: &str) -> anyhow::Result<FetchOutcome> {
        let slot = self.slot(file_name);
        let outcome = {
            let _guard = slot.lock().await;
            self.fetch_locked(url, file_name).await
        };
        self.release(file_name, slot);
        outcome
    }

    async fn fetch_locked(&self, url: &str, file_name: &str) -> anyhow::Result<FetchOutcome> {
        let path = self.path_for(file_name);

        if is_cached(&path).await {
            tracing::debug!(%url, path = %path.display(), "cache hit");
            return Ok(FetchOutcome::Hit);
        }

        tracing::info!(%url, path = %path.display(), "not cached; downloading");
        let mut download = match self.http.get(url).await {
            Ok(download) => download,
            Err(err) => {
                tracing::warn!(%url, error = %err, "fetch failed; leaving uncached");
                return Ok(FetchOutcome::Unavailable(err));
            }
        };

        let part_path = self
            .root
            .join(format!(".{file_name}.{}.part", uuid::Uuid::new_v4().simple()));
        let mut part = fs::File::create(&part_path)
            .await
            .with_context(|| format!("create cache file: {}", part_path.display()))?;

        let copied = download.copy_to(&mut part).await;
        drop(part);

        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(CopyError::Fetch(err)) => {
                tracing::warn!(%url, error = %err, "download interrupted; discarding partial file");
                discard(&part_path).await;
                return Ok(FetchOutcome::Unavailable(err));
            }
            Err(CopyError::Write(err)) => {
                discard(&part_path).await;
                return Err(err)
                    .with_context(|| format!("write cache file: {}", part_path.display()));
            }
        };

        fs::rename(&part_path, &path)
            .await
            .with_context(|| format!("commit cache file: {}", path.display()))?;

        tracing::info!(%url, bytes, path = %path.display(), "cached");
        Ok(FetchOutcome::Stored { bytes })
    }

    fn slot(&self, file_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(in_flight.entry(file_name.to_owned()).or_default())
    }

    /// Forgets `file_name` once no other caller holds or waits on its slot.
    fn release(&self, file_name: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&slot) <= 2 {
            in_flight.remove(file_name);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Present and non-empty.
pub async fn is_cached(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

async fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        tracing::debug!(path = %path.display(), ?err, "remove partial file");
    }
}
