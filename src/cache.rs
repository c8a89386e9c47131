use std::{
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use crate::util::write_atomic;

/// Name of a single cache file inside the cache directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// A key from a formatted identifier such as `keys-123.json`
    ///
    /// Anything that is not ASCII alphanumeric, `-`, `_` or `.` is replaced with `_`
    /// so the key always names a file directly inside the cache directory. A replaced
    /// name gets a short hash of the original before its extension, keeping
    /// `keys-a/b.json` and `keys-a_b.json` apart.
    pub fn new(name: impl AsRef<str>) -> Self {
        let raw = name.as_ref();
        let mut name = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        // `.` and `..` would resolve outside of a plain file name
        if name.chars().all(|c| c == '.') {
            name = name.replace('.', "_");
        }

        if name != raw {
            let tag = format!("-{}", hex::encode(&Sha256::digest(raw.as_bytes())[..4]));
            let at = name.rfind('.').filter(|&i| i > 0).unwrap_or(name.len());
            name.insert_str(at, &tag);
        }

        Self(name)
    }

    /// A key derived from the hash of a URL
    #[must_use]
    pub fn for_url(url: &str, extension: &str) -> Self {
        let hash = Sha256::digest(url.as_bytes());
        Self::new(format!("{}.{extension}", hex::encode(&hash[..16])))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a value is stored in a cache file
pub trait CacheEntry: Sized {
    /// # Errors
    /// Errors when the value cannot be serialised
    fn encode(&self) -> Result<Vec<u8>>;

    /// # Errors
    /// Errors when the stored bytes are not a valid value
    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

impl CacheEntry for String {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Self::from_utf8(bytes).context("Cached text is not valid UTF-8")
    }
}

impl CacheEntry for Value {
    fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Serialising JSON")
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        serde_json::from_slice(&bytes).context("Cached JSON is malformed")
    }
}

/// File-backed cache where an entry's age is the modification time of its file
#[derive(Debug, Clone)]
pub struct TtlCache {
    dir: PathBuf,
}

impl TtlCache {
    /// Opens the cache at `dir`, creating the directory if it does not exist
    ///
    /// # Errors
    /// Errors when the directory cannot be created
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Creating cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Time since the entry was last written, `None` when there is no entry
    pub async fn age(&self, key: &CacheKey) -> Option<Duration> {
        let modified = tokio::fs::metadata(self.path_for(key))
            .await
            .and_then(|m| m.modified())
            .ok()?;

        // A timestamp in the future counts as freshly written
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default(),
        )
    }

    /// Returns the cached value for `key` if it is younger than `ttl`, otherwise runs
    /// `producer` and stores what it returns
    ///
    /// When the producer yields `None` the existing entry, stale or not, is left alone.
    #[instrument(skip(self, key, producer), fields(key = key.as_str()))]
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, producer: F) -> Option<T>
    where
        T: CacheEntry,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let path = self.path_for(key);

        if let Some(age) = self.age(key).await
            && age < ttl
        {
            match read_entry(&path).await {
                Ok(value) => {
                    debug!("Cache hit ({}s old)", age.as_secs());
                    return Some(value);
                }
                Err(e) => warn!("Ignoring unreadable cache entry: {e:#}"),
            }
        }

        let value = producer().await?;

        match value.encode() {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&path, bytes).await {
                    error!("Unable to store cache entry: {e:#}");
                }
            }
            Err(e) => error!("Unable to encode cache entry: {e:#}"),
        }

        Some(value)
    }
}

async fn read_entry<T: CacheEntry>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Reading {}", path.display()))?;
    T::decode(bytes)
}
