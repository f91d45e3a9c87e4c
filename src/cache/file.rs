//! Durable on-disk cache tier (L2).
//!
//! Each entry lives in its own file named after the SHA-256 of the key, so
//! arbitrary keys map to safe file names. Entries are bincode-encoded
//! [`CacheEntry`] values. The on-disk layout is private to this module.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::backend::CacheBackend;
use crate::cache::entry::{CacheEntry, CacheStats, StatsCounters, resolve_ttl};
use crate::config::duration_secs;
use crate::error::{HalberdError, Result};
use crate::metrics::MetricsCollector;

const CACHE_FILE_EXTENSION: &str = "cache";

/// Configuration for [`FileCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheConfig {
    /// Directory holding the cache files.
    pub directory: PathBuf,
    /// TTL applied when the caller does not pass one. Zero never expires.
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        FileCacheConfig {
            directory: PathBuf::from(".cache/embeddings"),
            default_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl FileCacheConfig {
    /// Reject an empty directory path.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(HalberdError::config("cache.l2.directory must not be empty"));
        }
        Ok(())
    }
}

/// SHA-256 of `input` as lowercase hex.
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(input.as_bytes()))
}

/// File-per-entry cache with no capacity bound.
///
/// Entries persist until deleted, cleared, or found expired on read. Any I/O
/// or decode failure is logged and reported as a miss (reads) or ignored
/// (writes): the cache is an optimization, never a source of truth.
#[derive(Debug)]
pub struct FileCache<V> {
    config: FileCacheConfig,
    io_lock: Mutex<()>,
    stats: StatsCounters,
    _marker: PhantomData<fn() -> V>,
}

impl<V> FileCache<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Open (creating if needed) a cache directory.
    pub fn new(config: FileCacheConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.directory).map_err(|e| {
            HalberdError::config(format!(
                "failed to create cache directory {}: {e}",
                config.directory.display()
            ))
        })?;

        tracing::debug!(
            event = "cache.l2.opened",
            directory = %config.directory.display(),
            default_ttl_secs = config.default_ttl.as_secs_f64(),
            "file cache opened"
        );

        let cache = FileCache {
            config,
            io_lock: Mutex::new(()),
            stats: StatsCounters::new("file"),
            _marker: PhantomData,
        };
        cache.stats.set_size(cache.count_files());
        Ok(cache)
    }

    /// Mirror hits, misses, evictions and size into `metrics` (label `tier=file`).
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.stats.set_metrics(metrics);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    /// Cache directory.
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.config
            .directory
            .join(format!("{}.{CACHE_FILE_EXTENSION}", sha256_hex(key)))
    }

    fn cache_files(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.config.directory) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path.extension().and_then(|ext| ext.to_str())
                            == Some(CACHE_FILE_EXTENSION)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(
                    event = "cache.l2.list_failed",
                    directory = %self.config.directory.display(),
                    error = %e,
                    "failed to list cache directory"
                );
                Vec::new()
            }
        }
    }

    fn count_files(&self) -> usize {
        self.cache_files().len()
    }

    /// Read and decode the entry at `path`. `None` for absent or unreadable files.
    fn read_entry(&self, path: &Path) -> Option<CacheEntry<V>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    event = "cache.l2.read_failed",
                    path = %path.display(),
                    error = %e,
                    "error reading cache file"
                );
                return None;
            }
        };

        match decode_entry::<V>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    event = "cache.l2.decode_failed",
                    path = %path.display(),
                    error = %e,
                    "error decoding cache file"
                );
                None
            }
        }
    }

    fn remove_path(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(
                    event = "cache.l2.delete_failed",
                    path = %path.display(),
                    error = %e,
                    "error deleting cache file"
                );
                false
            }
        }
    }
}

fn encode_entry<V: Serialize>(entry: &CacheEntry<V>) -> Result<Vec<u8>> {
    Ok(bincode::serialize(entry)?)
}

fn decode_entry<V: DeserializeOwned>(bytes: &[u8]) -> Result<CacheEntry<V>> {
    Ok(bincode::deserialize(bytes)?)
}

impl<V> CacheBackend<V> for FileCache<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &str) -> Option<V> {
        let path = self.path_for(key);
        let _guard = self.io_lock.lock();

        match self.read_entry(&path) {
            Some(entry) if entry.is_expired() => {
                if self.remove_path(&path) {
                    self.stats.record_evictions(1);
                }
                self.stats.record_miss();
                None
            }
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, resolve_ttl(ttl, self.config.default_ttl));
        let bytes = match encode_entry(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(
                    event = "cache.l2.encode_failed",
                    error = %e,
                    "error encoding cache entry"
                );
                return;
            }
        };

        let path = self.path_for(key);
        let tmp_path = path.with_extension("tmp");
        let _guard = self.io_lock.lock();

        let written = fs::write(&tmp_path, &bytes).and_then(|()| fs::rename(&tmp_path, &path));
        if let Err(e) = written {
            tracing::error!(
                event = "cache.l2.write_failed",
                path = %path.display(),
                error = %e,
                "error writing cache file"
            );
            let _ = fs::remove_file(&tmp_path);
        }
    }

    fn delete(&self, key: &str) -> bool {
        let path = self.path_for(key);
        let _guard = self.io_lock.lock();
        self.remove_path(&path)
    }

    fn clear(&self) {
        let paths = self.cache_files();
        let removed = {
            let _guard = self.io_lock.lock();
            paths.iter().filter(|path| self.remove_path(path)).count()
        };
        self.stats.set_size(0);
        tracing::info!(
            event = "cache.l2.cleared",
            directory = %self.config.directory.display(),
            removed,
            "file cache cleared"
        );
    }

    fn exists(&self, key: &str) -> bool {
        let path = self.path_for(key);
        let _guard = self.io_lock.lock();
        self.read_entry(&path)
            .is_some_and(|entry| !entry.is_expired())
    }

    fn stats(&self) -> CacheStats {
        self.stats.set_size(self.count_files());
        self.stats.snapshot()
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
