//! Disk-backed LRU cache of rendered previews
//!
//! Maps cache keys to files in the storage directory. Capacity is fixed at
//! construction; when a `put` pushes the cache past it, the least recently
//! used entry is dropped and its file is deleted before `put` returns.
//! Deletion failures are logged and reported, never fatal: a leaked file only
//! costs disk space, the in-memory index stays correct.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::CacheKey;

/// What happened to a file displaced by `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Nothing was displaced
    Nothing,
    /// The displaced entry's file was deleted
    Deleted { key: CacheKey, path: PathBuf },
    /// The displaced entry's file was already missing
    AlreadyGone { key: CacheKey, path: PathBuf },
    /// The file could not be deleted and is now orphaned on disk
    Leaked {
        key: CacheKey,
        path: PathBuf,
        error: String,
    },
}

/// Cache counters, exposed on the health endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub capacity: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub leaked_files: u64,
}

pub struct PreviewCache {
    entries: Mutex<LruCache<CacheKey, PathBuf>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    leaked_files: AtomicU64,
}

impl PreviewCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or_else(|| {
            warn!("Preview cache capacity of 0 requested, using 1");
            NonZeroUsize::MIN
        });
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            leaked_files: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Look up a preview path, marking the entry most recently used. Does not touch disk.
    pub async fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.entries.lock().await.get(key).cloned();
        let counter = if path.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        path
    }

    /// Like `get`, without counting towards hit/miss statistics
    pub async fn touch(&self, key: &CacheKey) -> Option<PathBuf> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Insert or update an entry.
    ///
    /// The index is updated under the lock; the displaced file (LRU victim, or
    /// the previous file of an updated key when its path changed) is deleted
    /// after the lock is released but before this call returns.
    pub async fn put(&self, key: CacheKey, path: PathBuf) -> EvictionOutcome {
        let displaced = {
            let mut entries = self.entries.lock().await;
            entries.push(key.clone(), path.clone())
        };

        match displaced {
            None => EvictionOutcome::Nothing,
            Some((old_key, old_path)) if old_key == key => {
                if old_path == path {
                    EvictionOutcome::Nothing
                } else {
                    debug!(key = %key, path = %old_path.display(), "Replacing cached preview file");
                    self.delete_file(old_key, old_path).await
                }
            }
            Some((old_key, old_path)) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %old_key, path = %old_path.display(), "Evicting least recently used preview");
                self.delete_file(old_key, old_path).await
            }
        }
    }

    /// Drop an entry from the index without touching its file
    pub async fn remove(&self, key: &CacheKey) -> Option<PathBuf> {
        self.entries.lock().await.pop(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().await.contains(key)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            capacity: self.capacity(),
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            leaked_files: self.leaked_files.load(Ordering::Relaxed),
        }
    }

    async fn delete_file(&self, key: CacheKey, path: PathBuf) -> EvictionOutcome {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => EvictionOutcome::Deleted { key, path },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = %key, path = %path.display(), "Evicted preview file was already gone");
                EvictionOutcome::AlreadyGone { key, path }
            }
            Err(e) => {
                self.leaked_files.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    path = %path.display(),
                    error = %e,
                    "Failed to delete evicted preview file, leaving it on disk"
                );
                EvictionOutcome::Leaked {
                    key,
                    path,
                    error: e.to_string(),
                }
            }
        }
    }
}
