//! Preview pipeline
//!
//! hash -> cache lookup -> (hit) read file
//!                      -> (miss) fetch -> transform -> persist -> cache insert
//!
//! Concurrent misses for the same key share one in-flight operation. The
//! fetch belongs to the waiters: once every waiter has gone away it is
//! dropped. Transform and persist run on their own task and always finish,
//! so a half-written preview can never be published.

use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, WeakShared};
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::models::{CacheKey, CropMode, PreviewRequest};
use crate::services::cache_key::cache_key;
use crate::services::fetcher::Fetcher;
use crate::services::preview_cache::{EvictionOutcome, PreviewCache};
use crate::services::transformer::Transformer;
use crate::storage::PreviewStorage;

type PreviewFuture = BoxFuture<'static, PipelineResult<Bytes>>;

#[derive(Clone)]
pub struct PreviewService {
    cache: Arc<PreviewCache>,
    storage: PreviewStorage,
    fetcher: Arc<dyn Fetcher>,
    transformer: Arc<dyn Transformer>,
    in_flight: Arc<InFlightRegistry>,
}

impl PreviewService {
    pub fn new(
        cache: Arc<PreviewCache>,
        storage: PreviewStorage,
        fetcher: Arc<dyn Fetcher>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        Self {
            cache,
            storage,
            fetcher,
            transformer,
            in_flight: Arc::new(InFlightRegistry::default()),
        }
    }

    pub fn cache(&self) -> &Arc<PreviewCache> {
        &self.cache
    }

    pub fn storage(&self) -> &PreviewStorage {
        &self.storage
    }

    /// Number of distinct previews currently being fetched or rendered
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Return the preview for `(url, width, height, mode)`, rendering it on a miss
    pub async fn process(
        &self,
        url: &str,
        headers: &HeaderMap,
        width: u32,
        height: u32,
        mode: CropMode,
    ) -> PipelineResult<Bytes> {
        let request = PreviewRequest {
            url: url.to_string(),
            width,
            height,
            mode,
        };
        self.process_request(request, headers).await
    }

    pub async fn process_request(
        &self,
        request: PreviewRequest,
        headers: &HeaderMap,
    ) -> PipelineResult<Bytes> {
        let key = cache_key(&request.url, request.width, request.height, request.mode);

        if let Some(path) = self.cache.get(&key).await {
            if let Some(preview) = self.read_cached(&key, path).await.map_err(Arc::new)? {
                debug!(key = %key, url = %request.url, "Serving preview from cache");
                return Ok(preview);
            }
        }

        let preview = {
            let mut entries = self.in_flight.lock();
            match entries.get(&key).and_then(|entry| entry.preview.upgrade()) {
                Some(existing) => {
                    debug!(key = %key, url = %request.url, "Joining in-flight preview");
                    existing
                }
                None => {
                    let id = self.in_flight.next_id();
                    let guard = InFlightGuard {
                        registry: Arc::clone(&self.in_flight),
                        key: key.clone(),
                        id,
                    };
                    let preview = self
                        .clone()
                        .render(guard, key.clone(), request, headers.clone())
                        .boxed()
                        .shared();
                    if let Some(weak) = preview.downgrade() {
                        entries.insert(key, InFlight { id, preview: weak });
                    }
                    preview
                }
            }
        };

        preview.await
    }

    async fn render(
        self,
        guard: InFlightGuard,
        key: CacheKey,
        request: PreviewRequest,
        headers: HeaderMap,
    ) -> PipelineResult<Bytes> {
        let _guard = guard;

        // A previous leader may have published this key between our lookup and now
        if let Some(path) = self.cache.touch(&key).await {
            if let Some(preview) = self.read_cached(&key, path).await.map_err(Arc::new)? {
                return Ok(preview);
            }
        }

        debug!(key = %key, url = %request.url, "Cache miss, fetching source image");
        let source = self
            .fetcher
            .fetch(&request.url, &headers)
            .await
            .map_err(|e| Arc::new(PipelineError::from(e)))?;

        let service = self.clone();
        tokio::spawn(async move { service.store(key, source, request).await })
            .await
            .map_err(|e| Arc::new(PipelineError::internal(e.to_string())))?
            .map_err(Arc::new)
    }

    /// Transform and publish a fetched source. Runs detached from the request.
    async fn store(
        &self,
        key: CacheKey,
        source: Bytes,
        request: PreviewRequest,
    ) -> Result<Bytes, PipelineError> {
        let PreviewRequest {
            url,
            width,
            height,
            mode,
        } = request;
        let transformer = Arc::clone(&self.transformer);
        let preview = tokio::task::spawn_blocking(move || {
            transformer.transform(&source, width, height, mode)
        })
        .await
        .map_err(|e| PipelineError::internal(e.to_string()))??;

        let path = self
            .storage
            .write(&key, &preview)
            .await
            .map_err(PipelineError::Persist)?;

        match self.cache.put(key.clone(), path).await {
            EvictionOutcome::Leaked {
                key: evicted,
                path,
                error,
            } => {
                warn!(
                    key = %key,
                    evicted = %evicted,
                    path = %path.display(),
                    error = %error,
                    "Stored preview, evicted file leaked"
                );
            }
            outcome => {
                info!(
                    key = %key,
                    url = %url,
                    bytes = preview.len(),
                    width,
                    height,
                    mode = %mode,
                    evicted = !matches!(outcome, EvictionOutcome::Nothing),
                    "Stored preview"
                );
            }
        }

        Ok(preview)
    }

    /// Read a cache hit. A missing file drops the entry and reports a miss.
    async fn read_cached(
        &self,
        key: &CacheKey,
        path: PathBuf,
    ) -> Result<Option<Bytes>, PipelineError> {
        match self.storage.read(&path).await {
            Ok(preview) => Ok(Some(preview)),
            Err(e) if e.is_not_found() => {
                warn!(key = %key, path = %path.display(), "Cached preview file missing, refetching");
                self.cache.remove(key).await;
                Ok(None)
            }
            Err(e) => Err(PipelineError::CacheRead(e)),
        }
    }
}

struct InFlight {
    id: u64,
    preview: WeakShared<PreviewFuture>,
}

/// Key -> in-progress preview. Entries hold weak handles so an operation
/// nobody waits for any more is dropped rather than parked.
#[derive(Default)]
struct InFlightRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<CacheKey, InFlight>>,
}

impl InFlightRegistry {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // Never held across an await
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, InFlight>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn finish(&self, key: &CacheKey, id: u64) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key);
        }
    }
}

/// Removes its in-flight entry when the operation settles or is dropped
struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: CacheKey,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.finish(&self.key, self.id);
    }
}
