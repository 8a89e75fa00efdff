//! Process-wide cache of loaded classifiers.
//!
//! Keyed by canonical artifact path. Each key owns a `OnceCell`, so
//! concurrent requests for the same artifact share a single load and a
//! failed load leaves the key empty for the next caller to retry.

use super::backend::ModelBackend;
use super::classifier::{LoadedClassifier, LoaderOptions};
use crate::error::{Error, Result};
use crate::registry::ModelVariantDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Slot = Arc<OnceCell<Arc<LoadedClassifier>>>;

/// Identifier handed out per load request, increasing over the cache's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Completion message of [`ModelCache::load_async`].
#[derive(Debug)]
pub struct LoadEvent {
    /// Request this event answers.
    pub request_id: RequestId,
    /// Catalog key of the requested variant.
    pub variant_key: String,
    /// Loaded classifier or the load error.
    pub outcome: Result<Arc<LoadedClassifier>>,
}

/// Tracks the most recent request so late completions can be discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestRequest(Option<RequestId>);

impl LatestRequest {
    /// Record `id` as the newest request.
    pub fn set(&mut self, id: RequestId) {
        self.0 = Some(id);
    }

    /// Whether `id` is still the newest request.
    pub fn is_current(&self, id: RequestId) -> bool {
        self.0 == Some(id)
    }
}

struct CacheInner {
    handle: Handle,
    backend: Arc<dyn ModelBackend>,
    options: LoaderOptions,
    slots: Mutex<HashMap<PathBuf, Slot>>,
    next_request: AtomicU64,
}

/// Shared classifier cache. Clones share the same entries.
#[derive(Clone)]
pub struct ModelCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("entries", &self.len())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl ModelCache {
    /// Create an empty cache.
    ///
    /// Loads run as blocking tasks on `handle`; completions of
    /// [`ModelCache::load_async`] are delivered from tasks on the same runtime.
    pub fn new(handle: Handle, backend: Arc<dyn ModelBackend>, options: LoaderOptions) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                handle,
                backend,
                options,
                slots: Mutex::new(HashMap::new()),
                next_request: AtomicU64::new(1),
            }),
        }
    }

    /// Return the classifier for `descriptor`, loading it on first use.
    ///
    /// Concurrent calls for the same artifact wait on one load. A failed
    /// load is reported to every waiter and not cached.
    pub async fn resolve(&self, descriptor: &ModelVariantDescriptor) -> Result<Arc<LoadedClassifier>> {
        let key = self.key_on_worker(&descriptor.path).await?;
        let slot = self.slot(&key);

        if let Some(hit) = slot.get() {
            debug!("Cache hit for {}", key.display());
            return Ok(Arc::clone(hit));
        }

        match slot
            .get_or_try_init(|| self.load_on_worker(descriptor.clone()))
            .await
        {
            Ok(loaded) => Ok(Arc::clone(loaded)),
            Err(e) => {
                self.release_failed(&key, &slot);
                Err(e)
            }
        }
    }

    /// Return the classifier if it is already loaded. Never loads.
    ///
    /// Resolves the artifact path on the calling thread.
    pub fn get_cached(&self, descriptor: &ModelVariantDescriptor) -> Option<Arc<LoadedClassifier>> {
        let key = cache_key(&descriptor.path);
        let slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&key).and_then(|slot| slot.get().cloned())
    }

    /// Allocate a fresh request id.
    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.inner.next_request.fetch_add(1, Ordering::Relaxed))
    }

    /// Resolve in the background and report on `events`.
    ///
    /// The event is sent from a runtime task even when the classifier is
    /// already cached, so the caller never observes it before this returns.
    pub fn load_async(
        &self,
        request_id: RequestId,
        descriptor: &ModelVariantDescriptor,
        events: mpsc::UnboundedSender<LoadEvent>,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        let descriptor = descriptor.clone();

        self.inner.handle.spawn(async move {
            let outcome = cache.resolve(&descriptor).await;
            if let Err(ref e) = outcome {
                warn!("Loading '{}' failed: {}", descriptor.key, e);
            }

            let event = LoadEvent {
                request_id,
                variant_key: descriptor.key,
                outcome,
            };
            if events.send(event).is_err() {
                debug!("Load event for request {} dropped: receiver closed", request_id.0);
            }
        })
    }

    /// Number of successfully loaded classifiers.
    pub fn len(&self) -> usize {
        let slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &Path) -> Slot {
        let mut slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_path_buf()).or_default())
    }

    /// Drop the entry of a failed load unless another caller still waits on it.
    fn release_failed(&self, key: &Path, slot: &Slot) {
        let mut slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slots.get(key)
            && Arc::ptr_eq(current, slot)
            && !slot.initialized()
            && Arc::strong_count(slot) == 2
        {
            slots.remove(key);
        }
    }

    /// Canonicalize on the blocking pool; it touches the filesystem.
    async fn key_on_worker(&self, path: &Path) -> Result<PathBuf> {
        let path = path.to_path_buf();
        self.inner
            .handle
            .spawn_blocking(move || cache_key(&path))
            .await
            .map_err(|e| Error::Internal {
                message: format!("cache key task failed: {e}"),
            })
    }

    async fn load_on_worker(&self, descriptor: ModelVariantDescriptor) -> Result<Arc<LoadedClassifier>> {
        let inner = Arc::clone(&self.inner);
        debug!("Loading classifier '{}' from {}", descriptor.key, descriptor.path.display());

        self.inner
            .handle
            .spawn_blocking(move || {
                LoadedClassifier::load(&descriptor, inner.backend.as_ref(), &inner.options)
                    .map(Arc::new)
            })
            .await
            .map_err(|e| Error::Internal {
                message: format!("classifier load task failed: {e}"),
            })?
    }
}

/// Canonical artifact path, or the absolute path when it does not exist yet.
fn cache_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::inference::testing::{FixedBackend, write_variant};
    use std::time::Duration;

    fn cache_with(backend: &Arc<FixedBackend>) -> ModelCache {
        ModelCache::new(
            Handle::current(),
            Arc::clone(backend) as Arc<dyn ModelBackend>,
            LoaderOptions {
                image_size: 8,
                warmup: true,
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);

        assert!(cache.get_cached(&descriptor).is_none());
        let first = cache.resolve(&descriptor).await.unwrap();
        let second = cache.resolve(&descriptor).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.loads(), 1);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get_cached(&descriptor).unwrap(), &first));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_one_load() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]).with_delay(Duration::from_millis(50)));
        let cache = cache_with(&backend);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let descriptor = descriptor.clone();
                tokio::spawn(async move { cache.resolve(&descriptor).await.unwrap() })
            })
            .collect();

        let mut loaded = Vec::new();
        for task in tasks {
            loaded.push(task.await.unwrap());
        }

        assert_eq!(backend.loads(), 1);
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_same_artifact_through_different_paths_is_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        let mut alias = descriptor.clone();
        alias.key = "alias".to_string();
        alias.path = dir.path().join(".").join("v1.onnx");

        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);

        let a = cache.resolve(&descriptor).await.unwrap();
        let b = cache.resolve(&alias).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.loads(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["a", "b", "c"]);
        // Two outputs against three classes.
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);

        let err = cache.resolve(&descriptor).await.unwrap_err();
        assert!(matches!(err, Error::OutputWidthMismatch { .. }));
        assert!(cache.is_empty());

        cache.resolve(&descriptor).await.unwrap_err();
        assert_eq!(backend.loads(), 2);
    }

    #[tokio::test]
    async fn test_failed_loads_leave_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);

        for key in ["v1", "v2", "v3"] {
            let mut descriptor = write_variant(dir.path(), key, &["a", "b"]);
            descriptor.path = dir.path().join(format!("{key}_missing.onnx"));
            let err = cache.resolve(&descriptor).await.unwrap_err();
            assert!(matches!(err, Error::ModelFileNotFound { .. }));
        }
        // Width mismatch fails after the backend ran.
        let mismatched = write_variant(dir.path(), "v4", &["a", "b", "c"]);
        cache.resolve(&mismatched).await.unwrap_err();

        assert_eq!(cache.inner.slots.lock().unwrap().len(), 0);

        // A good artifact is still cached normally afterwards.
        let good = write_variant(dir.path(), "v5", &["a", "b"]);
        cache.resolve(&good).await.unwrap();
        assert_eq!(cache.inner.slots.lock().unwrap().len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_load_async_delivers_event() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = cache.next_request_id();
        cache.load_async(id, &descriptor, tx.clone());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id, id);
        assert_eq!(event.variant_key, "v1");
        let first = event.outcome.unwrap();

        // A cache hit still arrives through the channel.
        let id2 = cache.next_request_id();
        assert!(id2 > id);
        cache.load_async(id2, &descriptor, tx);
        let event = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&event.outcome.unwrap(), &first));
        assert_eq!(backend.loads(), 1);
    }

    #[tokio::test]
    async fn test_load_async_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = write_variant(dir.path(), "v1", &["a", "b"]);
        descriptor.path = dir.path().join("gone.onnx");
        let backend = Arc::new(FixedBackend::new(vec![1.0, 0.0]));
        let cache = cache_with(&backend);
        let (tx, mut rx) = mpsc::unbounded_channel();

        cache.load_async(cache.next_request_id(), &descriptor, tx);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.outcome, Err(Error::ModelFileNotFound { .. })));
    }

    #[test]
    fn test_latest_request_discards_stale_ids() {
        let mut latest = LatestRequest::default();
        let (a, b) = (RequestId(1), RequestId(2));
        assert!(!latest.is_current(a));
        latest.set(a);
        assert!(latest.is_current(a));
        latest.set(b);
        assert!(!latest.is_current(a));
        assert!(latest.is_current(b));
    }
}
