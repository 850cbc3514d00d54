//! Cache construction.
//!
//! [`CacheConfig`] carries the scalar parameters and can be loaded from JSON.
//! [`ImageCacheBuilder`] adds the schemes and collaborators and produces an
//! [`ImageCache`] handle.
//!
//! ## Example
//!
//! ```rust
//! use imagecache::builder::ImageCacheBuilder;
//! use imagecache::scheme::{SchemeDescriptor, renderers};
//! use image::imageops::FilterType;
//!
//! let cache = ImageCacheBuilder::new("avatars", 64, 128)
//!     .scheme(SchemeDescriptor::new(1, true, renderers::aspect_fill(FilterType::Triangle)))
//!     .worker_threads(2)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(cache.capacity(), 128);
//! assert!(!cache.contains("file:///tmp/missing.png"));
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dispatch::{Dispatcher, InlineDispatcher};
use crate::error::ConfigError;
use crate::fetch::{Collaborators, Delivery, FetchCoordinator};
#[cfg(feature = "metrics")]
use crate::metrics::{CacheMetricsSnapshot, MetricsReset, MetricsSnapshotProvider};
use crate::policy::lru_index::LruSnapshot;
use crate::scheme::{RenderedImage, SchemeDescriptor, SchemeRegistry};
use crate::source::{Decoder, Fetcher, FileFetcher, ImageDecoder};

/// Scalar cache parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespacing label. Names worker threads and log spans.
    pub identifier: String,
    /// Side length, in pixels, of every rendered artifact.
    pub size: u32,
    /// Number of slots shared by all schemes. Zero disables storage.
    pub capacity: usize,
    /// Worker pool size; `None` uses rayon's default.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl CacheConfig {
    pub fn new(identifier: impl Into<String>, size: u32, capacity: usize) -> Self {
        Self {
            identifier: identifier.into(),
            size,
            capacity,
            worker_threads: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::new("cache identifier must not be empty"));
        }
        if self.size == 0 {
            return Err(ConfigError::new("cache size must be >= 1 pixel"));
        }
        if let Some(n) = self.worker_threads
            && n == 0
        {
            return Err(ConfigError::new("worker_threads must be >= 1 when set"));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::new(format!("invalid cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::new(format!("failed to serialize cache config: {e}")))
    }
}

/// Fluent builder for [`ImageCache`].
///
/// Defaults: [`FileFetcher`], [`ImageDecoder`], [`InlineDispatcher`].
pub struct ImageCacheBuilder {
    config: CacheConfig,
    schemes: Vec<SchemeDescriptor>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ImageCacheBuilder {
    pub fn new(identifier: impl Into<String>, size: u32, capacity: usize) -> Self {
        Self::from_config(CacheConfig::new(identifier, size, capacity))
    }

    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            schemes: Vec::new(),
            fetcher: Arc::new(FileFetcher),
            decoder: Arc::new(ImageDecoder),
            dispatcher: Arc::new(InlineDispatcher),
        }
    }

    pub fn scheme(mut self, scheme: SchemeDescriptor) -> Self {
        self.schemes.push(scheme);
        self
    }

    pub fn schemes(mut self, schemes: impl IntoIterator<Item = SchemeDescriptor>) -> Self {
        self.schemes.extend(schemes);
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Context that miss deliveries are handed to.
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = Some(threads);
        self
    }

    pub fn build(self) -> Result<ImageCache, ConfigError> {
        self.config.validate()?;
        let registry = SchemeRegistry::new(self.schemes)?;
        let pool = build_worker_pool(&self.config)?;

        tracing::debug!(
            cache = %self.config.identifier,
            size = self.config.size,
            capacity = self.config.capacity,
            schemes = registry.len(),
            "image cache created"
        );

        let coordinator = FetchCoordinator::new(
            self.config.identifier.as_str(),
            self.config.size,
            self.config.capacity,
            registry,
            Collaborators {
                fetcher: self.fetcher,
                decoder: self.decoder,
                dispatcher: self.dispatcher,
            },
            pool,
        );
        Ok(ImageCache {
            config: Arc::new(self.config),
            inner: Arc::new(coordinator),
        })
    }
}

fn build_worker_pool(config: &CacheConfig) -> Result<rayon::ThreadPool, ConfigError> {
    let identifier = config.identifier.clone();
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(move |n| format!("imagecache-{identifier}-{n}"));
    if let Some(n) = config.worker_threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| ConfigError::new(format!("failed to build worker pool: {e}")))
}

/// Shared handle to one cache. Clones refer to the same slots and pool.
#[derive(Clone)]
pub struct ImageCache {
    config: Arc<CacheConfig>,
    inner: Arc<FetchCoordinator>,
}

impl ImageCache {
    /// Requests every scheme's artifact for `url`.
    ///
    /// `callback` runs exactly once per registered scheme: synchronously with
    /// `from_cache = true` on a hit, or later through the dispatcher on a miss.
    pub fn request<F>(&self, url: &str, callback: F)
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        self.inner.request(url, callback);
    }

    /// Blocking variant of [`request`](Self::request) returning one delivery
    /// per scheme in registry order.
    pub fn request_blocking(&self, url: &str) -> Vec<Delivery> {
        self.inner.request_blocking(url)
    }

    /// Blocks for `url` and returns only the successfully rendered artifacts.
    pub fn artifacts_blocking(&self, url: &str) -> Vec<RenderedImage> {
        self.inner.artifacts_blocking(url)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    pub fn size(&self) -> u32 {
        self.config.size
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn registry(&self) -> &SchemeRegistry {
        self.inner.registry()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.contains(url)
    }

    pub fn is_pending(&self, url: &str) -> bool {
        self.inner.is_pending(url)
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending_len()
    }

    pub fn slot_of(&self, url: &str) -> Option<usize> {
        self.inner.slot_of(url)
    }

    pub fn lru_snapshot(&self) -> LruSnapshot {
        self.inner.lru_snapshot()
    }

    /// Returns `true` if both handles refer to the same cache.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(feature = "metrics")]
impl MetricsSnapshotProvider<CacheMetricsSnapshot> for ImageCache {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        self.inner.snapshot()
    }
}

#[cfg(feature = "metrics")]
impl MetricsReset for ImageCache {
    fn reset_metrics(&self) {
        self.inner.reset_metrics();
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .field("coordinator", &self.inner)
            .finish()
    }
}
