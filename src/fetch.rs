//! # Fetch coordinator
//!
//! Maps URLs to slots, coalesces concurrent misses into one fetch + render
//! cycle per URL, and fans each scheme's result out to every waiter exactly
//! once.
//!
//! ## Request Flow
//!
//! ```text
//!   request(url, cb)
//!        │
//!        ▼  state lock
//!   ┌─────────────────────────────┐   hit   ┌───────────────────────────────┐
//!   │ SlotStore::get(url)         │ ──────► │ LruIndex::mark_mru(slot)      │
//!   └─────────────┬───────────────┘         │ cb(..) per scheme, same thread│
//!                 │ miss                    └───────────────────────────────┘
//!                 ▼
//!   ┌─────────────────────────────┐  found  ┌───────────────────────────────┐
//!   │ pending.get(url)            │ ──────► │ join: on_ready per scheme cell│
//!   └─────────────┬───────────────┘         └───────────────────────────────┘
//!                 │ absent
//!                 ▼
//!   insert PendingFetch, on_ready per cell, spawn on worker pool:
//!     fetch ─► decode ─► render every scheme in registry order
//!     state lock: remove pending + install slot (evict LRU) + mark MRU
//!     cell.set per scheme ─► dispatcher ─► cb(..)
//! ```
//!
//! ## Locking
//!
//! | Lock                      | Guards                             | Order |
//! |---------------------------|------------------------------------|-------|
//! | `state` (`parking_lot`)   | `SlotStore` + pending-fetch table  | 1st   |
//! | `LruIndex` internal mutex | recency list                       | 2nd   |
//!
//! Neither lock is held while fetching, decoding, rendering, completing a
//! result cell, or invoking a callback. Removing the pending entry and
//! installing the slot happen under one `state` critical section, so a URL is
//! always either committed, pending, or absent, and a pending URL never owns a
//! slot that eviction could pick.

use std::sync::Arc;

use image::DynamicImage;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::dispatch::Dispatcher;
use crate::ds::{ResultCell, collect_all};
use crate::error::CacheError;
#[cfg(feature = "metrics")]
use crate::metrics::{
    CacheMetricsSnapshot, FetchMetrics, FetchMetricsRecorder, MetricsReset, MetricsSnapshotProvider,
};
use crate::policy::lru_index::{LruIndex, LruSnapshot};
use crate::scheme::{RenderedImage, SchemeId, SchemeRegistry};
use crate::source::{Decoder, Fetcher};
use crate::store::slot::SlotStore;

/// Callback invoked once per registered scheme for every request.
pub type RequestCallback = Arc<dyn Fn(Delivery) + Send + Sync>;

type SchemeCell = ResultCell<RenderedImage, CacheError>;

/// One scheme's result for one request.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: Arc<str>,
    pub scheme: SchemeId,
    /// Whether the scheme's artifacts carry no transparency.
    pub opaque: bool,
    /// `true` when served synchronously from a committed slot.
    pub from_cache: bool,
    pub result: Result<RenderedImage, CacheError>,
}

impl Delivery {
    pub fn artifact(&self) -> Option<&RenderedImage> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CacheError> {
        self.result.as_ref().err()
    }
}

/// External collaborators the coordinator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub decoder: Arc<dyn Decoder>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// In-flight fetch for one URL. Cells are in registry order.
struct PendingFetch {
    cells: Vec<Arc<SchemeCell>>,
    waiters: usize,
}

struct CoordinatorState {
    slots: SlotStore,
    pending: FxHashMap<Arc<str>, PendingFetch>,
}

enum Acquired {
    Hit(Vec<Delivery>),
    Pending {
        cells: Vec<Arc<SchemeCell>>,
        initiator: bool,
    },
}

/// Orchestrates lookups, request coalescing, rendering, and slot commits.
pub struct FetchCoordinator {
    identifier: Arc<str>,
    size: u32,
    registry: SchemeRegistry,
    state: Mutex<CoordinatorState>,
    lru: LruIndex,
    collaborators: Collaborators,
    pool: rayon::ThreadPool,
    #[cfg(feature = "metrics")]
    metrics: Arc<FetchMetrics>,
}

impl FetchCoordinator {
    pub fn new(
        identifier: impl Into<Arc<str>>,
        size: u32,
        capacity: usize,
        registry: SchemeRegistry,
        collaborators: Collaborators,
        pool: rayon::ThreadPool,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            size,
            registry,
            state: Mutex::new(CoordinatorState {
                slots: SlotStore::new(capacity),
                pending: FxHashMap::default(),
            }),
            lru: LruIndex::new_prepopulated(capacity),
            collaborators,
            pool,
            #[cfg(feature = "metrics")]
            metrics: Arc::default(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Side length of every rendered artifact.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.lru.capacity()
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    /// Number of committed slots.
    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// Returns `true` if `url` is committed. Does not touch recency.
    pub fn contains(&self, url: &str) -> bool {
        self.state.lock().slots.contains(url)
    }

    /// Returns `true` if a fetch for `url` is in flight.
    pub fn is_pending(&self, url: &str) -> bool {
        self.state.lock().pending.contains_key(url)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Slot id holding `url`, if committed.
    pub fn slot_of(&self, url: &str) -> Option<usize> {
        self.state.lock().slots.lookup(url)
    }

    /// Current recency order of slot ids, least recently used first.
    pub fn lru_snapshot(&self) -> LruSnapshot {
        self.lru.snapshot()
    }

    /// Requests every scheme's artifact for `url`.
    ///
    /// On a hit, `callback` runs synchronously on the calling thread once per
    /// scheme with `from_cache = true`. On a miss this returns immediately and
    /// `callback` runs later, once per scheme in registry order, through the
    /// dispatcher, with `from_cache = false`.
    pub fn request<F>(self: &Arc<Self>, url: &str, callback: F)
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let url: Arc<str> = Arc::from(url);
        let callback: RequestCallback = Arc::new(callback);

        match self.acquire(&url) {
            Acquired::Hit(deliveries) => {
                for delivery in deliveries {
                    #[cfg(feature = "metrics")]
                    self.metrics.record_delivery();
                    callback(delivery);
                }
            },
            Acquired::Pending { cells, initiator } => {
                self.attach_waiter(&url, &cells, &callback);
                if initiator {
                    self.spawn_fetch(url, cells);
                }
            },
        }
    }

    /// Blocks until every scheme for `url` resolves and returns the results in
    /// registry order. Joins or starts a fetch on a miss like
    /// [`request`](Self::request), but never goes through the dispatcher.
    pub fn request_blocking(self: &Arc<Self>, url: &str) -> Vec<Delivery> {
        let url: Arc<str> = Arc::from(url);
        match self.acquire(&url) {
            Acquired::Hit(deliveries) => deliveries,
            Acquired::Pending { cells, initiator } => {
                if initiator {
                    self.spawn_fetch(Arc::clone(&url), cells.clone());
                }
                self.registry
                    .iter()
                    .zip(&cells)
                    .map(|(scheme, cell)| Delivery {
                        url: Arc::clone(&url),
                        scheme: scheme.id(),
                        opaque: scheme.opaque(),
                        from_cache: false,
                        result: cell.get(),
                    })
                    .collect()
            },
        }
    }

    /// Blocks until `url` resolves and returns the artifacts that rendered
    /// successfully, in registry order.
    pub fn artifacts_blocking(self: &Arc<Self>, url: &str) -> Vec<RenderedImage> {
        let url: Arc<str> = Arc::from(url);
        match self.acquire(&url) {
            Acquired::Hit(deliveries) => deliveries
                .into_iter()
                .filter_map(|delivery| delivery.result.ok())
                .collect(),
            Acquired::Pending { cells, initiator } => {
                if initiator {
                    self.spawn_fetch(Arc::clone(&url), cells.clone());
                }
                collect_all(cells.iter().map(Arc::as_ref))
            },
        }
    }

    fn acquire(&self, url: &Arc<str>) -> Acquired {
        #[cfg(feature = "metrics")]
        self.metrics.record_request();

        let mut state = self.state.lock();

        if let Some(slot) = state.slots.get(url) {
            let slot_id = slot.id();
            let deliveries = self
                .registry
                .iter()
                .map(|scheme| Delivery {
                    url: Arc::clone(url),
                    scheme: scheme.id(),
                    opaque: scheme.opaque(),
                    from_cache: true,
                    result: slot.artifact(scheme.id()).cloned().ok_or_else(|| {
                        CacheError::render(scheme.id(), "no artifact cached for scheme")
                    }),
                })
                .collect();
            self.lru.mark_most_recently_used(slot_id);
            drop(state);

            #[cfg(feature = "metrics")]
            self.metrics.record_hit();
            trace!(cache = %self.identifier, url = %url, slot = slot_id, "hit");
            return Acquired::Hit(deliveries);
        }

        #[cfg(feature = "metrics")]
        self.metrics.record_miss();

        if let Some(pending) = state.pending.get_mut(url) {
            pending.waiters += 1;
            let waiters = pending.waiters;
            let cells = pending.cells.clone();
            drop(state);

            #[cfg(feature = "metrics")]
            self.metrics.record_coalesced();
            debug!(cache = %self.identifier, url = %url, waiters, "joined in-flight fetch");
            return Acquired::Pending {
                cells,
                initiator: false,
            };
        }

        let cells: Vec<Arc<SchemeCell>> = self
            .registry
            .iter()
            .map(|_| Arc::new(ResultCell::new()))
            .collect();
        state.pending.insert(
            Arc::clone(url),
            PendingFetch {
                cells: cells.clone(),
                waiters: 1,
            },
        );
        drop(state);

        debug!(cache = %self.identifier, url = %url, "miss; starting fetch");
        Acquired::Pending {
            cells,
            initiator: true,
        }
    }

    /// Registers `callback` on every scheme cell. Each cell completes once, so
    /// each scheme is delivered to this waiter once.
    fn attach_waiter(&self, url: &Arc<str>, cells: &[Arc<SchemeCell>], callback: &RequestCallback) {
        for (scheme, cell) in self.registry.iter().zip(cells) {
            let url = Arc::clone(url);
            let callback = Arc::clone(callback);
            let dispatcher = Arc::clone(&self.collaborators.dispatcher);
            #[cfg(feature = "metrics")]
            let metrics = Arc::clone(&self.metrics);
            let scheme_id = scheme.id();
            let opaque = scheme.opaque();
            cell.on_ready(move |result| {
                dispatcher.dispatch(Box::new(move || {
                    #[cfg(feature = "metrics")]
                    metrics.record_delivery();
                    callback(Delivery {
                        url,
                        scheme: scheme_id,
                        opaque,
                        from_cache: false,
                        result,
                    });
                }));
            });
        }
    }

    fn spawn_fetch(self: &Arc<Self>, url: Arc<str>, cells: Vec<Arc<SchemeCell>>) {
        #[cfg(feature = "metrics")]
        self.metrics.record_fetch_started();

        let this = Arc::clone(self);
        self.pool.spawn(move || this.run_fetch(url, cells));
    }

    /// Worker-side half of a miss.
    ///
    /// The slot is committed (or the pending entry dropped on failure) before
    /// any cell completes, so a waiter that observes a result and re-requests
    /// the URL sees a hit after success and a fresh miss after failure.
    fn run_fetch(&self, url: Arc<str>, cells: Vec<Arc<SchemeCell>>) {
        let span = tracing::debug_span!("fetch", cache = %self.identifier, url = %url);
        let _guard = span.enter();

        let image = match self.load(&url) {
            Ok(image) => image,
            Err(error) => {
                warn!(error = %error, "fetch failed; notifying waiters");
                #[cfg(feature = "metrics")]
                self.metrics.record_fetch_failed();

                self.abandon(&url);
                for cell in &cells {
                    complete_cell(cell, Err(error.clone()));
                }
                return;
            },
        };

        let results: Vec<Result<RenderedImage, CacheError>> = self
            .registry
            .ids()
            .map(|id| self.registry.render(id, &image, self.size))
            .collect();
        drop(image);

        let mut artifacts = FxHashMap::default();
        for result in &results {
            match result {
                Ok(artifact) => {
                    artifacts.insert(artifact.scheme(), artifact.clone());
                },
                Err(error) => {
                    warn!(error = %error, "render failed");
                    #[cfg(feature = "metrics")]
                    self.metrics.record_render_failed();
                },
            }
        }
        self.commit(&url, artifacts);

        for (cell, result) in cells.iter().zip(results) {
            complete_cell(cell, result);
        }
    }

    fn load(&self, url: &str) -> Result<DynamicImage, CacheError> {
        let bytes = self.collaborators.fetcher.fetch(url)?;
        self.collaborators.decoder.decode(url, &bytes)
    }

    fn abandon(&self, url: &Arc<str>) {
        let removed = self.state.lock().pending.remove(url);
        check_retired(removed.is_some());
    }

    /// Retires the pending entry and installs the artifacts into the LRU slot
    /// as one step under the state lock.
    fn commit(&self, url: &Arc<str>, artifacts: FxHashMap<SchemeId, RenderedImage>) {
        let mut state = self.state.lock();
        let removed = state.pending.remove(url);
        check_retired(removed.is_some());
        let waiters = removed.map_or(0, |pending| pending.waiters);

        if artifacts.is_empty() {
            debug!(waiters, "every scheme failed; nothing to commit");
            return;
        }
        let Ok(slot) = self.lru.least_recently_used() else {
            debug!(waiters, "zero capacity; nothing to commit");
            return;
        };

        let evicted = state.slots.install(slot, Arc::clone(url), artifacts);
        self.lru.mark_most_recently_used(slot);
        #[cfg(debug_assertions)]
        state.slots.debug_validate_invariants();
        drop(state);

        #[cfg(feature = "metrics")]
        {
            self.metrics.record_commit();
            if evicted.is_some() {
                self.metrics.record_eviction();
            }
        }
        match evicted {
            Some(evicted) => debug!(slot, waiters, evicted = %evicted, "committed; evicted"),
            None => debug!(slot, waiters, "committed"),
        }
    }
}

/// Only the worker that created a pending entry completes its cells.
fn complete_cell(cell: &SchemeCell, result: Result<RenderedImage, CacheError>) {
    let set = cell.set_result(result);
    if set.is_err() {
        error!("scheme cell completed twice");
    }
    debug_assert!(set.is_ok(), "scheme cell completed twice");
}

fn check_retired(removed: bool) {
    if !removed {
        error!("pending fetch vanished before its worker retired it");
    }
    debug_assert!(removed, "pending fetch vanished");
}

#[cfg(feature = "metrics")]
impl MetricsSnapshotProvider<CacheMetricsSnapshot> for FetchCoordinator {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        let (cache_len, pending) = {
            let state = self.state.lock();
            (state.slots.len(), state.pending.len())
        };
        let m = &self.metrics;
        CacheMetricsSnapshot {
            requests: m.requests.get(),
            hits: m.hits.get(),
            misses: m.misses.get(),
            coalesced: m.coalesced.get(),
            fetches_started: m.fetches_started.get(),
            fetches_failed: m.fetches_failed.get(),
            renders_failed: m.renders_failed.get(),
            commits: m.commits.get(),
            evictions: m.evictions.get(),
            deliveries: m.deliveries.get(),
            cache_len,
            pending,
            capacity: self.capacity(),
        }
    }
}

#[cfg(feature = "metrics")]
impl MetricsReset for FetchCoordinator {
    fn reset_metrics(&self) {
        self.metrics.reset_metrics();
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FetchCoordinator")
            .field("identifier", &self.identifier)
            .field("size", &self.size)
            .field("len", &state.slots.len())
            .field("pending", &state.pending.len())
            .field("capacity", &state.slots.capacity())
            .finish_non_exhaustive()
    }
}
