use serde::Serialize;

/// Point-in-time copy of a cache's fetch counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,

    pub fetches_started: u64,
    pub fetches_failed: u64,
    pub renders_failed: u64,

    pub commits: u64,
    pub evictions: u64,
    pub deliveries: u64,

    // gauges captured at snapshot time
    pub cache_len: usize,
    pub pending: usize,
    pub capacity: usize,
}

impl CacheMetricsSnapshot {
    /// Fraction of requests served from committed slots.
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}
