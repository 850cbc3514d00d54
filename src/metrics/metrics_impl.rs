use crate::metrics::cell::MetricsCell;
use crate::metrics::traits::{FetchMetricsRecorder, MetricsReset};

/// Atomic counters for one cache.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    pub requests: MetricsCell,
    pub hits: MetricsCell,
    pub misses: MetricsCell,
    pub coalesced: MetricsCell,
    pub fetches_started: MetricsCell,
    pub fetches_failed: MetricsCell,
    pub renders_failed: MetricsCell,
    pub commits: MetricsCell,
    pub evictions: MetricsCell,
    pub deliveries: MetricsCell,
}

impl FetchMetricsRecorder for FetchMetrics {
    #[inline]
    fn record_request(&self) {
        self.requests.incr();
    }

    #[inline]
    fn record_hit(&self) {
        self.hits.incr();
    }

    #[inline]
    fn record_miss(&self) {
        self.misses.incr();
    }

    #[inline]
    fn record_coalesced(&self) {
        self.coalesced.incr();
    }

    #[inline]
    fn record_fetch_started(&self) {
        self.fetches_started.incr();
    }

    #[inline]
    fn record_fetch_failed(&self) {
        self.fetches_failed.incr();
    }

    #[inline]
    fn record_render_failed(&self) {
        self.renders_failed.incr();
    }

    #[inline]
    fn record_commit(&self) {
        self.commits.incr();
    }

    #[inline]
    fn record_eviction(&self) {
        self.evictions.incr();
    }

    #[inline]
    fn record_delivery(&self) {
        self.deliveries.incr();
    }
}

impl MetricsReset for FetchMetrics {
    fn reset_metrics(&self) {
        for cell in [
            &self.requests,
            &self.hits,
            &self.misses,
            &self.coalesced,
            &self.fetches_started,
            &self.fetches_failed,
            &self.renders_failed,
            &self.commits,
            &self.evictions,
            &self.deliveries,
        ] {
            cell.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_increment_their_counter() {
        let metrics = FetchMetrics::default();
        metrics.record_request();
        metrics.record_request();
        metrics.record_hit();
        metrics.record_coalesced();
        assert_eq!(metrics.requests.get(), 2);
        assert_eq!(metrics.hits.get(), 1);
        assert_eq!(metrics.coalesced.get(), 1);
        assert_eq!(metrics.misses.get(), 0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = FetchMetrics::default();
        metrics.record_eviction();
        metrics.record_delivery();
        metrics.reset_metrics();
        assert_eq!(metrics.evictions.get(), 0);
        assert_eq!(metrics.deliveries.get(), 0);
    }
}
