//! # Metrics Trait Hierarchy
//!
//! Recording, snapshotting, and resetting are split into small traits so the
//! fetch coordinator only depends on the recorder it writes to.
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │     FetchMetricsRecorder     │  hit / miss / join / commit /
//!   │   (written by coordinator)   │  evict / failures
//!   └──────────────┬───────────────┘
//!                  │
//!   ┌──────────────┴───────────────┐    ┌──────────────────────────────┐
//!   │ MetricsSnapshotProvider<S>   │    │ MetricsReset                 │
//!   │ (monitoring, bench/test)     │    │ (between tests / iterations) │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//! ```
//!
//! Recorders take `&self`: the coordinator is shared across threads and
//! counters are atomics.

/// Counters written along the request pipeline.
pub trait FetchMetricsRecorder {
    fn record_request(&self);
    fn record_hit(&self);
    fn record_miss(&self);
    /// A miss that joined an in-flight fetch instead of starting one.
    fn record_coalesced(&self);
    fn record_fetch_started(&self);
    fn record_fetch_failed(&self);
    fn record_render_failed(&self);
    fn record_commit(&self);
    fn record_eviction(&self);
    fn record_delivery(&self);
}

/// Read a point-in-time view of the counters.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset metrics between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}
