pub mod cell;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;

pub use metrics_impl::FetchMetrics;
pub use snapshot::CacheMetricsSnapshot;
pub use traits::{FetchMetricsRecorder, MetricsReset, MetricsSnapshotProvider};
