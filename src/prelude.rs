pub use crate::builder::{CacheConfig, ImageCache, ImageCacheBuilder};
pub use crate::dispatch::{CallbackQueue, Dispatcher, InlineDispatcher, QueueDispatcher, callback_queue};
pub use crate::ds::{ResultCell, collect_all, collect_some};
pub use crate::error::{AlreadySetError, CacheError, ConfigError, EmptyIndexError, SnapshotError};
pub use crate::fetch::Delivery;
#[cfg(feature = "metrics")]
pub use crate::metrics::{CacheMetricsSnapshot, MetricsReset, MetricsSnapshotProvider};
pub use crate::policy::{LruIndex, LruSnapshot};
pub use crate::registry::CacheRegistry;
pub use crate::scheme::{RenderFailure, RenderedImage, Renderer, SchemeDescriptor, SchemeId, SchemeRegistry, renderers};
pub use crate::source::{Decoder, Fetcher, FileFetcher, FnDecoder, FnFetcher, ImageDecoder};
