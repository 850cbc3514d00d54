//! imagecache: fixed-capacity image artifact cache keyed by source URL.
//!
//! Each URL is fetched, decoded, and rendered once per registered scheme, no
//! matter how many callers ask for it concurrently. Rendered artifacts live in
//! a fixed array of slots recycled in least-recently-used order.
//!
//! ```rust
//! use imagecache::prelude::*;
//! use image::imageops::FilterType;
//!
//! let cache = ImageCacheBuilder::new("thumbs", 32, 64)
//!     .scheme(SchemeDescriptor::new(1, true, renderers::aspect_fill(FilterType::Triangle)))
//!     .scheme(SchemeDescriptor::new(2, false, renderers::aspect_fit(FilterType::Triangle)))
//!     .build()
//!     .unwrap();
//!
//! cache.request("file:///does/not/exist.png", |delivery| {
//!     if let Some(err) = delivery.error() {
//!         eprintln!("scheme {}: {err}", delivery.scheme);
//!     }
//! });
//! ```

pub mod builder;
pub mod dispatch;
pub mod ds;
pub mod error;
pub mod fetch;
pub mod policy;
pub mod registry;
pub mod scheme;
pub mod source;
pub mod store;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod prelude;

pub use builder::{CacheConfig, ImageCache, ImageCacheBuilder};
pub use error::CacheError;
