//! Error types for the imagecache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Delivered to request callbacks when a fetch, decode, or
//!   scheme render fails. Cloned once per waiter.
//! - [`EmptyIndexError`]: Returned when the LRU index is queried at capacity 0.
//! - [`AlreadySetError`]: Returned when a result cell is written twice.
//! - [`ConfigError`]: Returned when cache construction parameters are invalid
//!   (e.g. zero size, empty or duplicate scheme set).
//! - [`SnapshotError`]: Returned when a persisted LRU order cannot be restored.
//!
//! ## Example Usage
//!
//! ```
//! use imagecache::error::ConfigError;
//! use imagecache::builder::CacheConfig;
//!
//! let config = CacheConfig::new("avatars", 0, 16);
//! let err: ConfigError = config.validate().unwrap_err();
//! assert!(err.to_string().contains("size"));
//! ```

use thiserror::Error;

use crate::scheme::SchemeId;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Failure delivered to a request callback in place of an artifact.
///
/// `Download` and `Decode` abort the whole fetch, so every scheme's waiters
/// receive the same value. `Render` is scoped to the one scheme that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("download failed for {url}: {message}")]
    Download { url: String, message: String },

    #[error("decode failed for {url}: {message}")]
    Decode { url: String, message: String },

    #[error("render failed for scheme {scheme}: {message}")]
    Render { scheme: SchemeId, message: String },
}

impl CacheError {
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn render(scheme: SchemeId, message: impl Into<String>) -> Self {
        Self::Render {
            scheme,
            message: message.into(),
        }
    }

    /// Returns `true` for errors that abort the whole fetch rather than one scheme.
    pub fn is_fetch_wide(&self) -> bool {
        matches!(self, Self::Download { .. } | Self::Decode { .. })
    }
}

// ---------------------------------------------------------------------------
// Invariant violations
// ---------------------------------------------------------------------------

/// The LRU index tracks zero slots, so there is no least-recently-used id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("LRU index is empty (capacity 0)")]
pub struct EmptyIndexError;

/// A result cell was written after it already reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("result cell already set")]
pub struct AlreadySetError;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheConfig::validate`](crate::builder::CacheConfig::validate),
/// [`SchemeRegistry::new`](crate::scheme::SchemeRegistry::new) and
/// [`ImageCacheBuilder::build`](crate::builder::ImageCacheBuilder::build).
/// Carries a human-readable description of which parameter failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// SnapshotError
// ---------------------------------------------------------------------------

/// Error returned when a persisted LRU order does not describe a valid index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot capacity {expected} does not match order length {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("slot id {id} is out of range for capacity {capacity}")]
    OutOfRange { id: usize, capacity: usize },

    #[error("slot id {0} appears more than once")]
    Duplicate(usize),

    #[error("malformed snapshot: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
