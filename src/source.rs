//! Byte retrieval and decoding collaborators.
//!
//! The cache core never talks to the network or parses image formats itself.
//! It asks a [`Fetcher`] for the raw bytes of a URL and a [`Decoder`] for the
//! in-memory image, both of which run on the worker pool, outside every lock.
//! Retry policy, if any, belongs to the fetcher.

use std::fs;
use std::path::Path;

use image::DynamicImage;

use crate::error::CacheError;

/// Retrieves the source bytes for a URL.
pub trait Fetcher: Send + Sync {
    /// Returns the bytes for `url` or a [`CacheError::Download`].
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CacheError>;
}

/// Turns fetched bytes into a decoded image.
pub trait Decoder: Send + Sync {
    /// Returns the image or a [`CacheError::Decode`].
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<DynamicImage, CacheError>;
}

/// Reads `file://` URLs, or plain paths, from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        fs::read(Path::new(path)).map_err(|e| CacheError::download(url, e.to_string()))
    }
}

/// Adapts a closure into a [`Fetcher`].
pub struct FnFetcher<F>(pub F);

impl<F> Fetcher for FnFetcher<F>
where
    F: Fn(&str) -> Result<Vec<u8>, CacheError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        (self.0)(url)
    }
}

/// Decodes any format the `image` crate recognizes from its magic bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<DynamicImage, CacheError> {
        image::load_from_memory(bytes).map_err(|e| CacheError::decode(url, e.to_string()))
    }
}

/// Adapts a closure into a [`Decoder`].
pub struct FnDecoder<F>(pub F);

impl<F> Decoder for FnDecoder<F>
where
    F: Fn(&str, &[u8]) -> Result<DynamicImage, CacheError> + Send + Sync,
{
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<DynamicImage, CacheError> {
        (self.0)(url, bytes)
    }
}
