//! Shared caches keyed by identifier.
//!
//! Hosts that want several components to share one cache per identifier own a
//! [`CacheRegistry`] and hand it around explicitly. Dropping the registry
//! drops its handles; caches stay alive while any clone of their
//! [`ImageCache`] handle does.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::builder::{ImageCache, ImageCacheBuilder};
use crate::error::ConfigError;

#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: Mutex<FxHashMap<String, ImageCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache registered under `identifier`, building and
    /// registering one with `make` if absent.
    ///
    /// `make` runs under the registry lock, so concurrent callers for the same
    /// identifier build at most one cache. A failed build registers nothing.
    pub fn get_or_insert_with<F>(&self, identifier: &str, make: F) -> Result<ImageCache, ConfigError>
    where
        F: FnOnce() -> ImageCacheBuilder,
    {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(identifier) {
            return Ok(cache.clone());
        }

        let cache = make().build()?;
        if cache.identifier() != identifier {
            return Err(ConfigError::new(format!(
                "builder identifier '{}' does not match registry key '{identifier}'",
                cache.identifier()
            )));
        }
        caches.insert(identifier.to_owned(), cache.clone());
        tracing::debug!(cache = identifier, "registered shared cache");
        Ok(cache)
    }

    pub fn get(&self, identifier: &str) -> Option<ImageCache> {
        self.caches.lock().get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.caches.lock().contains_key(identifier)
    }

    /// Unregisters and returns the cache for `identifier`.
    pub fn remove(&self, identifier: &str) -> Option<ImageCache> {
        self.caches.lock().remove(identifier)
    }

    pub fn len(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.lock().is_empty()
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.caches.lock().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&self) {
        self.caches.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use image::{DynamicImage, RgbaImage};

    use super::*;
    use crate::scheme::{RenderFailure, SchemeDescriptor};

    fn builder(identifier: &str) -> ImageCacheBuilder {
        ImageCacheBuilder::new(identifier, 8, 4)
            .scheme(SchemeDescriptor::new(
                1,
                true,
                |_: &mut RgbaImage, _: &DynamicImage| -> Result<(), RenderFailure> { Ok(()) },
            ))
            .worker_threads(1)
    }

    #[test]
    fn get_or_insert_reuses_existing_cache() {
        let registry = CacheRegistry::new();
        let first = registry.get_or_insert_with("avatars", || builder("avatars")).unwrap();
        let second = registry
            .get_or_insert_with("avatars", || panic!("must not rebuild"))
            .unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("avatars"));
    }

    #[test]
    fn failed_build_registers_nothing() {
        let registry = CacheRegistry::new();
        let result = registry.get_or_insert_with("bad", || ImageCacheBuilder::new("bad", 0, 4));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn mismatched_identifier_is_rejected() {
        let registry = CacheRegistry::new();
        let err = registry
            .get_or_insert_with("a", || builder("b"))
            .unwrap_err();
        assert!(err.message().contains("does not match"));
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn remove_and_clear() {
        let registry = CacheRegistry::new();
        registry.get_or_insert_with("a", || builder("a")).unwrap();
        registry.get_or_insert_with("b", || builder("b")).unwrap();
        assert_eq!(registry.identifiers(), vec!["a".to_string(), "b".to_string()]);

        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.identifier(), "a");
        assert!(registry.remove("a").is_none());

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_callers_build_once() {
        let registry = Arc::new(CacheRegistry::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .get_or_insert_with("shared", || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            builder("shared")
                        })
                        .unwrap()
                })
            })
            .collect();

        let caches: Vec<ImageCache> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(caches.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }
}
