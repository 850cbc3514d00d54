//! Rendering schemes and the immutable registry that holds them.
//!
//! A scheme is one named transform from a decoded source image to a square
//! artifact of the cache's size. Every cached URL carries one artifact per
//! registered scheme.
//!
//! ## Key Components
//!
//! | Component          | Description                                         |
//! |--------------------|-----------------------------------------------------|
//! | `Renderer`         | Draws a decoded image into a square RGBA canvas     |
//! | `SchemeDescriptor` | `{ id, opaque, renderer }`                          |
//! | `SchemeRegistry`   | Validated, ordered set of descriptors               |
//! | `RenderedImage`    | The artifact: shared pixels + scheme metadata       |
//! | `renderers`        | Stock `aspect_fill` / `aspect_fit` renderers        |
//!
//! Renderers receive a fresh transparent canvas per call and must not retain
//! the canvas or the source image. A failing (or panicking) renderer only
//! affects its own scheme.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::{DynamicImage, RgbaImage};
use rustc_hash::FxHashSet;

use crate::error::{CacheError, ConfigError};

/// Caller-chosen scheme identifier, unique within one registry.
pub type SchemeId = i64;

/// Error type renderers report failures with.
pub type RenderFailure = Box<dyn std::error::Error + Send + Sync>;

/// Draws `image` into `canvas`, a `size x size` RGBA buffer.
pub trait Renderer: Send + Sync {
    fn render(&self, canvas: &mut RgbaImage, image: &DynamicImage) -> Result<(), RenderFailure>;
}

impl<F> Renderer for F
where
    F: Fn(&mut RgbaImage, &DynamicImage) -> Result<(), RenderFailure> + Send + Sync,
{
    fn render(&self, canvas: &mut RgbaImage, image: &DynamicImage) -> Result<(), RenderFailure> {
        self(canvas, image)
    }
}

/// One rendering scheme.
#[derive(Clone)]
pub struct SchemeDescriptor {
    id: SchemeId,
    opaque: bool,
    renderer: Arc<dyn Renderer>,
}

impl SchemeDescriptor {
    pub fn new(id: SchemeId, opaque: bool, renderer: impl Renderer + 'static) -> Self {
        Self {
            id,
            opaque,
            renderer: Arc::new(renderer),
        }
    }

    pub fn id(&self) -> SchemeId {
        self.id
    }

    /// Whether artifacts of this scheme carry no transparency.
    pub fn opaque(&self) -> bool {
        self.opaque
    }

    /// Renders `image` into a new `size x size` artifact.
    ///
    /// Opaque schemes get every pixel's alpha forced to 255 after the renderer
    /// returns. A renderer panic is reported as a render error.
    pub fn render(&self, image: &DynamicImage, size: u32) -> Result<RenderedImage, CacheError> {
        let mut canvas = RgbaImage::new(size, size);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.renderer.render(&mut canvas, image)
        }));
        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(failure)) => return Err(CacheError::render(self.id, failure.to_string())),
            Err(_) => return Err(CacheError::render(self.id, "renderer panicked")),
        }

        if self.opaque {
            for pixel in canvas.pixels_mut() {
                pixel.0[3] = u8::MAX;
            }
        }
        Ok(RenderedImage {
            pixels: Arc::new(canvas),
            scheme: self.id,
            opaque: self.opaque,
        })
    }
}

impl fmt::Debug for SchemeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeDescriptor")
            .field("id", &self.id)
            .field("opaque", &self.opaque)
            .finish_non_exhaustive()
    }
}

/// Rendered artifact for one `(url, scheme)` pair. Cloning shares the pixels.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pixels: Arc<RgbaImage>,
    scheme: SchemeId,
    opaque: bool,
}

impl RenderedImage {
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn scheme(&self) -> SchemeId {
        self.scheme
    }

    pub fn opaque(&self) -> bool {
        self.opaque
    }

    /// Side length in pixels.
    pub fn size(&self) -> u32 {
        self.pixels.width()
    }

    /// Returns `true` if both artifacts share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl PartialEq for RenderedImage {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.opaque == other.opaque
            && (self.ptr_eq(other) || *self.pixels == *other.pixels)
    }
}

/// Immutable, ordered set of schemes fixed at cache construction.
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    schemes: Vec<SchemeDescriptor>,
}

impl SchemeRegistry {
    /// Builds a registry, rejecting an empty set or duplicate ids.
    pub fn new(schemes: Vec<SchemeDescriptor>) -> Result<Self, ConfigError> {
        if schemes.is_empty() {
            return Err(ConfigError::new("at least one scheme is required"));
        }
        let mut seen = FxHashSet::default();
        for scheme in &schemes {
            if !seen.insert(scheme.id) {
                return Err(ConfigError::new(format!(
                    "duplicate scheme id {}",
                    scheme.id
                )));
            }
        }
        Ok(Self { schemes })
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    /// Schemes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SchemeDescriptor> {
        self.schemes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = SchemeId> + '_ {
        self.schemes.iter().map(SchemeDescriptor::id)
    }

    pub fn get(&self, id: SchemeId) -> Option<&SchemeDescriptor> {
        self.schemes.iter().find(|scheme| scheme.id == id)
    }

    /// Renders `image` with scheme `id`.
    pub fn render(
        &self,
        id: SchemeId,
        image: &DynamicImage,
        size: u32,
    ) -> Result<RenderedImage, CacheError> {
        let scheme = self
            .get(id)
            .ok_or_else(|| CacheError::render(id, "scheme not registered"))?;
        scheme.render(image, size)
    }
}

/// Stock renderers.
pub mod renderers {
    use image::imageops::{self, FilterType};
    use image::{DynamicImage, RgbaImage};

    use super::RenderFailure;

    /// Scales `image` to cover the canvas and crops the overflow evenly.
    pub fn aspect_fill(
        filter: FilterType,
    ) -> impl Fn(&mut RgbaImage, &DynamicImage) -> Result<(), RenderFailure> + Send + Sync {
        move |canvas, image| {
            check_source(image)?;
            let (w, h) = canvas.dimensions();
            let filled = image.resize_to_fill(w, h, filter).to_rgba8();
            imageops::replace(canvas, &filled, 0, 0);
            Ok(())
        }
    }

    /// Scales `image` to fit inside the canvas, centered, leaving the
    /// remainder transparent.
    pub fn aspect_fit(
        filter: FilterType,
    ) -> impl Fn(&mut RgbaImage, &DynamicImage) -> Result<(), RenderFailure> + Send + Sync {
        move |canvas, image| {
            check_source(image)?;
            let (w, h) = canvas.dimensions();
            let fitted = image.resize(w, h, filter).to_rgba8();
            let x = (w - fitted.width()) / 2;
            let y = (h - fitted.height()) / 2;
            imageops::overlay(canvas, &fitted, i64::from(x), i64::from(y));
            Ok(())
        }
    }

    fn check_source(image: &DynamicImage) -> Result<(), RenderFailure> {
        if image.width() == 0 || image.height() == 0 {
            return Err("source image has no pixels".into());
        }
        Ok(())
    }
}
