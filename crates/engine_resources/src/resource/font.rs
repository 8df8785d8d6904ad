//! Font cache
//!
//! Fonts are parsed with `fontdue` and cached per (file, point size). Two
//! sizes of the same file are independent entries.

use std::path::{Path, PathBuf};

use fontdue::{FontSettings, LineMetrics, Metrics};
use nalgebra::Vector2;

use super::cache::KeyedCache;
use super::{AssetKind, ResourceError};
use crate::foundation::collections::AssetHandle;

/// Cache key for a font opened at one point size
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontKey {
    /// Font file
    pub path: PathBuf,
    /// Size in points (one point per pixel)
    pub point_size: u32,
}

impl FontKey {
    /// Create a key for `path` at `point_size`
    pub fn new(path: impl Into<PathBuf>, point_size: u32) -> Self {
        Self {
            path: path.into(),
            point_size,
        }
    }
}

/// A parsed font bound to the point size it was opened at
pub struct Font {
    inner: fontdue::Font,
    point_size: u32,
}

impl Font {
    /// Parse font bytes (TTF or OTF) for rendering at `point_size`
    pub fn from_bytes(bytes: &[u8], point_size: u32) -> Result<Self, String> {
        if point_size == 0 {
            return Err("point size must be positive".to_string());
        }
        let settings = FontSettings {
            scale: point_size as f32,
            ..FontSettings::default()
        };
        let inner = fontdue::Font::from_bytes(bytes, settings).map_err(|e| format!("fontdue error: {}", e))?;
        Ok(Self { inner, point_size })
    }

    /// Size the font was opened at
    pub const fn point_size(&self) -> u32 {
        self.point_size
    }

    fn px(&self) -> f32 {
        self.point_size as f32
    }

    /// Horizontal line metrics at this size
    pub fn line_metrics(&self) -> Option<LineMetrics> {
        self.inner.horizontal_line_metrics(self.px())
    }

    /// Distance between consecutive baselines
    pub fn line_height(&self) -> f32 {
        self.line_metrics().map_or(self.px(), |m| m.new_line_size)
    }

    /// Rasterize one glyph into an 8-bit coverage bitmap
    pub fn rasterize(&self, ch: char) -> (Metrics, Vec<u8>) {
        self.inner.rasterize(ch, self.px())
    }

    /// Width and height of a single line of text
    pub fn measure(&self, text: &str) -> Vector2<f32> {
        let width = text
            .chars()
            .map(|ch| self.inner.metrics(ch, self.px()).advance_width)
            .sum();
        Vector2::new(width, self.line_height())
    }

    /// Underlying fontdue font
    pub const fn inner(&self) -> &fontdue::Font {
        &self.inner
    }
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("point_size", &self.point_size)
            .field("glyphs", &self.inner.glyph_count())
            .finish()
    }
}

pub(crate) struct FontCache {
    cache: KeyedCache<FontKey, Font>,
}

impl FontCache {
    pub fn new() -> Self {
        log::trace!("Creating font cache");
        Self {
            cache: KeyedCache::new(AssetKind::Font),
        }
    }

    fn decode(key: &FontKey) -> Result<Font, ResourceError> {
        if key.point_size == 0 {
            return Err(ResourceError::InvalidParameter(format!(
                "font {} requested at point size 0",
                key.path.display()
            )));
        }
        let load_failed = |reason: String| ResourceError::LoadFailed {
            kind: AssetKind::Font,
            path: key.path.clone(),
            reason,
        };
        let bytes = std::fs::read(&key.path).map_err(|e| load_failed(e.to_string()))?;
        Font::from_bytes(&bytes, key.point_size).map_err(load_failed)
    }

    pub fn get(&mut self, path: &Path, point_size: u32) -> Option<AssetHandle<Font>> {
        self.cache.get(&FontKey::new(path, point_size), Self::decode)
    }

    pub fn load(&mut self, path: &Path, point_size: u32) -> Option<AssetHandle<Font>> {
        self.cache.load(&FontKey::new(path, point_size), Self::decode)
    }

    pub fn unload(&mut self, path: &Path, point_size: u32) -> bool {
        self.cache.unload(&FontKey::new(path, point_size)).is_some()
    }

    pub fn clear(&mut self) -> usize {
        self.cache.clear()
    }

    pub fn resolve(&self, handle: AssetHandle<Font>) -> Option<&Font> {
        self.cache.resolve(handle)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for FontCache {
    fn drop(&mut self) {
        log::trace!("Destroying font cache ({} fonts)", self.cache.len());
    }
}
