//! Texture cache
//!
//! Textures are decoded on the CPU with `image` and handed to a
//! [`RenderDevice`] for upload. The cache only keeps a weak reference to the
//! device: once the renderer is gone new loads fail and evicted textures have
//! nothing left to destroy.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use nalgebra::Vector2;

use super::cache::KeyedCache;
use super::image_loader::ImageData;
use super::{AssetKind, ResourceError};
use crate::foundation::collections::AssetHandle;

/// Device-side texture identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Renderer interface used to upload and destroy textures
pub trait RenderDevice {
    /// Upload decoded pixels, returning the device-side id
    fn create_texture(&self, image: &ImageData) -> Result<TextureId, String>;

    /// Destroy a texture previously returned by `create_texture`
    fn destroy_texture(&self, id: TextureId);
}

/// Render device that keeps no pixels, for tools and tests
#[derive(Debug, Default)]
pub struct HeadlessRenderDevice {
    next_id: Cell<u64>,
    live: RefCell<HashSet<TextureId>>,
    created: Cell<usize>,
}

impl HeadlessRenderDevice {
    /// Create a new headless device
    pub fn new() -> Self {
        Self::default()
    }

    /// Textures created and not yet destroyed
    pub fn live_textures(&self) -> usize {
        self.live.borrow().len()
    }

    /// Total number of `create_texture` calls
    pub fn textures_created(&self) -> usize {
        self.created.get()
    }
}

impl RenderDevice for HeadlessRenderDevice {
    fn create_texture(&self, image: &ImageData) -> Result<TextureId, String> {
        if image.width == 0 || image.height == 0 {
            return Err(format!("empty image {}x{}", image.width, image.height));
        }
        let id = TextureId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.created.set(self.created.get() + 1);
        self.live.borrow_mut().insert(id);
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) {
        if !self.live.borrow_mut().remove(&id) {
            log::warn!("Destroying unknown texture {:?}", id);
        }
    }
}

/// A texture uploaded to the render device
///
/// Owns the device-side texture: dropping it destroys the texture exactly
/// once, or does nothing if the device has already been dropped.
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    device: Weak<dyn RenderDevice>,
}

impl Texture {
    /// Device-side id
    pub const fn id(&self) -> TextureId {
        self.id
    }

    /// Width in pixels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Size in pixels
    pub fn size(&self) -> Vector2<f32> {
        Vector2::new(self.width as f32, self.height as f32)
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.destroy_texture(self.id);
        }
    }
}

pub(crate) struct TextureCache {
    device: Weak<dyn RenderDevice>,
    cache: KeyedCache<PathBuf, Texture>,
}

impl TextureCache {
    pub fn new(device: &Rc<dyn RenderDevice>) -> Self {
        log::trace!("Creating texture cache");
        Self {
            device: Rc::downgrade(device),
            cache: KeyedCache::new(AssetKind::Texture),
        }
    }

    fn decode(device: &Weak<dyn RenderDevice>, path: &Path) -> Result<Texture, ResourceError> {
        let load_failed = |reason: String| ResourceError::LoadFailed {
            kind: AssetKind::Texture,
            path: path.to_path_buf(),
            reason,
        };

        let Some(render) = device.upgrade() else {
            return Err(load_failed("render device has been dropped".to_string()));
        };

        let image = ImageData::from_file(path)?;
        let id = render.create_texture(&image).map_err(load_failed)?;

        Ok(Texture {
            id,
            width: image.width,
            height: image.height,
            device: Weak::clone(device),
        })
    }

    pub fn get(&mut self, path: &Path) -> Option<AssetHandle<Texture>> {
        let device = &self.device;
        self.cache.get(&path.to_path_buf(), |p| Self::decode(device, p))
    }

    pub fn load(&mut self, path: &Path) -> Option<AssetHandle<Texture>> {
        let device = &self.device;
        self.cache.load(&path.to_path_buf(), |p| Self::decode(device, p))
    }

    pub fn unload(&mut self, path: &Path) -> bool {
        self.cache.unload(&path.to_path_buf()).is_some()
    }

    pub fn clear(&mut self) -> usize {
        self.cache.clear()
    }

    pub fn resolve(&self, handle: AssetHandle<Texture>) -> Option<&Texture> {
        self.cache.resolve(handle)
    }

    /// Get-or-load `path` and report its size
    pub fn texture_size(&mut self, path: &Path) -> Option<Vector2<f32>> {
        let handle = self.get(path)?;
        self.resolve(handle).map(Texture::size)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.cache.contains(&path.to_path_buf())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        log::trace!("Destroying texture cache ({} textures)", self.cache.len());
    }
}
