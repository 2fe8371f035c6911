use std::fs;

use image::DynamicImage;

use crate::cache::{ResourceCache, ResourceError, ResourceHandle};
use crate::gfx::{GraphicsContext, PixelFormat, TextureHandle};
use crate::tiling;

pub const DEFAULT_IMAGE_SIZE: u32 = 32;
pub const DEFAULT_IMAGE_BLOCK: u32 = 8;
const DEFAULT_IMAGE_LIGHT: u8 = 0xbf;
const DEFAULT_IMAGE_DARK: u8 = 0x3f;

/// Backing storage of a loaded image. `Invalid` only exists before the first
/// load and after teardown; a loaded image always holds at least one texture.
#[derive(Default)]
pub enum ImageStorage {
    #[default]
    Invalid,
    Native(TextureHandle),
    Composite(CompositeImage),
}

/// One cell of a composite image. `(u2, v2)` is the fraction of the tile's
/// texture actually covered by image data, exactly 1.0 when the region fills
/// the texture.
pub struct ImageTile {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub u2: f32,
    pub v2: f32,
}

pub struct CompositeImage {
    pub width: u32,
    pub height: u32,
    pub rows: u32,
    pub columns: u32,
    /// Row-major tile grid.
    pub tiles: Vec<ImageTile>,
}

#[derive(Default)]
pub struct ImageResource {
    pub storage: ImageStorage,
}

impl ImageResource {
    pub fn is_loaded(&self) -> bool {
        !matches!(self.storage, ImageStorage::Invalid)
    }

    pub fn width(&self) -> u32 {
        match &self.storage {
            ImageStorage::Invalid => 0,
            ImageStorage::Native(texture) => texture.width(),
            ImageStorage::Composite(composite) => composite.width,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.storage {
            ImageStorage::Invalid => 0,
            ImageStorage::Native(texture) => texture.height(),
            ImageStorage::Composite(composite) => composite.height,
        }
    }
}

/// The resource cache specialized for images: PNG decode + tiling as the load
/// callback, graphics-context lifecycle hooks, and the two implicit defaults
/// (procedural checkerboard, default font).
pub struct ImageCache {
    cache: ResourceCache<ImageResource>,
    gfx: Option<GraphicsContext>,
    default_image: ImageResource,
    default_font: Option<ResourceHandle<ImageResource>>,
    default_font_path: Option<String>,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCache {
    pub fn new() -> Self {
        let mut cache = ResourceCache::new();
        cache.start().expect("fresh resource cache");
        Self {
            cache,
            gfx: None,
            default_image: ImageResource::default(),
            default_font: None,
            default_font_path: None,
        }
    }

    pub fn set_default_font_path(&mut self, path: impl Into<String>) {
        self.default_font_path = Some(path.into());
    }

    pub fn context(&self) -> Option<&GraphicsContext> {
        self.gfx.as_ref()
    }

    /// Graphics context acquired or restored: every cached path is reloaded
    /// into fresh textures under the new context.
    pub fn set_context(&mut self, gfx: GraphicsContext) -> Result<(), ResourceError> {
        self.gfx = Some(gfx);
        self.reload_cache()
    }

    /// Graphics context lost: all textures are freed, the context dropped.
    pub fn clear_context(&mut self) -> Result<(), ResourceError> {
        self.free_all()?;
        self.gfx = None;
        Ok(())
    }

    pub fn retrieve(
        &mut self,
        path: &str,
        persistent: bool,
    ) -> Result<ResourceHandle<ImageResource>, ResourceError> {
        let gfx = self.gfx.as_ref();
        self.cache.retrieve(path, persistent, |path, image| load_image(gfx, path, image))
    }

    /// Deletes the image's textures and resets it to `Invalid`. Without a
    /// context the reset still happens; no textures were ever created.
    pub fn free_texture(&self, image: &mut ImageResource) {
        free_image(self.gfx.as_ref(), image);
    }

    pub fn path_of(&self, handle: &ResourceHandle<ImageResource>) -> Option<&str> {
        self.cache.path_of(handle)
    }

    pub fn default_image(&self) -> &ImageResource {
        &self.default_image
    }

    pub fn default_font(&self) -> Option<&ResourceHandle<ImageResource>> {
        self.default_font.as_ref()
    }

    /// Frees every cached image plus the procedural default, which lives
    /// outside the cache table and is not reachable through `process`.
    pub fn free_all(&mut self) -> Result<(), ResourceError> {
        let gfx = self.gfx.as_ref();
        self.cache.process(|_path, handle| {
            free_image(gfx, &mut handle.borrow_mut());
            Ok(())
        })?;
        free_image(gfx, &mut self.default_image);
        Ok(())
    }

    /// Re-decodes every cached path into fresh textures, retrying paths that
    /// previously failed, then re-derives the default font. A default-font
    /// failure is logged rather than aborting the reload.
    pub fn reload_all(&mut self) -> Result<(), ResourceError> {
        self.cache.clear_failures();
        let gfx = self.gfx.as_ref();
        self.cache.process(|path, handle| {
            let mut image = handle.borrow_mut();
            free_image(gfx, &mut image);
            load_image(gfx, path, &mut image)
        })?;
        if let Some(path) = self.default_font_path.clone() {
            match self.retrieve(&path, true) {
                Ok(handle) => self.default_font = Some(handle),
                Err(err) => {
                    eprintln!("[images] failed to reload default font '{path}': {err}");
                }
            }
        }
        Ok(())
    }

    /// Recovery entry point after a graphics device reset: every texture is
    /// invalid, so free everything, regenerate the checkerboard default, and
    /// reload the cached paths.
    pub fn reload_cache(&mut self) -> Result<(), ResourceError> {
        self.free_all()?;
        if self.gfx.is_some() {
            self.default_image = self.build_default_image()?;
        }
        self.reload_all()
    }

    /// Frees everything and clears the cache tables.
    pub fn stop(&mut self) -> Result<(), ResourceError> {
        self.free_all()?;
        self.default_font = None;
        self.cache.stop();
        Ok(())
    }

    fn build_default_image(&self) -> Result<ImageResource, ResourceError> {
        let gfx = self.gfx.as_ref().ok_or(ResourceError::NoVideoMode)?;
        let size = DEFAULT_IMAGE_SIZE;
        let mut pixels = vec![0u8; size as usize * size as usize * 4];
        for y in 0..size {
            for x in 0..size {
                let light = ((x / DEFAULT_IMAGE_BLOCK) + (y / DEFAULT_IMAGE_BLOCK)) % 2 == 0;
                let shade = if light { DEFAULT_IMAGE_LIGHT } else { DEFAULT_IMAGE_DARK };
                let at = ((y * size + x) * 4) as usize;
                pixels[at..at + 4].copy_from_slice(&[shade, shade, shade, 0xff]);
            }
        }
        let storage = tiling::build_textures(gfx, &pixels, size, size, PixelFormat::Rgba)?;
        Ok(ImageResource { storage })
    }
}

/// Load callback for the image cache: read the file, decode the PNG, hand the
/// pixels to the tiling engine. Fails with `NoVideoMode` before touching the
/// file when no context is active.
fn load_image(
    gfx: Option<&GraphicsContext>,
    path: &str,
    image: &mut ImageResource,
) -> Result<(), ResourceError> {
    let gfx = gfx.ok_or(ResourceError::NoVideoMode)?;
    let bytes = fs::read(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ResourceError::NotFound(path.to_string())
        } else {
            ResourceError::Io(err)
        }
    })?;
    let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)?;
    let (width, height, format, pixels) = match decoded {
        DynamicImage::ImageRgb8(buf) => (buf.width(), buf.height(), PixelFormat::Rgb, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => {
            (buf.width(), buf.height(), PixelFormat::Rgba, buf.into_raw())
        }
        other => {
            return Err(ResourceError::UnsupportedFormat(format!(
                "{path}: only 8-bit RGB/RGBA PNG is supported, got {:?}",
                other.color()
            )))
        }
    };
    image.storage = tiling::build_textures(gfx, &pixels, width, height, format)?;
    Ok(())
}

fn free_image(gfx: Option<&GraphicsContext>, image: &mut ImageResource) {
    let storage = std::mem::take(&mut image.storage);
    let Some(gfx) = gfx else { return };
    match storage {
        ImageStorage::Invalid => {}
        ImageStorage::Native(texture) => gfx.delete_texture(texture),
        ImageStorage::Composite(composite) => {
            for tile in composite.tiles {
                gfx.delete_texture(tile.texture);
            }
        }
    }
}
