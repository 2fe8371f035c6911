use std::cell::Cell;

use crate::cache::ResourceError;

pub const DEFAULT_MIN_TEXTURE_SIZE: u32 = 16;

/// Smallest and largest texture dimension the active device accepts. Both
/// bounds are powers of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLimits {
    pub min_size: u32,
    pub max_size: u32,
}

impl TextureLimits {
    pub fn new(min_size: u32, max_size: u32) -> Self {
        debug_assert!(min_size.is_power_of_two() && max_size.is_power_of_two());
        debug_assert!(min_size <= max_size);
        Self { min_size, max_size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// One graphics-API texture plus the metadata the image layer needs without
/// touching the GPU object. In headless mode the GPU fields stay empty but the
/// handle is still counted and carries a unique id.
pub struct TextureHandle {
    id: u64,
    width: u32,
    height: u32,
    texture: Option<wgpu::Texture>,
    view: Option<wgpu::TextureView>,
}

impl TextureHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.view.as_ref()
    }
}

enum Backend {
    Wgpu { device: wgpu::Device, queue: wgpu::Queue, sampler: wgpu::Sampler },
    Headless,
}

/// Owner of the device/queue pair plus the bookkeeping every texture operation
/// consults: size limits, the live-texture count, and an optional allocation
/// budget. Interior counters use `Cell` so texture creation works through a
/// shared borrow while the image cache mutates its own tables.
pub struct GraphicsContext {
    backend: Backend,
    limits: TextureLimits,
    budget: Option<usize>,
    live: Cell<usize>,
    next_id: Cell<u64>,
}

impl GraphicsContext {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Image Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let limits = TextureLimits::new(
            DEFAULT_MIN_TEXTURE_SIZE,
            device.limits().max_texture_dimension_2d,
        );
        Self {
            backend: Backend::Wgpu { device: device.clone(), queue: queue.clone(), sampler },
            limits,
            budget: None,
            live: Cell::new(0),
            next_id: Cell::new(1),
        }
    }

    /// Context without a device behind it: textures are counted and handed
    /// ids but no GPU objects are created. Used for servers and tests.
    pub fn headless(limits: TextureLimits) -> Self {
        Self {
            backend: Backend::Headless,
            limits,
            budget: None,
            live: Cell::new(0),
            next_id: Cell::new(1),
        }
    }

    pub fn with_limits(mut self, limits: TextureLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Caps the number of simultaneously live textures; creation past the cap
    /// fails with a graphics error.
    pub fn with_texture_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn limits(&self) -> TextureLimits {
        self.limits
    }

    pub fn live_textures(&self) -> usize {
        self.live.get()
    }

    pub fn sampler(&self) -> Option<&wgpu::Sampler> {
        match &self.backend {
            Backend::Wgpu { sampler, .. } => Some(sampler),
            Backend::Headless => None,
        }
    }

    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<TextureHandle, ResourceError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ResourceError::InvalidArgument("pixel buffer does not match texture size"));
        }
        if let Some(budget) = self.budget {
            if self.live.get() >= budget {
                return Err(ResourceError::GraphicsApi(format!(
                    "texture budget of {budget} exhausted"
                )));
            }
        }
        let (texture, view) = match &self.backend {
            Backend::Headless => (None, None),
            Backend::Wgpu { device, queue, .. } => {
                let rgba_storage;
                let rgba: &[u8] = match format {
                    PixelFormat::Rgba => pixels,
                    PixelFormat::Rgb => {
                        // wgpu has no 24-bit format; expand to opaque RGBA.
                        let len = width as usize * height as usize * 4;
                        let mut out = Vec::new();
                        out.try_reserve_exact(len)
                            .map_err(|_| ResourceError::OutOfMemory(len))?;
                        for px in pixels.chunks_exact(3) {
                            out.extend_from_slice(&[px[0], px[1], px[2], 0xff]);
                        }
                        rgba_storage = out;
                        &rgba_storage
                    }
                };
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Image Texture"),
                    size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    rgba,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * width),
                        rows_per_image: Some(height),
                    },
                    wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                (Some(texture), Some(view))
            }
        };
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.set(self.live.get() + 1);
        Ok(TextureHandle { id, width, height, texture, view })
    }

    pub fn delete_texture(&self, handle: TextureHandle) {
        if let Some(texture) = handle.texture {
            texture.destroy();
        }
        self.live.set(self.live.get().saturating_sub(1));
    }
}
