pub mod cache;
pub mod config;
pub mod gfx;
pub mod images;
pub mod scripts;
pub mod tiling;

pub use cache::{ResourceCache, ResourceError, ResourceHandle};
pub use gfx::{GraphicsContext, PixelFormat, TextureHandle, TextureLimits};
pub use images::{ImageCache, ImageResource, ImageStorage};
