use crate::cache::ResourceError;
use crate::gfx::{GraphicsContext, PixelFormat, TextureLimits};
use crate::images::{CompositeImage, ImageStorage, ImageTile};

/// True when the image can be uploaded as a single native texture: both
/// dimensions are powers of two inside the device's supported range.
pub fn fits_native(width: u32, height: u32, limits: TextureLimits) -> bool {
    width.is_power_of_two()
        && height.is_power_of_two()
        && width >= limits.min_size
        && height >= limits.min_size
        && width <= limits.max_size
        && height <= limits.max_size
}

/// One cell of the tile grid: the sub-rectangle of true image pixels it
/// covers and the (power-of-two) texture extent it will be uploaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub texture_width: u32,
    pub texture_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilingPlan {
    pub rows: u32,
    pub columns: u32,
    /// Row-major, matching (row, col) iteration order.
    pub tiles: Vec<TileRegion>,
}

/// Splits an image that cannot be one native texture into a row/column grid.
/// Interior cells cover exactly `max_size` square; the last row and column
/// cover the remainder, rounded up to the next power of two (floored at
/// `min_size`) for their texture extent.
pub fn plan_tiles(width: u32, height: u32, limits: TextureLimits) -> TilingPlan {
    let max = limits.max_size;
    let columns = width.div_ceil(max);
    let rows = height.div_ceil(max);
    let mut tiles = Vec::with_capacity((rows * columns) as usize);
    for row in 0..rows {
        for col in 0..columns {
            let x = col * max;
            let y = row * max;
            let region_width = if col + 1 == columns { width - x } else { max };
            let region_height = if row + 1 == rows { height - y } else { max };
            tiles.push(TileRegion {
                x,
                y,
                width: region_width,
                height: region_height,
                texture_width: texture_extent(region_width, limits),
                texture_height: texture_extent(region_height, limits),
            });
        }
    }
    TilingPlan { rows, columns, tiles }
}

fn texture_extent(region: u32, limits: TextureLimits) -> u32 {
    region.next_power_of_two().max(limits.min_size)
}

/// Copies a tile's region out of the source image into a scratch buffer sized
/// to the tile's texture, replicating the nearest in-bounds pixel into the
/// right and bottom padding. Replication keeps linear filtering from sampling
/// garbage at tile seams.
pub fn fill_tile(
    src: &[u8],
    src_width: u32,
    bytes_per_pixel: usize,
    tile: &TileRegion,
) -> Result<Vec<u8>, ResourceError> {
    let len = tile.texture_width as usize * tile.texture_height as usize * bytes_per_pixel;
    let mut out = Vec::new();
    out.try_reserve_exact(len).map_err(|_| ResourceError::OutOfMemory(len))?;
    let span = tile.width as usize * bytes_per_pixel;
    for row in 0..tile.texture_height {
        // Rows past the region repeat the region's last valid row.
        let src_row = tile.y + row.min(tile.height - 1);
        let base = (src_row as usize * src_width as usize + tile.x as usize) * bytes_per_pixel;
        out.extend_from_slice(&src[base..base + span]);
        let last = base + span - bytes_per_pixel;
        for _ in tile.width..tile.texture_width {
            out.extend_from_slice(&src[last..last + bytes_per_pixel]);
        }
    }
    Ok(out)
}

fn uv_extent(region: u32, texture: u32) -> f32 {
    // Exact comparison instead of division so a full tile is exactly 1.0.
    if region == texture {
        1.0
    } else {
        region as f32 / texture as f32
    }
}

/// Turns decoded pixels into image storage: a single native texture when the
/// dimensions allow it, otherwise a composite grid of padded power-of-two
/// tiles. A failure partway through a composite build deletes the tiles
/// already created before the error propagates.
pub fn build_textures(
    gfx: &GraphicsContext,
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<ImageStorage, ResourceError> {
    if width == 0 || height == 0 {
        return Err(ResourceError::InvalidArgument("image dimensions must be non-zero"));
    }
    let bytes_per_pixel = format.bytes_per_pixel();
    if pixels.len() != width as usize * height as usize * bytes_per_pixel {
        return Err(ResourceError::InvalidArgument("pixel buffer does not match image dimensions"));
    }
    let limits = gfx.limits();
    if fits_native(width, height, limits) {
        let texture = gfx.create_texture(width, height, format, pixels)?;
        return Ok(ImageStorage::Native(texture));
    }
    let plan = plan_tiles(width, height, limits);
    let mut tiles: Vec<ImageTile> = Vec::new();
    tiles
        .try_reserve_exact(plan.tiles.len())
        .map_err(|_| ResourceError::OutOfMemory(plan.tiles.len() * std::mem::size_of::<ImageTile>()))?;
    for region in &plan.tiles {
        let built = fill_tile(pixels, width, bytes_per_pixel, region).and_then(|scratch| {
            gfx.create_texture(region.texture_width, region.texture_height, format, &scratch)
        });
        match built {
            Ok(texture) => tiles.push(ImageTile {
                texture,
                width: region.width,
                height: region.height,
                u2: uv_extent(region.width, region.texture_width),
                v2: uv_extent(region.height, region.texture_height),
            }),
            Err(err) => {
                for tile in tiles {
                    gfx.delete_texture(tile.texture);
                }
                return Err(err);
            }
        }
    }
    Ok(ImageStorage::Composite(CompositeImage {
        width,
        height,
        rows: plan.rows,
        columns: plan.columns,
        tiles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TextureLimits {
        TextureLimits::new(16, 256)
    }

    #[test]
    fn interior_cells_use_max_size() {
        let plan = plan_tiles(600, 400, limits());
        assert_eq!(plan.columns, 3);
        assert_eq!(plan.rows, 2);
        let first = plan.tiles[0];
        assert_eq!((first.width, first.height), (256, 256));
        assert_eq!((first.texture_width, first.texture_height), (256, 256));
    }

    #[test]
    fn remainder_cells_round_up_to_power_of_two() {
        let plan = plan_tiles(600, 400, limits());
        let last = plan.tiles[plan.tiles.len() - 1];
        assert_eq!((last.width, last.height), (88, 144));
        assert_eq!((last.texture_width, last.texture_height), (128, 256));
    }

    #[test]
    fn tiny_remainders_are_floored_at_min_size() {
        let plan = plan_tiles(258, 256, limits());
        assert_eq!((plan.rows, plan.columns), (1, 2));
        let last = plan.tiles[1];
        assert_eq!(last.width, 2);
        assert_eq!(last.texture_width, 16);
    }

    #[test]
    fn uv_extent_is_exact_for_full_tiles() {
        assert_eq!(uv_extent(256, 256), 1.0);
        assert_eq!(uv_extent(88, 128), 0.6875);
    }

    #[test]
    fn small_non_power_of_two_images_are_not_native() {
        assert!(fits_native(256, 256, limits()));
        assert!(!fits_native(600, 400, limits()));
        assert!(!fits_native(8, 8, limits()));
        assert!(!fits_native(512, 512, limits()));
    }
}
