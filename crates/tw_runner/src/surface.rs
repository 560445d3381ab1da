//! Software rendering target and the tileset format it draws from.

use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use glam::{IVec2, UVec2};
use image::{Rgba, RgbaImage};
use tw_engine::TileDraw;
use tw_map::{MapError, Tileset};

pub const RTS_SIGNATURE: &[u8; 4] = b".rts";
const RTS_HEADER_RESERVED: usize = 240;

/// Tile atlas in `.rts` version 1 form, 32 bits per pixel.
///
/// Only the header and the tile pixels are read. Per-tile animation and
/// obstruction records that follow the pixels are left unread.
#[derive(Debug, Clone)]
pub struct RtsTileset {
    tile_width: u32,
    tile_height: u32,
    tiles: Vec<RgbaImage>,
}

impl RtsTileset {
    pub fn read_from(reader: &mut dyn Read) -> Result<Self, MapError> {
        let mut header = [0u8; 16];
        reader.read_exact(&mut header)?;
        if &header[0..4] != RTS_SIGNATURE {
            return Err(MapError::format(format!(
                "bad tileset signature {:?}",
                String::from_utf8_lossy(&header[0..4])
            )));
        }
        let field = |at: usize| u16::from_le_bytes([header[at], header[at + 1]]);
        let version = field(4);
        let tile_count = field(6);
        let tile_width = field(8);
        let tile_height = field(10);
        let bpp = field(12);
        let mut reserved = [0u8; RTS_HEADER_RESERVED];
        reader.read_exact(&mut reserved)?;

        if version != 1 {
            return Err(MapError::format(format!(
                "unsupported tileset version {version}"
            )));
        }
        if bpp != 32 {
            return Err(MapError::format(format!(
                "unsupported tileset depth {bpp} bpp, only 32 bpp is supported"
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(MapError::format(format!(
                "invalid tile size {tile_width}x{tile_height}"
            )));
        }

        let (width, height) = (u32::from(tile_width), u32::from(tile_height));
        let mut tiles = Vec::with_capacity(tile_count.into());
        for i in 0..tile_count {
            let mut pixels = vec![0u8; (width * height * 4) as usize];
            reader.read_exact(&mut pixels).map_err(|err| match MapError::from(err) {
                MapError::Truncated { .. } => MapError::truncated(format!("tileset tile {i}")),
                other => other,
            })?;
            let tile = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
                MapError::format(format!("tile {i} pixel buffer has the wrong size"))
            })?;
            tiles.push(tile);
        }
        log::debug!("Read tileset: {tile_count} tiles of {width}x{height}");

        Ok(Self {
            tile_width: width,
            tile_height: height,
            tiles,
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, MapError> {
        let file = fs::File::open(path)
            .map_err(|e| MapError::Resource(format!("{}: {e}", path.display())))?;
        Self::read_from(&mut BufReader::new(file))
    }

    pub fn tile(&self, index: i32) -> Option<&RgbaImage> {
        usize::try_from(index).ok().and_then(|i| self.tiles.get(i))
    }

    #[cfg(test)]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

impl Tileset for RtsTileset {
    fn tile_size(&self) -> (i32, i32) {
        (self.tile_width as i32, self.tile_height as i32)
    }
}

/// The frame being rendered. Tiles are alpha-tested, so fully transparent
/// pixels of upper layers leave lower layers visible.
pub struct Canvas {
    image: RgbaImage,
    background: Rgba<u8>,
}

impl Canvas {
    pub fn new(resolution: UVec2) -> Self {
        let background = Rgba([0, 0, 0, 255]);
        Self {
            image: RgbaImage::from_pixel(resolution.x, resolution.y, background),
            background,
        }
    }

    pub fn resolution(&self) -> UVec2 {
        UVec2::new(self.image.width(), self.image.height())
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn clear(&mut self) {
        let background = self.background;
        self.image.pixels_mut().for_each(|p| *p = background);
    }

    pub fn draw_tiles(&mut self, tileset: &RtsTileset, draws: &[TileDraw]) {
        self.clear();
        for draw in draws {
            match tileset.tile(draw.tile) {
                Some(tile) => self.blit(tile, IVec2::new(draw.x, draw.y)),
                None => log::trace!("Tile index {} out of range, not drawn", draw.tile),
            }
        }
    }

    pub fn blit(&mut self, source: &RgbaImage, at: IVec2) {
        for (sx, sy, pixel) in source.enumerate_pixels() {
            if pixel[3] == 0 {
                continue;
            }
            let x = at.x + sx as i32;
            let y = at.y + sy as i32;
            if let Some(target) = self.pixel_mut(x, y) {
                *target = *pixel;
            }
        }
    }

    pub fn fill_rect(&mut self, at: IVec2, size: UVec2, color: Rgba<u8>) {
        for dy in 0..size.y as i32 {
            for dx in 0..size.x as i32 {
                if let Some(target) = self.pixel_mut(at.x + dx, at.y + dy) {
                    *target = color;
                }
            }
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<(), String> {
        self.image
            .save(path)
            .map_err(|e| format!("Failed to write screenshot {}: {e}", path.display()))
    }

    fn pixel_mut(&mut self, x: i32, y: i32) -> Option<&mut Rgba<u8>> {
        let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
        if x < self.image.width() && y < self.image.height() {
            Some(self.image.get_pixel_mut(x, y))
        } else {
            None
        }
    }
}

/// `.rts` bytes for tiles of one solid colour each.
#[cfg(test)]
pub(crate) fn encode_solid_tileset(
    tile_width: u16,
    tile_height: u16,
    colors: &[[u8; 4]],
) -> Vec<u8> {
    let mut out = RTS_SIGNATURE.to_vec();
    for field in [1u16, colors.len() as u16, tile_width, tile_height, 32] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&[0; RTS_HEADER_RESERVED]);
    for color in colors {
        for _ in 0..usize::from(tile_width) * usize::from(tile_height) {
            out.extend_from_slice(color);
        }
    }
    out
}
