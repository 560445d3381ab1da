//! In-memory form of a decoded map.
//!
//! A `Map` owns everything it was decoded with, including its tileset. Person
//! spawn records are descriptors only: the engine consumes them once when the
//! map becomes active and the live persons take over from there.

use crate::decode::Tileset;
use crate::error::MapError;

/// Positional meaning of the map's string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringSlot {
    Tileset,
    Music,
    /// Obsolete per-map script file name, never used.
    LegacyScript,
    Entry,
    Leave,
    LeaveNorth,
    LeaveEast,
    LeaveSouth,
    LeaveWest,
}

impl StringSlot {
    pub const COUNT: usize = 9;

    pub const ALL: [StringSlot; Self::COUNT] = [
        StringSlot::Tileset,
        StringSlot::Music,
        StringSlot::LegacyScript,
        StringSlot::Entry,
        StringSlot::Leave,
        StringSlot::LeaveNorth,
        StringSlot::LeaveEast,
        StringSlot::LeaveSouth,
        StringSlot::LeaveWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapScripts {
    slots: [String; StringSlot::COUNT],
}

impl MapScripts {
    /// Build from the string table as stored in the file. Missing trailing
    /// slots are empty; strings past the ninth have no meaning and are dropped.
    pub fn from_table(table: Vec<String>) -> Self {
        let mut slots: [String; StringSlot::COUNT] = Default::default();
        for (slot, value) in slots.iter_mut().zip(table) {
            *slot = value;
        }
        Self { slots }
    }

    pub fn get(&self, slot: StringSlot) -> &str {
        &self.slots[slot.index()]
    }

    pub fn set(&mut self, slot: StringSlot, value: impl Into<String>) {
        self.slots[slot.index()] = value.into();
    }

    pub fn tileset_file(&self) -> &str {
        self.get(StringSlot::Tileset)
    }

    pub fn music_file(&self) -> &str {
        self.get(StringSlot::Music)
    }

    pub fn entry_script(&self) -> &str {
        self.get(StringSlot::Entry)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.slots
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerProps {
    pub flags: u16,
    pub parallax: (f32, f32),
    pub scrolling: (f32, f32),
    pub segment_count: i32,
    pub reflective: bool,
}

/// One full-map grid of tile indices, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    width: i32,
    height: i32,
    tiles: Vec<i32>,
    pub props: LayerProps,
}

impl Layer {
    pub fn new(width: i32, height: i32, tiles: Vec<i32>) -> Result<Self, MapError> {
        if width <= 0 || height <= 0 {
            return Err(MapError::format(format!(
                "layer dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if tiles.len() != expected {
            return Err(MapError::format(format!(
                "layer of {width}x{height} needs {expected} tiles, got {}",
                tiles.len()
            )));
        }
        Ok(Self {
            width,
            height,
            tiles,
            props: LayerProps::default(),
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tiles(&self) -> &[i32] {
        &self.tiles
    }

    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(x as usize + y as usize * self.width as usize)
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<i32> {
        self.index(x, y).map(|i| self.tiles[i])
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: i32) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    /// Tile at `(x, y)` with both coordinates wrapped into the layer, so any
    /// integer (including negatives) addresses a cell.
    pub fn wrapped_tile(&self, x: i32, y: i32) -> i32 {
        let cx = x.rem_euclid(self.width);
        let cy = y.rem_euclid(self.height);
        self.tiles[cx as usize + cy as usize * self.width as usize]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapOrigin {
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub direction: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonScripts {
    pub on_create: Option<String>,
    pub on_destroy: Option<String>,
    pub on_touch: Option<String>,
    pub on_talk: Option<String>,
    pub on_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonSpawn {
    pub name: String,
    pub spriteset: String,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub scripts: PersonScripts,
}

/// Step-on script. The file also carries a position for it, which is not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub script: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub area: Rect,
    pub layer: i32,
    pub steps: i32,
}

pub struct Map<T> {
    pub is_toric: bool,
    pub origin: MapOrigin,
    pub tileset: T,
    pub layers: Vec<Layer>,
    pub persons: Vec<PersonSpawn>,
    pub triggers: Vec<Trigger>,
    pub zones: Vec<Zone>,
    pub scripts: MapScripts,
}

impl<T> Map<T> {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: i32) -> Option<&Layer> {
        usize::try_from(index).ok().and_then(|i| self.layers.get(i))
    }

    /// Size in tiles of layer 0, which defines the map's extent.
    pub fn size_in_tiles(&self) -> (i32, i32) {
        self.layers
            .first()
            .map(|layer| (layer.width(), layer.height()))
            .unwrap_or((0, 0))
    }

    /// Hand the spawn records to the caller; the map keeps none afterwards.
    pub fn take_persons(&mut self) -> Vec<PersonSpawn> {
        std::mem::take(&mut self.persons)
    }
}

impl<T: Tileset> Map<T> {
    pub fn tile_size(&self) -> (i32, i32) {
        self.tileset.tile_size()
    }

    /// Extent of layer 0 in pixels.
    pub fn pixel_size(&self) -> (i32, i32) {
        let (w, h) = self.size_in_tiles();
        let (tile_w, tile_h) = self.tile_size();
        (w * tile_w, h * tile_h)
    }
}

impl<T> std::fmt::Debug for Map<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("is_toric", &self.is_toric)
            .field("origin", &self.origin)
            .field("layers", &self.layers.len())
            .field("persons", &self.persons.len())
            .field("triggers", &self.triggers.len())
            .field("zones", &self.zones.len())
            .finish_non_exhaustive()
    }
}
