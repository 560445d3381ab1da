//! Viewport planning: which tile goes where for a given camera focus.
//!
//! The renderer is split in two. `Viewport::plan` is pure and produces a draw
//! list; the engine hands that list to the host's `TileSurface`.

use glam::{IVec2, UVec2};
use tw_map::{Map, Tileset};

use crate::host::TileDraw;

/// Tiles beyond `resolution / tile_size` drawn on each axis to cover the
/// partial tiles at both edges.
const EDGE_TILES: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewPlan {
    /// Pixel offset of the viewport's top-left corner into the map.
    pub offset: IVec2,
    /// Back-to-front: all of layer 0, then layer 1, and so on.
    pub draws: Vec<TileDraw>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Map coordinate the view is centred on.
    pub focus: IVec2,
    pub resolution: UVec2,
}

impl Viewport {
    pub fn new(focus: IVec2, resolution: UVec2) -> Self {
        Self { focus, resolution }
    }

    /// Top-left offset for a map of `map_pixels`. Non-toric maps clamp so the
    /// view never leaves the map; a map smaller than the view pins to 0.
    pub fn offset(&self, map_pixels: IVec2, toric: bool) -> IVec2 {
        let resolution = self.resolution.as_ivec2();
        let offset = self.focus - resolution / 2;
        if toric {
            return offset;
        }
        let max = (map_pixels - resolution).max(IVec2::ZERO);
        offset.clamp(IVec2::ZERO, max)
    }

    pub fn plan<T: Tileset>(&self, map: &Map<T>) -> ViewPlan {
        let (tile_w, tile_h) = map.tile_size();
        let (map_w, map_h) = map.pixel_size();
        let offset = self.offset(IVec2::new(map_w, map_h), map.is_toric);
        if tile_w <= 0 || tile_h <= 0 {
            log::warn!("Tileset reports tile size {tile_w}x{tile_h}, nothing to draw");
            return ViewPlan {
                offset,
                draws: Vec::new(),
            };
        }

        let tile = IVec2::new(tile_w, tile_h);
        let first = IVec2::new(offset.x.div_euclid(tile_w), offset.y.div_euclid(tile_h));
        let shift = IVec2::new(offset.x.rem_euclid(tile_w), offset.y.rem_euclid(tile_h));
        let grid = self.resolution.as_ivec2() / tile + IVec2::splat(EDGE_TILES);

        let mut draws = Vec::with_capacity(map.layer_count() * (grid.x * grid.y) as usize);
        for (index, layer) in map.layers.iter().enumerate() {
            for gy in 0..grid.y {
                for gx in 0..grid.x {
                    let tile_index = layer.wrapped_tile(first.x + gx, first.y + gy);
                    draws.push(TileDraw {
                        layer: index,
                        x: gx * tile_w - shift.x,
                        y: gy * tile_h - shift.y,
                        tile: tile_index,
                    });
                }
            }
        }
        log::trace!(
            "Planned {} tile draws at offset ({}, {})",
            draws.len(),
            offset.x,
            offset.y
        );

        ViewPlan { offset, draws }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_map::{Layer, MapOrigin, MapScripts};

    struct Tiles(i32, i32);

    impl Tileset for Tiles {
        fn tile_size(&self) -> (i32, i32) {
            (self.0, self.1)
        }
    }

    fn map(width: i32, height: i32, tile: i32, toric: bool, layers: usize) -> Map<Tiles> {
        let layers = (0..layers)
            .map(|l| {
                let tiles = (0..width * height).map(|i| i + 1000 * l as i32).collect();
                Layer::new(width, height, tiles).unwrap()
            })
            .collect();
        Map {
            is_toric: toric,
            origin: MapOrigin::default(),
            tileset: Tiles(tile, tile),
            layers,
            persons: Vec::new(),
            triggers: Vec::new(),
            zones: Vec::new(),
            scripts: MapScripts::default(),
        }
    }

    #[test]
    fn centred_offset_on_large_map() {
        let view = Viewport::new(IVec2::new(200, 150), UVec2::new(320, 240));
        assert_eq!(
            view.offset(IVec2::new(640, 480), false),
            IVec2::new(40, 30)
        );
    }

    #[test]
    fn non_toric_offset_clamps_to_map_edges() {
        let map_pixels = IVec2::new(640, 480);
        let res = UVec2::new(320, 240);
        for (focus, expected) in [
            (IVec2::new(0, 0), IVec2::new(0, 0)),
            (IVec2::new(-500, -500), IVec2::new(0, 0)),
            (IVec2::new(640, 480), IVec2::new(320, 240)),
            (IVec2::new(10_000, 10_000), IVec2::new(320, 240)),
            (IVec2::new(160, 120), IVec2::new(0, 0)),
            (IVec2::new(480, 360), IVec2::new(320, 240)),
        ] {
            let offset = Viewport::new(focus, res).offset(map_pixels, false);
            assert_eq!(offset, expected, "focus {focus:?}");
            assert!(offset.x >= 0 && offset.x <= 640 - 320);
            assert!(offset.y >= 0 && offset.y <= 480 - 240);
        }
    }

    #[test]
    fn map_smaller_than_view_pins_to_origin() {
        let view = Viewport::new(IVec2::new(500, -20), UVec2::new(320, 240));
        assert_eq!(view.offset(IVec2::new(100, 50), false), IVec2::ZERO);
    }

    #[test]
    fn toric_offset_is_never_clamped() {
        let view = Viewport::new(IVec2::new(-37, 5000), UVec2::new(320, 240));
        assert_eq!(
            view.offset(IVec2::new(640, 480), true),
            IVec2::new(-197, 4880)
        );
    }

    #[test]
    fn grid_covers_view_plus_edges_per_layer() {
        let map = map(40, 30, 16, false, 2);
        let plan = Viewport::new(IVec2::new(160, 120), UVec2::new(320, 240)).plan(&map);
        let per_layer = (320 / 16 + 2) * (240 / 16 + 2);
        assert_eq!(plan.draws.len(), 2 * per_layer as usize);
        assert!(plan.draws[..per_layer as usize].iter().all(|d| d.layer == 0));
        assert!(plan.draws[per_layer as usize..].iter().all(|d| d.layer == 1));
        assert_eq!(plan.draws[per_layer as usize].tile, 1000);
    }

    #[test]
    fn partial_scroll_shifts_first_tile() {
        let map = map(40, 30, 16, false, 1);
        // focus 165 -> offset 5: first tile column 0, drawn 5px left of the edge.
        let plan = Viewport::new(IVec2::new(165, 120), UVec2::new(320, 240)).plan(&map);
        assert_eq!(plan.offset, IVec2::new(5, 0));
        let first = plan.draws[0];
        assert_eq!((first.x, first.y, first.tile), (-5, 0, 0));
        assert_eq!((plan.draws[1].x, plan.draws[1].tile), (11, 1));
    }

    #[test]
    fn toric_negative_offset_wraps_and_aligns() {
        let map = map(4, 4, 10, true, 1);
        // offset (-1, -1): first visible cell is (-1, -1) which wraps to (3, 3).
        let plan = Viewport::new(IVec2::new(9, 9), UVec2::new(20, 20)).plan(&map);
        assert_eq!(plan.offset, IVec2::new(-1, -1));
        let first = plan.draws[0];
        assert_eq!(first.tile, 3 + 3 * 4);
        assert_eq!((first.x, first.y), (-9, -9));
    }

    #[test]
    fn toric_offsets_one_layer_apart_draw_the_same_tiles() {
        let map = map(5, 3, 8, true, 1);
        let res = UVec2::new(16, 16);
        let layer_px = 5 * 8;
        // First tile column -1 versus layer_width - 1.
        let a = Viewport::new(IVec2::new(0, 8), res).plan(&map);
        let b = Viewport::new(IVec2::new(layer_px, 8), res).plan(&map);
        assert_eq!(a.offset.x + layer_px, b.offset.x);
        let tiles_a: Vec<i32> = a.draws.iter().map(|d| d.tile).collect();
        let tiles_b: Vec<i32> = b.draws.iter().map(|d| d.tile).collect();
        assert_eq!(tiles_a, tiles_b);
        assert_eq!(map.layers[0].wrapped_tile(-1, 0), map.layers[0].wrapped_tile(4, 0));
    }

    #[test]
    fn zero_tile_size_yields_empty_plan() {
        let mut map = map(4, 4, 16, false, 1);
        map.tileset = Tiles(0, 16);
        let plan = Viewport::new(IVec2::ZERO, UVec2::new(64, 64)).plan(&map);
        assert!(plan.draws.is_empty());
    }
}
