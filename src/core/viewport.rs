use crate::core::constants::{MAX_ZOOM, MIN_ZOOM, TILE_SIZE};
use crate::core::geo::{BoundingBox, LatLng, Point, TileCoord};
use crate::core::projection;
use crate::tiles::decode::TileImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Snapshot of what the map window shows: pixel size, zoom and the
/// Mercator-degree box that fills it.
///
/// A viewport is always replaced wholesale; nothing in the crate patches
/// one in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width of the window in pixels
    pub width: u32,
    /// Height of the window in pixels
    pub height: u32,
    /// Integer zoom level
    pub zoom: u8,
    /// Geographic extent of the window in Mercator degrees
    pub bounds: BoundingBox,
}

/// A tile of a [`VisibleTileSet`] together with where its top-left corner
/// lands on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub coord: TileCoord,
    pub offset: (i32, i32),
}

/// Tiles whose screen rectangles intersect a window, row by row from the
/// top-left. Recomputed from scratch for every viewport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibleTileSet {
    pub placements: Vec<Placement>,
}

impl VisibleTileSet {
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter()
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.placements.iter().map(|p| p.coord)
    }
}

/// Render-time view of one visible tile: its image if the cache holds one.
#[derive(Debug, Clone)]
pub struct PlacedTile {
    pub coord: TileCoord,
    pub offset: (i32, i32),
    pub image: Option<Arc<TileImage>>,
}

impl Viewport {
    /// `zoom` is clamped to the levels tile servers publish.
    pub fn new(width: u32, height: u32, zoom: u8, bounds: BoundingBox) -> Self {
        Self {
            width,
            height,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            bounds,
        }
    }

    /// Builds the viewport of a `width` x `height` window centred on `center`.
    pub fn centered(center: LatLng, zoom: u8, width: u32, height: u32) -> Self {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let merc = center.to_mercator();
        let upp = projection::units_per_pixel(zoom);

        let west = merc.x - upp * (width / 2) as f64;
        let north = merc.y + upp * (height / 2) as f64;
        let east = west + upp * width as f64;
        let south = north - upp * height as f64;

        Self::new(width, height, zoom, BoundingBox::new(north, south, east, west))
    }

    /// Geographic center of the window
    pub fn center(&self) -> LatLng {
        LatLng::from_mercator(self.bounds.center())
    }

    /// Viewport after dragging the map by `(dx, dy)` pixels; dragging right
    /// reveals what lies to the west.
    pub fn panned_by(&self, dx: f64, dy: f64) -> Self {
        let upp = projection::units_per_pixel(self.zoom);
        let merc = self.bounds.center();
        let moved = LatLng::from_mercator(Point::new(merc.x - dx * upp, merc.y + dy * upp));
        Self::centered(moved, self.zoom, self.width, self.height)
    }

    /// Viewport after `steps` wheel notches (positive zooms in), keeping the
    /// center fixed.
    pub fn zoomed_by(&self, steps: i32) -> Self {
        let zoom = (self.zoom as i32 + steps).clamp(MIN_ZOOM as i32, MAX_ZOOM as i32) as u8;
        Self::centered(self.center(), zoom, self.width, self.height)
    }

    /// Viewport after the window was resized, keeping the center fixed
    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self::centered(self.center(), self.zoom, width, height)
    }

    /// Tiles covering this viewport's own window.
    pub fn visible_tiles(&self) -> VisibleTileSet {
        self.layout(self.width, self.height)
    }

    /// Tiles covering a `width` x `height` window showing these bounds.
    ///
    /// The tile containing the center is anchored so the center lands in the
    /// middle of the window; the grid then extends left and up until the
    /// window's top-left corner is covered. Tiles that do not exist at this
    /// zoom are left out, and a zoom beyond `MAX_ZOOM` shows nothing.
    pub fn layout(&self, width: u32, height: u32) -> VisibleTileSet {
        if self.zoom > MAX_ZOOM {
            log::warn!("zoom {} is beyond the tile pyramid, nothing to show", self.zoom);
            return VisibleTileSet::default();
        }

        let tile = TILE_SIZE as i32;
        let tile_px = TILE_SIZE as f64;
        let center = self.bounds.center();

        let (center_x, center_y) = projection::tile_for_point(center.x, center.y, self.zoom);
        let tile_bounds = projection::tile_bounds(center_x, center_y, self.zoom);

        // Screen y grows downwards while Mercator y grows northwards
        let y_ratio = (center.y - tile_bounds.north) / (tile_bounds.south - tile_bounds.north);
        let x_ratio = (center.x - tile_bounds.west) / (tile_bounds.east - tile_bounds.west);

        let center_pos_x = ((width / 2) as f64 - x_ratio * tile_px).floor() as i32;
        let center_pos_y = ((height / 2) as f64 - y_ratio * tile_px).floor() as i32;

        let tiles_left = (center_pos_x as f64 / tile_px).ceil() as i32;
        let left_index = center_x - tiles_left;
        let left_pos = center_pos_x - tiles_left * tile;

        let tiles_above = (center_pos_y as f64 / tile_px).ceil() as i32;
        let top_index = center_y - tiles_above;
        let top_pos = center_pos_y - tiles_above * tile;

        let (width, height) = (width as i32, height as i32);
        let mut placements = Vec::new();
        let mut row = 0;
        while top_pos + row * tile < height {
            let mut col = 0;
            while left_pos + col * tile < width {
                let coord = TileCoord::new(left_index + col, top_index + row, self.zoom);
                if coord.is_valid() {
                    placements.push(Placement {
                        coord,
                        offset: (left_pos + col * tile, top_pos + row * tile),
                    });
                }
                col += 1;
            }
            row += 1;
        }

        VisibleTileSet { placements }
    }
}
