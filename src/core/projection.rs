//! Slippy tile math over Mercator degrees.
//!
//! All functions are pure. The world square spans `[-180, 180]` on both axes
//! and is split into `2^zoom` tiles per axis; tile `y` grows southwards.

use crate::core::constants::TILE_SIZE;
use crate::core::geo::BoundingBox;

fn tiles_per_axis(zoom: u8) -> f64 {
    2_f64.powi(zoom as i32)
}

/// Tile index containing the point `(merc_x, merc_y)` at `zoom`.
pub fn tile_for_point(merc_x: f64, merc_y: f64, zoom: u8) -> (i32, i32) {
    let n = tiles_per_axis(zoom);
    let x = ((1.0 + merc_x / 180.0) / 2.0 * n).floor() as i32;
    let y = ((1.0 - merc_y / 180.0) / 2.0 * n).floor() as i32;
    (x, y)
}

/// Mercator x of the western edge of tile column `x`.
pub fn tile_to_merc_x(x: i32, zoom: u8) -> f64 {
    x as f64 / tiles_per_axis(zoom) * 360.0 - 180.0
}

/// Mercator y of the northern edge of tile row `y`.
pub fn tile_to_merc_y(y: i32, zoom: u8) -> f64 {
    -(y as f64 / tiles_per_axis(zoom) * 360.0 - 180.0)
}

/// Geographic extent of one tile.
pub fn tile_bounds(x: i32, y: i32, zoom: u8) -> BoundingBox {
    BoundingBox::new(
        tile_to_merc_y(y, zoom),
        tile_to_merc_y(y.saturating_add(1), zoom),
        tile_to_merc_x(x.saturating_add(1), zoom),
        tile_to_merc_x(x, zoom),
    )
}

/// Mercator degrees covered by one screen pixel at `zoom`.
pub fn units_per_pixel(zoom: u8) -> f64 {
    360.0 / tiles_per_axis(zoom) / TILE_SIZE as f64
}

/// Mercator degrees covered by one tile at `zoom`.
pub fn tile_span(zoom: u8) -> f64 {
    units_per_pixel(zoom) * TILE_SIZE as f64
}
