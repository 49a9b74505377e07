use crate::core::constants::MAX_ZOOM;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Latitude beyond which the Web Mercator projection is undefined for tiles
const MAX_LATITUDE: f64 = 85.0511287798;

/// Projects a latitude onto the Mercator y axis, expressed in degrees so that
/// it shares units with longitude.
pub fn mercator_y(lat: f64) -> f64 {
    (PI / 4.0 + lat.to_radians() / 2.0).tan().ln().to_degrees()
}

/// Inverse of [`mercator_y`].
pub fn inverse_mercator_y(merc_y: f64) -> f64 {
    (2.0 * merc_y.to_radians().exp().atan() - PI / 2.0).to_degrees()
}

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Clamps latitude to the range the tile pyramid covers
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Converts to Mercator degrees (x = longitude, y = projected latitude)
    pub fn to_mercator(&self) -> Point {
        Point::new(self.lng, mercator_y(Self::clamp_lat(self.lat)))
    }

    /// Creates LatLng from Mercator degrees
    pub fn from_mercator(point: Point) -> Self {
        Self::new(inverse_mercator_y(point.y), point.x)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Rectangle in Mercator degrees. `north > south` and `east > west` for any
/// box produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Gets the center point of the box in Mercator degrees
    pub fn center(&self) -> Point {
        Point::new(
            (self.east + self.west) / 2.0,
            (self.north + self.south) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Checks if the box contains a point given in Mercator degrees
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.west
            && point.x <= self.east
            && point.y >= self.south
            && point.y <= self.north
    }
}

/// Identifies one tile in the slippy map tile system.
///
/// `x` and `y` are signed so that neighbours of edge tiles can be expressed
/// while computing a visible set; [`TileCoord::is_valid`] tells whether a
/// coordinate actually exists on the planet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: i32, y: i32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Creates the tile containing a LatLng at a zoom level
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let merc = lat_lng.to_mercator();
        let (x, y) = crate::core::projection::tile_for_point(merc.x, merc.y, zoom);
        Self::new(x, y, zoom)
    }

    /// Gets the bounds of the tile in Mercator degrees
    pub fn bounds(&self) -> BoundingBox {
        crate::core::projection::tile_bounds(self.x, self.y, self.z)
    }

    /// Number of tiles along one axis at this tile's zoom level, saturating
    /// for zooms no tile server publishes
    pub fn tiles_per_axis(&self) -> i64 {
        if self.z >= 63 {
            i64::MAX
        } else {
            1_i64 << self.z
        }
    }

    /// Checks if the tile exists at its zoom level
    pub fn is_valid(&self) -> bool {
        if self.z > MAX_ZOOM {
            return false;
        }
        let max_coord = self.tiles_per_axis();
        self.x >= 0 && self.y >= 0 && (self.x as i64) < max_coord && (self.y as i64) < max_coord
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
