//! Core constants shared by the tile pipeline.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Lowest zoom level the viewer will request.
pub const MIN_ZOOM: u8 = 0;

/// Highest zoom level served by the public OpenStreetMap tile servers.
pub const MAX_ZOOM: u8 = 19;

/// Zoom level a fresh view starts at.
pub const DEFAULT_ZOOM: u8 = 14;

/// Upper bound on fetches executing at the same time.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 15;

/// Mirror subdomains of the tile server, picked per request.
pub const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// `{s}` is the mirror, `{z}/{x}/{y}` the tile coordinate.
pub const DEFAULT_URL_TEMPLATE: &str = "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Public tile servers reject requests without an identifying User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("tilelook/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout; a timed out request counts as a failed fetch.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
