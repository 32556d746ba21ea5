//! Engine-wide constants for the tile grid and the Web Mercator world.
//! Keeping them in a single place makes it easier to tweak magic numbers.

/// Edge length of a square tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Half a tile; also the default inner extension of the view port.
pub const HALF_TILE_SIZE: u32 = TILE_SIZE / 2;

/// Latitude limit of the Web Mercator projection (degrees).
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Longitude limit (degrees).
pub const MAX_LONGITUDE: f64 = 180.0;

/// Equatorial earth radius in meters (WGS 84).
pub const EARTH_RADIUS: f64 = 6_378_137.0;

pub const METERS_PER_INCH: f64 = 0.0254;

/// Screen resolution assumed by [`crate::core::projection::map_scale_96dpi`].
pub const DEFAULT_SCREEN_DPI: u32 = 96;

/// Highest zoom level the grid and the fetch tasks accept.
pub const MAX_ZOOM_LEVEL: u8 = 22;

/// Additional fetch attempts after the first one fails.
pub const MAX_RETRIES: u32 = 2;

/// Connect/read timeout of a single tile fetch.
pub const FETCH_TIMEOUT_MS: u64 = 1_500;

/// Number of bounded waits for the worker pool to drain on cancel.
pub const CANCEL_WAIT_ATTEMPTS: u32 = 5;

/// Length of one bounded wait on cancel.
pub const CANCEL_WAIT_MS: u64 = 5_000;

/// Vertical drag distance (px) that doubles the zoom factor in zoom mode.
pub const ZOOM_DRAG_DIVISOR: f64 = 50.0;

/// Wheel rotation divisor for wheel zooming.
pub const WHEEL_ZOOM_DIVISOR: f64 = 10.0;

/// Default map center (Dresden).
pub const DEFAULT_CENTER: (f64, f64) = (51.053631, 13.740810);

pub const DEFAULT_ZOOM_LEVEL: u8 = 12;

pub const DEFAULT_WORKER_COUNT: usize = 10;
