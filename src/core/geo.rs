use crate::core::projection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A geographical coordinate in degrees.
///
/// No clamping happens at this level; the projection functions clamp to the
/// Mercator range when they need to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoord {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Component-wise sum
    pub fn add(&self, other: &GeoCoord) -> GeoCoord {
        GeoCoord::new(self.latitude + other.latitude, self.longitude + other.longitude)
    }

    /// Component-wise difference
    pub fn subtract(&self, other: &GeoCoord) -> GeoCoord {
        GeoCoord::new(self.latitude - other.latitude, self.longitude - other.longitude)
    }

    /// Component-wise absolute value
    pub fn abs(&self) -> GeoCoord {
        GeoCoord::new(self.latitude.abs(), self.longitude.abs())
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// Human readable form, five decimals per axis.
    pub fn formatted(&self) -> String {
        format!("{:.5} | {:.5}", self.latitude, self.longitude)
    }

    /// Wraps a longitude into `[-180, 180)`.
    pub fn wrap_longitude(longitude: f64) -> f64 {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

impl Default for GeoCoord {
    /// Greenwich
    fn default() -> Self {
        Self::new(51.477222, 0.0)
    }
}

impl Add for GeoCoord {
    type Output = GeoCoord;

    fn add(self, rhs: GeoCoord) -> GeoCoord {
        GeoCoord::add(&self, &rhs)
    }
}

impl Sub for GeoCoord {
    type Output = GeoCoord;

    fn sub(self, rhs: GeoCoord) -> GeoCoord {
        self.subtract(&rhs)
    }
}

/// `lat,lng`, the form static-map providers expect as a center parameter.
impl fmt::Display for GeoCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
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

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A fractional position in the slippy-map tile grid of one zoom level.
///
/// The integer part of `x`/`y` is the tile index, the fractional part the
/// relative position inside that tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileNumber {
    pub x: f64,
    pub y: f64,
    pub zoom: u8,
}

impl TileNumber {
    pub fn new(x: f64, y: f64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    pub fn x_index(&self) -> i64 {
        self.x.floor() as i64
    }

    pub fn y_index(&self) -> i64 {
        self.y.floor() as i64
    }

    pub fn x_frac(&self) -> f64 {
        self.x - self.x.floor()
    }

    pub fn y_frac(&self) -> f64 {
        self.y - self.y.floor()
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// The same position shifted by whole tiles.
    pub fn offset(&self, columns: i32, rows: i32) -> TileNumber {
        TileNumber::new(self.x + columns as f64, self.y + rows as f64, self.zoom)
    }

    /// Geographic coordinate of this position, longitude wrapped so that
    /// tiles left or right of the antimeridian still resolve.
    pub fn center(&self) -> GeoCoord {
        let geo = projection::tile_number_to_geo(*self);
        GeoCoord::new(geo.latitude, GeoCoord::wrap_longitude(geo.longitude))
    }

    /// `false` for rows above the north or below the south edge of the world.
    pub fn is_inside_world(&self) -> bool {
        let rows = projection::number_of_tiles(self.zoom) as i64;
        (0..rows).contains(&self.y_index())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Same zoom and the same position up to float noise from re-anchoring.
    pub fn approx_eq(&self, other: &TileNumber) -> bool {
        const EPS: f64 = 1e-6;
        self.zoom == other.zoom && (self.x - other.x).abs() < EPS && (self.y - other.y).abs() < EPS
    }
}

impl fmt::Display for TileNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}@{}]", self.x_index(), self.y_index(), self.zoom)
    }
}
