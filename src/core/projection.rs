//! Web Mercator projection between geographic coordinates, world pixels
//! and tile numbers.
//!
//! All functions are pure and safe to call from any thread.

use crate::core::constants::{
    DEFAULT_SCREEN_DPI, EARTH_RADIUS, MAX_LATITUDE, MAX_LONGITUDE, MAX_ZOOM_LEVEL, METERS_PER_INCH,
    TILE_SIZE,
};
use crate::core::geo::{GeoCoord, Point, TileNumber};
use std::f64::consts::PI;

/// Number of tiles along one edge of the world at `zoom`. Zoom levels above
/// `MAX_ZOOM_LEVEL` are treated as `MAX_ZOOM_LEVEL`.
pub fn number_of_tiles(zoom: u8) -> u64 {
    1u64 << zoom.min(MAX_ZOOM_LEVEL)
}

/// Edge length of the world map in pixels: `256 * 2^zoom`.
pub fn map_size_px(zoom: u8) -> u64 {
    TILE_SIZE as u64 * number_of_tiles(zoom)
}

/// Pixel position of `coord` on the world map. Latitude is clamped to the
/// Mercator range and longitude to `[-180, 180]` first.
pub fn geo_to_world_pixel(coord: GeoCoord, zoom: u8) -> Point {
    let latitude = coord.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let longitude = coord.longitude.clamp(-MAX_LONGITUDE, MAX_LONGITUDE);
    let map_size = map_size_px(zoom) as f64;

    let x = (longitude + 180.0) / 360.0 * map_size;
    let sin_latitude = latitude.to_radians().sin();
    let y = (0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI)) * map_size;

    Point::new(x, y)
}

/// Inverse of [`geo_to_world_pixel`]. Both axes are clipped to
/// `[0, map_size - 1]`.
pub fn world_pixel_to_geo(pixel: Point, zoom: u8) -> GeoCoord {
    let map_size = map_size_px(zoom) as f64;
    let x = pixel.x.clamp(0.0, map_size - 1.0) / map_size - 0.5;
    let y = 0.5 - pixel.y.clamp(0.0, map_size - 1.0) / map_size;

    let latitude = 90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI;
    let longitude = 360.0 * x;

    GeoCoord::new(latitude, longitude)
}

/// Slippy-map tile number of `coord`, fractional part included.
pub fn geo_to_tile_number(coord: GeoCoord, zoom: u8) -> TileNumber {
    let n = number_of_tiles(zoom) as f64;
    let x = n * ((coord.longitude + 180.0) / 360.0);

    let latitude = coord.latitude.to_radians();
    let sec = 1.0 / latitude.cos();
    let y = n * ((1.0 - (latitude.tan() + sec).ln() / PI) / 2.0);

    TileNumber::new(x, y, zoom)
}

/// Geographic coordinate of a (fractional) tile number. Longitude is not
/// wrapped; see [`TileNumber::center`].
pub fn tile_number_to_geo(tile_number: TileNumber) -> GeoCoord {
    let n = number_of_tiles(tile_number.zoom) as f64;
    let longitude = tile_number.x / n * 360.0 - 180.0;
    let latitude = (PI - tile_number.y / n * 2.0 * PI).sinh().atan().to_degrees();
    GeoCoord::new(latitude, longitude)
}

/// Geographic coordinate of a pixel on an image whose center is
/// `image_center`. `half_image_size_px` is half the image edge length.
pub fn image_pixel_to_geo(
    pixel_on_image: Point,
    image_center: GeoCoord,
    half_image_size_px: f64,
    zoom: u8,
) -> GeoCoord {
    let center = geo_to_world_pixel(image_center, zoom);
    let world = Point::new(
        center.x + pixel_on_image.x - half_image_size_px,
        center.y + pixel_on_image.y - half_image_size_px,
    );
    world_pixel_to_geo(world, zoom)
}

/// Pixel position of `coord` on an image centered at `image_center`.
pub fn geo_to_image_pixel(
    coord: GeoCoord,
    image_center: GeoCoord,
    half_image_size_px: f64,
    zoom: u8,
) -> Point {
    let world = geo_to_world_pixel(coord, zoom);
    let center = geo_to_world_pixel(image_center, zoom);
    Point::new(
        half_image_size_px + (world.x - center.x),
        half_image_size_px + (world.y - center.y),
    )
}

/// Absolute geographic difference between `origin` and `origin` moved by
/// `(dx_px, dy_px)` on the world map.
pub fn delta_geo_coord(origin: GeoCoord, zoom: u8, dx_px: f64, dy_px: f64) -> GeoCoord {
    let world = geo_to_world_pixel(origin, zoom);
    let moved = world_pixel_to_geo(Point::new(world.x + dx_px, world.y + dy_px), zoom);
    (moved - origin).abs()
}

/// Meters represented by one pixel at `latitude`.
pub fn ground_resolution(latitude: f64, zoom: u8) -> f64 {
    latitude.to_radians().cos() * 2.0 * PI * EARTH_RADIUS / map_size_px(zoom) as f64
}

/// Scale denominator (`1 : n`) for a screen with `dpi` pixels per inch.
pub fn map_scale(latitude: f64, zoom: u8, dpi: u32) -> f64 {
    ground_resolution(latitude, zoom) * dpi as f64 / METERS_PER_INCH
}

pub fn map_scale_96dpi(latitude: f64, zoom: u8) -> f64 {
    map_scale(latitude, zoom, DEFAULT_SCREEN_DPI)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_size() {
        assert_eq!(map_size_px(0), 256);
        assert_eq!(map_size_px(1), 512);
        assert_eq!(map_size_px(12), 256 * 4096);
        assert_eq!(number_of_tiles(3), 8);
    }

    #[test]
    fn test_zoom_beyond_limit_is_clamped() {
        assert_eq!(number_of_tiles(u8::MAX), number_of_tiles(MAX_ZOOM_LEVEL));
        assert_eq!(map_size_px(64), map_size_px(MAX_ZOOM_LEVEL));

        let origin = GeoCoord::new(0.0, 0.0);
        let tile = geo_to_tile_number(origin, 64);
        let limit = number_of_tiles(MAX_ZOOM_LEVEL) as f64 / 2.0;
        assert!((tile.x - limit).abs() < 1e-6 && (tile.y - limit).abs() < 1e-6);

        let pixel = geo_to_world_pixel(origin, 200);
        assert!(pixel.x.is_finite() && pixel.y.is_finite());
    }

    #[test]
    fn test_origin_tile_number() {
        let tn = geo_to_tile_number(GeoCoord::new(0.0, 0.0), 0);
        assert!((tn.x - 0.5).abs() < 1e-12);
        assert!((tn.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_world_pixel_of_origin() {
        let p = geo_to_world_pixel(GeoCoord::new(0.0, 0.0), 1);
        assert!((p.x - 256.0).abs() < 1e-9);
        assert!((p.y - 256.0).abs() < 1e-9);
    }

    #[test]
    fn test_geo_to_world_pixel_clamps() {
        let north = geo_to_world_pixel(GeoCoord::new(89.9, 0.0), 2);
        let limit = geo_to_world_pixel(GeoCoord::new(MAX_LATITUDE, 0.0), 2);
        assert_eq!(north, limit);
        assert!(north.y.abs() < 1e-3);

        let east = geo_to_world_pixel(GeoCoord::new(0.0, 250.0), 2);
        assert!((east.x - map_size_px(2) as f64).abs() < 1e-9);
    }

    #[test]
    fn test_world_pixel_to_geo_clips() {
        let geo = world_pixel_to_geo(Point::new(-500.0, -500.0), 0);
        assert!((geo.longitude - (-180.0)).abs() < 1e-9);
        assert!(geo.latitude > 85.0);
    }

    #[test]
    fn test_tile_number_to_geo_inverts() {
        let dresden = GeoCoord::new(51.053631, 13.740810);
        let tn = geo_to_tile_number(dresden, 12);
        let back = tile_number_to_geo(tn);
        assert!((back.latitude - dresden.latitude).abs() < 1e-9);
        assert!((back.longitude - dresden.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_image_pixel_round_trip() {
        let center = GeoCoord::new(48.0, 11.0);
        let target = GeoCoord::new(48.01, 11.02);
        let px = geo_to_image_pixel(target, center, 128.0, 13);
        let back = image_pixel_to_geo(px, center, 128.0, 13);
        assert!((back.latitude - target.latitude).abs() < 1e-6);
        assert!((back.longitude - target.longitude).abs() < 1e-6);

        let mid = image_pixel_to_geo(Point::new(128.0, 128.0), center, 128.0, 13);
        assert!((mid.latitude - center.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_ground_resolution_and_scale() {
        let res = ground_resolution(0.0, 0);
        assert!((res - 156_543.033_928).abs() < 1e-3);

        let scale = map_scale_96dpi(0.0, 0);
        assert!((scale - res * 96.0 / 0.0254).abs() < 1e-6);
        assert!(ground_resolution(60.0, 10) < ground_resolution(0.0, 10));
    }
}
