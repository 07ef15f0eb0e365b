//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude),
//! pseudo-Mercator meters and the integer tile grid used by web map tile
//! servers, plus the georeference of the canvas covering a tile grid.

mod types;

pub use types::{BoundingBox, CoordError, GeoReference, TileGrid, MAX_LAT, MAX_ZOOM, MIN_LAT};

use std::f64::consts::PI;

/// WGS 84 semi-major axis in meters, as used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half of the projected world width in meters.
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS;

/// EPSG code of the pseudo-Mercator projection every canvas is written in.
pub const PSEUDO_MERCATOR_EPSG: u16 = 3857;

/// Ground resolution in meters per pixel at the given zoom level.
///
/// `resolution(zoom) = earthCircumference / (tileSize · 2^zoom)`
#[inline]
pub fn resolution(zoom: u8, tile_size: u32) -> f64 {
    2.0 * ORIGIN_SHIFT / (tile_size as f64 * 2.0_f64.powi(zoom as i32))
}

/// Projects a geodetic coordinate to pseudo-Mercator meters.
///
/// Returns `(x, y)` where `y` grows northward.
#[inline]
pub fn lat_lon_to_meters(lat: f64, lon: f64) -> (f64, f64) {
    let x = lon * ORIGIN_SHIFT / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0);
    (x, y * ORIGIN_SHIFT / 180.0)
}

/// Converts pseudo-Mercator meters back to a geodetic coordinate.
///
/// Returns `(lat, lon)`.
#[inline]
pub fn meters_to_lat_lon(x: f64, y: f64) -> (f64, f64) {
    let lon = x / ORIGIN_SHIFT * 180.0;
    let lat = y / ORIGIN_SHIFT * 180.0;
    let lat = 180.0 / PI * (2.0 * (lat * PI / 180.0).exp().atan() - PI / 2.0);
    (lat, lon)
}

/// Converts meters to global pixel coordinates at the given zoom.
///
/// Pixel `y` grows northward here, matching the projected axis.
#[inline]
pub fn meters_to_pixels(x: f64, y: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let res = resolution(zoom, tile_size);
    ((x + ORIGIN_SHIFT) / res, (y + ORIGIN_SHIFT) / res)
}

/// Converts global pixel coordinates at the given zoom back to meters.
#[inline]
pub fn pixels_to_meters(px: f64, py: f64, zoom: u8, tile_size: u32) -> (f64, f64) {
    let res = resolution(zoom, tile_size);
    (px * res - ORIGIN_SHIFT, py * res - ORIGIN_SHIFT)
}

/// Number of tiles along one axis at the given zoom level.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_zoom_0() {
        // One 256px tile spans the whole world
        let res = resolution(0, 256);
        assert!((res - 156_543.033_928_041).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_halves_per_zoom() {
        for zoom in 0..20 {
            let ratio = resolution(zoom, 512) / resolution(zoom + 1, 512);
            assert!((ratio - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_origin_maps_to_zero_meters() {
        let (x, y) = lat_lon_to_meters(0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_dateline_maps_to_origin_shift() {
        let (x, _) = lat_lon_to_meters(0.0, 180.0);
        assert!((x - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[test]
    fn test_max_latitude_maps_to_square_world() {
        let (_, y) = lat_lon_to_meters(MAX_LAT, 0.0);
        assert!((y - ORIGIN_SHIFT).abs() < 1.0, "y = {}", y);
    }

    #[test]
    fn test_meters_to_pixels_corners() {
        let (px, py) = meters_to_pixels(-ORIGIN_SHIFT, -ORIGIN_SHIFT, 3, 512);
        assert!(px.abs() < 1e-9 && py.abs() < 1e-9);

        let (px, py) = meters_to_pixels(ORIGIN_SHIFT, ORIGIN_SHIFT, 3, 512);
        assert!((px - 8.0 * 512.0).abs() < 1e-6);
        assert!((py - 8.0 * 512.0).abs() < 1e-6);
    }

    #[test]
    fn test_tiles_per_axis() {
        assert_eq!(tiles_per_axis(0), 1);
        assert_eq!(tiles_per_axis(13), 8192);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_meters_roundtrip(
                lat in -85.0..85.0_f64,
                lon in -180.0..180.0_f64,
            ) {
                let (x, y) = lat_lon_to_meters(lat, lon);
                let (lat2, lon2) = meters_to_lat_lon(x, y);
                prop_assert!((lat - lat2).abs() < 1e-9);
                prop_assert!((lon - lon2).abs() < 1e-9);
            }

            #[test]
            fn test_pixels_roundtrip(
                x in -ORIGIN_SHIFT..ORIGIN_SHIFT,
                y in -ORIGIN_SHIFT..ORIGIN_SHIFT,
                zoom in 0u8..=18,
            ) {
                let (px, py) = meters_to_pixels(x, y, zoom, 512);
                let (x2, y2) = pixels_to_meters(px, py, zoom, 512);
                prop_assert!((x - x2).abs() < 1e-3);
                prop_assert!((y - y2).abs() < 1e-3);
            }
        }
    }
}
