//! Geometry types: bounding boxes, tile grids and canvas georeference.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;
use thiserror::Error;

use super::{
    lat_lon_to_meters, meters_to_pixels, pixels_to_meters, resolution, tiles_per_axis,
    PSEUDO_MERCATOR_EPSG,
};

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Deepest zoom level the grid math accepts.
pub const MAX_ZOOM: u8 = 22;

/// Errors produced by coordinate and grid calculations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0} (must be between {MIN_LAT} and {MAX_LAT})")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    #[error("Invalid zoom level: {0} (must be between 0 and {MAX_ZOOM})")]
    InvalidZoom(u8),

    #[error("Invalid bounding box: {0}")]
    InvalidBounds(String),

    #[error("Invalid tile size: {0}")]
    InvalidTileSize(u32),

    #[error("Invalid tile grid: columns {x_min}..={x_max}, rows {y_min}..={y_max}")]
    InvalidGrid {
        x_min: i64,
        x_max: i64,
        y_min: i64,
        y_max: i64,
    },
}

/// Geodetic bounding box in degrees.
///
/// Invariant: `lon_min < lon_max` and `lat_min < lat_max`. Boxes that wrap
/// the antimeridian are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    lon_min: f64,
    lon_max: f64,
    lat_min: f64,
    lat_max: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self, CoordError> {
        for lon in [lon_min, lon_max] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(CoordError::InvalidLongitude(lon));
            }
        }
        for lat in [lat_min, lat_max] {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(CoordError::InvalidLatitude(lat));
            }
        }
        if lon_min >= lon_max {
            return Err(CoordError::InvalidBounds(format!(
                "lon_min {} must be less than lon_max {}",
                lon_min, lon_max
            )));
        }
        if lat_min >= lat_max {
            return Err(CoordError::InvalidBounds(format!(
                "lat_min {} must be less than lat_max {}",
                lat_min, lat_max
            )));
        }

        Ok(Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        })
    }

    pub fn lon_min(&self) -> f64 {
        self.lon_min
    }

    pub fn lon_max(&self) -> f64 {
        self.lon_max
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    /// Northwest corner as `(lat, lon)`.
    pub fn north_west(&self) -> (f64, f64) {
        (self.lat_max, self.lon_min)
    }

    /// Southeast corner as `(lat, lon)`.
    pub fn south_east(&self) -> (f64, f64) {
        (self.lat_min, self.lon_max)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lon {}..{}, lat {}..{}",
            self.lon_min, self.lon_max, self.lat_min, self.lat_max
        )
    }
}

/// Georeference of a canvas in pseudo-Mercator meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoReference {
    /// Easting of the canvas's top-left corner.
    pub origin_x: f64,
    /// Northing of the canvas's top-left corner.
    pub origin_y: f64,
    /// Pixel size in meters (square pixels).
    pub resolution: f64,
    /// Spatial reference, always EPSG:3857.
    pub epsg: u16,
}

impl GeoReference {
    /// GDAL-style affine geotransform
    /// `[origin_x, res, 0, origin_y, 0, -res]`.
    pub fn geo_transform(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.resolution,
            0.0,
            self.origin_y,
            0.0,
            -self.resolution,
        ]
    }

    /// Meters coordinate of the top-left corner of canvas pixel `(col, row)`.
    pub fn pixel_to_meters(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.resolution,
            self.origin_y - row as f64 * self.resolution,
        )
    }
}

/// Rectangle of tile indices covering a bounding box at one zoom level.
///
/// Invariant: `x_min <= x_max`, `y_min <= y_max`, all indices lie in
/// `0..=2^zoom - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileGrid {
    zoom: u8,
    x_min: u32,
    x_max: u32,
    y_min: u32,
    y_max: u32,
    tile_size: u32,
}

impl TileGrid {
    /// Creates a grid from explicit tile indices.
    pub fn new(
        zoom: u8,
        x_min: u32,
        x_max: u32,
        y_min: u32,
        y_max: u32,
        tile_size: u32,
    ) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        if tile_size == 0 {
            return Err(CoordError::InvalidTileSize(tile_size));
        }
        let last = tiles_per_axis(zoom) - 1;
        if x_min > x_max || y_min > y_max || x_max > last || y_max > last {
            return Err(CoordError::InvalidGrid {
                x_min: x_min as i64,
                x_max: x_max as i64,
                y_min: y_min as i64,
                y_max: y_max as i64,
            });
        }

        Ok(Self {
            zoom,
            x_min,
            x_max,
            y_min,
            y_max,
            tile_size,
        })
    }

    /// Computes the tile grid covering `bbox` and the georeference of the
    /// canvas spanning that grid.
    ///
    /// Vertical indices are flipped (`row = 2^zoom - floor(pixelY / tileSize)`)
    /// because projected Y grows northward while raster rows grow downward.
    /// Indices are clamped into the valid range at the projection edges.
    pub fn compute(
        bbox: &BoundingBox,
        zoom: u8,
        tile_size: u32,
    ) -> Result<(Self, GeoReference), CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        if tile_size == 0 {
            return Err(CoordError::InvalidTileSize(tile_size));
        }

        let n = tiles_per_axis(zoom) as i64;
        let ts = tile_size as f64;

        let (nw_lat, nw_lon) = bbox.north_west();
        let (se_lat, se_lon) = bbox.south_east();
        let (mx1, my1) = lat_lon_to_meters(nw_lat, nw_lon);
        let (mx2, my2) = lat_lon_to_meters(se_lat, se_lon);
        let (px1, py1) = meters_to_pixels(mx1, my1, zoom, tile_size);
        let (px2, py2) = meters_to_pixels(mx2, my2, zoom, tile_size);

        let clamp = |v: i64| v.clamp(0, n - 1);
        let x_min = (px1 / ts).floor() as i64;
        let x_max = (px2 / ts).floor() as i64;
        let y_min = n - (py1 / ts).floor() as i64;
        let y_max = n - (py2 / ts).floor() as i64;

        if x_min > x_max || y_min > y_max {
            return Err(CoordError::InvalidGrid {
                x_min,
                x_max,
                y_min,
                y_max,
            });
        }

        let grid = Self::new(
            zoom,
            clamp(x_min) as u32,
            clamp(x_max) as u32,
            clamp(y_min) as u32,
            clamp(y_max) as u32,
            tile_size,
        )?;

        Ok((grid, grid.georeference()))
    }

    /// Georeference of the canvas covering this grid.
    pub fn georeference(&self) -> GeoReference {
        let n = tiles_per_axis(self.zoom) as f64;
        let ts = self.tile_size as f64;
        let (origin_x, origin_y) = pixels_to_meters(
            self.x_min as f64 * ts,
            (n - self.y_min as f64) * ts,
            self.zoom,
            self.tile_size,
        );

        GeoReference {
            origin_x,
            origin_y,
            resolution: resolution(self.zoom, self.tile_size),
            epsg: PSEUDO_MERCATOR_EPSG,
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn x_min(&self) -> u32 {
        self.x_min
    }

    pub fn x_max(&self) -> u32 {
        self.x_max
    }

    pub fn y_min(&self) -> u32 {
        self.y_min
    }

    pub fn y_max(&self) -> u32 {
        self.y_max
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tile columns.
    pub fn columns(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    /// Number of tile rows.
    pub fn rows(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> u64 {
        self.columns() as u64 * self.rows() as u64
    }

    /// Canvas width in pixels.
    pub fn canvas_width(&self) -> u32 {
        self.columns() * self.tile_size
    }

    /// Canvas height in pixels.
    pub fn canvas_height(&self) -> u32 {
        self.rows() * self.tile_size
    }

    /// Tile column indices, west to east.
    pub fn x_range(&self) -> RangeInclusive<u32> {
        self.x_min..=self.x_max
    }

    /// Tile row indices, north to south.
    pub fn y_range(&self) -> RangeInclusive<u32> {
        self.y_min..=self.y_max
    }

    /// Whether tile `(x, y)` belongs to this grid.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.x_range().contains(&x) && self.y_range().contains(&y)
    }

    /// Pixel offset of tile `(x, y)` inside the canvas.
    pub fn pixel_offset(&self, x: u32, y: u32) -> (u32, u32) {
        (
            (x - self.x_min) * self.tile_size,
            (y - self.y_min) * self.tile_size,
        )
    }

    /// Iterates over all tiles in row-major order (north to south, then west
    /// to east).
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.y_range()
            .flat_map(move |y| self.x_range().map(move |x| (x, y)))
    }
}

impl fmt::Display for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z{} x {}..={} y {}..={} ({}x{} tiles of {}px)",
            self.zoom,
            self.x_min,
            self.x_max,
            self.y_min,
            self.y_max,
            self.columns(),
            self.rows(),
            self.tile_size
        )
    }
}
