//! Data products served by the tile API.
//!
//! Each product fixes the band layout of its tiles, the sample type of the
//! output raster, the STAC collection it is registered against and whether
//! cloud replacement applies to it.
//!
//! | Product             | Bands | Type  | Tile | Collection           |
//! |---------------------|-------|-------|------|----------------------|
//! | `RGB`               | 4     | Byte  | PNG  | sentinel-2-l2a       |
//! | `NDVI`              | 2     | Byte  | PNG  | sentinel-2-l2a       |
//! | `B08`               | 1     | Int16 | TIFF | sentinel-2-l2a       |
//! | `RGB16`             | 4     | Int16 | TIFF | sentinel-2-l2a       |
//! | `RGB16Landsat`      | 4     | Int16 | TIFF | landsat-c2-l2        |
//! | `NDVILandsat`       | 2     | Byte  | PNG  | landsat-c2-l2        |
//! | `LandCover9Classes` | 4     | Byte  | PNG  | io-lulc-annual-v02   |
//! | `ESAWorldCover`     | 4     | Byte  | PNG  | esa-worldcover       |

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use super::{PixelType, RasterError};

const PC_TILES: &str =
    "https://planetarycomputer.microsoft.com/api/data/v1/mosaic/tiles/{key}/WebMercatorQuad/{z}/{x}/{y}@2x";

/// Year from which the `RGB` product switches to the `visual` asset.
const VISUAL_ASSET_FIRST_YEAR: i32 = 2022;

/// Encoding of tiles as served by the tile API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEncoding {
    Png,
    Tiff,
}

impl TileEncoding {
    /// File extension used for downloaded tiles.
    pub fn extension(&self) -> &'static str {
        match self {
            TileEncoding::Png => "png",
            TileEncoding::Tiff => "tif",
        }
    }
}

/// A raster product that can be assembled into a mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataProduct {
    Rgb,
    Ndvi,
    B08,
    Rgb16,
    Rgb16Landsat,
    NdviLandsat,
    LandCover9Classes,
    EsaWorldCover,
}

impl DataProduct {
    /// Every product, in display order.
    pub const ALL: [DataProduct; 8] = [
        DataProduct::Rgb,
        DataProduct::Ndvi,
        DataProduct::B08,
        DataProduct::Rgb16,
        DataProduct::Rgb16Landsat,
        DataProduct::NdviLandsat,
        DataProduct::LandCover9Classes,
        DataProduct::EsaWorldCover,
    ];

    /// Name used in config files, on the command line and in output names.
    pub fn name(&self) -> &'static str {
        match self {
            DataProduct::Rgb => "RGB",
            DataProduct::Ndvi => "NDVI",
            DataProduct::B08 => "B08",
            DataProduct::Rgb16 => "RGB16",
            DataProduct::Rgb16Landsat => "RGB16Landsat",
            DataProduct::NdviLandsat => "NDVILandsat",
            DataProduct::LandCover9Classes => "LandCover9Classes",
            DataProduct::EsaWorldCover => "ESAWorldCover",
        }
    }

    /// Number of bands per tile and in the output raster.
    pub fn band_count(&self) -> u32 {
        match self {
            DataProduct::Ndvi | DataProduct::NdviLandsat => 2,
            DataProduct::B08 => 1,
            _ => 4,
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            DataProduct::B08 | DataProduct::Rgb16 | DataProduct::Rgb16Landsat => PixelType::Int16,
            _ => PixelType::Byte,
        }
    }

    /// How tiles of this product are encoded on the wire.
    pub fn encoding(&self) -> TileEncoding {
        match self.pixel_type() {
            PixelType::Int16 => TileEncoding::Tiff,
            PixelType::Byte => TileEncoding::Png,
        }
    }

    /// STAC collection the product's mosaic is registered against.
    pub fn collection(&self) -> &'static str {
        match self {
            DataProduct::Rgb | DataProduct::Ndvi | DataProduct::B08 | DataProduct::Rgb16 => {
                "sentinel-2-l2a"
            }
            DataProduct::LandCover9Classes => "io-lulc-annual-v02",
            DataProduct::EsaWorldCover => "esa-worldcover",
            DataProduct::Rgb16Landsat | DataProduct::NdviLandsat => "landsat-c2-l2",
        }
    }

    /// Whether mosaic registration filters scenes by `eo:cloud_cover`.
    ///
    /// Land-cover collections carry no cloud metadata and are sorted by
    /// date alone.
    pub fn uses_cloud_filter(&self) -> bool {
        !matches!(
            self,
            DataProduct::LandCover9Classes | DataProduct::EsaWorldCover
        )
    }

    /// Whether cloud classification and replacement can run for this
    /// product. Only Sentinel-2 products have a reflectance companion the
    /// classifier understands.
    pub fn supports_cloud_detection(&self) -> bool {
        matches!(
            self,
            DataProduct::Rgb | DataProduct::Ndvi | DataProduct::B08 | DataProduct::Rgb16
        )
    }

    /// Product whose tiles are classified on behalf of this one.
    ///
    /// Its fourth band doubles as the validity (alpha) mask of a candidate.
    pub fn companion(&self) -> DataProduct {
        DataProduct::Rgb16
    }

    /// Default tile URL template with `{key}`, `{z}`, `{x}` and `{y}`
    /// placeholders.
    pub fn default_template(&self) -> String {
        let query = match self {
            DataProduct::Rgb => {
                "assets=visual&asset_bidx=visual%7C1%2C2%2C3&nodata=0&collection=sentinel-2-l2a&format=png"
            }
            DataProduct::Ndvi => {
                "expression=%28B08-B04%29%2F%28B08%2BB04%29&asset_as_band=True&rescale=-1%2C1&nodata=0&collection=sentinel-2-l2a&format=png"
            }
            DataProduct::B08 => "assets=B08&nodata=0&collection=sentinel-2-l2a&format=tif",
            DataProduct::Rgb16 => {
                "assets=B04&assets=B03&assets=B02&nodata=0&collection=sentinel-2-l2a&format=tif"
            }
            DataProduct::Rgb16Landsat => {
                "assets=red&assets=green&assets=blue&nodata=0&collection=landsat-c2-l2&format=tif"
            }
            DataProduct::NdviLandsat => {
                "expression=%28nir08-red%29%2F%28nir08%2Bred%29&asset_as_band=True&rescale=-1%2C1&nodata=0&collection=landsat-c2-l2&format=png"
            }
            DataProduct::LandCover9Classes => {
                "assets=data&colormap_name=io-lulc-9-class&exitwhenfull=False&skipcovered=False&collection=io-lulc-annual-v02&format=png"
            }
            DataProduct::EsaWorldCover => {
                "assets=map&colormap_name=esa-worldcover&exitwhenfull=False&skipcovered=False&collection=esa-worldcover&format=png"
            }
        };
        format!("{}?{}", PC_TILES, query)
    }

    /// Template for requests whose window starts on `start`.
    ///
    /// Scenes before 2022 lack the `visual` asset, so `RGB` falls back to a
    /// colour-formula rendering of bands 4/3/2.
    pub fn legacy_template(&self, start: NaiveDate) -> Option<String> {
        if *self == DataProduct::Rgb && start.year() < VISUAL_ASSET_FIRST_YEAR {
            return Some(format!(
                "{}?assets=B04&assets=B03&assets=B02&color_formula=Gamma+RGB+3.7+Saturation+1.5+Sigmoidal+RGB+15+0.35&nodata=0&collection=sentinel-2-l2a&format=png",
                PC_TILES
            ));
        }
        None
    }
}

impl fmt::Display for DataProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataProduct {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataProduct::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RasterError::UnknownProduct(s.to_string()))
    }
}
