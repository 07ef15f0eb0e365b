//! GeoTIFF output.
//!
//! Writes a strip-organised, uncompressed, pixel-interleaved TIFF with the
//! GeoTIFF tags needed to place it in EPSG:3857:
//!
//! - `ModelPixelScale` (33550): `[res, res, 0]`
//! - `ModelTiepoint` (33922): pixel `(0, 0)` tied to the canvas origin
//! - `GeoKeyDirectory` (34735): projected model, pixel-is-area, EPSG code
//! - `GeoAsciiParams` (34737): citation string
//!
//! Strips are pulled from a callback so a raster larger than memory can be
//! written one tile row at a time.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKindStandard};
use tiff::tags::Tag;
use tracing::debug;

use crate::canvas::{CanvasError, RasterLayout};
use crate::raster::PixelType;

const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GEOTIFF_GEOASCIIPARAMS: u16 = 34737;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GT_CITATION_GEO_KEY: u16 = 1026;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const RASTER_PIXEL_IS_AREA: u16 = 1;

const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;
const EXTRA_SAMPLE_UNSPECIFIED: u16 = 0;
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;
const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;

const CITATION: &str = "WGS 84 / Pseudo-Mercator|";

/// Writes a GeoTIFF described by `layout` to `path`.
///
/// `strip(first_row, rows)` must return `rows × width × bands`
/// pixel-interleaved samples starting at `first_row`. Samples are clamped
/// to the layout's pixel type.
pub fn write_geotiff<F>(
    path: &Path,
    layout: &RasterLayout,
    rows_per_strip: u32,
    mut strip: F,
) -> Result<(), CanvasError>
where
    F: FnMut(u32, u32) -> Result<Vec<i32>, CanvasError>,
{
    layout.validate()?;
    if rows_per_strip == 0 {
        return Err(CanvasError::InvalidLayout("rows per strip is zero".into()));
    }

    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(writer)?;
    let mut dir = encoder.new_directory()?;

    let bands = layout.bands as usize;
    let rows_per_strip = rows_per_strip.min(layout.height);

    dir.write_tag(Tag::ImageWidth, layout.width)?;
    dir.write_tag(Tag::ImageLength, layout.height)?;
    let bits = vec![layout.pixel_type.bits_per_sample(); bands];
    dir.write_tag(Tag::BitsPerSample, bits.as_slice())?;
    dir.write_tag(Tag::Compression, 1u16)?;
    dir.write_tag(Tag::SamplesPerPixel, layout.bands as u16)?;
    dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
    dir.write_tag(Tag::RowsPerStrip, rows_per_strip)?;

    let (photometric, extra) = sample_interpretation(layout);
    dir.write_tag(Tag::PhotometricInterpretation, photometric)?;
    if !extra.is_empty() {
        dir.write_tag(Tag::ExtraSamples, extra.as_slice())?;
    }

    let sample_format = match layout.pixel_type {
        PixelType::Byte => SAMPLE_FORMAT_UINT,
        PixelType::Int16 => SAMPLE_FORMAT_INT,
    };
    dir.write_tag(Tag::SampleFormat, vec![sample_format; bands].as_slice())?;

    write_geo_tags(&mut dir, layout)?;

    let mut offsets: Vec<u32> = Vec::new();
    let mut byte_counts: Vec<u32> = Vec::new();
    let mut row = 0u32;
    while row < layout.height {
        let rows = rows_per_strip.min(layout.height - row);
        let samples = strip(row, rows)?;
        let expected = rows as usize * layout.width as usize * bands;
        if samples.len() != expected {
            return Err(CanvasError::InvalidLayout(format!(
                "strip at row {} has {} samples, expected {}",
                row,
                samples.len(),
                expected
            )));
        }

        let offset = match layout.pixel_type {
            PixelType::Byte => {
                let data: Vec<u8> = samples
                    .iter()
                    .map(|&s| PixelType::Byte.clamp(s) as u8)
                    .collect();
                dir.write_data(data.as_slice())?
            }
            PixelType::Int16 => {
                let data: Vec<i16> = samples
                    .iter()
                    .map(|&s| PixelType::Int16.clamp(s) as i16)
                    .collect();
                dir.write_data(data.as_slice())?
            }
        };
        let offset = u32::try_from(offset).map_err(|_| {
            CanvasError::Tiff(format!("strip offset {} exceeds classic TIFF range", offset))
        })?;
        offsets.push(offset);
        byte_counts.push((expected * layout.pixel_type.bytes_per_sample()) as u32);
        row += rows;
    }

    dir.write_tag(Tag::StripOffsets, offsets.as_slice())?;
    dir.write_tag(Tag::StripByteCounts, byte_counts.as_slice())?;
    dir.finish()?;

    debug!(
        path = %path.display(),
        width = layout.width,
        height = layout.height,
        strips = offsets.len(),
        "Wrote GeoTIFF"
    );
    Ok(())
}

/// Photometric interpretation and extra-sample roles for a layout.
///
/// Byte rasters with three or more bands are RGB, with a fourth band
/// treated as alpha. Everything else is a grayscale stack.
fn sample_interpretation(layout: &RasterLayout) -> (u16, Vec<u16>) {
    let bands = layout.bands as usize;
    if layout.pixel_type == PixelType::Byte && bands >= 3 {
        let mut extra = vec![EXTRA_SAMPLE_UNSPECIFIED; bands - 3];
        if let Some(first) = extra.first_mut() {
            *first = EXTRA_SAMPLE_UNASSOCIATED_ALPHA;
        }
        (PHOTOMETRIC_RGB, extra)
    } else {
        (
            PHOTOMETRIC_BLACK_IS_ZERO,
            vec![EXTRA_SAMPLE_UNSPECIFIED; bands.saturating_sub(1)],
        )
    }
}

fn write_geo_tags<W: std::io::Write + std::io::Seek>(
    dir: &mut DirectoryEncoder<'_, W, TiffKindStandard>,
    layout: &RasterLayout,
) -> Result<(), CanvasError> {
    let geo = &layout.georeference;

    let pixel_scale = [geo.resolution, geo.resolution, 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, pixel_scale.as_slice())?;

    let tiepoint = [0.0, 0.0, 0.0, geo.origin_x, geo.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())?;

    dir.write_tag(
        Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY),
        geokey_directory(geo.epsg).as_slice(),
    )?;
    dir.write_tag(Tag::Unknown(GEOTIFF_GEOASCIIPARAMS), CITATION)?;
    Ok(())
}

/// `[version, revision, minor, count, (key, location, count, value)...]`
fn geokey_directory(epsg: u16) -> Vec<u16> {
    let citation_len = CITATION.len() as u16;
    vec![
        1,
        1,
        0,
        4,
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        MODEL_TYPE_PROJECTED,
        GT_RASTER_TYPE_GEO_KEY,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
        GT_CITATION_GEO_KEY,
        GEOTIFF_GEOASCIIPARAMS,
        citation_len,
        0,
        PROJECTED_CS_TYPE_GEO_KEY,
        0,
        1,
        epsg,
    ]
}
