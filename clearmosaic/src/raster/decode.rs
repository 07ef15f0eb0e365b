//! Tile decoding.
//!
//! Byte products arrive as PNG and are decoded with the `image` crate.
//! Reflectance products arrive as 16-bit TIFF and are decoded with the
//! `tiff` crate. Both decoders return interleaved samples, which are split
//! into the band-sequential layout of [`TileBuffer`].

use std::io::Cursor;

use image::ImageFormat;
use tiff::decoder::{Decoder, DecodingResult};

use super::{RasterError, TileBuffer, TileEncoding};

/// Decodes an encoded tile into a buffer with exactly `bands` bands.
pub fn decode_tile(
    bytes: &[u8],
    encoding: TileEncoding,
    bands: u32,
) -> Result<TileBuffer, RasterError> {
    match encoding {
        TileEncoding::Png => decode_png(bytes, bands),
        TileEncoding::Tiff => decode_tiff(bytes, bands),
    }
}

/// Decodes a PNG tile.
///
/// The image is converted to the channel layout matching `bands`
/// (1 = gray, 2 = gray + alpha, 3 = RGB, 4 = RGBA) before splitting.
pub fn decode_png(bytes: &[u8], bands: u32) -> Result<TileBuffer, RasterError> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| RasterError::Decode(format!("PNG: {}", e)))?;

    let (width, height, raw) = match bands {
        1 => {
            let buf = img.to_luma8();
            (buf.width(), buf.height(), buf.into_raw())
        }
        2 => {
            let buf = img.to_luma_alpha8();
            (buf.width(), buf.height(), buf.into_raw())
        }
        3 => {
            let buf = img.to_rgb8();
            (buf.width(), buf.height(), buf.into_raw())
        }
        4 => {
            let buf = img.to_rgba8();
            (buf.width(), buf.height(), buf.into_raw())
        }
        other => {
            return Err(RasterError::UnsupportedFormat(format!(
                "PNG tiles cannot carry {} bands",
                other
            )))
        }
    };

    deinterleave(raw.into_iter().map(i32::from), width, height, bands, bands)
}

/// Decodes a TIFF tile.
///
/// Tiles with more samples per pixel than `bands` keep the leading ones.
pub fn decode_tiff(bytes: &[u8], bands: u32) -> Result<TileBuffer, RasterError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))
        .map_err(|e| RasterError::Decode(format!("TIFF: {}", e)))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| RasterError::Decode(format!("TIFF: {}", e)))?;
    let image = decoder
        .read_image()
        .map_err(|e| RasterError::Decode(format!("TIFF: {}", e)))?;

    let samples: Vec<i32> = match image {
        DecodingResult::U8(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::I8(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(i32::from).collect(),
        DecodingResult::I32(v) => v,
        DecodingResult::F32(v) => v.into_iter().map(|s| s.round() as i32).collect(),
        _ => {
            return Err(RasterError::UnsupportedFormat(
                "TIFF sample format".to_string(),
            ))
        }
    };

    let pixels = width as usize * height as usize;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(RasterError::Decode(format!(
            "TIFF: {} samples do not fit {}x{} pixels",
            samples.len(),
            width,
            height
        )));
    }
    let channels = (samples.len() / pixels) as u32;
    if channels < bands {
        return Err(RasterError::BandMismatch {
            expected: bands,
            actual: channels,
        });
    }

    deinterleave(samples.into_iter(), width, height, channels, bands)
}

/// Splits pixel-interleaved samples into band-sequential planes, keeping the
/// first `bands` of `channels` samples per pixel.
fn deinterleave(
    interleaved: impl Iterator<Item = i32>,
    width: u32,
    height: u32,
    channels: u32,
    bands: u32,
) -> Result<TileBuffer, RasterError> {
    let plane = width as usize * height as usize;
    let channels = channels as usize;
    let band_count = bands as usize;

    let mut count = 0usize;
    let mut planar = vec![0i32; plane * band_count];
    for (i, sample) in interleaved.enumerate() {
        let pixel = i / channels;
        let channel = i % channels;
        if pixel >= plane {
            break;
        }
        if channel < band_count {
            planar[channel * plane + pixel] = sample;
        }
        count = i + 1;
    }

    if count < plane * channels {
        return Err(RasterError::SampleCount {
            expected: plane * channels,
            actual: count,
        });
    }

    TileBuffer::from_samples(width, height, bands, planar)
}
