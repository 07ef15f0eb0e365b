//! Disk-backed raster target.
//!
//! Samples live in a raw, pixel-interleaved scratch file next to the output
//! (`<output>.part`). Every block read or write re-opens the file, so memory
//! use stays bounded by the block being transferred. [`DiskCanvas::finish`]
//! streams the scratch file into the final GeoTIFF one strip at a time and
//! removes it. A canvas dropped without finishing removes its scratch file.
//!
//! Scratch layout, for pixel `(col, row)` and band `b`:
//!
//! ```text
//! offset = ((row * width + col) * bands + b) * bytes_per_sample
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{CanvasError, RasterLayout, RasterTarget};
use crate::geotiff;
use crate::raster::{PixelType, TileBuffer};

/// Raster backed by a scratch file and finalised into a GeoTIFF.
pub struct DiskCanvas {
    layout: RasterLayout,
    output: PathBuf,
    scratch: PathBuf,
    lock: Mutex<()>,
}

impl DiskCanvas {
    /// Creates a zero-filled canvas that will be written to `output`.
    ///
    /// An existing file at `output` is replaced on [`finish`](Self::finish).
    pub fn create(output: impl Into<PathBuf>, layout: RasterLayout) -> Result<Self, CanvasError> {
        layout.validate()?;
        let output = output.into();
        let scratch = scratch_path(&output);

        let size = layout.width as u64
            * layout.height as u64
            * layout.bands as u64
            * layout.pixel_type.bytes_per_sample() as u64;
        let file = File::create(&scratch)?;
        file.set_len(size)?;

        debug!(
            path = %scratch.display(),
            width = layout.width,
            height = layout.height,
            bands = layout.bands,
            "Created scratch raster"
        );

        Ok(Self {
            layout,
            output,
            scratch,
            lock: Mutex::new(()),
        })
    }

    /// Final GeoTIFF path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Converts the scratch file into the output GeoTIFF, one strip of
    /// `rows_per_strip` rows at a time, and deletes the scratch file.
    pub fn finish(self, rows_per_strip: u32) -> Result<PathBuf, CanvasError> {
        let _guard = self.lock.lock();
        let mut file = File::open(&self.scratch)?;
        let row_bytes = self.row_bytes();
        let pixel_type = self.layout.pixel_type;

        geotiff::write_geotiff(&self.output, &self.layout, rows_per_strip, |row, rows| {
            let mut raw = vec![0u8; row_bytes * rows as usize];
            file.seek(SeekFrom::Start(row as u64 * row_bytes as u64))?;
            file.read_exact(&mut raw)?;
            Ok(decode_samples(&raw, pixel_type))
        })?;

        drop(file);
        if let Err(e) = fs::remove_file(&self.scratch) {
            warn!(path = %self.scratch.display(), error = %e, "Failed to remove scratch raster");
        }

        Ok(self.output.clone())
    }

    fn row_bytes(&self) -> usize {
        self.layout.width as usize
            * self.layout.bands as usize
            * self.layout.pixel_type.bytes_per_sample()
    }

    fn offset(&self, col: u32, row: u32) -> u64 {
        (row as u64 * self.layout.width as u64 + col as u64)
            * self.layout.bands as u64
            * self.layout.pixel_type.bytes_per_sample() as u64
    }

    fn open(&self) -> Result<File, CanvasError> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.scratch)?)
    }
}

impl RasterTarget for DiskCanvas {
    fn layout(&self) -> RasterLayout {
        self.layout
    }

    fn write_block(&self, x: u32, y: u32, block: &TileBuffer) -> Result<(), CanvasError> {
        self.layout
            .check_block(x, y, block.width(), block.height(), block.bands())?;
        let pixel_type = self.layout.pixel_type;
        let bands = block.bands();

        let _guard = self.lock.lock();
        let mut file = self.open()?;
        let mut segment = Vec::with_capacity(
            block.width() as usize * bands as usize * pixel_type.bytes_per_sample(),
        );

        for row in 0..block.height() {
            segment.clear();
            for col in 0..block.width() {
                for band in 0..bands {
                    encode_sample(&mut segment, block.get(band, col, row), pixel_type);
                }
            }
            file.seek(SeekFrom::Start(self.offset(x, y + row)))?;
            file.write_all(&segment)?;
        }
        Ok(())
    }

    fn read_block(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<TileBuffer, CanvasError> {
        let bands = self.layout.bands;
        self.layout.check_block(x, y, width, height, bands)?;
        let pixel_type = self.layout.pixel_type;

        let _guard = self.lock.lock();
        let mut file = self.open()?;
        let mut block = TileBuffer::new(width, height, bands);
        let mut raw = vec![0u8; width as usize * bands as usize * pixel_type.bytes_per_sample()];

        for row in 0..height {
            file.seek(SeekFrom::Start(self.offset(x, y + row)))?;
            file.read_exact(&mut raw)?;
            let samples = decode_samples(&raw, pixel_type);
            for col in 0..width {
                for band in 0..bands {
                    block.set(band, col, row, samples[(col * bands + band) as usize]);
                }
            }
        }
        Ok(block)
    }

    fn flush(&self) -> Result<(), CanvasError> {
        let _guard = self.lock.lock();
        self.open()?.sync_data()?;
        Ok(())
    }
}

impl Drop for DiskCanvas {
    fn drop(&mut self) {
        if !self.scratch.exists() {
            return;
        }
        match fs::remove_file(&self.scratch) {
            Ok(()) => debug!(path = %self.scratch.display(), "Discarded scratch raster"),
            Err(e) => {
                warn!(path = %self.scratch.display(), error = %e, "Failed to remove scratch raster")
            }
        }
    }
}

fn scratch_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

fn encode_sample(out: &mut Vec<u8>, value: i32, pixel_type: PixelType) {
    match pixel_type {
        PixelType::Byte => out.push(pixel_type.clamp(value) as u8),
        PixelType::Int16 => out.extend_from_slice(&(pixel_type.clamp(value) as i16).to_le_bytes()),
    }
}

fn decode_samples(raw: &[u8], pixel_type: PixelType) -> Vec<i32> {
    match pixel_type {
        PixelType::Byte => raw.iter().map(|&b| b as i32).collect(),
        PixelType::Int16 => raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
            .collect(),
    }
}
