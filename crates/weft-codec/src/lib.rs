//! Snapshot codec: resample, grey, dither and pack a frame into 2-bit hex.

pub mod dither;
pub mod mosaic;
pub mod pack;

use image::{imageops, imageops::FilterType, ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use weft_types::{config::CodecConfig, frame::ImageFrame, Result, WeftError};

/// Four-tone grey palette indexed by level.
pub const PALETTE: [[u8; 3]; 4] = [[0, 0, 0], [85, 85, 85], [170, 170, 170], [255, 255, 255]];

/// A quantised frame in its packed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedSnapshot {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl CompressedSnapshot {
    pub fn from_levels(levels: &[u8], width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes: pack::pack_levels(levels, width, height),
        }
    }

    pub fn from_hex(hex_text: &str, width: u32, height: u32) -> Result<Self> {
        let bytes = hex::decode(hex_text.trim())
            .map_err(|err| codec_error(format!("snapshot is not valid hex: {err}")))?;
        let expected = pack::packed_len(width, height);
        if bytes.len() < expected {
            return Err(codec_error(format!(
                "snapshot holds {} bytes, {width}x{height} needs {expected}",
                bytes.len()
            )));
        }
        Ok(Self {
            width,
            height,
            bytes: bytes[..expected].to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }

    pub fn levels(&self) -> Result<Vec<u8>> {
        pack::unpack_levels(&self.bytes, self.width, self.height)
    }
}

/// Lossy fixed-size compressor. Holds only its target dimensions, so one
/// instance can serve concurrent callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCompressor {
    target_width: u32,
    target_height: u32,
}

impl SnapshotCompressor {
    pub fn new(config: CodecConfig) -> Self {
        Self::with_dimensions(config.target_width, config.target_height)
    }

    pub fn with_dimensions(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    pub fn target_height(&self) -> u32 {
        self.target_height
    }

    /// Hex characters produced by every successful compression.
    pub fn encoded_len(&self) -> usize {
        2 * pack::packed_len(self.target_width, self.target_height)
    }

    /// Compress a frame to uppercase hex. Returns an empty string when the
    /// frame cannot be captured; callers treat that as "no snapshot".
    pub fn compress(&self, frame: &ImageFrame) -> String {
        match self.try_compress(frame) {
            Ok(snapshot) => snapshot.to_hex(),
            Err(err) => {
                warn!("snapshot capture failed: {err}");
                String::new()
            }
        }
    }

    pub fn try_compress(&self, frame: &ImageFrame) -> Result<CompressedSnapshot> {
        let resampled = self.resample(frame)?;
        let luma: Vec<u8> = resampled.pixels().map(luma_of).collect();
        let levels = dither::dither_plane(&luma, self.target_width as usize);
        debug!(
            "compressed {}x{} frame into {}x{} levels",
            frame.width, frame.height, self.target_width, self.target_height
        );
        Ok(CompressedSnapshot::from_levels(
            &levels,
            self.target_width,
            self.target_height,
        ))
    }

    /// Parse hex text back into one level (0-3) per target pixel.
    pub fn decompress(&self, hex_text: &str) -> Result<Vec<u8>> {
        CompressedSnapshot::from_hex(hex_text, self.target_width, self.target_height)?.levels()
    }

    /// Map levels onto the opaque grey palette.
    pub fn levels_to_image(&self, levels: &[u8]) -> ImageFrame {
        let mut data = Vec::with_capacity(levels.len() * 4);
        for &level in levels {
            let [r, g, b] = PALETTE[(level & 0x03) as usize];
            data.extend_from_slice(&[r, g, b, 255]);
        }
        ImageFrame::from_rgba(self.target_width, self.target_height, data)
    }

    /// Decode hex text straight into a palette image.
    pub fn preview(&self, hex_text: &str) -> Result<RgbaImage> {
        let levels = self.decompress(hex_text)?;
        let frame = self.levels_to_image(&levels);
        to_rgba_image(&frame)
    }

    fn resample(&self, frame: &ImageFrame) -> Result<RgbaImage> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(codec_error("target dimensions must be positive"));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(codec_error(format!(
                "source frame has no pixels ({}x{})",
                frame.width, frame.height
            )));
        }
        let source = to_rgba_image(frame)?;
        if source.dimensions() == (self.target_width, self.target_height) {
            return Ok(source);
        }
        Ok(imageops::resize(
            &source,
            self.target_width,
            self.target_height,
            FilterType::Triangle,
        ))
    }
}

impl Default for SnapshotCompressor {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

/// Rec. 601 luma rounded to the nearest integer.
pub fn luma_of(pixel: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    let weighted = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    weighted.round().clamp(0.0, 255.0) as u8
}

pub fn to_rgba_image(frame: &ImageFrame) -> Result<RgbaImage> {
    ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(
        || {
            codec_error(format!(
                "frame buffer of {} bytes does not match {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        },
    )
}

pub fn codec_error(message: impl Into<String>) -> WeftError {
    WeftError::Codec(message.into())
}
