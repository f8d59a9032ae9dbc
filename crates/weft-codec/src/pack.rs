//! 2-bit packing, four pixels per byte, most significant pixel first.

use weft_types::Result;

use crate::codec_error;

/// Packed bytes needed for one row of `width` pixels.
pub fn bytes_per_row(width: u32) -> usize {
    (width as usize + 3) / 4
}

pub fn packed_len(width: u32, height: u32) -> usize {
    bytes_per_row(width) * height as usize
}

/// Pack row-major levels. Each row starts on a fresh byte; bits of a row's
/// final byte with no pixel behind them stay zero.
pub fn pack_levels(levels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let width = width as usize;
    let row_bytes = bytes_per_row(width as u32);
    let mut packed = vec![0u8; row_bytes * height as usize];

    for y in 0..height as usize {
        for x in 0..width {
            let Some(level) = levels.get(y * width + x) else {
                continue;
            };
            let slot = x % 4;
            packed[y * row_bytes + x / 4] |= (level & 0x03) << (6 - slot * 2);
        }
    }
    packed
}

/// Inverse of [`pack_levels`]. Padding bits are skipped and bytes past the
/// last row are ignored.
pub fn unpack_levels(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = packed_len(width, height);
    if bytes.len() < expected {
        return Err(codec_error(format!(
            "snapshot holds {} bytes, {width}x{height} needs {expected}",
            bytes.len()
        )));
    }

    let width = width as usize;
    let row_bytes = bytes_per_row(width as u32);
    let mut levels = Vec::with_capacity(width * height as usize);
    for y in 0..height as usize {
        for x in 0..width {
            let byte = bytes[y * row_bytes + x / 4];
            levels.push((byte >> (6 - (x % 4) * 2)) & 0x03);
        }
    }
    Ok(levels)
}
