//! Ordered dithering down to four grey levels.

/// 4x4 Bayer threshold matrix, unscaled.
pub const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

pub const MATRIX_SCALE: i32 = 4;
pub const DITHER_BIAS: i32 = 32;

/// Level cut points: values below the first map to 0, and so on.
pub const LEVEL_CUTS: [i32; 3] = [64, 128, 192];

/// Signed amount added to a luma value at `(x, y)` before quantisation.
pub fn offset_at(x: usize, y: usize) -> i32 {
    BAYER_4X4[y % 4][x % 4] as i32 * MATRIX_SCALE - DITHER_BIAS
}

pub fn quantize_value(value: i32) -> u8 {
    if value < LEVEL_CUTS[0] {
        0
    } else if value < LEVEL_CUTS[1] {
        1
    } else if value < LEVEL_CUTS[2] {
        2
    } else {
        3
    }
}

pub fn dither_level(luma: u8, x: usize, y: usize) -> u8 {
    quantize_value(luma as i32 + offset_at(x, y))
}

/// Dither a row-major luma plane into 2-bit levels.
pub fn dither_plane(luma: &[u8], width: usize) -> Vec<u8> {
    luma.iter()
        .enumerate()
        .map(|(idx, &value)| dither_level(value, idx % width, idx / width))
        .collect()
}
