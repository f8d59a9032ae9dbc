use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A captured RGBA frame, row-major, four bytes per pixel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    /// Solid frame filled with one opaque colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self::from_rgba(width, height, data)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// True when the dimensions are positive and the buffer matches them.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_frame_is_well_formed() {
        let frame = ImageFrame::filled(3, 2, [10, 20, 30]);
        assert!(frame.is_well_formed());
        assert_eq!(&frame.data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn empty_and_mismatched_frames_are_rejected() {
        assert!(!ImageFrame::empty().is_well_formed());
        let frame = ImageFrame::from_rgba(2, 2, vec![0; 12]);
        assert!(!frame.is_well_formed());
    }
}
