//! Grid layout and rendering for the snapshot history wall.

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::SnapshotCompressor;

/// Cell colour used when a stored snapshot cannot be decoded.
const BROKEN_CELL: Rgba<u8> = Rgba([51, 10, 10, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MosaicLayout {
    pub cols: u32,
    pub rows: u32,
    /// Side of one square cell in pixels.
    pub cell_size: f64,
    /// Snapshots that fit; older ones beyond this are dropped.
    pub shown: usize,
    pub empty_cells: usize,
}

impl MosaicLayout {
    pub fn total_cells(&self) -> usize {
        (self.cols * self.rows) as usize
    }
}

/// Fit `count` square cells into the viewport, densest first.
///
/// Returns `None` when there is nothing to show or no viewport.
pub fn plan_grid(viewport_width: u32, viewport_height: u32, count: usize) -> Option<MosaicLayout> {
    if count == 0 || viewport_width == 0 || viewport_height == 0 {
        return None;
    }
    let width = viewport_width as f64;
    let height = viewport_height as f64;
    let theoretical = (width * height / count as f64).sqrt();

    let cols = ((width / theoretical).floor() as u32).max(1);
    let max_rows = ((height / theoretical).floor() as u32).max(1);
    let mut rows = max_rows;
    let mut total = (cols * rows) as usize;

    let shown = if count > total {
        total
    } else {
        if count < total {
            let optimal_rows = ((count as u32) + cols - 1) / cols;
            if optimal_rows <= max_rows {
                rows = optimal_rows.max(1);
                total = (cols * rows) as usize;
            }
        }
        count
    };

    let cell_size = (width / cols as f64).min(height / rows as f64);
    Some(MosaicLayout {
        cols,
        rows,
        cell_size,
        shown,
        empty_cells: total - shown,
    })
}

/// Render snapshots (most recent first) onto a black canvas. Each snapshot is
/// turned a quarter clockwise and stretched into its cell.
pub fn render_mosaic(
    compressor: &SnapshotCompressor,
    snapshots: &[String],
    layout: &MosaicLayout,
    viewport_width: u32,
    viewport_height: u32,
) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(viewport_width, viewport_height, Rgba([0, 0, 0, 255]));
    let cell = (layout.cell_size.floor() as u32).max(1);

    for (position, hex_text) in snapshots.iter().take(layout.shown).enumerate() {
        let col = position as u32 % layout.cols;
        let row = position as u32 / layout.cols;
        let x = (col * cell) as i64;
        let y = (row * cell) as i64;

        let tile = match compressor.preview(hex_text) {
            Ok(image) => {
                let rotated = imageops::rotate90(&image);
                imageops::resize(&rotated, cell, cell, FilterType::Nearest)
            }
            Err(err) => {
                warn!("mosaic cell {position} unreadable: {err}");
                RgbaImage::from_pixel(cell, cell, BROKEN_CELL)
            }
        };
        imageops::overlay(&mut canvas, &tile, x, y);
    }

    debug!(
        "mosaic {}x{} cells, {} shown, {} empty",
        layout.cols, layout.rows, layout.shown, layout.empty_cells
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::frame::ImageFrame;

    #[test]
    fn nothing_to_plan_for_empty_history() {
        assert!(plan_grid(1920, 1080, 0).is_none());
        assert!(plan_grid(0, 1080, 10).is_none());
    }

    #[test]
    fn overflow_keeps_most_recent() {
        let layout = plan_grid(100, 100, 10).unwrap();
        // sqrt(10000 / 10) ~ 31.6 -> 3x3 grid.
        assert_eq!((layout.cols, layout.rows), (3, 3));
        assert_eq!(layout.shown, 9);
        assert_eq!(layout.empty_cells, 0);
    }

    #[test]
    fn underflow_shrinks_rows() {
        let layout = plan_grid(400, 100, 3).unwrap();
        // size ~115.5 -> 3 cols, 1 row.
        assert_eq!(layout.cols, 3);
        assert_eq!(layout.rows, 1);
        assert_eq!(layout.shown, 3);
        assert_eq!(layout.empty_cells, 0);
        assert!((layout.cell_size - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn narrow_viewport_still_gets_a_column() {
        let layout = plan_grid(10, 1000, 1).unwrap();
        assert_eq!(layout.cols, 1);
        assert!(layout.rows >= 1);
        assert_eq!(layout.shown, 1);
    }

    #[test]
    fn render_places_tiles_and_marks_broken_cells() {
        let compressor = SnapshotCompressor::with_dimensions(4, 4);
        let white = compressor.compress(&ImageFrame::filled(4, 4, [255; 3]));
        let snapshots = vec![white, "not-hex".to_string()];
        let layout = plan_grid(40, 20, snapshots.len()).unwrap();
        let canvas = render_mosaic(&compressor, &snapshots, &layout, 40, 20);

        assert_eq!(canvas.dimensions(), (40, 20));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        let cell = layout.cell_size.floor() as u32;
        assert_eq!(canvas.get_pixel(cell, 0), &BROKEN_CELL);
    }
}
