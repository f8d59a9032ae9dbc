//! Procedural stand-ins for the installation's generative visuals.
//!
//! Each routine is an oscillator stripe pattern, displaced by a modulation
//! field, colour-gained, inverted and slightly saturated. Rendering is pure:
//! the same `(routine, size, t)` always yields the same frame.

use std::f32::consts::TAU;

use weft_types::{frame::ImageFrame, textures::TextureCatalog};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modulation {
    Noise { scale: f32, speed: f32 },
    Cellular { scale: f32, speed: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub frequency: f32,
    pub sync: f32,
    pub offset: f32,
    pub gains: [f32; 3],
    pub modulation: Modulation,
    pub amount: f32,
    pub saturation: f32,
}

impl Oscillator {
    pub fn render(&self, width: u32, height: u32, t: f32) -> ImageFrame {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width.max(1) as f32;
                let v = (y as f32 + 0.5) / height.max(1) as f32;
                let [r, g, b] = self.sample(u, v, t);
                data.extend_from_slice(&[to_byte(r), to_byte(g), to_byte(b), 255]);
            }
        }
        ImageFrame::from_rgba(width, height, data)
    }

    fn sample(&self, u: f32, v: f32, t: f32) -> [f32; 3] {
        let field = match self.modulation {
            Modulation::Noise { scale, speed } => value_noise(u * scale, v * scale, t * speed),
            Modulation::Cellular { scale, speed } => {
                cellular(u * scale * 4.0, v * scale * 4.0, t * speed)
            }
        };
        let x = u + (field - 0.5) * self.amount;

        let phase = (x + t * self.sync) * self.frequency;
        let shift = self.offset * TAU / 3.0;
        let raw = [wave(phase - shift), wave(phase), wave(phase + shift)];

        let mut rgb = [0.0; 3];
        for (channel, (value, gain)) in rgb.iter_mut().zip(raw.iter().zip(self.gains)) {
            *channel = 1.0 - (value * gain).clamp(0.0, 1.0);
        }
        saturate(rgb, self.saturation)
    }
}

/// Ordered set of routines addressed by activation index.
#[derive(Debug, Clone)]
pub struct TextureRegistry {
    routines: Vec<Oscillator>,
    catalog: TextureCatalog,
}

impl TextureRegistry {
    pub fn new(routines: Vec<Oscillator>, catalog: TextureCatalog) -> Self {
        Self { routines, catalog }
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn catalog(&self) -> &TextureCatalog {
        &self.catalog
    }

    pub fn get(&self, index: usize) -> Option<&Oscillator> {
        self.routines.get(index)
    }

    /// Render routine `index`, or an empty frame when it does not exist.
    pub fn render(&self, index: usize, width: u32, height: u32, t: f32) -> ImageFrame {
        self.get(index)
            .map(|routine| routine.render(width, height, t))
            .unwrap_or_else(ImageFrame::empty)
    }
}

impl Default for TextureRegistry {
    fn default() -> Self {
        let routines = vec![
            Oscillator {
                frequency: 12.0,
                sync: 0.1,
                offset: 0.4,
                gains: [6.4, 3.6, 1.0],
                modulation: Modulation::Noise { scale: 3.0, speed: 0.1 },
                amount: 0.1,
                saturation: 1.1,
            },
            Oscillator {
                frequency: 10.0,
                sync: 0.08,
                offset: 0.8,
                gains: [2.0, 3.2, 0.9],
                modulation: Modulation::Noise { scale: 4.0, speed: 0.1 },
                amount: 0.1,
                saturation: 1.1,
            },
            Oscillator {
                frequency: 12.0,
                sync: 0.1,
                offset: 0.4,
                gains: [1.5, 7.2, 3.2],
                modulation: Modulation::Noise { scale: 1.0, speed: 0.1 },
                amount: 0.5,
                saturation: 1.1,
            },
            Oscillator {
                frequency: 10.0,
                sync: 0.14,
                offset: 0.4,
                gains: [2.0, 7.2, 3.2],
                modulation: Modulation::Cellular { scale: 0.8, speed: 0.1 },
                amount: 0.3,
                saturation: 1.1,
            },
        ];
        Self::new(routines, TextureCatalog::default())
    }
}

fn wave(phase: f32) -> f32 {
    phase.sin() * 0.5 + 0.5
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn saturate([r, g, b]: [f32; 3], amount: f32) -> [f32; 3] {
    let luma = 0.2125 * r + 0.7154 * g + 0.0721 * b;
    [r, g, b].map(|c| (luma + (c - luma) * amount).clamp(0.0, 1.0))
}

fn hash(x: f32, y: f32) -> f32 {
    let h = (x * 127.1 + y * 311.7).sin() * 43_758.547;
    h - h.floor()
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Bilinear value noise in `[0, 1]`, drifting with `z`.
fn value_noise(x: f32, y: f32, z: f32) -> f32 {
    let (x, y) = (x + z, y - z * 0.5);
    let (ix, iy) = (x.floor(), y.floor());
    let (fx, fy) = (smooth(x - ix), smooth(y - iy));
    let a = hash(ix, iy);
    let b = hash(ix + 1.0, iy);
    let c = hash(ix, iy + 1.0);
    let d = hash(ix + 1.0, iy + 1.0);
    let top = a + (b - a) * fx;
    let bottom = c + (d - c) * fx;
    top + (bottom - top) * fy
}

/// Distance to the nearest moving feature point, clamped to `[0, 1]`.
fn cellular(x: f32, y: f32, z: f32) -> f32 {
    let (ix, iy) = (x.floor(), y.floor());
    let mut nearest = f32::MAX;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let cx = ix + dx as f32;
            let cy = iy + dy as f32;
            let px = cx + 0.5 + 0.5 * (z + TAU * hash(cx, cy)).sin();
            let py = cy + 0.5 + 0.5 * (z + TAU * hash(cy, cx)).cos();
            let dist = ((px - x).powi(2) + (py - y).powi(2)).sqrt();
            nearest = nearest.min(dist);
        }
    }
    nearest.clamp(0.0, 1.0)
}
