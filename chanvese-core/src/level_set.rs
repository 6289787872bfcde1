// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The level set function Φ whose sign encodes the segmentation.

use std::f64::consts::PI;

use image::DynamicImage;

use crate::error::{ChanVeseError, Result};

/// A `width x height` scalar field. `Φ(x,y) >= 0` marks "inside" the
/// segmentation, `Φ(x,y) < 0` marks "outside". The zero level is the
/// contour. Φ never needs reinitialization to a signed-distance function;
/// the semi-implicit solver tolerates arbitrary values.
#[derive(Debug, Clone)]
pub struct LevelSet {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl LevelSet {
    pub fn from_data(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }
        if data.len() != width * height {
            return Err(ChanVeseError::BufferLength {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(LevelSet {
            width,
            height,
            data,
        })
    }

    pub fn zeros(width: usize, height: usize) -> Result<Self> {
        Self::from_data(width, height, vec![0.0; width * height])
    }

    /// Default initialization: `sin(pi*x/5) * sin(pi*y/5)`, a regular grid
    /// of small alternating-sign patches.
    pub fn init_default(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push((x as f64 * PI / 5.0).sin() * (y as f64 * PI / 5.0).sin());
            }
        }
        LevelSet::from_data(width, height, data)
    }

    /// Load Φ₀ from a grayscale image, rescaling its [0,1] values to
    /// [-4,4] via `Φ ← 4*(2*Φ - 1)`, matching the original CLI's `phi0:`
    /// option (`PhiRescale` in `chanvesecli.c`).
    pub fn from_image(img: &DynamicImage) -> Result<Self> {
        let gray = img.to_luma8();
        let width = gray.width() as usize;
        let height = gray.height() as usize;
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }
        let mut data = vec![0.0; width * height];
        for (x, y, p) in gray.enumerate_pixels() {
            let normalized = p[0] as f64 / 255.0;
            data[x as usize + width * y as usize] = 4.0 * (2.0 * normalized - 1.0);
        }
        LevelSet::from_data(width, height, data)
    }

    /// Load Φ₀ from a plain whitespace-separated text matrix, `height`
    /// rows of `width` numbers each. Mirrors the original's fallback to
    /// `ReadMatrixFromFile` for non-image Φ₀ inputs.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut data = Vec::new();
        let mut width = None;
        let mut height = 0usize;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse::<f64>().map_err(|_| ChanVeseError::EmptyImage))
                .collect::<Result<_>>()?;
            match width {
                None => width = Some(values.len()),
                Some(w) if w != values.len() => return Err(ChanVeseError::EmptyImage),
                _ => {}
            }
            data.extend(values);
            height += 1;
        }
        let width = width.ok_or(ChanVeseError::EmptyImage)?;
        LevelSet::from_data(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[x + self.width * y]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        let idx = x + self.width * y;
        self.data[idx] = value;
    }

    #[inline]
    pub fn is_inside(&self, x: usize, y: usize) -> bool {
        self.get(x, y) >= 0.0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_init_is_sinusoidal_grid() {
        let phi = LevelSet::init_default(8, 8).unwrap();
        assert_eq!(phi.get(0, 0), 0.0);
        let expected = (5.0_f64 * PI / 5.0).sin() * (5.0_f64 * PI / 5.0).sin();
        assert!((phi.get(5, 5) - expected).abs() < 1e-12);
    }

    #[test]
    fn rescale_spans_minus_four_to_four() {
        let img = DynamicImage::new_luma8(2, 1);
        let phi = LevelSet::from_image(&img).unwrap();
        // All-zero luma maps to normalized 0.0 -> 4*(2*0 - 1) = -4.
        assert_eq!(phi.get(0, 0), -4.0);
    }

    #[test]
    fn text_matrix_roundtrip() {
        let phi = LevelSet::from_text("1 2\n3 4\n").unwrap();
        assert_eq!(phi.width(), 2);
        assert_eq!(phi.height(), 2);
        assert_eq!(phi.get(1, 1), 4.0);
    }
}
