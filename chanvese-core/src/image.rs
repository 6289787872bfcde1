// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Channel-planar floating point image buffer.
//!
//! Mirrors the memory layout expected by the original Chan-Vese routine: a
//! contiguous block of `width * height * channels` samples, ordered so that
//! the sample at pixel `(x, y)` of channel `k` sits at
//! `x + width * (y + height * k)`.

use image::{DynamicImage, GenericImageView};

use crate::error::{ChanVeseError, Result};

/// A scalar or multichannel image sampled on a `width x height` grid.
#[derive(Debug, Clone)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f64>,
}

impl Image {
    /// Build an image from a pre-populated channel-planar buffer.
    pub fn from_data(width: usize, height: usize, channels: usize, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }
        if channels == 0 {
            return Err(ChanVeseError::NoChannels);
        }
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(ChanVeseError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Image {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build an all-zero image of the given shape.
    pub fn zeros(width: usize, height: usize, channels: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }
        if channels == 0 {
            return Err(ChanVeseError::NoChannels);
        }
        Ok(Image {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        })
    }

    /// Convert a decoded image into a [0,1]-scaled `Image`, keeping RGB as
    /// three channels and grayscale as one.
    ///
    /// Performs the same truecolor/grayscale dispatch the teacher's CLI does
    /// when it inspects `image::open(path)`'s result before conversion.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 {
            return Err(ChanVeseError::InvalidDimensions { width, height });
        }

        let rgb = img.to_rgb8();
        let is_gray = rgb
            .pixels()
            .all(|p| p[0] == p[1] && p[1] == p[2]);

        if is_gray {
            let mut data = vec![0.0; width * height];
            for (x, y, p) in rgb.enumerate_pixels() {
                data[x as usize + width * y as usize] = p[0] as f64 / 255.0;
            }
            Image::from_data(width, height, 1, data)
        } else {
            let mut data = vec![0.0; width * height * 3];
            let plane = width * height;
            for (x, y, p) in rgb.enumerate_pixels() {
                let idx = x as usize + width * y as usize;
                data[idx] = p[0] as f64 / 255.0;
                data[idx + plane] = p[1] as f64 / 255.0;
                data[idx + 2 * plane] = p[2] as f64 / 255.0;
            }
            Image::from_data(width, height, 3, data)
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    fn index(&self, x: usize, y: usize, k: usize) -> usize {
        x + self.width * (y + self.height * k)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, k: usize) -> f64 {
        self.data[self.index(x, y, k)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, k: usize, value: f64) {
        let idx = self.index(x, y, k);
        self.data[idx] = value;
    }

    /// The contiguous slice holding channel `k`'s plane.
    pub fn channel(&self, k: usize) -> &[f64] {
        let start = self.height * self.width * k;
        &self.data[start..start + self.width * self.height]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Image::from_data(2, 2, 1, vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, ChanVeseError::BufferLength { .. }));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = Image::from_data(0, 2, 1, vec![]).unwrap_err();
        assert!(matches!(err, ChanVeseError::InvalidDimensions { .. }));
    }

    #[test]
    fn channel_planar_indexing_matches_offsets() {
        // width=2, height=2, channels=2: offset = x + W*(y + H*k)
        let data = vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0];
        let img = Image::from_data(2, 2, 2, data).unwrap();
        assert_eq!(img.get(0, 0, 0), 0.0);
        assert_eq!(img.get(1, 1, 0), 3.0);
        assert_eq!(img.get(0, 0, 1), 10.0);
        assert_eq!(img.get(1, 1, 1), 13.0);
    }
}
