// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Median-cut color quantization, reducing a truecolor RGB image to a
//! palette of at most 256 colors for GIF encoding.

use log::warn;

use crate::error::{ChanVeseError, Result};

/// An axis-aligned box in RGB space, tracking which pixels fall inside it
/// during the split search.
#[derive(Debug, Clone, Copy)]
struct BBox {
    min: [i32; 3],
    max: [i32; 3],
    num_pixels: u64,
    volume: u64,
}

impl BBox {
    fn volume(min: [i32; 3], max: [i32; 3]) -> u64 {
        ((max[0] - min[0] + 1) as u64)
            * ((max[1] - min[1] + 1) as u64)
            * ((max[2] - min[2] + 1) as u64)
    }

    fn contains(&self, pixel: [u8; 3]) -> bool {
        (0..3).all(|c| self.min[c] <= pixel[c] as i32 && pixel[c] as i32 <= self.max[c])
    }
}

/// The outcome of color-quantizing an image: one palette index per pixel
/// plus the palette itself.
#[derive(Debug, Clone)]
pub struct QuantizeResult {
    pub indices: Vec<u8>,
    pub palette: Vec<[u8; 3]>,
}

/// Quantize `rgb` (one `[R,G,B]` triple per pixel) to at most `num_colors`
/// distinct colors using median-cut box splitting.
///
/// The resulting palette may have fewer than `num_colors` entries when the
/// image has too little color variation to keep splitting (every remaining
/// box has volume <= 2), and `num_colors == 0` is not itself an error: it
/// just never enters the split loop, leaving the single bounding box over
/// all pixels as the one-entry palette — matching `Rgb2Ind`, which only
/// rejects `NumColors > 256`.
pub fn quantize(rgb: &[[u8; 3]], num_colors: usize) -> Result<QuantizeResult> {
    if rgb.is_empty() {
        return Err(ChanVeseError::EmptyImage);
    }
    if num_colors > 256 {
        return Err(ChanVeseError::TooManyColors {
            requested: num_colors,
        });
    }

    let mut min = [255i32; 3];
    let mut max = [0i32; 3];
    for pixel in rgb {
        for c in 0..3 {
            let v = pixel[c] as i32;
            if v < min[c] {
                min[c] = v;
            }
            if v > max[c] {
                max[c] = v;
            }
        }
    }

    let mut boxes = vec![BBox {
        min,
        max,
        num_pixels: rgb.len() as u64,
        volume: BBox::volume(min, max),
    }];

    while boxes.len() < num_colors {
        let split_by_pixels_only = boxes.len() % 4 > 0;
        let mut best_idx = None;
        let mut best_merit = 0f64;

        for (k, b) in boxes.iter().enumerate() {
            if b.volume <= 2 {
                continue;
            }
            let merit = if split_by_pixels_only {
                b.num_pixels as f64
            } else {
                b.num_pixels as f64 * b.volume as f64
            };
            if merit > best_merit {
                best_merit = merit;
                best_idx = Some(k);
            }
        }

        let best_idx = match best_idx {
            Some(idx) => idx,
            // No remaining box is worth splitting; settle for fewer colors
            // than requested rather than subdividing noise.
            None => break,
        };

        let (lower, upper) = median_split(&boxes[best_idx], rgb);
        boxes[best_idx] = upper;
        boxes.push(lower);
    }

    let num_boxes = boxes.len();
    let mut sums = vec![[0u64; 3]; num_boxes];
    let mut counts = vec![0u64; num_boxes];

    for &pixel in rgb {
        let mut owner = num_boxes;
        for (k, b) in boxes.iter().enumerate() {
            if b.contains(pixel) {
                owner = k;
                break;
            }
        }
        if owner == num_boxes {
            warn!(
                "color ({},{},{}) fell outside every quantization box",
                pixel[0], pixel[1], pixel[2]
            );
            owner = 0;
        } else {
            for c in 0..3 {
                sums[owner][c] += pixel[c] as u64;
            }
        }
        counts[owner] += 1;
    }

    let mut palette = Vec::with_capacity(num_boxes);
    for k in 0..num_boxes {
        if counts[k] == 0 {
            palette.push([0u8; 3]);
            continue;
        }
        let mut entry = [0u8; 3];
        for c in 0..3 {
            let average = sums[k][c] as f64 / counts[k] as f64;
            entry[c] = if average < 0.5 {
                0
            } else if average >= 254.5 {
                255
            } else {
                (average + 0.5) as u8
            };
        }
        palette.push(entry);
    }

    let mut indices = Vec::with_capacity(rgb.len());
    for &pixel in rgb {
        let mut best_box = 0usize;
        let mut min_dist = i64::MAX;
        for (k, color) in palette.iter().enumerate() {
            let mut dist = 0i64;
            for c in 0..3 {
                let diff = pixel[c] as i64 - color[c] as i64;
                dist += diff * diff;
            }
            if dist < min_dist {
                min_dist = dist;
                best_box = k;
            }
        }
        indices.push(best_box as u8);
    }

    Ok(QuantizeResult { indices, palette })
}

/// Split `box` along its longest axis at the pixel-count median, returning
/// `(lower, upper)` with `lower` keeping the original minimum and `upper`
/// keeping the original maximum.
///
/// The final adjustment clamps the split point into `[min, max-1]` instead
/// of the original's backward scan (`for (; i >= Box.Max[MaxDim]; i--)`),
/// which only terminates because the caller never selects a box whose
/// longest dimension has length 1 (volume > 2 forces it); the scan existed
/// to guard against exactly that, and a direct clamp gives the same
/// guarantee — both partitions non-empty — without depending on the scan's
/// termination argument.
fn median_split(split_box: &BBox, rgb: &[[u8; 3]]) -> (BBox, BBox) {
    let mut max_len = 0;
    let mut max_dim = 0;
    for d in 0..3 {
        let len = split_box.max[d] - split_box.min[d] + 1;
        if len > max_len {
            max_len = len;
            max_dim = d;
        }
    }

    let mut hist = [0u64; 256];
    for pixel in rgb {
        if split_box.contains(*pixel) {
            hist[pixel[max_dim] as usize] += 1;
        }
    }

    let min_d = split_box.min[max_dim];
    let max_d = split_box.max[max_dim];

    let mut i = min_d;
    let mut accum = hist[i as usize];
    while 2 * accum < split_box.num_pixels && i < 254 {
        i += 1;
        accum += hist[i as usize];
    }

    if i > min_d && (i - min_d) < (max_d - i - 1) {
        accum -= hist[i as usize];
        i -= 1;
    }

    let _ = accum;
    let i = i.clamp(min_d, (max_d - 1).max(min_d));
    let lower_pixels: u64 = hist[min_d as usize..=(i as usize)].iter().sum();

    let mut lower_max = split_box.max;
    lower_max[max_dim] = i;
    let lower = BBox {
        min: split_box.min,
        max: lower_max,
        num_pixels: lower_pixels,
        volume: BBox::volume(split_box.min, lower_max),
    };

    let mut upper_min = split_box.min;
    upper_min[max_dim] = i + 1;
    let upper = BBox {
        min: upper_min,
        max: split_box.max,
        num_pixels: split_box.num_pixels - lower_pixels,
        volume: BBox::volume(upper_min, split_box.max),
    };

    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            quantize(&[], 4).unwrap_err(),
            ChanVeseError::EmptyImage
        ));
    }

    #[test]
    fn rejects_too_many_colors() {
        let rgb = vec![[0, 0, 0]];
        assert!(matches!(
            quantize(&rgb, 300).unwrap_err(),
            ChanVeseError::TooManyColors { .. }
        ));
    }

    #[test]
    fn single_color_image_quantizes_to_one_palette_entry() {
        let rgb = vec![[10, 20, 30]; 16];
        let result = quantize(&rgb, 16).unwrap();
        assert_eq!(result.palette.len(), 1);
        assert_eq!(result.palette[0], [10, 20, 30]);
        assert!(result.indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn palette_never_exceeds_requested_colors() {
        let mut rgb = Vec::new();
        for r in 0..8u16 {
            for g in 0..8u16 {
                rgb.push([r as u8 * 32, g as u8 * 32, 128]);
            }
        }
        let result = quantize(&rgb, 16).unwrap();
        assert!(result.palette.len() <= 16);
        assert!(result.indices.iter().all(|&i| (i as usize) < result.palette.len()));
    }

    #[test]
    fn two_distinct_colors_split_into_two_boxes() {
        let mut rgb = vec![[0u8, 0, 0]; 8];
        rgb.extend(vec![[255u8, 255, 255]; 8]);
        let result = quantize(&rgb, 2).unwrap();
        assert_eq!(result.palette.len(), 2);
        let idx_black = result.indices[0];
        let idx_white = result.indices[8];
        assert_ne!(idx_black, idx_white);
    }
}
