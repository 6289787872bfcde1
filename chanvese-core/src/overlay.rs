// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Builds the animated-GIF preview frames: the source image darkened by
//! 5%, with an antialiased cyan tint traced along the segmentation curve.

use crate::image::Image;
use crate::level_set::LevelSet;
use crate::solver::CallbackState;

/// `255.0*x + 0.5` floored and clamped to `[0,255]`, matching the
/// original's `ROUNDCLAMP` macro.
fn round_clamp(x: f64) -> u8 {
    if x < 0.0 {
        0
    } else if x > 1.0 {
        255
    } else {
        (255.0 * x + 0.5).floor() as u8
    }
}

/// Render one overlay frame: the image at 95% brightness, tinted cyan along
/// the boundary of `phi`'s zero level set.
///
/// Grayscale sources (one channel) are treated as equal red/green/blue —
/// made explicit here rather than left as an out-of-bounds read into
/// nonexistent channel planes, which is what a literal port of the
/// original's fixed 3-channel indexing would do for single-channel input.
pub fn render_frame(image: &Image, phi: &LevelSet) -> Vec<[u8; 3]> {
    let width = image.width();
    let height = image.height();
    let gray = image.channels() == 1;

    let mut is_edge = vec![false; width * height];
    for y in 0..height {
        for x in 0..width {
            let i = x + width * y;
            if phi.data()[i] >= 0.0 {
                let bordered_by_outside = (x > 0 && phi.data()[i - 1] < 0.0)
                    || (x + 1 < width && phi.data()[i + 1] < 0.0)
                    || (y > 0 && phi.data()[i - width] < 0.0)
                    || (y + 1 < height && phi.data()[i + width] < 0.0);
                is_edge[i] = bordered_by_outside;
            }
        }
    }

    let mut out = vec![[0u8; 3]; width * height];
    for y in 0..height {
        let iu = if y == 0 { 0isize } else { -(width as isize) };
        let id = if y == height - 1 { 0isize } else { width as isize };

        for x in 0..width {
            let il = if x == 0 { 0isize } else { -1isize };
            let ir = if x == width - 1 { 0isize } else { 1isize };

            let i = x + width * y;
            let (r, g, b) = if gray {
                let v = image.get(x, y, 0);
                (v, v, v)
            } else {
                (image.get(x, y, 0), image.get(x, y, 1), image.get(x, y, 2))
            };

            let mut red = 0.95 * r;
            let mut green = 0.95 * g;
            let mut blue = 0.95 * b;

            let at = |offset: isize| -> f64 {
                if is_edge[(i as isize + offset) as usize] {
                    1.0
                } else {
                    0.0
                }
            };
            let mut alpha = (4.0 * at(0) + at(ir) + at(il) + at(id) + at(iu)) / 4.0;
            if alpha > 1.0 {
                alpha = 1.0;
            }

            red = (1.0 - alpha) * red;
            green = (1.0 - alpha) * green;
            blue = (1.0 - alpha) * blue + alpha;

            out[i] = [round_clamp(red), round_clamp(green), round_clamp(blue)];
        }
    }

    out
}

/// Accumulates overlay frames from solver progress callbacks, sampling
/// every `iter_per_frame`th running iteration plus always the terminal
/// (converged / max-iterations) frame.
pub struct OverlayBuilder {
    width: usize,
    height: usize,
    iter_per_frame: usize,
    frames: Vec<Vec<[u8; 3]>>,
    delays: Vec<u16>,
}

impl OverlayBuilder {
    pub fn new(width: usize, height: usize, iter_per_frame: usize) -> Self {
        OverlayBuilder {
            width,
            height,
            iter_per_frame: iter_per_frame.max(1),
            frames: Vec::new(),
            delays: Vec::new(),
        }
    }

    /// Consider emitting a frame for this callback invocation. Returns
    /// whether a frame was actually added.
    pub fn push(&mut self, state: CallbackState, iter: usize, image: &Image, phi: &LevelSet) -> bool {
        if state == CallbackState::Running && iter % self.iter_per_frame != 0 {
            return false;
        }
        self.frames.push(render_frame(image, phi));
        self.delays.push(if state == CallbackState::Running { 12 } else { 120 });
        true
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn into_parts(self) -> (Vec<Vec<[u8; 3]>>, Vec<u16>) {
        (self.frames, self.delays)
    }

    pub fn frames(&self) -> &[Vec<[u8; 3]>] {
        &self.frames
    }

    pub fn delays(&self) -> &[u16] {
        &self.delays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_far_from_boundary_is_just_darkened() {
        // A 5x5 image, all inside (Phi >= 1), center pixel has no outside
        // neighbor so it should see zero tint.
        let image = Image::from_data(5, 5, 1, vec![1.0; 25]).unwrap();
        let phi = LevelSet::from_data(5, 5, vec![1.0; 25]).unwrap();
        let frame = render_frame(&image, &phi);
        assert_eq!(frame[2 + 5 * 2], [round_clamp(0.95), round_clamp(0.95), round_clamp(0.95)]);
    }

    #[test]
    fn boundary_pixel_gets_cyan_tint() {
        let mut phi_data = vec![1.0; 9];
        phi_data[4] = 1.0; // center inside
        phi_data[5] = -1.0; // right neighbor outside
        let image = Image::from_data(3, 3, 1, vec![0.0; 9]).unwrap();
        let phi = LevelSet::from_data(3, 3, phi_data).unwrap();
        let frame = render_frame(&image, &phi);
        let center = frame[4];
        // Center is an edge pixel (adjacent to outside) so alpha > 0, blue channel lifted.
        assert!(center[2] > 0);
    }

    #[test]
    fn overlay_builder_samples_every_nth_iteration_plus_terminal() {
        let image = Image::zeros(2, 2, 1).unwrap();
        let phi = LevelSet::zeros(2, 2).unwrap();
        let mut builder = OverlayBuilder::new(2, 2, 5);
        assert!(builder.push(CallbackState::Running, 0, &image, &phi));
        assert!(!builder.push(CallbackState::Running, 3, &image, &phi));
        assert!(builder.push(CallbackState::Running, 5, &image, &phi));
        assert!(builder.push(CallbackState::Converged, 7, &image, &phi));
        assert_eq!(builder.num_frames(), 3);
    }
}
