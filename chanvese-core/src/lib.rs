// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-phase image segmentation by Chan-Vese active contours without edges,
//! extended to multichannel images via the Chan-Sandberg-Vese vector model.
//!
//! This crate is the pure, file-I/O-free core: a semi-implicit Gauss-Seidel
//! solver, a median-cut color quantizer, an overlay-frame builder, and an
//! animated GIF encoder. Argument parsing, image decoding, and progress
//! display belong to `chanvese-cli`.

pub mod error;
pub mod gif;
pub mod image;
pub mod level_set;
pub mod overlay;
pub mod quantize;
pub mod solver;

pub use error::{ChanVeseError, Result};
pub use image::Image;
pub use level_set::LevelSet;
pub use solver::{segment, CallbackState, Config, ProgressCallback, SolveStatus};
