// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types for the Chan-Vese segmentation pipeline.

use thiserror::Error;

/// Failures that can arise anywhere in the segmentation pipeline.
///
/// Argument/precondition failures and resource failures (spec categories 1
/// and 2) both surface as one of these variants instead of a bare status
/// code; non-convergence is not an error and is reported through
/// [`crate::solver::SolveStatus`] instead.
#[derive(Debug, Error)]
pub enum ChanVeseError {
    #[error("width and height must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("buffer length {actual} does not match width*height*channels = {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("image has no channels")]
    NoChannels,

    #[error("level set dimensions {phi_width}x{phi_height} do not match image dimensions {image_width}x{image_height}")]
    DimensionMismatch {
        phi_width: usize,
        phi_height: usize,
        image_width: usize,
        image_height: usize,
    },

    #[error("input has no pixels")]
    EmptyImage,

    #[error("requested {requested} colors exceeds the 256 color maximum")]
    TooManyColors { requested: usize },

    #[error("transparent color index {index} is out of range for a palette of {num_colors} colors")]
    InvalidTransparentIndex { index: usize, num_colors: usize },

    #[error("frames must share the same width and height to be encoded together")]
    FrameSizeMismatch,

    #[error("no frames were supplied")]
    NoFrames,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ChanVeseError>;
