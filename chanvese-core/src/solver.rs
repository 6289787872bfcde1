// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Semi-implicit Gauss-Seidel solver for Chan-Vese / Chan-Sandberg-Vese
//! active contours without edges.

use std::f64::consts::PI;
use std::fmt;

use log::{debug, trace};
use nalgebra::DVector;

use crate::error::{ChanVeseError, Result};
use crate::image::Image;
use crate::level_set::LevelSet;

const DIVIDE_EPS: f64 = 1e-16;

/// Parameters of the Chan-Vese functional and the solver's stopping rule.
///
/// Field names and defaults mirror the original option struct: `mu` is the
/// curve-length penalty, `nu` the area penalty (positive values shrink the
/// curve), `lambda1`/`lambda2` weight the inside/outside region fit, `dt` is
/// the semi-implicit timestep, `tol`/`max_iter` bound the iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub tol: f64,
    pub max_iter: usize,
    pub mu: f64,
    pub nu: f64,
    pub lambda1: f64,
    pub lambda2: f64,
    pub dt: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tol: 1e-3,
            max_iter: 500,
            mu: 0.25,
            nu: 0.0,
            lambda1: 1.0,
            lambda2: 1.0,
            dt: 0.5,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn set_tol(&mut self, tol: f64) -> &mut Self {
        self.tol = tol;
        self
    }

    pub fn set_max_iter(&mut self, max_iter: usize) -> &mut Self {
        self.max_iter = max_iter;
        self
    }

    pub fn set_mu(&mut self, mu: f64) -> &mut Self {
        self.mu = mu;
        self
    }

    pub fn set_nu(&mut self, nu: f64) -> &mut Self {
        self.nu = nu;
        self
    }

    pub fn set_lambda1(&mut self, lambda1: f64) -> &mut Self {
        self.lambda1 = lambda1;
        self
    }

    pub fn set_lambda2(&mut self, lambda2: f64) -> &mut Self {
        self.lambda2 = lambda2;
        self
    }

    pub fn set_dt(&mut self, dt: f64) -> &mut Self {
        self.dt = dt;
        self
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tol       : {}", self.tol)?;
        writeln!(f, "max iter  : {}", self.max_iter)?;
        writeln!(f, "mu        : {}", self.mu)?;
        writeln!(f, "nu        : {}", self.nu)?;
        writeln!(f, "lambda1   : {}", self.lambda1)?;
        writeln!(f, "lambda2   : {}", self.lambda2)?;
        write!(f, "dt        : {}", self.dt)
    }
}

/// Outcome of a solve that ran to a valid stopping point (as opposed to an
/// `Err` for a malformed input). Matches the original's two non-error return
/// codes: 1 = converged, 2 = max_iter exhausted. A callback-requested abort
/// is folded into `MaxIterationsReached` — the original treats it as the
/// same outcome so the caller may still use the partially-evolved Φ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveStatus {
    /// `||Phi_k - Phi_{k-1}|| / sqrt(NumEl) <= tol` was reached.
    Converged { iterations: usize, delta: f64 },
    /// `max_iter` sweeps ran without reaching `tol`, or the progress
    /// callback requested early termination — both are reported as
    /// non-convergence so the caller can still use the partially-evolved Φ.
    MaxIterationsReached { iterations: usize, delta: f64 },
}

/// Mirrors the three states the original plotting callback distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    Running,
    Converged,
    MaxIterationsReached,
}

/// Capability for observing solver progress, the Rust counterpart of a C
/// function pointer plus an opaque context pointer: the trait object itself
/// carries whatever state a closure or struct needs.
///
/// Returning `false` aborts the solve early; the solver then reports
/// [`SolveStatus::MaxIterationsReached`] with the iteration count and delta
/// reached so far, and runs the termination callback with
/// [`CallbackState::MaxIterationsReached`].
pub trait ProgressCallback {
    fn on_progress(
        &mut self,
        state: CallbackState,
        iter: usize,
        delta: f64,
        c1: &[f64],
        c2: &[f64],
        phi: &LevelSet,
    ) -> bool;
}

impl<F> ProgressCallback for F
where
    F: FnMut(CallbackState, usize, f64, &[f64], &[f64], &LevelSet) -> bool,
{
    fn on_progress(
        &mut self,
        state: CallbackState,
        iter: usize,
        delta: f64,
        c1: &[f64],
        c2: &[f64],
        phi: &LevelSet,
    ) -> bool {
        self(state, iter, delta, c1, c2, phi)
    }
}

/// A callback that never aborts and does nothing with progress reports.
pub struct NoopCallback;

impl ProgressCallback for NoopCallback {
    fn on_progress(
        &mut self,
        _state: CallbackState,
        _iter: usize,
        _delta: f64,
        _c1: &[f64],
        _c2: &[f64],
        _phi: &LevelSet,
    ) -> bool {
        true
    }
}

/// Average value of `image` inside (`c1`) and outside (`c2`) the region
/// where `phi >= 0`, one component per channel.
pub fn region_averages(image: &Image, phi: &LevelSet) -> (DVector<f64>, DVector<f64>) {
    let channels = image.channels();
    let mut c1 = DVector::zeros(channels);
    let mut c2 = DVector::zeros(channels);

    for k in 0..channels {
        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        let mut count1: u64 = 0;
        let mut count2: u64 = 0;
        let plane = image.channel(k);
        for (n, &value) in plane.iter().enumerate() {
            if phi.data()[n] >= 0.0 {
                count1 += 1;
                sum1 += value;
            } else {
                count2 += 1;
                sum2 += value;
            }
        }
        c1[k] = if count1 > 0 { sum1 / count1 as f64 } else { 0.0 };
        c2[k] = if count2 > 0 { sum2 / count2 as f64 } else { 0.0 };
    }

    (c1, c2)
}

/// Run the Chan-Vese / Chan-Sandberg-Vese solve to completion, mutating a
/// fresh copy of `phi0` in place and returning it alongside the stopping
/// reason.
pub fn segment(
    image: &Image,
    phi0: &LevelSet,
    config: &Config,
    callback: &mut dyn ProgressCallback,
) -> Result<(LevelSet, SolveStatus)> {
    if phi0.width() != image.width() || phi0.height() != image.height() {
        return Err(ChanVeseError::DimensionMismatch {
            phi_width: phi0.width(),
            phi_height: phi0.height(),
            image_width: image.width(),
            image_height: image.height(),
        });
    }

    let width = image.width();
    let height = image.height();
    let channels = image.channels();
    let num_pixels = width * height;
    let num_el = (num_pixels * channels) as f64;

    let mut phi = phi0.clone();
    let (mut c1, mut c2) = region_averages(image, &phi);

    let mut delta = if config.tol > 0.0 {
        config.tol * 1000.0
    } else {
        1000.0
    };

    if !callback.on_progress(CallbackState::Running, 0, delta, c1.as_slice(), c2.as_slice(), &phi) {
        callback.on_progress(CallbackState::MaxIterationsReached, 0, delta, c1.as_slice(), c2.as_slice(), &phi);
        return Ok((phi, SolveStatus::MaxIterationsReached {
            iterations: 0,
            delta,
        }));
    }

    let mut final_iter = config.max_iter;
    let mut converged = false;

    for iter in 1..=config.max_iter {
        let mut diff_sq_sum = 0.0f64;

        for y in 0..height {
            let yu = if y == 0 { y } else { y - 1 };
            let yd = if y == height - 1 { y } else { y + 1 };

            for x in 0..width {
                let xl = if x == 0 { x } else { x - 1 };
                let xr = if x == width - 1 { x } else { x + 1 };

                let phi_c = phi.get(x, y);
                let phi_r = phi.get(xr, y);
                let phi_l = phi.get(xl, y);
                let phi_u = phi.get(x, yu);
                let phi_d = phi.get(x, yd);

                let pixel_delta = config.dt / (PI * (1.0 + phi_c * phi_c));

                let mut phi_x = phi_r - phi_c;
                let mut phi_y = (phi_d - phi_u) / 2.0;
                let idiv_r = 1.0 / (DIVIDE_EPS + phi_x * phi_x + phi_y * phi_y).sqrt();

                phi_x = phi_c - phi_l;
                let idiv_l = 1.0 / (DIVIDE_EPS + phi_x * phi_x + phi_y * phi_y).sqrt();

                phi_x = (phi_r - phi_l) / 2.0;
                phi_y = phi_d - phi_c;
                let idiv_d = 1.0 / (DIVIDE_EPS + phi_x * phi_x + phi_y * phi_y).sqrt();

                phi_y = phi_c - phi_u;
                let idiv_u = 1.0 / (DIVIDE_EPS + phi_x * phi_x + phi_y * phi_y).sqrt();

                let f_vec = DVector::from_iterator(channels, (0..channels).map(|k| image.get(x, y, k)));
                let dist1 = (&f_vec - &c1).norm_squared();
                let dist2 = (&f_vec - &c2).norm_squared();

                let phi_last = phi_c;
                let new_phi = (phi_c
                    + pixel_delta
                        * (config.mu * (phi_r * idiv_r + phi_l * idiv_l + phi_d * idiv_d + phi_u * idiv_u)
                            - config.nu
                            - config.lambda1 * dist1
                            + config.lambda2 * dist2))
                    / (1.0 + pixel_delta * config.mu * (idiv_r + idiv_l + idiv_d + idiv_u));

                phi.set(x, y, new_phi);
                let pixel_diff = new_phi - phi_last;
                diff_sq_sum += pixel_diff * pixel_diff;
            }
        }

        delta = (diff_sq_sum / num_el).sqrt();
        let averages = region_averages(image, &phi);
        c1 = averages.0;
        c2 = averages.1;

        trace!("sweep {} delta {:.6e}", iter, delta);

        if iter >= 2 && delta <= config.tol {
            final_iter = iter;
            converged = true;
            break;
        }

        if !callback.on_progress(CallbackState::Running, iter, delta, c1.as_slice(), c2.as_slice(), &phi) {
            callback.on_progress(CallbackState::MaxIterationsReached, iter, delta, c1.as_slice(), c2.as_slice(), &phi);
            return Ok((phi, SolveStatus::MaxIterationsReached {
                iterations: iter,
                delta,
            }));
        }
    }

    let status = if converged {
        debug!("converged in {} iterations, delta {:.6e}", final_iter, delta);
        callback.on_progress(
            CallbackState::Converged,
            final_iter,
            delta,
            c1.as_slice(),
            c2.as_slice(),
            &phi,
        );
        SolveStatus::Converged {
            iterations: final_iter,
            delta,
        }
    } else {
        debug!("reached max_iter={} without converging, delta {:.6e}", config.max_iter, delta);
        callback.on_progress(
            CallbackState::MaxIterationsReached,
            config.max_iter,
            delta,
            c1.as_slice(),
            c2.as_slice(),
            &phi,
        );
        SolveStatus::MaxIterationsReached {
            iterations: config.max_iter,
            delta,
        }
    };

    Ok((phi, status))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn rejects_dimension_mismatch() {
        let image = Image::zeros(4, 4, 1).unwrap();
        let phi = LevelSet::zeros(3, 4).unwrap();
        let config = Config::default();
        let err = segment(&image, &phi, &config, &mut NoopCallback).unwrap_err();
        assert!(matches!(err, ChanVeseError::DimensionMismatch { .. }));
    }

    #[test]
    fn constant_image_converges_with_region_averages_equal_to_value() {
        let data = vec![0.5; 16];
        let image = Image::from_data(4, 4, 1, data).unwrap();
        let phi0 = LevelSet::init_default(4, 4).unwrap();
        let config = Config::default();
        let (_, status) = segment(&image, &phi0, &config, &mut NoopCallback).unwrap();
        match status {
            SolveStatus::Converged { .. } => {}
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[test]
    fn tol_zero_runs_exactly_max_iter_sweeps() {
        let data: Vec<f64> = (0..64).map(|i| (i % 7) as f64 / 7.0).collect();
        let image = Image::from_data(8, 8, 1, data).unwrap();
        let phi0 = LevelSet::init_default(8, 8).unwrap();
        let mut config = Config::default();
        config.set_tol(0.0).set_max_iter(10);
        let (_, status) = segment(&image, &phi0, &config, &mut NoopCallback).unwrap();
        assert_eq!(
            status,
            SolveStatus::MaxIterationsReached {
                iterations: 10,
                delta: match status {
                    SolveStatus::MaxIterationsReached { delta, .. } => delta,
                    _ => unreachable!(),
                },
            }
        );
    }

    #[test]
    fn region_averages_match_constant_planes() {
        let mut data = vec![0.0; 8];
        for v in data.iter_mut().take(4) {
            *v = 1.0;
        }
        for v in data.iter_mut().skip(4) {
            *v = 3.0;
        }
        let image = Image::from_data(2, 2, 2, {
            // channel 0 all 1.0, channel 1 all 3.0
            let mut d = vec![1.0; 4];
            d.extend(vec![3.0; 4]);
            d
        });
        let image = image.unwrap();
        let mut phi = LevelSet::zeros(2, 2).unwrap();
        phi.set(0, 0, 1.0);
        phi.set(1, 0, -1.0);
        phi.set(0, 1, 1.0);
        phi.set(1, 1, -1.0);
        let (c1, c2) = region_averages(&image, &phi);
        assert_relative_eq!(c1[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(c1[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(c2[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(c2[1], 3.0, epsilon = 1e-12);
        let _ = data;
    }

    #[test]
    fn callback_abort_stops_early() {
        let data = vec![0.2; 16];
        let image = Image::from_data(4, 4, 1, data).unwrap();
        let phi0 = LevelSet::init_default(4, 4).unwrap();
        let mut config = Config::default();
        config.set_tol(0.0).set_max_iter(100);
        let mut calls = 0usize;
        let mut callback = |_state: CallbackState, _iter: usize, _delta: f64, _c1: &[f64], _c2: &[f64], _phi: &LevelSet| {
            calls += 1;
            calls < 3
        };
        let (_, status) = segment(&image, &phi0, &config, &mut callback).unwrap();
        assert!(matches!(status, SolveStatus::MaxIterationsReached { iterations: 2, .. }));
        assert_eq!(calls, 4);
    }
}
