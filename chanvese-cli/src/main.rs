// SPDX-License-Identifier: MPL-2.0

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};

use chanvese_core::level_set::LevelSet;
use chanvese_core::overlay::OverlayBuilder;
use chanvese_core::solver::{self, CallbackState, Config, ProgressCallback};
use chanvese_core::{gif, quantize, Image};

/// Number of palette entries reserved for real colors; the 256th slot is
/// always the hardcoded transparent/background index, matching the
/// original encoder's `NumColors = 256, TransparentColor = 255` call.
const MAX_REAL_COLORS: usize = 255;
const TRANSPARENT_INDEX: usize = 255;

fn main() -> anyhow::Result<()> {
    let matches = clap::App::new("chanvese")
        .version(std::env!("CARGO_PKG_VERSION"))
        .about("Chan-Vese active contours without edges, two-phase image segmentation")
        .arg(
            clap::Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Multiple levels of verbosity (up to -vvv)"),
        )
        .arg(
            clap::Arg::with_name("ARGS")
                .multiple(true)
                .required(true)
                .help(
                    "key:value parameters (mu, nu, lambda1, lambda2, tol, maxiter, dt, phi0, \
                     iterperframe, jpegquality) followed by the positional input, animation \
                     and (optional) final mask paths",
                ),
        )
        .get_matches();

    let verbosity = 1 + matches.occurrences_of("verbose") as usize;
    stderrlog::new()
        .quiet(false)
        .verbosity(verbosity)
        .show_level(false)
        .color(stderrlog::ColorChoice::Never)
        .init()
        .context("failed to initialize log verbosity")?;

    let args = matches.values_of("ARGS").unwrap().collect::<Vec<&str>>();
    run(parse_params(&args)?)
}

/// Parsed program parameters, the Rust counterpart of `programparams`.
struct Params {
    input_file: PathBuf,
    animation_file: PathBuf,
    final_file: Option<PathBuf>,
    jpeg_quality: u8,
    phi0_file: Option<PathBuf>,
    config: Config,
    iter_per_frame: usize,
}

/// Parse the `key:value` parameters and the positional input/animation/final
/// paths, following the same first-colon-split, positional-fallback
/// interface as the original's `ParseParam`.
fn parse_params(args: &[&str]) -> anyhow::Result<Params> {
    let mut input_file = None;
    let mut animation_file = None;
    let mut final_file = None;
    let mut jpeg_quality = 85u8;
    let mut phi0_file = None;
    let mut iter_per_frame = 10usize;
    let mut config = Config::default();

    for &token in args {
        match token.split_once(':') {
            Some((key, value)) if !key.is_empty() && !key.starts_with('-') => match key {
                "tol" => {
                    config.set_tol(value.parse().context("invalid value for tol")?);
                }
                "mu" => {
                    config.set_mu(value.parse().context("invalid value for mu")?);
                }
                "nu" => {
                    config.set_nu(value.parse().context("invalid value for nu")?);
                }
                "lambda1" => {
                    config.set_lambda1(value.parse().context("invalid value for lambda1")?);
                }
                "lambda2" => {
                    config.set_lambda2(value.parse().context("invalid value for lambda2")?);
                }
                "dt" => {
                    config.set_dt(value.parse().context("invalid value for dt")?);
                }
                "maxiter" => {
                    config.set_max_iter(value.parse().context("invalid value for maxiter")?);
                }
                "phi0" => {
                    phi0_file = Some(PathBuf::from(value));
                }
                "iterperframe" => {
                    let n: usize = value.parse().context("invalid value for iterperframe")?;
                    if n == 0 {
                        bail!("iterations per frame must be positive");
                    }
                    iter_per_frame = n;
                }
                "jpegquality" => {
                    let n: i64 = value.parse().context("invalid value for jpegquality")?;
                    if !(0..=100).contains(&n) {
                        bail!("JPEG quality must be between 0 and 100");
                    }
                    jpeg_quality = n as u8;
                }
                other => bail!("unknown option \"{}\"", other),
            },
            _ => {
                if token.starts_with('-') {
                    bail!("unknown option \"{}\"", token);
                }
                if input_file.is_none() {
                    input_file = Some(PathBuf::from(token));
                } else if animation_file.is_none() {
                    animation_file = Some(PathBuf::from(token));
                } else if final_file.is_none() {
                    final_file = Some(PathBuf::from(token));
                } else {
                    bail!("too many positional arguments, got unexpected \"{}\"", token);
                }
            }
        }
    }

    let input_file = input_file.context("missing input file; usage: chanvese [param:value ...] input animation [final]")?;
    let animation_file = animation_file.context("missing animation output file")?;

    Ok(Params {
        input_file,
        animation_file,
        final_file,
        jpeg_quality,
        phi0_file,
        config,
        iter_per_frame,
    })
}

fn run(params: Params) -> anyhow::Result<()> {
    let dynamic_input = image::open(&params.input_file)
        .with_context(|| format!("failed to open input image {}", params.input_file.display()))?;
    let image = Image::from_dynamic(&dynamic_input).context("failed to decode input image")?;

    let phi0 = match &params.phi0_file {
        None => LevelSet::init_default(image.width(), image.height())?,
        Some(path) => load_phi0(path, image.width(), image.height())?,
    };

    log::info!("Segmentation parameters");
    log::info!(
        "f         : [{} x {} {}]",
        image.width(),
        image.height(),
        if image.channels() == 1 { "grayscale" } else { "RGB" }
    );
    log::info!("phi0      : {}", if params.phi0_file.is_some() { "custom" } else { "default" });
    for line in params.config.to_string().lines() {
        log::info!("{}", line);
    }

    let bar = if log::log_enabled!(log::Level::Info) {
        let bar = ProgressBar::new(params.config.max_iter as u64);
        bar.set_style(ProgressStyle::default_bar().template("{bar:40} iter {pos}/{len}  delta {msg}"));
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut progress = CliProgress {
        image: &image,
        overlay: OverlayBuilder::new(image.width(), image.height(), params.iter_per_frame),
        bar,
    };

    let (final_phi, status) = solver::segment(&image, &phi0, &params.config, &mut progress)
        .context("segmentation failed")?;

    match status {
        solver::SolveStatus::Converged { iterations, .. } => {
            log::info!("Converged in {} iterations.", iterations);
        }
        solver::SolveStatus::MaxIterationsReached { iterations, .. } => {
            log::info!("Maximum number of iterations exceeded after {} iterations.", iterations);
        }
    }

    let (c1, c2) = solver::region_averages(&image, &final_phi);
    log::info!("Region averages");
    if image.channels() == 1 {
        log::info!("c1        : {:.4}", c1[0]);
        log::info!("c2        : {:.4}", c2[0]);
    } else {
        log::info!(
            "c1        : ({:.4}, {:.4}, {:.4})",
            c1[0],
            c1[1],
            c1[2]
        );
        log::info!(
            "c2        : ({:.4}, {:.4}, {:.4})",
            c2[0],
            c2[1],
            c2[2]
        );
    }

    if let Some(final_path) = &params.final_file {
        write_binary_mask(final_path, &final_phi, params.jpeg_quality)?;
    }

    write_animation(&progress.overlay, &params.animation_file, image.width(), image.height())?;

    Ok(())
}

/// Load the initial level set from `path`: as a grayscale image if it
/// decodes as one, falling back to a whitespace-separated text matrix
/// otherwise, mirroring the original's generic `ReadMatrixFromFile` call
/// for any `phi0:` value.
fn load_phi0(path: &Path, image_width: usize, image_height: usize) -> anyhow::Result<LevelSet> {
    let phi0 = match image::open(path) {
        Ok(img) => LevelSet::from_image(&img)?,
        Err(_) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read phi0 file {}", path.display()))?;
            LevelSet::from_text(&text)?
        }
    };
    if phi0.width() != image_width || phi0.height() != image_height {
        bail!(
            "Size mismatch: phi0 ({}x{}) does not match image size ({}x{}).",
            phi0.width(),
            phi0.height(),
            image_width,
            image_height
        );
    }
    Ok(phi0)
}

fn write_binary_mask(path: &Path, phi: &LevelSet, jpeg_quality: u8) -> anyhow::Result<()> {
    let width = phi.width();
    let height = phi.height();
    let mask: Vec<u8> = phi.data().iter().map(|&v| if v >= 0.0 { 255 } else { 0 }).collect();
    let gray = image::GrayImage::from_raw(width as u32, height as u32, mask)
        .context("failed to build binary mask image")?;

    let is_jpeg = matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref(),
        Some("jpg") | Some("jpeg")
    );

    if is_jpeg {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let encoder = image::jpeg::JPEGEncoder::new_with_quality(file, jpeg_quality);
        encoder
            .encode(gray.as_raw(), width as u32, height as u32, image::ColorType::L8)
            .with_context(|| format!("failed to write {}", path.display()))?;
    } else {
        gray.save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Quantize the accumulated overlay frames to a shared global palette,
/// optimize with frame differencing, and write the animated GIF.
fn write_animation(
    overlay: &OverlayBuilder,
    path: &Path,
    width: usize,
    height: usize,
) -> anyhow::Result<()> {
    let frames_rgb = overlay.frames();
    let delays = overlay.delays();
    let num_frames = frames_rgb.len();
    if num_frames == 0 {
        bail!("no animation frames were produced");
    }

    let pool: Vec<[u8; 3]> = frames_rgb.iter().flatten().copied().collect();
    let quantized = quantize::quantize(&pool, MAX_REAL_COLORS).context("color quantization failed")?;

    let mut palette: Vec<[u8; 3]> = quantized.palette;
    palette.resize(256, [0, 0, 0]);

    let pixels_per_frame = width * height;
    let mut frame_indices: Vec<Vec<u8>> = quantized
        .indices
        .chunks(pixels_per_frame)
        .map(|chunk| chunk.to_vec())
        .collect();

    gif::frame_difference(&mut frame_indices, TRANSPARENT_INDEX as u8);

    let frames: Vec<gif::Frame> = frame_indices
        .into_iter()
        .zip(delays.iter().copied())
        .map(|(indices, delay_centis)| gif::Frame { indices, delay_centis })
        .collect();

    gif::write_gif_file(path, &frames, width, height, &palette, TRANSPARENT_INDEX)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("Output written to \"{}\".", path.display());
    Ok(())
}

/// Adapts solver progress callbacks into overlay frames and a progress bar.
struct CliProgress<'a> {
    image: &'a Image,
    overlay: OverlayBuilder,
    bar: ProgressBar,
}

impl ProgressCallback for CliProgress<'_> {
    fn on_progress(
        &mut self,
        state: CallbackState,
        iter: usize,
        delta: f64,
        _c1: &[f64],
        _c2: &[f64],
        phi: &LevelSet,
    ) -> bool {
        self.overlay.push(state, iter, self.image, phi);
        self.bar.set_position(iter as u64);
        self.bar.set_message(&format!("{:.4}", delta));
        if state != CallbackState::Running {
            self.bar.finish_and_clear();
        }
        true
    }
}
