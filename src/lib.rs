//! # laserspot
//!
//! Characterize a laser spot captured in a 2D image with a **saturating
//! elliptical Gaussian** model, generate synthetic spots with known ground
//! truth, and simulate how the spot changes when the beam is refocused.
//!
//! ## Features
//!
//! - **Model**: rotated bivariate Gaussian with background offset, amplitude
//!   scale and an optional hard saturation ceiling, evaluated over any
//!   coordinate grid
//! - **Synthetic data**: random spot parameters within plausible bounds, bounded
//!   additive sensor noise, clipping to the 8-bit range; the RNG is always
//!   supplied by the caller, so a fixed seed reproduces the same image
//! - **Focus transform**: derive the spot after focusing by a factor while
//!   preserving total energy
//! - **Fitter**: Levenberg-Marquardt recovery of all seven free parameters from
//!   an observed image, with saturated pixels masked out and a moment-based
//!   initial guess
//!
//! ## Example
//!
//! ```
//! use laserspot::{fit_auto, focus, generate, BeamMetrics, CoordinateGrid, FitConfig, FOCUS_FACTOR};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! // A 64×64 integer pixel grid
//! let grid = CoordinateGrid::mgrid(64, 64).unwrap();
//!
//! // Synthetic 8-bit image of a random spot, plus the parameters that made it
//! let mut rng = StdRng::seed_from_u64(56);
//! let (image, truth) = generate(&grid, &mut rng).unwrap();
//!
//! // Measure the spot, treating 255 as the sensor ceiling
//! let result = fit_auto(&grid, &image, Some(255.0), &FitConfig::default()).unwrap();
//! println!("fit {:?} after {} iterations", result.status, result.iterations);
//!
//! // Focus the ground truth by 4×: half the width, four times the peak
//! let focused = focus(&truth, FOCUS_FACTOR).unwrap();
//! assert!((focused.energy() - truth.energy()).abs() < 1e-9 * truth.energy());
//!
//! let metrics = BeamMetrics::from_params(&focused).unwrap();
//! println!("focused FWHM {:.2} px", metrics.fwhm());
//! ```
//!
//! ## Model
//!
//! ```text
//! I(x, y) = zscale · exp(−½ (A dx² + B dy² + C dx dy)) + zoff,   then min(I, zmax)
//! ```
//!
//! with `dx = x − xoff`, `dy = y − yoff` and `A`, `B`, `C` the precision
//! coefficients of an ellipse rotated by `phi` with principal widths `sigma0`
//! and `sigma1` (see [`model`]).
//!
//! ## Errors
//!
//! Every operation validates its inputs and fails with [`SpotError`] instead of
//! producing NaN: non-positive sigmas, a non-positive focus factor, mismatched
//! grid shapes, or a field that would contain non-finite values. A fit that
//! does not converge is still returned, flagged through [`FitStatus`].
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (`debug` for solver iterations, `info`
//! and `warn` for fit outcomes) and never installs a subscriber itself.

mod error;
pub mod fit;
pub mod focus;
pub mod grid;
pub mod metrics;
pub mod model;
pub mod params;
pub mod synthetic;

pub use error::{Result, SpotError};
pub use fit::{
    estimate_initial, fit, fit_auto, FitConfig, FitResult, FitStatus, FIT_PARAMETER_COUNT,
    MIN_LEVEL,
};
pub use focus::{focus, FOCUS_FACTOR};
pub use grid::{CoordinateGrid, IntensityField};
pub use metrics::{BeamMetrics, CONTOUR_LEVEL};
pub use model::{evaluate, intensity_at};
pub use params::{Precision, SpotParams};
pub use synthetic::{generate, generate_with, SyntheticConfig};
