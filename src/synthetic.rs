//! Synthetic laser spot images with known ground truth.
//!
//! A random [`SpotParams`] is drawn within physically plausible bounds, the
//! model is evaluated over the grid, bounded additive noise is added to every
//! pixel and the result is clipped to the 8-bit range. The exact parameters are
//! returned alongside the image so a fit can be checked against them.
//!
//! The random-number generator is always supplied by the caller, so a seeded
//! generator reproduces the same image and parameters.
//!
//! # Example
//!
//! ```
//! use laserspot::{generate, CoordinateGrid};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let grid = CoordinateGrid::mgrid(64, 64).unwrap();
//! let mut rng = StdRng::seed_from_u64(56);
//! let (image, truth) = generate(&grid, &mut rng).unwrap();
//! assert!(image.max() <= 255.0);
//! assert!(truth.sigma0 >= 8.0 && truth.sigma0 < 16.0);
//! ```

use std::f64::consts::PI;

use rand::RngExt;
use tracing::debug;

use crate::error::{Result, SpotError};
use crate::grid::{CoordinateGrid, IntensityField};
use crate::model::evaluate;
use crate::params::SpotParams;

/// Bounds used when drawing a synthetic spot.
///
/// Every range is half-open `[lo, hi)` except `clip_range`, which is closed.
/// The defaults reproduce an 8-bit sensor looking at a spot roughly 8 to 16
/// pixels wide near the middle of the frame.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Range for each of `sigma0` and `sigma1`, drawn independently.
    /// Default: `(8.0, 16.0)`.
    pub sigma_range: (f64, f64),
    /// Full width of the uniform jitter added to the grid's half extent to
    /// place the center. Default: `8.0`, i.e. `±4` pixels.
    pub center_jitter: f64,
    /// Range for `zscale`. Default: `(0.0, 255.0)`.
    pub zscale_range: (f64, f64),
    /// Range for `zoff`. Default: `(0.0, 1.0)`.
    pub zoff_range: (f64, f64),
    /// Per-pixel additive noise is uniform in `[0, noise_amplitude)`.
    /// Default: `8.0`.
    pub noise_amplitude: f64,
    /// Final clip of the noisy image. Default: `(0.0, 255.0)`.
    pub clip_range: (f64, f64),
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sigma_range: (8.0, 16.0),
            center_jitter: 8.0,
            zscale_range: (0.0, 255.0),
            zoff_range: (0.0, 1.0),
            noise_amplitude: 8.0,
            clip_range: (0.0, 255.0),
        }
    }
}

impl SyntheticConfig {
    /// Reject inverted ranges, non-positive sigma bounds and negative widths.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("sigma_range", self.sigma_range),
            ("zscale_range", self.zscale_range),
            ("zoff_range", self.zoff_range),
            ("clip_range", self.clip_range),
        ];
        for (name, (lo, hi)) in ranges {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(SpotError::InvalidConfig(format!(
                    "{name} must be a finite range with lo <= hi, got ({lo}, {hi})"
                )));
            }
        }
        if self.sigma_range.0 <= 0.0 {
            return Err(SpotError::InvalidConfig(format!(
                "sigma_range must be strictly positive, got lower bound {}",
                self.sigma_range.0
            )));
        }
        for (name, width) in [
            ("center_jitter", self.center_jitter),
            ("noise_amplitude", self.noise_amplitude),
        ] {
            if !(width.is_finite() && width >= 0.0) {
                return Err(SpotError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {width}"
                )));
            }
        }
        Ok(())
    }
}

/// Generate a noisy synthetic spot with the default bounds.
///
/// Returns the clipped noisy image and the exact parameters used (no `zmax`).
pub fn generate<R: RngExt + ?Sized>(
    grid: &CoordinateGrid,
    rng: &mut R,
) -> Result<(IntensityField, SpotParams)> {
    generate_with(grid, rng, &SyntheticConfig::default())
}

/// Generate a noisy synthetic spot with explicit bounds.
pub fn generate_with<R: RngExt + ?Sized>(
    grid: &CoordinateGrid,
    rng: &mut R,
    config: &SyntheticConfig,
) -> Result<(IntensityField, SpotParams)> {
    config.validate()?;
    let truth = draw_params(grid, rng, config);
    debug!(
        "Synthetic spot: phi={:.3} sigma=({:.2}, {:.2}) center=({:.2}, {:.2}) zscale={:.1} zoff={:.3}",
        truth.phi, truth.sigma0, truth.sigma1, truth.xoff, truth.yoff, truth.zscale, truth.zoff
    );

    let clean = evaluate(grid, &truth)?.into_matrix();

    // row-major, independent of the matrix storage order
    let (rows, cols) = clean.shape();
    let mut noisy = clean;
    for i in 0..rows {
        for j in 0..cols {
            noisy[(i, j)] += config.noise_amplitude * rng.random::<f64>();
        }
    }

    let (lo, hi) = config.clip_range;
    let image = IntensityField::from_matrix(noisy).clamp(lo, hi);
    Ok((image, truth))
}

/// Draw one parameter set. The draw order is fixed: phi, sigma0, sigma1,
/// xoff, yoff, zscale, zoff.
fn draw_params<R: RngExt + ?Sized>(
    grid: &CoordinateGrid,
    rng: &mut R,
    config: &SyntheticConfig,
) -> SpotParams {
    let phi = 2.0 * PI * (rng.random::<f64>() - 0.5);
    let sigma0 = uniform(rng, config.sigma_range);
    let sigma1 = uniform(rng, config.sigma_range);
    let xoff = config.center_jitter * (rng.random::<f64>() - 0.5) + grid.x_extent() / 2.0;
    let yoff = config.center_jitter * (rng.random::<f64>() - 0.5) + grid.y_extent() / 2.0;
    let zscale = uniform(rng, config.zscale_range);
    let zoff = uniform(rng, config.zoff_range);

    SpotParams {
        phi,
        sigma0,
        sigma1,
        xoff,
        yoff,
        zscale,
        zoff,
        zmax: None,
    }
}

#[inline]
fn uniform<R: RngExt + ?Sized>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    (hi - lo) * rng.random::<f64>() + lo
}
