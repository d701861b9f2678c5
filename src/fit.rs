//! Least-squares fitting of the spot model to an observed image.
//!
//! The fitter refines seven free parameters
//! `[phi, sigma0, sigma1, xoff, yoff, zscale, zoff]` with Levenberg-Marquardt
//! on the 7×7 normal equations, using the analytic Jacobian of the Gaussian
//! term. `zmax` is not fitted; it is taken from the initial guess and held
//! fixed.
//!
//! # Saturation
//!
//! Where the model is clamped at `zmax` its gradient is zero, so saturated
//! pixels carry no information about width or amplitude. By default pixels
//! whose observed value sits at the ceiling are left out of the residual
//! entirely (see [`FitConfig::exclude_saturated`]). With exclusion turned off
//! the fit still runs, but a flat-topped spot pulls the amplitude down.
//!
//! # Non-convergence
//!
//! Running out of iterations is not an error. The returned [`FitResult`]
//! carries the best parameters seen, the final cost and a [`FitStatus`] so the
//! caller can decide whether to retry from another initial guess.

use nalgebra::{Matrix2, SMatrix, SVector};
use tracing::{debug, info, warn};

use crate::error::{Result, SpotError};
use crate::grid::{CoordinateGrid, IntensityField};
use crate::params::{wrap_angle, SpotParams};

/// Number of free parameters in a fit.
pub const FIT_PARAMETER_COUNT: usize = 7;

/// Fraction of the peak (above background) that bounds the fit window and the
/// initial-guess region.
pub const MIN_LEVEL: f64 = 0.5;

const MIN_LAMBDA: f64 = 1e-12;
const MAX_LAMBDA: f64 = 1e12;
const DIAG_FLOOR: f64 = 1e-9;

type Vector7 = SVector<f64, FIT_PARAMETER_COUNT>;
type Matrix7 = SMatrix<f64, FIT_PARAMETER_COUNT, FIT_PARAMETER_COUNT>;

/// Configuration for [`fit`].
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Maximum number of outer Levenberg-Marquardt iterations. Default 200.
    pub max_iterations: u32,
    /// Relative tolerance on both the step size and the cost decrease.
    /// Default 1e-10.
    pub tolerance: f64,
    /// Starting damping factor. Default 1e-3.
    pub initial_lambda: f64,
    /// Damping multiplier after a rejected step. Default 10.
    pub lambda_up: f64,
    /// Damping divisor after an accepted step. Default 10.
    pub lambda_down: f64,
    /// Drop pixels at or above `zmax - saturation_margin` when the initial
    /// guess carries a `zmax`. Default true.
    pub exclude_saturated: bool,
    /// Default 1e-9.
    pub saturation_margin: f64,
    /// If set, restrict the fit to the bounding box of pixels at or above
    /// `background + level · (max − background)`. Default None (whole image).
    pub window_level: Option<f64>,
    /// Pixels of padding around the window. Default 2.
    pub window_margin: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 10.0,
            exclude_saturated: true,
            saturation_margin: 1e-9,
            window_level: None,
            window_margin: 2,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SpotError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(SpotError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.initial_lambda > 0.0 && self.initial_lambda.is_finite()) {
            return Err(SpotError::InvalidConfig(format!(
                "initial_lambda must be positive, got {}",
                self.initial_lambda
            )));
        }
        if !(self.lambda_up > 1.0 && self.lambda_down > 1.0) {
            return Err(SpotError::InvalidConfig(format!(
                "lambda_up and lambda_down must exceed 1, got {} and {}",
                self.lambda_up, self.lambda_down
            )));
        }
        if !(self.saturation_margin >= 0.0) {
            return Err(SpotError::InvalidConfig(format!(
                "saturation_margin must be non-negative, got {}",
                self.saturation_margin
            )));
        }
        if let Some(level) = self.window_level {
            check_level(level)?;
        }
        Ok(())
    }
}

/// How a fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// Step size or cost decrease fell below the tolerance.
    Converged,
    /// `max_iterations` was reached first.
    MaxIterations,
    /// No damped step could be solved or evaluated; the parameters are the
    /// last good ones.
    Stalled,
}

/// Outcome of a fit, converged or not.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Best parameters found. `phi` is wrapped into `(−π, π]` and `zmax` is
    /// the one from the initial guess.
    pub params: SpotParams,
    pub status: FitStatus,
    /// Outer iterations performed.
    pub iterations: u32,
    /// Sum of squared residuals over the fitted pixels.
    pub cost: f64,
    /// `sqrt(cost / n_pixels)`.
    pub rmse: f64,
    /// Pixels that took part in the fit.
    pub n_pixels: usize,
}

impl FitResult {
    pub fn is_converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

/// Pixel coordinate and observed value.
#[derive(Debug, Clone, Copy)]
struct PixelSample {
    x: f64,
    y: f64,
    value: f64,
}

/// Fit the spot model to `observed`, starting from `initial`.
///
/// Fails only on precondition violations: invalid `initial`, mismatched
/// shapes, non-finite data, an invalid config, or fewer usable pixels than
/// `FIT_PARAMETER_COUNT + 1`.
pub fn fit(
    grid: &CoordinateGrid,
    observed: &IntensityField,
    initial: &SpotParams,
    config: &FitConfig,
) -> Result<FitResult> {
    initial.validate()?;
    config.validate()?;
    check_inputs(grid, observed)?;

    let samples = select_samples(grid, observed, initial.zmax, config);
    let required = FIT_PARAMETER_COUNT + 1;
    if samples.len() < required {
        return Err(SpotError::TooFewPixels {
            found: samples.len(),
            required,
        });
    }

    let zmax = initial.zmax;
    let mut theta = to_vector(initial);
    let mut cost = total_cost(&samples, &theta, zmax);
    let mut lambda = config.initial_lambda;
    let mut status = FitStatus::MaxIterations;
    let mut iterations = 0;

    debug!(
        "Fitting {} pixels, initial cost {:.6e}",
        samples.len(),
        cost
    );

    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        let (jtj, jtr) = normal_equations(&samples, &theta, zmax);

        let mut outcome = StepOutcome::Stalled;
        while lambda <= MAX_LAMBDA {
            let mut damped = jtj;
            for p in 0..FIT_PARAMETER_COUNT {
                damped[(p, p)] += lambda * jtj[(p, p)].max(DIAG_FLOOR);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= config.lambda_up;
                continue;
            };
            let delta = chol.solve(&jtr);
            let trial = apply_step(&theta, &delta);
            let trial_cost = total_cost(&samples, &trial, zmax);
            let rel_step = delta.norm() / theta.norm().max(1e-12);

            if trial_cost.is_finite() && trial_cost <= cost {
                let rel_decrease = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                theta = trial;
                cost = trial_cost;
                lambda = (lambda / config.lambda_down).max(MIN_LAMBDA);
                outcome = if rel_step < config.tolerance || rel_decrease < config.tolerance {
                    StepOutcome::Converged
                } else {
                    StepOutcome::Accepted
                };
                break;
            }
            if rel_step < config.tolerance {
                // no step of any useful size lowers the cost
                outcome = StepOutcome::Converged;
                break;
            }
            lambda *= config.lambda_up;
        }

        debug!(
            "LM iter {}: cost={:.6e} lambda={:.1e} outcome={:?}",
            iterations, cost, lambda, outcome
        );

        match outcome {
            StepOutcome::Accepted => {}
            StepOutcome::Converged => {
                status = FitStatus::Converged;
                break;
            }
            StepOutcome::Stalled => {
                status = FitStatus::Stalled;
                break;
            }
        }
    }

    let params = from_vector(&theta, zmax).normalized();
    let n_pixels = samples.len();
    let rmse = (cost / n_pixels as f64).sqrt();
    match status {
        FitStatus::Converged => info!(
            "Spot fit converged in {} iterations: rmse={:.4} sigma=({:.3}, {:.3}) center=({:.3}, {:.3})",
            iterations, rmse, params.sigma0, params.sigma1, params.xoff, params.yoff
        ),
        _ => warn!(
            "Spot fit did not converge ({:?}) after {} iterations, rmse={:.4}",
            status, iterations, rmse
        ),
    }

    Ok(FitResult {
        params,
        status,
        iterations,
        cost,
        rmse,
        n_pixels,
    })
}

/// Estimate the spot parameters and fit in one call.
///
/// The initial guess comes from [`estimate_initial`] at
/// `config.window_level` (or [`MIN_LEVEL`]), with `zmax` as the saturation
/// ceiling to hold fixed during the fit.
pub fn fit_auto(
    grid: &CoordinateGrid,
    observed: &IntensityField,
    zmax: Option<f64>,
    config: &FitConfig,
) -> Result<FitResult> {
    let level = config.window_level.unwrap_or(MIN_LEVEL);
    let initial = SpotParams {
        zmax,
        ..estimate_initial(grid, observed, level)?
    };
    fit(grid, observed, &initial, config)
}

/// Moment-based initial guess.
///
/// The background is taken as the image minimum and the amplitude as
/// `max − background`. Pixels at or above `background + level · amplitude`
/// fill an ellipse with semi-axes `sigma_i · √(−2 ln level)`; a uniformly
/// filled ellipse has second moment `semi_axis² / 4` along each axis, which
/// inverts to `sigma_i² = 4 λ_i / (−2 ln level)` for the covariance
/// eigenvalues `λ_i`. The major-axis eigenvector gives `phi`. Eigenvalues
/// are floored at `1/12`, so a line or single-pixel-wide region still yields
/// positive sigmas rather than an error.
pub fn estimate_initial(
    grid: &CoordinateGrid,
    observed: &IntensityField,
    level: f64,
) -> Result<SpotParams> {
    check_level(level)?;
    check_inputs(grid, observed)?;

    let background = observed.min();
    let amplitude = observed.max() - background;
    let threshold = background + level * amplitude;

    let region: Vec<(f64, f64)> = grid
        .iter()
        .zip(observed.iter())
        .filter(|(_, (_, _, v))| amplitude > 0.0 && *v >= threshold)
        .map(|((_, _, x, y), _)| (x, y))
        .collect();
    if region.len() < 3 {
        return Err(SpotError::TooFewPixels {
            found: region.len(),
            required: 3,
        });
    }

    let n = region.len() as f64;
    let (mx, my) = region
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    let (mx, my) = (mx / n, my / n);
    let (mut cxx, mut cyy, mut cxy) = (0.0, 0.0, 0.0);
    for (x, y) in &region {
        let dx = x - mx;
        let dy = y - my;
        cxx += dx * dx;
        cyy += dy * dy;
        cxy += dx * dy;
    }
    let cov = Matrix2::new(cxx / n, cxy / n, cxy / n, cyy / n);

    let eigen = cov.symmetric_eigen();
    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let axis = eigen.eigenvectors.column(major);
    let phi = axis[1].atan2(axis[0]);

    // a single pixel already spans a variance of 1/12
    let scale = 4.0 / (-2.0 * level.ln());
    let sigma0 = (eigen.eigenvalues[major].max(1.0 / 12.0) * scale).sqrt();
    let sigma1 = (eigen.eigenvalues[minor].max(1.0 / 12.0) * scale).sqrt();

    debug!(
        "Initial guess from {} pixels: phi={:.3} sigma=({:.2}, {:.2}) center=({:.2}, {:.2})",
        region.len(),
        phi,
        sigma0,
        sigma1,
        mx,
        my
    );

    let guess = SpotParams {
        phi: wrap_angle(phi),
        sigma0,
        sigma1,
        xoff: mx,
        yoff: my,
        zscale: amplitude,
        zoff: background,
        zmax: None,
    };
    guess.validate()?;
    Ok(guess)
}

// ── Internal helpers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Accepted,
    Converged,
    Stalled,
}

fn check_level(level: f64) -> Result<()> {
    if !(level > 0.0 && level < 1.0) {
        return Err(SpotError::InvalidConfig(format!(
            "level must lie strictly between 0 and 1, got {level}"
        )));
    }
    Ok(())
}

fn check_inputs(grid: &CoordinateGrid, observed: &IntensityField) -> Result<()> {
    if grid.shape() != observed.shape() {
        return Err(SpotError::ShapeMismatch {
            expected: grid.shape(),
            found: observed.shape(),
        });
    }
    if !observed.is_finite() {
        return Err(SpotError::NonFiniteField);
    }
    Ok(())
}

/// Pixels that take part in the fit, after windowing and saturation masking.
fn select_samples(
    grid: &CoordinateGrid,
    observed: &IntensityField,
    zmax: Option<f64>,
    config: &FitConfig,
) -> Vec<PixelSample> {
    let window = config
        .window_level
        .map(|level| fit_window(observed, level, config.window_margin));
    let ceiling = match zmax {
        Some(zmax) if config.exclude_saturated => zmax - config.saturation_margin,
        _ => f64::INFINITY,
    };

    grid.iter()
        .zip(observed.iter())
        .filter(|((i, j, _, _), _)| match window {
            Some((i0, i1, j0, j1)) => (i0..=i1).contains(i) && (j0..=j1).contains(j),
            None => true,
        })
        .filter(|(_, (_, _, value))| *value < ceiling)
        .map(|((_, _, x, y), (_, _, value))| PixelSample { x, y, value })
        .collect()
}

/// Inclusive index bounding box `(i0, i1, j0, j1)` of the pixels at or above
/// `level` of the peak above background, padded by `margin`.
fn fit_window(observed: &IntensityField, level: f64, margin: usize) -> (usize, usize, usize, usize) {
    let (rows, cols) = observed.shape();
    let background = observed.min();
    let threshold = background + level * (observed.max() - background);
    let (mut i0, mut i1, mut j0, mut j1) = (usize::MAX, 0, usize::MAX, 0);
    for (i, j, v) in observed.iter() {
        if v >= threshold {
            i0 = i0.min(i);
            i1 = i1.max(i);
            j0 = j0.min(j);
            j1 = j1.max(j);
        }
    }
    (
        i0.saturating_sub(margin),
        i1.saturating_add(margin).min(rows - 1),
        j0.saturating_sub(margin),
        j1.saturating_add(margin).min(cols - 1),
    )
}

fn to_vector(p: &SpotParams) -> Vector7 {
    Vector7::from([p.phi, p.sigma0, p.sigma1, p.xoff, p.yoff, p.zscale, p.zoff])
}

fn from_vector(theta: &Vector7, zmax: Option<f64>) -> SpotParams {
    SpotParams {
        phi: theta[0],
        sigma0: theta[1],
        sigma1: theta[2],
        xoff: theta[3],
        yoff: theta[4],
        zscale: theta[5],
        zoff: theta[6],
        zmax,
    }
}

/// `theta + delta`, halving a sigma instead of letting it go non-positive.
fn apply_step(theta: &Vector7, delta: &Vector7) -> Vector7 {
    let mut trial = theta + delta;
    for s in [1, 2] {
        if trial[s] <= 0.0 {
            trial[s] = theta[s] * 0.5;
        }
    }
    trial
}

/// Model value and its gradient with respect to the free parameters.
///
/// The gradient is zero where the model is clamped at `zmax`.
fn model_and_gradient(sample: &PixelSample, theta: &Vector7, zmax: Option<f64>) -> (f64, Vector7) {
    let (phi, s0, s1, x0, y0, zscale, zoff) = (
        theta[0], theta[1], theta[2], theta[3], theta[4], theta[5], theta[6],
    );
    let (sin, cos) = phi.sin_cos();
    let inv0 = 1.0 / (s0 * s0);
    let inv1 = 1.0 / (s1 * s1);

    let dx = sample.x - x0;
    let dy = sample.y - y0;
    // coordinates along the principal axes
    let u = dx * cos + dy * sin;
    let v = -dx * sin + dy * cos;
    let e = (-0.5 * (u * u * inv0 + v * v * inv1)).exp();
    let model = zscale * e + zoff;

    if let Some(zmax) = zmax {
        if model > zmax {
            return (zmax, Vector7::zeros());
        }
    }

    let a = zscale * e;
    let grad = Vector7::from([
        a * u * v * (inv1 - inv0),
        a * u * u * inv0 / s0,
        a * v * v * inv1 / s1,
        a * (cos * u * inv0 - sin * v * inv1),
        a * (sin * u * inv0 + cos * v * inv1),
        e,
        1.0,
    ]);
    (model, grad)
}

fn normal_equations(samples: &[PixelSample], theta: &Vector7, zmax: Option<f64>) -> (Matrix7, Vector7) {
    let mut jtj = Matrix7::zeros();
    let mut jtr = Vector7::zeros();
    for sample in samples {
        let (model, grad) = model_and_gradient(sample, theta, zmax);
        let r = sample.value - model;
        jtj += grad * grad.transpose();
        jtr += grad * r;
    }
    (jtj, jtr)
}

fn total_cost(samples: &[PixelSample], theta: &Vector7, zmax: Option<f64>) -> f64 {
    samples
        .iter()
        .map(|sample| {
            let (model, _) = model_and_gradient(sample, theta, zmax);
            let r = sample.value - model;
            r * r
        })
        .sum()
}
