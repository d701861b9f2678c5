//! The saturating elliptical Gaussian intensity model.
//!
//! ```text
//! dx = x − xoff,  dy = y − yoff
//! A  = (cos φ / σ0)² + (sin φ / σ1)²
//! B  = (sin φ / σ0)² + (cos φ / σ1)²
//! C  = 2 sin φ cos φ (1/σ0² − 1/σ1²)
//! I  = zscale · exp(−½ (A dx² + B dy² + C dx dy)) + zoff
//! I  = min(I, zmax)                      if zmax is set
//! ```
//!
//! The clamp is applied after scale and offset, so `zoff` counts toward
//! saturation.

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{Result, SpotError};
use crate::grid::{CoordinateGrid, IntensityField};
use crate::params::{Precision, SpotParams};

/// Evaluate the model at every cell of `grid`.
///
/// Fails if `params` is outside the valid domain, or if the evaluation
/// produced a non-finite value (e.g. from an overflowing `zscale`).
pub fn evaluate(grid: &CoordinateGrid, params: &SpotParams) -> Result<IntensityField> {
    params.validate()?;
    let prec = params.precision();
    debug!(
        "Evaluating spot model on {:?} grid (A={:.4e}, B={:.4e}, C={:.4e})",
        grid.shape(),
        prec.a,
        prec.b,
        prec.c
    );

    let values = grid
        .xs()
        .zip_map(grid.ys(), |x, y| intensity_with(params, &prec, x, y));
    ensure_finite(values)
}

/// Model value at a single coordinate.
///
/// Does not validate `params`; callers that accept untrusted parameters
/// should go through [`evaluate`] or call [`SpotParams::validate`] first.
pub fn intensity_at(params: &SpotParams, x: f64, y: f64) -> f64 {
    intensity_with(params, &params.precision(), x, y)
}

/// Unclamped Gaussian term `exp(−½ Q)` at `(x, y)`, without scale or offset.
pub(crate) fn gaussian_term(params: &SpotParams, prec: &Precision, x: f64, y: f64) -> f64 {
    let dx = x - params.xoff;
    let dy = y - params.yoff;
    (-0.5 * prec.quadratic(dx, dy)).exp()
}

#[inline]
fn intensity_with(params: &SpotParams, prec: &Precision, x: f64, y: f64) -> f64 {
    let value = params.zscale * gaussian_term(params, prec, x, y) + params.zoff;
    match params.zmax {
        Some(zmax) => value.min(zmax),
        None => value,
    }
}

fn ensure_finite(values: DMatrix<f64>) -> Result<IntensityField> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SpotError::NonFiniteField);
    }
    Ok(IntensityField::from_matrix(values))
}
