//! Energy-preserving refocusing of a spot.
//!
//! Focusing by a factor `k` narrows both principal axes by `√k` and raises the
//! amplitude by `k`:
//!
//! ```text
//! sigma0' = sigma0 / √k,   sigma1' = sigma1 / √k,   zscale' = zscale · k
//! ```
//!
//! so `zscale · sigma0 · sigma1` (the total energy up to a constant `2π`) is
//! unchanged. Orientation, center, background and saturation are carried over.

use crate::error::{Result, SpotError};
use crate::params::SpotParams;

/// Default refocusing factor used when simulating a tighter beam.
pub const FOCUS_FACTOR: f64 = 4.0;

/// Derive the spot produced by focusing `params` by `factor`.
///
/// `params` is left untouched. Fails if `factor` is not strictly positive and
/// finite, or if `params` is invalid.
pub fn focus(params: &SpotParams, factor: f64) -> Result<SpotParams> {
    if !(factor > 0.0 && factor.is_finite()) {
        return Err(SpotError::InvalidFocusFactor(factor));
    }
    params.validate()?;

    let shrink = factor.sqrt();
    let focused = SpotParams {
        sigma0: params.sigma0 / shrink,
        sigma1: params.sigma1 / shrink,
        zscale: params.zscale * factor,
        ..*params
    };
    // extreme factors can underflow a sigma or overflow zscale
    focused.validate()?;
    Ok(focused)
}

impl SpotParams {
    /// Method form of [`focus`].
    pub fn focused(&self, factor: f64) -> Result<SpotParams> {
        focus(self, factor)
    }
}
