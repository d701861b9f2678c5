//! Beam size and energy figures derived from a parameter set.

use crate::error::{Result, SpotError};
use crate::params::SpotParams;

/// Intensity fraction (of the peak above background) at which the contour
/// diameter is measured.
pub const CONTOUR_LEVEL: f64 = 0.85;

/// `FWHM = 2 √(2 ln 2) · sigma`
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949;

/// Summary figures for one spot.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamMetrics {
    /// Unsaturated peak, `zscale + zoff`.
    pub peak: f64,
    /// `zscale · sigma0 · sigma1`, invariant under focusing.
    pub energy: f64,
    /// `2π · energy`, the volume under the Gaussian term.
    pub integrated_energy: f64,
    /// Full width at half maximum along the first axis.
    pub fwhm0: f64,
    /// Full width at half maximum along the second axis.
    pub fwhm1: f64,
    /// Level at which the contour diameters were taken.
    pub contour_level: f64,
    /// Diameter of the `contour_level` contour along the first axis.
    pub contour_diameter0: f64,
    /// Diameter of the `contour_level` contour along the second axis.
    pub contour_diameter1: f64,
    /// 0 for a round spot, approaching 1 as it elongates.
    pub eccentricity: f64,
}

impl BeamMetrics {
    /// Metrics at the default [`CONTOUR_LEVEL`].
    pub fn from_params(params: &SpotParams) -> Result<Self> {
        Self::with_contour_level(params, CONTOUR_LEVEL)
    }

    /// Metrics with contour diameters taken where the Gaussian term falls to
    /// `level` of its peak: `2 · sigma · √(−2 ln level)`.
    pub fn with_contour_level(params: &SpotParams, level: f64) -> Result<Self> {
        params.validate()?;
        if !(level > 0.0 && level < 1.0) {
            return Err(SpotError::InvalidConfig(format!(
                "contour level must lie strictly between 0 and 1, got {level}"
            )));
        }
        let radius_per_sigma = (-2.0 * level.ln()).sqrt();
        let major = params.sigma0.max(params.sigma1);
        let minor = params.sigma0.min(params.sigma1);

        Ok(Self {
            peak: params.peak(),
            energy: params.energy(),
            integrated_energy: params.integrated_energy(),
            fwhm0: FWHM_PER_SIGMA * params.sigma0,
            fwhm1: FWHM_PER_SIGMA * params.sigma1,
            contour_level: level,
            contour_diameter0: 2.0 * radius_per_sigma * params.sigma0,
            contour_diameter1: 2.0 * radius_per_sigma * params.sigma1,
            eccentricity: (1.0 - (minor / major).powi(2)).sqrt(),
        })
    }

    /// Geometric mean of the two FWHM values.
    pub fn fwhm(&self) -> f64 {
        (self.fwhm0 * self.fwhm1).sqrt()
    }
}
