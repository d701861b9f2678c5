//! Physical description of one elliptical Gaussian laser spot.

use std::f64::consts::PI;

use crate::error::{Result, SpotError};

/// Parameters of a rotated, offset, scaled and optionally saturating
/// elliptical Gaussian.
///
/// ```text
/// I(x, y) = zscale · exp(−½ Q(x − xoff, y − yoff)) + zoff,   clamped to zmax
/// ```
///
/// This is a plain value type: deriving a new spot (e.g. by
/// [`focused`](SpotParams::focused)) always builds a new record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotParams {
    /// Rotation of the first principal axis from the +x axis, radians.
    pub phi: f64,
    /// Standard deviation along the first principal axis, pixels. Must be > 0.
    pub sigma0: f64,
    /// Standard deviation along the second principal axis, pixels. Must be > 0.
    pub sigma1: f64,
    /// Center x coordinate, pixels. Default 0.
    pub xoff: f64,
    /// Center y coordinate, pixels. Default 0.
    pub yoff: f64,
    /// Peak amplitude above `zoff`. Default 1.
    pub zscale: f64,
    /// Uniform background added to every pixel. Default 0.
    pub zoff: f64,
    /// Saturation ceiling applied after scale and offset. Default none.
    pub zmax: Option<f64>,
}

/// Coefficients of the quadratic form `Q = A·dx² + B·dy² + C·dx·dy`.
///
/// Along the rotated axes the form diagonalizes to `1/sigma0²` and `1/sigma1²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Precision {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Precision {
    /// Evaluate `Q(dx, dy)`.
    #[inline]
    pub fn quadratic(&self, dx: f64, dy: f64) -> f64 {
        self.a * dx * dx + self.b * dy * dy + self.c * dx * dy
    }
}

impl SpotParams {
    /// Create a spot with the given orientation and widths and the default
    /// center `(0, 0)`, scale `1`, offset `0` and no saturation.
    pub fn new(phi: f64, sigma0: f64, sigma1: f64) -> Result<Self> {
        let params = Self {
            phi,
            sigma0,
            sigma1,
            xoff: 0.0,
            yoff: 0.0,
            zscale: 1.0,
            zoff: 0.0,
            zmax: None,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_center(self, xoff: f64, yoff: f64) -> Self {
        Self { xoff, yoff, ..self }
    }

    pub fn with_scale(self, zscale: f64) -> Self {
        Self { zscale, ..self }
    }

    pub fn with_offset(self, zoff: f64) -> Self {
        Self { zoff, ..self }
    }

    pub fn with_saturation(self, zmax: f64) -> Self {
        Self {
            zmax: Some(zmax),
            ..self
        }
    }

    pub fn without_saturation(self) -> Self {
        Self { zmax: None, ..self }
    }

    /// Check the domain preconditions: both sigmas strictly positive and every
    /// field finite.
    ///
    /// Fields are public, so this runs at the top of every operation that
    /// consumes a parameter set rather than only at construction.
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma0 > 0.0 && self.sigma1 > 0.0)
            || !self.sigma0.is_finite()
            || !self.sigma1.is_finite()
        {
            return Err(SpotError::InvalidSigma {
                sigma0: self.sigma0,
                sigma1: self.sigma1,
            });
        }
        let fields = [
            ("phi", self.phi),
            ("xoff", self.xoff),
            ("yoff", self.yoff),
            ("zscale", self.zscale),
            ("zoff", self.zoff),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(SpotError::NonFinite { field });
            }
        }
        if let Some(zmax) = self.zmax {
            // +inf means no ceiling; NaN and -inf clamp everything away
            if zmax.is_nan() || zmax == f64::NEG_INFINITY {
                return Err(SpotError::NonFinite { field: "zmax" });
            }
        }
        Ok(())
    }

    /// Quadratic-form coefficients `A`, `B`, `C` for this orientation and width.
    pub fn precision(&self) -> Precision {
        let (sin, cos) = self.phi.sin_cos();
        let inv0 = 1.0 / (self.sigma0 * self.sigma0);
        let inv1 = 1.0 / (self.sigma1 * self.sigma1);
        Precision {
            a: cos * cos * inv0 + sin * sin * inv1,
            b: sin * sin * inv0 + cos * cos * inv1,
            c: 2.0 * sin * cos * (inv0 - inv1),
        }
    }

    /// `zscale · sigma0 · sigma1`, proportional to the total radiant energy of
    /// the Gaussian term. Invariant under [`focused`](SpotParams::focused).
    pub fn energy(&self) -> f64 {
        self.zscale * self.sigma0 * self.sigma1
    }

    /// Volume of the Gaussian term above `zoff`: `2π · zscale · sigma0 · sigma1`.
    pub fn integrated_energy(&self) -> f64 {
        2.0 * PI * self.energy()
    }

    /// Unsaturated peak value at the center.
    pub fn peak(&self) -> f64 {
        self.zscale + self.zoff
    }

    /// Same spot with `phi` wrapped into `(−π, π]`.
    pub fn normalized(self) -> Self {
        Self {
            phi: wrap_angle(self.phi),
            ..self
        }
    }
}

/// Wrap an angle into `(−π, π]`.
pub(crate) fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}
