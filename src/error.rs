//! Error type shared by every operation in the crate.
//!
//! All failures are precondition violations: a parameter set, grid, or
//! configuration that lies outside the valid domain. Valid input always
//! succeeds. Fitter non-convergence is *not* an error; it is reported through
//! [`FitStatus`](crate::FitStatus) on a successful [`FitResult`](crate::FitResult).

/// Errors raised by the spot model, generator, focus transform and fitter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SpotError {
    /// One of the principal-axis widths is zero, negative or not finite.
    #[error("sigmas must be strictly positive and finite (sigma0 = {sigma0}, sigma1 = {sigma1})")]
    InvalidSigma { sigma0: f64, sigma1: f64 },
    /// The focusing factor is zero, negative or not finite.
    #[error("focus factor must be strictly positive and finite, got {0}")]
    InvalidFocusFactor(f64),
    /// A parameter field holds NaN or infinity.
    #[error("parameter `{field}` is not finite")]
    NonFinite { field: &'static str },
    /// Evaluation or input data produced NaN or infinity.
    #[error("intensity field contains non-finite values")]
    NonFiniteField,
    /// Two arrays that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// A grid with zero rows or columns.
    #[error("coordinate grid must have at least one row and one column")]
    EmptyGrid,
    /// Not enough usable pixels for the requested estimate.
    #[error("too few usable pixels: found {found}, need at least {required}")]
    TooFewPixels { found: usize, required: usize },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SpotError>;
