//! Pixel coordinate grids and the intensity fields evaluated over them.
//!
//! Both are backed by [`nalgebra::DMatrix`]. Index `(i, j)` addresses the same
//! pixel in the x-grid, the y-grid and any field evaluated on them. For the
//! integer grid built by [`CoordinateGrid::mgrid`], `i` runs along x and `j`
//! along y.

use nalgebra::DMatrix;

use crate::error::{Result, SpotError};

/// A pair of same-shaped coordinate arrays giving the `(x, y)` position of
/// every cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateGrid {
    xs: DMatrix<f64>,
    ys: DMatrix<f64>,
}

impl CoordinateGrid {
    /// Build a grid from explicit coordinate arrays.
    pub fn new(xs: DMatrix<f64>, ys: DMatrix<f64>) -> Result<Self> {
        if xs.shape() != ys.shape() {
            return Err(SpotError::ShapeMismatch {
                expected: xs.shape(),
                found: ys.shape(),
            });
        }
        if xs.is_empty() {
            return Err(SpotError::EmptyGrid);
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(SpotError::NonFiniteField);
        }
        Ok(Self { xs, ys })
    }

    /// Dense integer grid of `nx × ny` pixels: `x = i`, `y = j`.
    pub fn mgrid(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(SpotError::EmptyGrid);
        }
        Ok(Self {
            xs: DMatrix::from_fn(nx, ny, |i, _| i as f64),
            ys: DMatrix::from_fn(nx, ny, |_, j| j as f64),
        })
    }

    /// `(rows, cols)` of the coordinate arrays.
    pub fn shape(&self) -> (usize, usize) {
        self.xs.shape()
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &DMatrix<f64> {
        &self.xs
    }

    pub fn ys(&self) -> &DMatrix<f64> {
        &self.ys
    }

    /// Coordinates of cell `(i, j)`.
    pub fn coords(&self, i: usize, j: usize) -> (f64, f64) {
        (self.xs[(i, j)], self.ys[(i, j)])
    }

    /// Largest x coordinate on the grid.
    pub fn x_extent(&self) -> f64 {
        self.xs.max()
    }

    /// Largest y coordinate on the grid.
    pub fn y_extent(&self) -> f64 {
        self.ys.max()
    }

    /// `(i, j, x, y)` for every cell in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64, f64)> + '_ {
        let (rows, cols) = self.shape();
        (0..rows).flat_map(move |i| {
            (0..cols).map(move |j| (i, j, self.xs[(i, j)], self.ys[(i, j)]))
        })
    }
}

/// Real-valued intensity over a pixel grid.
///
/// Produced by [`evaluate`](crate::evaluate) or [`generate`](crate::generate);
/// never modified in place. Clamping returns a new field.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityField {
    values: DMatrix<f64>,
}

impl IntensityField {
    /// Wrap an existing matrix of intensities, e.g. a decoded image.
    pub fn from_matrix(values: DMatrix<f64>) -> Self {
        Self { values }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get((i, j)).copied()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.values
    }

    /// `(i, j, value)` for every cell in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let (rows, cols) = self.shape();
        (0..rows).flat_map(move |i| (0..cols).map(move |j| (i, j, self.values[(i, j)])))
    }

    pub fn min(&self) -> f64 {
        self.values.min()
    }

    pub fn max(&self) -> f64 {
        self.values.max()
    }

    /// Index of the largest value (first in row-major order on ties).
    pub fn argmax(&self) -> (usize, usize) {
        let mut best = (0, 0);
        let mut best_val = f64::NEG_INFINITY;
        for (i, j, v) in self.iter() {
            if v > best_val {
                best_val = v;
                best = (i, j);
            }
        }
        best
    }

    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Elementwise `min(value, zmax)`.
    pub fn clamp_max(&self, zmax: f64) -> Self {
        Self {
            values: self.values.map(|v| v.min(zmax)),
        }
    }

    /// Elementwise clamp into `[lo, hi]`.
    pub fn clamp(&self, lo: f64, hi: f64) -> Self {
        Self {
            values: self.values.map(|v| v.max(lo).min(hi)),
        }
    }
}
