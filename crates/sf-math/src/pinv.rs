//! Moore-Penrose pseudo-inverse (SVD via nalgebra)

use nalgebra::DMatrix;
use ndarray::Array2;
use sf_core::{SpatialError, SpatialResult};

/// Pseudo-inverse of an arbitrary real matrix.
///
/// For an (r x c) input the result is (c x r). Singular values below the
/// relative epsilon are treated as zero, which is what keeps the encoding
/// matrix bounded for redundant sensor layouts.
pub fn pseudo_inverse(a: &Array2<f64>) -> SpatialResult<Array2<f64>> {
    let (rows, cols) = a.dim();
    let m = DMatrix::from_fn(rows, cols, |i, j| a[[i, j]]);
    let p = m
        .pseudo_inverse(1e-9)
        .map_err(|e| SpatialError::ProcessingError(format!("pseudo-inverse failed: {e}")))?;
    Ok(Array2::from_shape_fn((cols, rows), |(i, j)| p[(i, j)]))
}
