//! Diffuse-field spatial coherence model
//!
//! The spatial covariance a diffuse (isotropic) field induces between two
//! sensors of a modal array expands on Legendre polynomials of the angle
//! between them, weighted by the squared modal response magnitudes:
//!
//!   C_qp(k) = sum_n (2n+1) |b_n(k)|^2 P_n(cos angle(q, p))
//!
//! with b_n normalised by the 4pi convention used by the modal model.

use ndarray::Array2;

use crate::legendre_column;

/// Diffuse coherence matrix for one frequency.
///
/// `order_weights[n]` is |b_n(k)|^2 (4pi-normalised), `cos_angles` holds the
/// cosine of the great-circle angle between every sensor pair (Q x Q).
pub fn diffuse_coherence_matrix(
    order_weights: &[f64],
    cos_angles: &Array2<f64>,
) -> Array2<f64> {
    let q = cos_angles.nrows();
    let n_max = order_weights.len().saturating_sub(1);
    let mut c = Array2::<f64>::zeros((q, q));
    for i in 0..q {
        for j in i..q {
            let p = legendre_column(n_max, cos_angles[[i, j]]);
            let mut acc = 0.0;
            for (n, &w) in order_weights.iter().enumerate() {
                acc += (2 * n + 1) as f64 * w * p[n];
            }
            c[[i, j]] = acc;
            c[[j, i]] = acc;
        }
    }
    c
}
