//! Modal (per-order) frequency responses of sensor arrays
//!
//! Closed-form responses of spherical and cylindrical arrays to a unit
//! plane wave, per spherical-harmonic order. All values carry the 4pi
//! plane-wave expansion term already divided out, so a 0th-order open
//! array tends to 1 at low frequency and the sampling-matrix
//! pseudo-inverse downstream needs no extra scaling.

use ndarray::Array2;
use num_complex::Complex64;

use sf_math::{
    bessel_j, bessel_j_deriv, hankel2, hankel2_deriv, sph_bessel_j, sph_bessel_j_deriv,
    sph_hankel2, sph_hankel2_deriv,
};

use crate::geometry::{ArrayConstruction, SensorPattern};

/// Highest order the modal model evaluates.
///
/// Above this the Hankel ratios are numerically worthless at audio-range
/// kr, and nothing in the pipeline ever asks for more.
pub const MAX_SIMULATION_ORDER: usize = 28;

/// i^n on the unit circle
fn i_pow(n: usize) -> Complex64 {
    match n % 4 {
        0 => Complex64::new(1.0, 0.0),
        1 => Complex64::new(0.0, 1.0),
        2 => Complex64::new(-1.0, 0.0),
        _ => Complex64::new(0.0, -1.0),
    }
}

/// Per-order modal responses, shape (bands, order + 1).
///
/// `kr` is the wavenumber-radius product at the sensor radius, `k_baffle_r`
/// the same at the baffle radius (equal when the sensors sit flush). Orders
/// above [`MAX_SIMULATION_ORDER`] are clamped. Cylindrical arrays only
/// model omnidirectional sensors; directional cylindrical requests are
/// reported and produce a zero response.
pub fn modal_coefficients(
    order: usize,
    kr: &[f64],
    k_baffle_r: &[f64],
    construction: ArrayConstruction,
    pattern: SensorPattern,
) -> Array2<Complex64> {
    let order = if order > MAX_SIMULATION_ORDER {
        log::warn!(
            "modal simulation order {order} clamped to {MAX_SIMULATION_ORDER}"
        );
        MAX_SIMULATION_ORDER
    } else {
        order
    };
    let mut out = Array2::<Complex64>::zeros((kr.len(), order + 1));

    match construction {
        ArrayConstruction::Spherical => {
            spherical_rows(&mut out, order, kr, k_baffle_r, pattern)
        }
        ArrayConstruction::Cylindrical => {
            cylindrical_rows(&mut out, order, kr, k_baffle_r, pattern)
        }
    }
    out
}

fn spherical_rows(
    out: &mut Array2<Complex64>,
    order: usize,
    kr: &[f64],
    k_baffle_r: &[f64],
    pattern: SensorPattern,
) {
    let d = pattern.directivity();
    for (band, (&x, &xb)) in kr.iter().zip(k_baffle_r).enumerate() {
        if x <= 0.0 {
            continue;
        }
        let j = sph_bessel_j(order, x);
        let jd = sph_bessel_j_deriv(order, x);
        if pattern.is_rigid() {
            let h2 = sph_hankel2(order, x);
            let h2d = sph_hankel2_deriv(order, x);
            let jd_b = sph_bessel_j_deriv(order, xb);
            let h2d_b = sph_hankel2_deriv(order, xb);
            for n in 0..=order {
                // Incident directional response minus the rigid-baffle
                // scattered term, matched at the baffle surface
                let incident = Complex64::new(d * j[n], -(1.0 - d) * jd[n]);
                let ratio = Complex64::new(jd_b[n], 0.0) / h2d_b[n];
                let scattered =
                    ratio * (d * h2[n] - Complex64::new(0.0, 1.0 - d) * h2d[n]);
                out[[band, n]] = i_pow(n) * (incident - scattered);
            }
        } else {
            for n in 0..=order {
                out[[band, n]] =
                    i_pow(n) * Complex64::new(d * j[n], -(1.0 - d) * jd[n]);
            }
        }
    }
}

fn cylindrical_rows(
    out: &mut Array2<Complex64>,
    order: usize,
    kr: &[f64],
    k_baffle_r: &[f64],
    pattern: SensorPattern,
) {
    if pattern.directivity() < 1.0 {
        log::warn!(
            "directional sensors are not modelled for cylindrical arrays; \
             modal response left at zero"
        );
        return;
    }
    let rigid = pattern.is_rigid();
    for (band, (&x, &xb)) in kr.iter().zip(k_baffle_r).enumerate() {
        if x <= 0.0 {
            continue;
        }
        for n in 0..=order {
            let jn = bessel_j(n, x);
            out[[band, n]] = if rigid {
                let ratio = bessel_j_deriv(n, xb) / hankel2_deriv(n, xb);
                i_pow(n) * (Complex64::new(jn, 0.0) - ratio * hankel2(n, x))
            } else {
                i_pow(n) * jn
            };
        }
    }
}
