//! Regularised inversion of modal responses
//!
//! Turns per-order modal responses into per-order equalisation filters
//! while keeping the worst-case noise amplification under a user ceiling.
//! The ceiling is expressed per sensor, so the working limit scales with
//! sqrt(Q): uncorrelated sensor self-noise averages down by that factor
//! over the sampling pseudo-inverse.

use ndarray::Array2;
use num_complex::Complex64;

use sf_core::{db_to_linear, AmbisonicOrder};
use sf_math::max_re_weights;

use crate::config::FilterDesign;

/// Modal magnitudes below this are treated as a dead order.
const DEAD_ORDER_EPS: f64 = 1e-12;

/// Per-order, per-band equalisation filters, shape (bands, order + 1).
///
/// `modal` holds the 4pi-normalised modal responses for the encoding order,
/// `kr` and `freqs` run over the same bands. `max_gain_db` is the per-sensor
/// amplification ceiling.
pub fn regularised_inversion(
    modal: &Array2<Complex64>,
    design: FilterDesign,
    max_gain_db: f32,
    num_sensors: usize,
    order: AmbisonicOrder,
    kr: &[f64],
    freqs: &[f32],
) -> Array2<Complex64> {
    debug_assert_eq!(modal.ncols(), order.as_usize() + 1);
    debug_assert_eq!(modal.nrows(), kr.len());
    let g_lim = (num_sensors as f64).sqrt() * db_to_linear(max_gain_db) as f64;

    match design {
        FilterDesign::SoftLimit => soft_limit(modal, g_lim),
        FilterDesign::Tikhonov => tikhonov(modal, g_lim),
        FilterDesign::LinearPhase => linear_phase(modal, g_lim, order, kr, freqs, false),
        FilterDesign::LinearPhaseMaxRe => {
            linear_phase(modal, g_lim, order, kr, freqs, true)
        }
    }
}

/// Exact inversion with the magnitude bent through a soft knee:
/// f = (2 g/pi) atan(pi |1/b| / (2 g)), phase of 1/b preserved.
fn soft_limit(modal: &Array2<Complex64>, g_lim: f64) -> Array2<Complex64> {
    let pi = std::f64::consts::PI;
    modal.mapv(|b| {
        let mag_b = b.norm();
        if mag_b < DEAD_ORDER_EPS {
            return Complex64::new(0.0, 0.0);
        }
        let soft = (2.0 * g_lim / pi) * (pi / (mag_b * 2.0 * g_lim)).atan();
        // conj(b)/|b| is the unit phase of 1/b
        (b.conj() / mag_b) * soft
    })
}

/// Tikhonov-regularised inversion: f = conj(b) / (|b|^2 + beta^2), with
/// beta derived from the gain ceiling alpha.
fn tikhonov(modal: &Array2<Complex64>, g_lim: f64) -> Array2<Complex64> {
    let alpha = g_lim.max(1.0 + 1e-6);
    let t = (1.0 - 1.0 / (alpha * alpha)).max(0.0).sqrt();
    let beta_sq = (1.0 - t) / (1.0 + t);
    modal.mapv(|b| b.conj() / (b.norm_sqr() + beta_sq))
}

/// Linear-phase design: per order, the hard inverse magnitude is used where
/// it stays under the ceiling and rolled off below the per-order cutoff
/// with an n-th order Butterworth-style split; all orders share the e^{jkr}
/// phase term. Order 0 is never rolled off, so it anchors the absolute
/// level.
fn linear_phase(
    modal: &Array2<Complex64>,
    g_lim: f64,
    order: AmbisonicOrder,
    kr: &[f64],
    freqs: &[f32],
    max_re_taper: bool,
) -> Array2<Complex64> {
    let n_max = order.as_usize();
    let bands = modal.nrows();
    let weights = if max_re_taper {
        max_re_weights(order)
    } else {
        vec![1.0; n_max + 1]
    };

    // Per-order cutoffs: lowest band where the hard inverse fits under the
    // ceiling. An order that never fits is pinned to the top band.
    let mut cutoff = vec![freqs[0] as f64; n_max + 1];
    for n in 1..=n_max {
        cutoff[n] = freqs[bands - 1] as f64;
        for band in 0..bands {
            if modal[[band, n]].norm() >= 1.0 / g_lim {
                cutoff[n] = freqs[band] as f64;
                break;
            }
        }
    }

    let mut out = Array2::<Complex64>::zeros((bands, n_max + 1));
    for band in 0..bands {
        let f = freqs[band] as f64;
        let phase = Complex64::new(0.0, kr[band]).exp();

        for n in 0..=n_max {
            let mag_b = modal[[band, n]].norm();
            let inv = if mag_b < DEAD_ORDER_EPS {
                0.0
            } else {
                (1.0 / mag_b).min(g_lim)
            };
            let hp = if n == 0 {
                1.0
            } else {
                let x = (f / cutoff[n]).powi(n as i32);
                x / (1.0 + x * x).sqrt()
            };
            out[[band, n]] = phase * (hp * inv * weights[n]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ArrayConstruction, SensorPattern};
    use crate::modal::modal_coefficients;

    fn tetra_setup() -> (Array2<Complex64>, Vec<f64>, Vec<f32>) {
        let freqs: Vec<f32> = (1..=128).map(|k| k as f32 * 187.5).collect();
        let kr: Vec<f64> = freqs
            .iter()
            .map(|&f| 2.0 * std::f64::consts::PI * f as f64 * 0.042 / 343.0)
            .collect();
        let modal = modal_coefficients(
            1,
            &kr,
            &kr,
            ArrayConstruction::Spherical,
            SensorPattern::RigidOmni,
        );
        (modal, kr, freqs)
    }

    fn max_gain(filters: &Array2<Complex64>) -> f64 {
        filters.iter().map(|v| v.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn test_all_designs_respect_ceiling() {
        let (modal, kr, freqs) = tetra_setup();
        let g_lim = 2.0 * db_to_linear(15.0) as f64; // sqrt(4) sensors
        for design in [
            FilterDesign::SoftLimit,
            FilterDesign::Tikhonov,
            FilterDesign::LinearPhase,
            FilterDesign::LinearPhaseMaxRe,
        ] {
            let f = regularised_inversion(
                &modal,
                design,
                15.0,
                4,
                AmbisonicOrder::First,
                &kr,
                &freqs,
            );
            // Small headroom for the Tikhonov peak and the 0th-order anchor
            assert!(
                max_gain(&f) <= g_lim * 1.05,
                "{design:?} exceeded ceiling: {} vs {}",
                max_gain(&f),
                g_lim
            );
            assert!(f.iter().all(|v| v.re.is_finite() && v.im.is_finite()));
        }
    }

    #[test]
    fn test_soft_limit_tracks_exact_inverse_when_well_conditioned() {
        let (modal, kr, freqs) = tetra_setup();
        let f = regularised_inversion(
            &modal,
            FilterDesign::SoftLimit,
            40.0, // generous ceiling
            4,
            AmbisonicOrder::First,
            &kr,
            &freqs,
        );
        // 0th order is well conditioned everywhere; the filter should be
        // close to the exact inverse at mid frequencies
        for band in 40..80 {
            let exact = 1.0 / modal[[band, 0]].norm();
            assert!((f[[band, 0]].norm() - exact).abs() / exact < 0.05);
        }
    }

    #[test]
    fn test_soft_limit_preserves_phase() {
        let (modal, kr, freqs) = tetra_setup();
        let f = regularised_inversion(
            &modal,
            FilterDesign::SoftLimit,
            15.0,
            4,
            AmbisonicOrder::First,
            &kr,
            &freqs,
        );
        for band in [5usize, 50, 120] {
            for n in 0..=1 {
                let prod = f[[band, n]] * modal[[band, n]];
                // f and 1/b share their phase, so f*b is (positive) real
                assert!(prod.im.abs() < 1e-9 * prod.norm().max(1e-30));
                assert!(prod.re >= 0.0);
            }
        }
    }

    #[test]
    fn test_ceiling_is_monotone() {
        // Lowering the ceiling never increases the worst-case gain
        let (modal, kr, freqs) = tetra_setup();
        for design in [FilterDesign::SoftLimit, FilterDesign::Tikhonov] {
            let mut prev = f64::INFINITY;
            for db in [30.0f32, 20.0, 10.0, 0.0] {
                let f = regularised_inversion(
                    &modal,
                    design,
                    db,
                    4,
                    AmbisonicOrder::First,
                    &kr,
                    &freqs,
                );
                let g = max_gain(&f);
                assert!(
                    g <= prev + 1e-9,
                    "{design:?}: gain grew when ceiling dropped to {db} dB"
                );
                prev = g;
            }
        }
    }

    #[test]
    fn test_linear_phase_is_linear_phase() {
        let (modal, kr, freqs) = tetra_setup();
        let f = regularised_inversion(
            &modal,
            FilterDesign::LinearPhase,
            15.0,
            4,
            AmbisonicOrder::First,
            &kr,
            &freqs,
        );
        // All orders share the same e^{jkr} phase
        for band in [10usize, 60, 120] {
            let expected = kr[band];
            for n in 0..=1 {
                if f[[band, n]].norm() > 1e-9 {
                    let arg = f[[band, n]].arg().rem_euclid(2.0 * std::f64::consts::PI);
                    let want = expected.rem_euclid(2.0 * std::f64::consts::PI);
                    assert!(
                        (arg - want).abs() < 1e-9 || (arg - want).abs() > 2.0 * std::f64::consts::PI - 1e-9,
                        "band {band} order {n}: phase {arg} vs {want}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_max_re_taper_reduces_first_order() {
        let (modal, kr, freqs) = tetra_setup();
        let plain = regularised_inversion(
            &modal,
            FilterDesign::LinearPhase,
            15.0,
            4,
            AmbisonicOrder::First,
            &kr,
            &freqs,
        );
        let tapered = regularised_inversion(
            &modal,
            FilterDesign::LinearPhaseMaxRe,
            15.0,
            4,
            AmbisonicOrder::First,
            &kr,
            &freqs,
        );
        let mut saw_reduction = false;
        for band in 0..plain.nrows() {
            let p = plain[[band, 1]].norm();
            let t = tapered[[band, 1]].norm();
            assert!(t <= p + 1e-12);
            if t < p * 0.99 {
                saw_reduction = true;
            }
        }
        assert!(saw_reduction);
    }

    #[test]
    fn test_dead_order_yields_zero_filter() {
        let mut modal = Array2::<Complex64>::zeros((4, 2));
        for band in 0..4 {
            modal[[band, 0]] = Complex64::new(1.0, 0.0);
            // order 1 left dead
        }
        let kr = vec![0.1, 0.2, 0.3, 0.4];
        let freqs = vec![100.0, 200.0, 300.0, 400.0];
        for design in [
            FilterDesign::SoftLimit,
            FilterDesign::Tikhonov,
            FilterDesign::LinearPhase,
        ] {
            let f = regularised_inversion(
                &modal,
                design,
                15.0,
                4,
                AmbisonicOrder::First,
                &kr,
                &freqs,
            );
            for band in 0..4 {
                assert!(
                    f[[band, 1]].norm() < 1e-9,
                    "{design:?} invented gain for a dead order"
                );
                assert!(f[[band, 1]].is_finite());
            }
        }
    }
}
