//! Objective evaluation of an encoding matrix
//!
//! Simulates the array's response to a dense grid of plane waves and
//! compares the encoded output against the ideal spherical harmonics,
//! per order and per band. Runs offline, never on the audio thread.

use ndarray::Array2;
use num_complex::Complex64;

use sf_core::{acn_to_order_degree, linear_to_db};
use sf_math::{fibonacci_sphere, legendre_column, real_sh_matrix};

use crate::geometry::{ArrayConstruction, ArrayGeometry};
use crate::matrix::EncodingMatrix;

/// Number of plane-wave directions in the evaluation grid.
const EVAL_GRID_SIZE: usize = 144;

/// Per-band, per-order performance metrics.
#[derive(Debug, Clone)]
pub struct EncodingDiagnostics {
    /// Band centre frequencies in Hz
    pub frequencies: Vec<f32>,
    /// 20 log10 of the unregularised inverse magnitude, (bands, N+1)
    pub ideal_inverse_db: Array2<f32>,
    /// 20 log10 of the realised filter magnitude, (bands, N+1)
    pub regularised_db: Array2<f32>,
    /// Spatial correlation against the ideal harmonics, 0..1, (bands, N+1)
    pub spatial_correlation: Array2<f32>,
    /// Diffuse level difference against ideal in dB, (bands, N+1)
    pub level_difference_db: Array2<f32>,
}

/// Evaluate an encoding matrix against simulated plane waves.
///
/// `gains` are the realised per-order filters and `sim_modal` the modal
/// responses used to synthesise the sensor spectra; evaluating `sim_modal`
/// beyond the encoding order exposes aliasing the encoder cannot undo.
pub fn evaluate_performance(
    matrix: &EncodingMatrix,
    gains: &Array2<Complex64>,
    sim_modal: &Array2<Complex64>,
    geometry: &ArrayGeometry,
    freqs: &[f32],
) -> EncodingDiagnostics {
    let order = matrix.order();
    let n = order.as_usize();
    let n_sh = order.channel_count();
    let n_bands = matrix.num_bands();
    let q = geometry.num_sensors();

    let grid = fibonacci_sphere(EVAL_GRID_SIZE);
    let y_ideal = real_sh_matrix(order, &grid); // (nSH x D)

    // Angular basis between every sensor and grid direction, per modal
    // order: (2k+1) P_k(cos angle) on a sphere, harmonic cosines on a
    // cylinder. Computed once; the band loop is then a plain dot product.
    let sensors = geometry.sensor_directions();
    let sim_orders = sim_modal.ncols();
    let mut basis = vec![vec![0.0f64; sim_orders]; q * grid.len()];
    for (s, sensor) in sensors.iter().enumerate() {
        for (d, dir) in grid.iter().enumerate() {
            let row = &mut basis[s * grid.len() + d];
            match geometry.construction() {
                ArrayConstruction::Spherical => {
                    let p = legendre_column(sim_orders - 1, sensor.cos_angle_to(dir) as f64);
                    for k in 0..sim_orders {
                        row[k] = (2 * k + 1) as f64 * p[k];
                    }
                }
                ArrayConstruction::Cylindrical => {
                    let daz = (sensor.azimuth_rad() - dir.azimuth_rad()) as f64;
                    for k in 0..sim_orders {
                        let eps = if k == 0 { 1.0 } else { 2.0 };
                        row[k] = eps * (k as f64 * daz).cos();
                    }
                }
            }
        }
    }

    let mut ideal_inverse_db = Array2::<f32>::zeros((n_bands, n + 1));
    let mut regularised_db = Array2::<f32>::zeros((n_bands, n + 1));
    let mut spatial_correlation = Array2::<f32>::zeros((n_bands, n + 1));
    let mut level_difference_db = Array2::<f32>::zeros((n_bands, n + 1));

    let mut p = Array2::<Complex64>::zeros((q, grid.len()));
    for band in 0..n_bands {
        // Sensor spectra for every grid plane wave
        for s in 0..q {
            for d in 0..grid.len() {
                let row = &basis[s * grid.len() + d];
                let mut acc = Complex64::new(0.0, 0.0);
                for k in 0..sim_orders {
                    acc += sim_modal[[band, k]] * row[k];
                }
                p[[s, d]] = acc;
            }
        }

        // Encoded output E = W * P, accumulated straight into the per-order
        // correlation and energy sums
        let w = matrix.band(band);
        let mut num = vec![Complex64::new(0.0, 0.0); n + 1];
        let mut energy = vec![0.0f64; n + 1];
        let mut energy_ideal = vec![0.0f64; n + 1];
        for ch in 0..n_sh {
            let (l, _) = acn_to_order_degree(ch);
            let ch_order = l as usize;
            for d in 0..grid.len() {
                let mut e = Complex64::new(0.0, 0.0);
                for s in 0..q {
                    let wv = w[[ch, s]];
                    e += Complex64::new(wv.re as f64, wv.im as f64) * p[[s, d]];
                }
                let ideal = y_ideal[[ch, d]];
                num[ch_order] += e * ideal;
                energy[ch_order] += e.norm_sqr();
                energy_ideal[ch_order] += ideal * ideal;
            }
        }

        for k in 0..=n {
            let mag = sim_modal[[band, k]].norm().max(1e-12);
            ideal_inverse_db[[band, k]] = linear_to_db((1.0 / mag) as f32);
            regularised_db[[band, k]] = linear_to_db(gains[[band, k]].norm() as f32);
            let den = (energy[k] * energy_ideal[k]).sqrt();
            spatial_correlation[[band, k]] = if den > 0.0 {
                (num[k].norm() / den) as f32
            } else {
                0.0
            };
            level_difference_db[[band, k]] = if energy_ideal[k] > 0.0 {
                10.0 * ((energy[k] / energy_ideal[k]).max(1e-12) as f32).log10()
            } else {
                0.0
            };
        }
    }

    EncodingDiagnostics {
        frequencies: freqs.to_vec(),
        ideal_inverse_db,
        regularised_db,
        spatial_correlation,
        level_difference_db,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::AmbisonicOrder;
    use crate::config::FilterDesign;
    use crate::geometry::ArrayPreset;
    use crate::matrix::build_encoding_matrix;
    use crate::modal::modal_coefficients;
    use crate::regularise::regularised_inversion;
    use sf_filterbank::Filterbank;

    fn diagnostics_for(
        preset: ArrayPreset,
        order: AmbisonicOrder,
    ) -> EncodingDiagnostics {
        let geometry = preset.geometry();
        let freqs = Filterbank::center_frequencies(48000.0);
        let kr: Vec<f64> = freqs
            .iter()
            .map(|&f| {
                2.0 * std::f64::consts::PI * f as f64 * geometry.array_radius() as f64
                    / 343.0
            })
            .collect();
        let modal = modal_coefficients(
            order.as_usize(),
            &kr,
            &kr,
            geometry.construction(),
            geometry.pattern(),
        );
        let sim_modal = modal_coefficients(
            20,
            &kr,
            &kr,
            geometry.construction(),
            geometry.pattern(),
        );
        let gains = regularised_inversion(
            &modal,
            FilterDesign::Tikhonov,
            15.0,
            geometry.num_sensors(),
            order,
            &kr,
            &freqs,
        );
        let w = build_encoding_matrix(&gains, &geometry, order).unwrap();
        evaluate_performance(&w, &gains, &sim_modal, &geometry, &freqs)
    }

    #[test]
    fn test_correlation_high_below_aliasing() {
        // Below spatial aliasing a well-designed array encodes accurately
        let diag = diagnostics_for(ArrayPreset::Rigid32, AmbisonicOrder::Fourth);
        let f_alias = 4.0 * 343.0 / (2.0 * std::f32::consts::PI * 0.042);
        for (band, &f) in diag.frequencies.iter().enumerate() {
            if f < 500.0 || f > f_alias * 0.5 {
                continue;
            }
            assert!(
                diag.spatial_correlation[[band, 0]] > 0.95,
                "band {band} ({f} Hz): order-0 correlation {}",
                diag.spatial_correlation[[band, 0]]
            );
            assert!(
                diag.spatial_correlation[[band, 1]] > 0.9,
                "band {band} ({f} Hz): order-1 correlation {}",
                diag.spatial_correlation[[band, 1]]
            );
        }
    }

    #[test]
    fn test_correlation_degrades_above_aliasing() {
        let diag = diagnostics_for(ArrayPreset::TetrahedralRigid, AmbisonicOrder::First);
        // Find a mid band well below aliasing (~1.3 kHz) and the top band
        let low = diag
            .frequencies
            .iter()
            .position(|&f| f > 600.0)
            .unwrap();
        let top = diag.frequencies.len() - 1;
        assert!(
            diag.spatial_correlation[[top, 1]]
                < diag.spatial_correlation[[low, 1]],
            "aliasing should reduce order-1 correlation"
        );
    }

    #[test]
    fn test_regularised_never_exceeds_ideal_curve() {
        let diag = diagnostics_for(ArrayPreset::TetrahedralRigid, AmbisonicOrder::First);
        for band in 0..diag.frequencies.len() {
            for k in 0..=1 {
                assert!(
                    diag.regularised_db[[band, k]]
                        <= diag.ideal_inverse_db[[band, k]] + 0.5,
                    "band {band} order {k}: {} dB vs ideal {} dB",
                    diag.regularised_db[[band, k]],
                    diag.ideal_inverse_db[[band, k]]
                );
            }
        }
    }

    #[test]
    fn test_all_metrics_finite() {
        let diag = diagnostics_for(ArrayPreset::Rigid19, AmbisonicOrder::Third);
        assert!(diag.ideal_inverse_db.iter().all(|v| v.is_finite()));
        assert!(diag.regularised_db.iter().all(|v| v.is_finite()));
        assert!(diag
            .spatial_correlation
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0 + 1e-4));
        assert!(diag.level_difference_db.iter().all(|v| v.is_finite()));
    }
}
