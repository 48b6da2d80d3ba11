//! Encoding matrix assembly and diffuse-field equalisation

use ndarray::Array2;
use num_complex::{Complex32, Complex64};

use sf_core::{replicate_per_channel, AmbisonicOrder, SpatialResult};
use sf_math::{diffuse_coherence_matrix, pseudo_inverse, real_sh_matrix};

use crate::geometry::{ArrayConstruction, ArrayGeometry};

/// Regularisation floor for the diffuse-field level correction.
const DIFFUSE_EQ_EPS: f64 = 2.23e-10;

/// Per-band complex encoding matrices W (nSH x Q).
///
/// Applying `band(b)` to a column of sensor spectra yields the spherical
/// harmonic spectra for that band, ACN/N3D.
pub struct EncodingMatrix {
    order: AmbisonicOrder,
    num_sensors: usize,
    bands: Vec<Array2<Complex32>>,
}

impl EncodingMatrix {
    /// Encoding order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Sensor count Q
    pub fn num_sensors(&self) -> usize {
        self.num_sensors
    }

    /// Number of bands
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// The matrix for one band
    pub fn band(&self, band: usize) -> &Array2<Complex32> {
        &self.bands[band]
    }

    /// Largest entry magnitude across all bands
    pub fn max_entry(&self) -> f32 {
        self.bands
            .iter()
            .flat_map(|m| m.iter())
            .map(|v| v.norm())
            .fold(0.0, f32::max)
    }

    /// Whether every entry is finite
    pub fn is_finite(&self) -> bool {
        self.bands
            .iter()
            .all(|m| m.iter().all(|v| v.re.is_finite() && v.im.is_finite()))
    }
}

/// Assemble the per-band encoding matrices.
///
/// `gains[(band, n)]` are the regularised per-order filters. Each channel
/// picks the filter of its order, and the spatial part is the transposed
/// pseudo-inverse of the SH sampling matrix at the sensor directions:
///
///   W_band = diag(gains) * pinv(Y)^T
pub fn build_encoding_matrix(
    gains: &Array2<Complex64>,
    geometry: &ArrayGeometry,
    order: AmbisonicOrder,
) -> SpatialResult<EncodingMatrix> {
    let n_sh = order.channel_count();
    let q = geometry.num_sensors();
    let y = real_sh_matrix(order, geometry.sensor_directions());
    let y_pinv = pseudo_inverse(&y)?; // (Q x nSH)
    let order_of = replicate_per_channel(order);

    let bands = (0..gains.nrows())
        .map(|band| {
            let mut w = Array2::<Complex32>::zeros((n_sh, q));
            for ch in 0..n_sh {
                let g = gains[[band, order_of[ch]]];
                for s in 0..q {
                    let v = g * y_pinv[[s, ch]];
                    w[[ch, s]] = Complex32::new(v.re as f32, v.im as f32);
                }
            }
            w
        })
        .collect();

    Ok(EncodingMatrix {
        order,
        num_sensors: q,
        bands,
    })
}

/// Flatten the diffuse-field response above spatial aliasing.
///
/// Uses the band whose centre is nearest the aliasing frequency
/// N*c/(2*pi*r) as the level reference and scales every channel row above
/// it so its diffuse-field energy matches the reference. `sim_modal`
/// should be evaluated well past the encoding order so the coherence model
/// converges. Cylindrical arrays are left untouched.
pub fn apply_diffuse_eq(
    matrix: &mut EncodingMatrix,
    geometry: &ArrayGeometry,
    sim_modal: &Array2<Complex64>,
    freqs: &[f32],
    speed_of_sound: f32,
) {
    if geometry.construction() == ArrayConstruction::Cylindrical {
        log::debug!("diffuse-field EQ skipped for cylindrical array");
        return;
    }
    let n_bands = matrix.num_bands();
    let n_sh = matrix.order.channel_count();
    let f_alias = matrix.order.as_usize() as f32 * speed_of_sound
        / (2.0 * std::f32::consts::PI * geometry.array_radius());
    let ref_band = freqs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - f_alias).abs().total_cmp(&(*b - f_alias).abs())
        })
        .map(|(i, _)| i)
        .unwrap_or(n_bands - 1)
        .min(n_bands - 2);

    let cos_angles = geometry.cos_angles();
    let coherence = |band: usize| -> Array2<f64> {
        let weights: Vec<f64> = (0..sim_modal.ncols())
            .map(|n| sim_modal[[band, n]].norm_sqr())
            .collect();
        diffuse_coherence_matrix(&weights, &cos_angles)
    };

    let ref_coherence = coherence(ref_band);
    let reference = channel_diffuse_levels(&matrix.bands[ref_band], &ref_coherence);
    for band in (ref_band + 1)..n_bands {
        let c = coherence(band);
        let actual = channel_diffuse_levels(&matrix.bands[band], &c);
        for ch in 0..n_sh {
            let gain = (reference[ch] / (actual[ch] + DIFFUSE_EQ_EPS))
                .max(0.0)
                .sqrt() as f32;
            for s in 0..matrix.num_sensors {
                matrix.bands[band][[ch, s]] *= gain;
            }
        }
    }
}

/// Diffuse-field energy per output channel: diag(W C W^H).
fn channel_diffuse_levels(w: &Array2<Complex32>, c: &Array2<f64>) -> Vec<f64> {
    let (n_sh, q) = w.dim();
    (0..n_sh)
        .map(|ch| {
            let mut acc = 0.0f64;
            for qi in 0..q {
                for pi in 0..q {
                    let a = Complex64::new(w[[ch, qi]].re as f64, w[[ch, qi]].im as f64);
                    let b = Complex64::new(w[[ch, pi]].re as f64, -(w[[ch, pi]].im as f64));
                    acc += (a * b).re * c[[qi, pi]];
                }
            }
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ArrayPreset, SensorPattern};
    use crate::modal::modal_coefficients;
    use sf_filterbank::Filterbank;
    use sf_math::real_sh_vector;

    fn band_setup(radius: f32) -> (Vec<f32>, Vec<f64>) {
        let freqs = Filterbank::center_frequencies(48000.0);
        let kr: Vec<f64> = freqs
            .iter()
            .map(|&f| 2.0 * std::f64::consts::PI * f as f64 * radius as f64 / 343.0)
            .collect();
        (freqs, kr)
    }

    #[test]
    fn test_exact_inverse_recovers_source_direction() {
        // With the exact modal inverse as gains, encoding the (order-
        // truncated) plane-wave sensor spectra must return the SH vector of
        // the source direction.
        let geometry = ArrayPreset::Open64.geometry();
        let order = AmbisonicOrder::First;
        let (freqs, kr) = band_setup(geometry.array_radius());
        let modal = modal_coefficients(
            order.as_usize(),
            &kr,
            &kr,
            geometry.construction(),
            SensorPattern::OpenOmni,
        );
        // Use the exact inverse as gains at a well-conditioned mid band
        let band = 40;
        let mut gains = Array2::<Complex64>::zeros((freqs.len(), 2));
        for b in 0..freqs.len() {
            for n in 0..=1 {
                let v = modal[[b, n]];
                if v.norm() > 1e-6 {
                    gains[[b, n]] = v.conj() / v.norm_sqr();
                }
            }
        }
        let w = build_encoding_matrix(&gains, &geometry, order).unwrap();

        // Plane wave from the front: sensor spectra per the modal expansion
        let src = sf_core::Direction::from_degrees(0.0, 0.0);
        let q = geometry.num_sensors();
        let mut p = vec![Complex64::new(0.0, 0.0); q];
        for (s, dir) in geometry.sensor_directions().iter().enumerate() {
            let cos_g = dir.cos_angle_to(&src) as f64;
            for n in 0..=1 {
                p[s] += modal[[band, n]]
                    * ((2 * n + 1) as f64 * sf_math::legendre_p(n, cos_g));
            }
        }
        let wb = w.band(band);
        let expected = real_sh_vector(order, &src);
        for ch in 0..4 {
            let mut acc = Complex64::new(0.0, 0.0);
            for s in 0..q {
                acc += Complex64::new(wb[[ch, s]].re as f64, wb[[ch, s]].im as f64) * p[s];
            }
            assert!(
                (acc.norm() - expected[ch].abs()).abs() < 0.05 * expected[0].abs().max(1.0),
                "channel {ch}: {} vs {}",
                acc.norm(),
                expected[ch]
            );
        }
    }

    #[test]
    fn test_matrix_shape_and_finiteness() {
        let geometry = ArrayPreset::Rigid32.geometry();
        let order = AmbisonicOrder::Fourth;
        let (freqs, kr) = band_setup(geometry.array_radius());
        let modal = modal_coefficients(
            order.as_usize(),
            &kr,
            &kr,
            geometry.construction(),
            geometry.pattern(),
        );
        let gains = modal.mapv(|b| {
            if b.norm() > 1e-9 {
                b.conj() / (b.norm_sqr() + 1e-3)
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        let w = build_encoding_matrix(&gains, &geometry, order).unwrap();
        assert_eq!(w.num_bands(), freqs.len());
        assert_eq!(w.band(0).dim(), (25, 32));
        assert!(w.is_finite());
        // The regularised gains bound every entry well below the hard
        // inverse blow-up
        assert!(w.max_entry().is_finite());
        assert!(w.max_entry() > 0.0);
    }

    #[test]
    fn test_diffuse_eq_reference_is_nearest_band() {
        let geometry = ArrayPreset::TetrahedralRigid.geometry();
        let order = AmbisonicOrder::First;
        // f_alias is ~1300 Hz here, so 1290 is nearer than 1500
        let freqs = vec![
            300.0f32, 700.0, 1290.0, 1500.0, 3000.0, 6000.0, 12000.0, 20000.0,
        ];
        let kr: Vec<f64> = freqs
            .iter()
            .map(|&f| 2.0 * std::f64::consts::PI * f as f64 * 0.042 / 343.0)
            .collect();
        let modal = modal_coefficients(
            order.as_usize(),
            &kr,
            &kr,
            geometry.construction(),
            geometry.pattern(),
        );
        let sim_modal = modal_coefficients(
            12,
            &kr,
            &kr,
            geometry.construction(),
            geometry.pattern(),
        );
        let gains = modal.mapv(|b| b.conj() / (b.norm_sqr() + 1e-2));
        let mut w = build_encoding_matrix(&gains, &geometry, order).unwrap();
        let before: Vec<_> = (0..w.num_bands()).map(|b| w.band(b).clone()).collect();
        apply_diffuse_eq(&mut w, &geometry, &sim_modal, &freqs, 343.0);

        // The 1290 Hz band is the level reference and stays untouched; the
        // 1500 Hz band sits above it and gets rescaled
        assert_eq!(w.band(2), &before[2]);
        let changed = w
            .band(3)
            .iter()
            .zip(before[3].iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0f32, f32::max);
        assert!(changed > 1e-6, "band above the reference was not rescaled");
    }

    #[test]
    fn test_diffuse_eq_flattens_above_aliasing() {
        let geometry = ArrayPreset::TetrahedralRigid.geometry();
        let order = AmbisonicOrder::First;
        let (freqs, kr) = band_setup(geometry.array_radius());
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
        let gains = modal.mapv(|b| b.conj() / (b.norm_sqr() + 1e-2));
        let mut w = build_encoding_matrix(&gains, &geometry, order).unwrap();
        apply_diffuse_eq(&mut w, &geometry, &sim_modal, &freqs, 343.0);
        assert!(w.is_finite());

        // The top band's diffuse level now matches the reference band's.
        let cos_angles = geometry.cos_angles();
        let level = |band: usize| -> f64 {
            let weights: Vec<f64> = (0..sim_modal.ncols())
                .map(|n| sim_modal[[band, n]].norm_sqr())
                .collect();
            let c = diffuse_coherence_matrix(&weights, &cos_angles);
            let m = w.band(band);
            let mut acc = 0.0;
            for qi in 0..4 {
                for pi in 0..4 {
                    let a = Complex64::new(m[[0, qi]].re as f64, m[[0, qi]].im as f64);
                    let b = Complex64::new(m[[0, pi]].re as f64, -m[[0, pi]].im as f64);
                    acc += (a * b).re * c[[qi, pi]];
                }
            }
            acc
        };
        let f_alias = 343.0 / (2.0 * std::f32::consts::PI * 0.042);
        let ref_band = freqs.iter().position(|&f| f >= f_alias).unwrap();
        let top = w.num_bands() - 1;
        let ratio = level(top) / level(ref_band);
        assert!(
            (ratio - 1.0).abs() < 0.05,
            "diffuse level ratio after EQ: {ratio}"
        );
    }

    #[test]
    fn test_diffuse_eq_noop_for_cylindrical() {
        let mut geometry = ArrayPreset::TetrahedralRigid.geometry();
        geometry.set_construction(ArrayConstruction::Cylindrical);
        let order = AmbisonicOrder::First;
        let (freqs, kr) = band_setup(geometry.array_radius());
        let modal = modal_coefficients(
            order.as_usize(),
            &kr,
            &kr,
            ArrayConstruction::Spherical,
            geometry.pattern(),
        );
        let gains = modal.mapv(|b| b.conj() / (b.norm_sqr() + 1e-2));
        let mut w = build_encoding_matrix(&gains, &geometry, order).unwrap();
        let before: Vec<_> = (0..w.num_bands())
            .map(|b| w.band(b).clone())
            .collect();
        apply_diffuse_eq(&mut w, &geometry, &modal, &freqs, 343.0);
        for b in 0..w.num_bands() {
            assert_eq!(w.band(b), &before[b]);
        }
    }
}
