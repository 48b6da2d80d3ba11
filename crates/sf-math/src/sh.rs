//! Real spherical harmonics (ACN ordering, N3D normalization)
//!
//! Evaluated by the associated-Legendre recurrence, so any order up to the
//! workspace maximum gets an exact basis rather than a hard-coded table.

use ndarray::Array2;
use sf_core::{acn_index, AmbisonicOrder, Direction};

/// Legendre polynomial P_n(x), by the three-term recurrence.
pub fn legendre_p(n: usize, x: f64) -> f64 {
    match n {
        0 => 1.0,
        1 => x,
        _ => {
            let mut prev = 1.0;
            let mut cur = x;
            for k in 1..n {
                let next = ((2 * k + 1) as f64 * x * cur - k as f64 * prev) / (k + 1) as f64;
                prev = cur;
                cur = next;
            }
            cur
        }
    }
}

/// All Legendre polynomials P_0(x)..P_n_max(x) in one recurrence pass.
pub fn legendre_column(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(n_max + 1);
    out.push(1.0);
    if n_max == 0 {
        return out;
    }
    out.push(x);
    for k in 1..n_max {
        let next = ((2 * k + 1) as f64 * x * out[k] - k as f64 * out[k - 1])
            / (k + 1) as f64;
        out.push(next);
    }
    out
}

/// Associated Legendre P_l^m(x) without the Condon-Shortley phase,
/// for all l in 0..=l_max at fixed m. Returns values indexed by l
/// (entries below l = m are zero).
fn assoc_legendre_column(l_max: usize, m: usize, x: f64) -> Vec<f64> {
    let mut out = vec![0.0f64; l_max + 1];
    if m > l_max {
        return out;
    }
    // P_m^m = (2m-1)!! (1-x^2)^{m/2}
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= fact * somx2;
            fact += 2.0;
        }
    }
    out[m] = pmm;
    if m == l_max {
        return out;
    }
    // P_{m+1}^m = x (2m+1) P_m^m
    let mut pmmp1 = x * (2.0 * m as f64 + 1.0) * pmm;
    out[m + 1] = pmmp1;
    let mut prev = pmm;
    for l in (m + 2)..=l_max {
        let next = ((2 * l - 1) as f64 * x * pmmp1 - (l + m - 1) as f64 * prev)
            / (l - m) as f64;
        prev = pmmp1;
        pmmp1 = next;
        out[l] = next;
    }
    out
}

/// N3D normalization constant for (l, |m|), including the sqrt(2) for m != 0.
fn n3d_norm(l: usize, m_abs: usize) -> f64 {
    let mut ratio = 1.0; // (l-|m|)! / (l+|m|)!
    for k in (l - m_abs + 1)..=(l + m_abs) {
        ratio /= k as f64;
    }
    let two = if m_abs == 0 { 1.0 } else { 2.0 };
    ((2 * l + 1) as f64 * two * ratio).sqrt()
}

/// Real spherical-harmonic vector for one direction, ACN order, N3D norm.
///
/// Y_00 = 1; the first-order set is sqrt(3) * (cos el sin az, sin el,
/// cos el cos az), matching the ACN [W, Y, Z, X] convention.
pub fn real_sh_vector(order: AmbisonicOrder, dir: &Direction) -> Vec<f64> {
    let n = order.as_usize();
    let n_sh = order.channel_count();
    let az = dir.azimuth_rad() as f64;
    let sin_el = (dir.elevation_rad() as f64).sin();

    let mut out = vec![0.0f64; n_sh];
    for m in 0..=n {
        let column = assoc_legendre_column(n, m, sin_el);
        for l in m..=n {
            let norm = n3d_norm(l, m);
            if m == 0 {
                out[acn_index(l as i32, 0)] = norm * column[l];
            } else {
                let (s, c) = (m as f64 * az).sin_cos();
                out[acn_index(l as i32, m as i32)] = norm * column[l] * c;
                out[acn_index(l as i32, -(m as i32))] = norm * column[l] * s;
            }
        }
    }
    out
}

/// Real spherical-harmonic sampling matrix Y (nSH x nDirs).
pub fn real_sh_matrix(order: AmbisonicOrder, dirs: &[Direction]) -> Array2<f64> {
    let n_sh = order.channel_count();
    let mut y = Array2::<f64>::zeros((n_sh, dirs.len()));
    for (d, dir) in dirs.iter().enumerate() {
        let column = real_sh_vector(order, dir);
        for (ch, &v) in column.iter().enumerate() {
            y[[ch, d]] = v;
        }
    }
    y
}

/// Per-order max-rE weights a_0..a_N.
///
/// a_n = P_n(cos(137.9deg / (N + 1.51))), the standard closed-form fit for
/// the max-rE decoding/tapering weights.
pub fn max_re_weights(order: AmbisonicOrder) -> Vec<f64> {
    let n = order.as_usize();
    let arg = (137.9f64.to_radians() / (n as f64 + 1.51)).cos();
    (0..=n).map(|k| legendre_p(k, arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::acn_to_order_degree;

    #[test]
    fn test_legendre_known() {
        assert_eq!(legendre_p(0, 0.3), 1.0);
        assert_eq!(legendre_p(1, 0.3), 0.3);
        let x = 0.5f64;
        assert!((legendre_p(2, x) - 0.5 * (3.0 * x * x - 1.0)).abs() < 1e-12);
        assert!((legendre_p(3, x) - 0.5 * (5.0 * x * x * x - 3.0 * x)).abs() < 1e-12);
    }

    #[test]
    fn test_sh_front() {
        let sh = real_sh_vector(AmbisonicOrder::First, &Direction::from_degrees(0.0, 0.0));
        let s3 = 3.0f64.sqrt();
        assert!((sh[0] - 1.0).abs() < 1e-9); // W
        assert!(sh[1].abs() < 1e-9); // Y
        assert!(sh[2].abs() < 1e-9); // Z
        assert!((sh[3] - s3).abs() < 1e-9); // X
    }

    #[test]
    fn test_sh_left_and_up() {
        let left = real_sh_vector(AmbisonicOrder::First, &Direction::from_degrees(90.0, 0.0));
        assert!((left[1] - 3.0f64.sqrt()).abs() < 1e-6);
        assert!(left[3].abs() < 1e-6);

        let up = real_sh_vector(AmbisonicOrder::First, &Direction::from_degrees(0.0, 90.0));
        assert!((up[2] - 3.0f64.sqrt()).abs() < 1e-6);
        assert!(up[1].abs() < 1e-6);
        assert!(up[3].abs() < 1e-6);
    }

    #[test]
    fn test_sh_orthonormality() {
        // N3D harmonics are orthonormal over the sphere with the 1/(4pi)
        // measure; check with a dense quadrature grid.
        let order = AmbisonicOrder::Third;
        let n_az = 48;
        let n_el = 24;
        let n_sh = order.channel_count();
        let mut gram = vec![vec![0.0f64; n_sh]; n_sh];
        let mut total_weight = 0.0;
        for ei in 0..n_el {
            let el = -std::f64::consts::FRAC_PI_2
                + std::f64::consts::PI * (ei as f64 + 0.5) / n_el as f64;
            let w = el.cos();
            for ai in 0..n_az {
                let az = 2.0 * std::f64::consts::PI * ai as f64 / n_az as f64;
                let sh = real_sh_vector(
                    order,
                    &Direction::from_radians(az as f32, el as f32),
                );
                total_weight += w;
                for i in 0..n_sh {
                    for j in 0..n_sh {
                        gram[i][j] += w * sh[i] * sh[j];
                    }
                }
            }
        }
        for i in 0..n_sh {
            for j in 0..n_sh {
                let v = gram[i][j] / total_weight;
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (v - expected).abs() < 2e-2,
                    "gram[{i}][{j}] = {v}"
                );
            }
        }
    }

    #[test]
    fn test_sh_matrix_shape() {
        let dirs = vec![
            Direction::from_degrees(0.0, 0.0),
            Direction::from_degrees(90.0, 0.0),
            Direction::from_degrees(0.0, 45.0),
        ];
        let y = real_sh_matrix(AmbisonicOrder::Second, &dirs);
        assert_eq!(y.dim(), (9, 3));
        // Every channel of a direction column matches the vector form
        let v = real_sh_vector(AmbisonicOrder::Second, &dirs[1]);
        for ch in 0..9 {
            let (l, _m) = acn_to_order_degree(ch);
            assert!(l <= 2);
            assert!((y[[ch, 1]] - v[ch]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_max_re_weights_taper() {
        let w = max_re_weights(AmbisonicOrder::Fourth);
        assert_eq!(w.len(), 5);
        assert!((w[0] - 1.0).abs() < 1e-12);
        // Weights taper off monotonically with order
        for k in 1..w.len() {
            assert!(w[k] < w[k - 1]);
            assert!(w[k] > 0.0);
        }
    }
}
