//! Bessel and Hankel functions of spherical and cylindrical kind.
//!
//! Series and recurrence evaluations in f64, accurate to well below the f32
//! precision the audio path works in for the argument range an audible-band
//! microphone array produces (kr up to roughly 30). Spherical j_n uses
//! downward (Miller) recurrence; y_n and the cylindrical functions use the
//! classical series/recurrence forms.

use num_complex::Complex64;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Harmonic number H_k = 1 + 1/2 + ... + 1/k (H_0 = 0)
fn harmonic(k: usize) -> f64 {
    (1..=k).map(|i| 1.0 / i as f64).sum()
}

/// Double factorial (2n+1)!! as f64
fn double_factorial_odd(n: usize) -> f64 {
    let mut acc = 1.0;
    let mut k = 2 * n + 1;
    while k > 1 {
        acc *= k as f64;
        k -= 2;
    }
    acc
}

// ---------------------------------------------------------------------------
// Cylindrical Bessel functions
// ---------------------------------------------------------------------------

/// Cylindrical Bessel function of the first kind J_n(x), by power series.
pub fn bessel_j(n: usize, x: f64) -> f64 {
    if x == 0.0 {
        return if n == 0 { 1.0 } else { 0.0 };
    }
    let half = x / 2.0;
    // First term: (x/2)^n / n!
    let mut term = 1.0;
    for k in 1..=n {
        term *= half / k as f64;
    }
    let mut sum = term;
    for k in 1..200 {
        term *= -(half * half) / (k as f64 * (n + k) as f64);
        sum += term;
        if term.abs() < sum.abs() * 1e-17 + 1e-300 {
            break;
        }
    }
    sum
}

/// Cylindrical Bessel function of the second kind Y_n(x).
///
/// Y_0 and Y_1 from the logarithmic series, higher orders by upward
/// recurrence (stable for Y).
pub fn bessel_y(n: usize, x: f64) -> f64 {
    assert!(x > 0.0, "Y_n is singular at x <= 0");
    let y0 = bessel_y0(x);
    if n == 0 {
        return y0;
    }
    let y1 = bessel_y1(x);
    if n == 1 {
        return y1;
    }
    let mut prev = y0;
    let mut cur = y1;
    for k in 1..n {
        let next = (2.0 * k as f64 / x) * cur - prev;
        prev = cur;
        cur = next;
    }
    cur
}

fn bessel_y0(x: f64) -> f64 {
    let half = x / 2.0;
    let log_term = (half.ln() + EULER_GAMMA) * bessel_j(0, x);
    // (2/pi) * [log term + sum_{k>=1} (-1)^{k+1} H_k (x^2/4)^k / (k!)^2]
    let mut sum = 0.0;
    let mut term = 1.0; // (x^2/4)^k / (k!)^2 at k=0
    for k in 1..200 {
        term *= (half * half) / (k as f64 * k as f64);
        let contrib = if k % 2 == 1 { term } else { -term } * harmonic(k);
        sum += contrib;
        if term.abs() * (1.0 + harmonic(k)) < 1e-17 * (1.0 + sum.abs()) {
            break;
        }
    }
    (2.0 / std::f64::consts::PI) * (log_term + sum)
}

fn bessel_y1(x: f64) -> f64 {
    let half = x / 2.0;
    let log_term = (half.ln() + EULER_GAMMA) * bessel_j(1, x);
    // Singular part
    let singular = -1.0 / x;
    // Regular series: -(1/2) sum_k (-1)^k (H_k + H_{k+1}) (x/2)^{2k+1} / (k! (k+1)!)
    let mut sum = 0.0;
    let mut term = half; // (x/2)^{2k+1} / (k!(k+1)!) at k=0
    for k in 0..200 {
        let psi = harmonic(k) + harmonic(k + 1);
        let contrib = if k % 2 == 0 { term } else { -term } * psi;
        sum += contrib;
        let kf = (k + 1) as f64;
        term *= (half * half) / (kf * (kf + 1.0));
        if term.abs() * (psi + 1.0) < 1e-17 * (1.0 + sum.abs()) {
            break;
        }
    }
    (2.0 / std::f64::consts::PI) * (log_term + singular) - sum / std::f64::consts::PI
}

/// Derivative J_n'(x)
pub fn bessel_j_deriv(n: usize, x: f64) -> f64 {
    if n == 0 {
        -bessel_j(1, x)
    } else {
        bessel_j(n - 1, x) - (n as f64 / x) * bessel_j(n, x)
    }
}

/// Derivative Y_n'(x)
pub fn bessel_y_deriv(n: usize, x: f64) -> f64 {
    if n == 0 {
        -bessel_y(1, x)
    } else {
        bessel_y(n - 1, x) - (n as f64 / x) * bessel_y(n, x)
    }
}

/// Cylindrical Hankel function of the second kind H_n^(2)(x) = J_n - i Y_n
pub fn hankel2(n: usize, x: f64) -> Complex64 {
    Complex64::new(bessel_j(n, x), -bessel_y(n, x))
}

/// Derivative of the cylindrical Hankel function of the second kind
pub fn hankel2_deriv(n: usize, x: f64) -> Complex64 {
    Complex64::new(bessel_j_deriv(n, x), -bessel_y_deriv(n, x))
}

// ---------------------------------------------------------------------------
// Spherical Bessel functions
// ---------------------------------------------------------------------------

/// Spherical Bessel functions j_0..j_n at x, by downward (Miller) recurrence.
pub fn sph_bessel_j(n_max: usize, x: f64) -> Vec<f64> {
    if x.abs() < 1e-8 {
        // Small-argument limit: j_n(x) ~ x^n / (2n+1)!!
        return (0..=n_max)
            .map(|n| x.powi(n as i32) / double_factorial_odd(n))
            .collect();
    }

    // Seed the recurrence well above the highest requested order
    let start = n_max + 16 + (x.abs() as usize);
    let mut next = 0.0f64;
    let mut cur = 1e-30f64;
    let mut out = vec![0.0f64; n_max + 1];
    for k in (0..start).rev() {
        let prev = (2.0 * (k + 1) as f64 + 1.0) / x * cur - next;
        next = cur;
        cur = prev;
        if k <= n_max {
            out[k] = cur;
        }
        // Rescale to avoid overflow during the downward pass
        if cur.abs() > 1e250 {
            let scale = 1e-250;
            cur *= scale;
            next *= scale;
            for v in out.iter_mut() {
                *v *= scale;
            }
        }
    }
    let j0 = x.sin() / x;
    let norm = j0 / out[0];
    for v in out.iter_mut() {
        *v *= norm;
    }
    out
}

/// Spherical Bessel functions of the second kind y_0..y_n, upward recurrence.
pub fn sph_bessel_y(n_max: usize, x: f64) -> Vec<f64> {
    assert!(x > 0.0, "y_n is singular at x <= 0");
    let mut out = vec![0.0f64; n_max + 1];
    out[0] = -x.cos() / x;
    if n_max == 0 {
        return out;
    }
    out[1] = -x.cos() / (x * x) - x.sin() / x;
    for k in 1..n_max {
        out[k + 1] = (2.0 * k as f64 + 1.0) / x * out[k] - out[k - 1];
    }
    out
}

/// Derivatives j_0'..j_n'(x)
pub fn sph_bessel_j_deriv(n_max: usize, x: f64) -> Vec<f64> {
    let j = sph_bessel_j(n_max + 1, x);
    deriv_from_values(&j, x)
}

/// Derivatives y_0'..y_n'(x)
pub fn sph_bessel_y_deriv(n_max: usize, x: f64) -> Vec<f64> {
    let y = sph_bessel_y(n_max + 1, x);
    deriv_from_values(&y, x)
}

/// f_n'(x) = f_{n-1}(x) - (n+1)/x f_n(x), with f_0' = -f_1
fn deriv_from_values(values: &[f64], x: f64) -> Vec<f64> {
    let n_max = values.len() - 2;
    let mut out = vec![0.0f64; n_max + 1];
    out[0] = -values[1];
    for n in 1..=n_max {
        out[n] = values[n - 1] - (n as f64 + 1.0) / x * values[n];
    }
    out
}

/// Spherical Hankel functions of the second kind h_0^(2)..h_n^(2)
pub fn sph_hankel2(n_max: usize, x: f64) -> Vec<Complex64> {
    let j = sph_bessel_j(n_max, x);
    let y = sph_bessel_y(n_max, x);
    j.iter()
        .zip(y.iter())
        .map(|(&jj, &yy)| Complex64::new(jj, -yy))
        .collect()
}

/// Derivatives of the spherical Hankel functions of the second kind
pub fn sph_hankel2_deriv(n_max: usize, x: f64) -> Vec<Complex64> {
    let jd = sph_bessel_j_deriv(n_max, x);
    let yd = sph_bessel_y_deriv(n_max, x);
    jd.iter()
        .zip(yd.iter())
        .map(|(&jj, &yy)| Complex64::new(jj, -yy))
        .collect()
}
