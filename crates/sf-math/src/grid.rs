//! Deterministic direction grids on the sphere

use sf_core::Direction;

/// Near-uniform spherical point set from the golden-ratio (Fibonacci) spiral.
///
/// Deterministic for a given count, which makes it suitable both for preset
/// sensor layouts and for steering/evaluation grids.
pub fn fibonacci_sphere(count: usize) -> Vec<Direction> {
    let golden_ratio = (1.0 + 5.0f64.sqrt()) / 2.0;
    (0..count)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * i as f64 / golden_ratio;
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
            let elevation = z.asin();
            let azimuth = theta.rem_euclid(2.0 * std::f64::consts::PI);
            Direction::from_radians(azimuth as f32, elevation as f32)
        })
        .collect()
}
