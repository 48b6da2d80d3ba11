//! sf-doa: direction-of-arrival estimation on spherical-harmonic streams
//!
//! Steered-response power: a grid of max-rE beamformers is swept over the
//! sphere and the per-beam energy of one frame gives a spatial power map;
//! the loudest beam is the estimate. Works directly on the ACN/N3D output
//! of the encoder, no raw sensor access needed.

use ndarray::Array2;

use sf_core::{
    acn_to_order_degree, AmbisonicOrder, Direction, SpatialError, SpatialResult,
};
use sf_math::{fibonacci_sphere, max_re_weights, real_sh_matrix};

/// A single-frame direction estimate.
#[derive(Debug, Clone)]
pub struct DoaEstimate {
    /// Direction of the loudest beam
    pub direction: Direction,
    /// Grid index of the loudest beam
    pub peak_index: usize,
    /// Beam energies over the whole grid
    pub power_map: Vec<f32>,
}

/// Steered-response power estimator.
pub struct DoaEstimator {
    order: AmbisonicOrder,
    grid: Vec<Direction>,
    /// Beam weights (directions x nSH)
    steering: Array2<f32>,
}

impl DoaEstimator {
    /// Build an estimator sweeping `grid_size` beams of the given order.
    pub fn new(order: AmbisonicOrder, grid_size: usize) -> SpatialResult<Self> {
        if grid_size == 0 {
            return Err(SpatialError::InvalidGeometry(
                "direction grid must not be empty".into(),
            ));
        }
        let grid = fibonacci_sphere(grid_size);
        let y = real_sh_matrix(order, &grid); // (nSH x D)
        let weights = max_re_weights(order);
        let n_sh = order.channel_count();

        // Beam towards d: w_d = diag(maxre) y(d) / nSH, so a unit-amplitude
        // plane wave from d yields beam output close to 1
        let mut steering = Array2::<f32>::zeros((grid.len(), n_sh));
        for d in 0..grid.len() {
            for ch in 0..n_sh {
                let (l, _) = acn_to_order_degree(ch);
                steering[[d, ch]] =
                    (weights[l as usize] * y[[ch, d]] / n_sh as f64) as f32;
            }
        }
        Ok(Self {
            order,
            grid,
            steering,
        })
    }

    /// Beamforming order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// The scan grid
    pub fn grid(&self) -> &[Direction] {
        &self.grid
    }

    /// Estimate the dominant direction of one frame.
    ///
    /// `sh_frame` holds at least nSH channels of equal length in ACN/N3D.
    pub fn analyze(&self, sh_frame: &[Vec<f32>]) -> SpatialResult<DoaEstimate> {
        let n_sh = self.order.channel_count();
        if sh_frame.len() < n_sh {
            return Err(SpatialError::InvalidChannelCount {
                expected: n_sh,
                got: sh_frame.len(),
            });
        }
        let samples = sh_frame[0].len();
        for ch in sh_frame.iter().take(n_sh) {
            if ch.len() != samples {
                return Err(SpatialError::FrameSizeMismatch {
                    expected: samples,
                    got: ch.len(),
                });
            }
        }

        let mut power_map = vec![0.0f32; self.grid.len()];
        for (d, power) in power_map.iter_mut().enumerate() {
            let mut energy = 0.0f32;
            for i in 0..samples {
                let mut beam = 0.0f32;
                for ch in 0..n_sh {
                    beam += self.steering[[d, ch]] * sh_frame[ch][i];
                }
                energy += beam * beam;
            }
            *power = energy;
        }

        let peak_index = power_map
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(DoaEstimate {
            direction: self.grid[peak_index],
            peak_index,
            power_map,
        })
    }
}
