//! Ambisonic convention conversion - channel ordering and normalization
//!
//! The encoder produces ACN-ordered, N3D-normalized signals internally;
//! this module converts that stream to whatever convention the host wants.
//! Conversion is a pure permutation plus per-channel scaling, so any
//! conversion is exactly invertible.

use serde::{Deserialize, Serialize};

use crate::{acn_to_order_degree, AmbisonicOrder, SpatialError, SpatialResult};

/// Channel ordering convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrdering {
    /// ACN (Ambisonic Channel Number) - AmbiX standard
    Acn,
    /// FuMa (Furse-Malham) ordering - legacy, first order only
    Fuma,
}

/// Loudness normalization convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    /// N3D (fully normalized)
    N3d,
    /// SN3D (Schmidt semi-normalized) - AmbiX standard
    Sn3d,
    /// FuMa (Furse-Malham) gains - legacy, first order only
    Fuma,
}

/// FuMa channel order for the first-order set: W, X, Y, Z as ACN indices.
const FUMA_TO_ACN: [usize; 4] = [0, 3, 1, 2];

/// Converter between Ambisonic conventions.
///
/// Built once per (source, target, order) triple; application is a single
/// indexed pass over the channels.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    /// Per output channel: (source channel index, gain)
    channel_map: Vec<(usize, f32)>,
}

impl FormatConverter {
    /// Create a converter.
    ///
    /// FuMa ordering or normalization above first order is rejected.
    pub fn new(
        source: (ChannelOrdering, Normalization),
        target: (ChannelOrdering, Normalization),
        order: AmbisonicOrder,
    ) -> SpatialResult<Self> {
        let uses_fuma = source.0 == ChannelOrdering::Fuma
            || target.0 == ChannelOrdering::Fuma
            || source.1 == Normalization::Fuma
            || target.1 == Normalization::Fuma;
        if uses_fuma && order != AmbisonicOrder::First {
            return Err(SpatialError::FumaOrderUnsupported(order.as_usize()));
        }

        let n_sh = order.channel_count();
        let mut channel_map = vec![(0usize, 1.0f32); n_sh];

        for acn in 0..n_sh {
            let src_idx = Self::position_of_acn(source.0, acn);
            let dst_idx = Self::position_of_acn(target.0, acn);
            let gain = Self::norm_factor(target.1, acn) / Self::norm_factor(source.1, acn);
            channel_map[dst_idx] = (src_idx, gain);
        }

        Ok(Self { channel_map })
    }

    /// Number of channels this converter covers
    pub fn channel_count(&self) -> usize {
        self.channel_map.len()
    }

    /// Convert a block of per-channel signals
    pub fn convert(&self, input: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let samples = input.first().map(|v| v.len()).unwrap_or(0);
        let mut output = vec![vec![0.0f32; samples]; self.channel_map.len()];
        self.convert_into(input, &mut output);
        output
    }

    /// Convert into preallocated output buffers.
    ///
    /// Output channels beyond the converter's channel count are left alone.
    pub fn convert_into(&self, input: &[Vec<f32>], output: &mut [Vec<f32>]) {
        for (dst, &(src, gain)) in self.channel_map.iter().enumerate() {
            if dst >= output.len() || src >= input.len() {
                continue;
            }
            for (o, &i) in output[dst].iter_mut().zip(input[src].iter()) {
                *o = i * gain;
            }
        }
    }

    /// Index of ACN channel `acn` in the given ordering
    fn position_of_acn(ordering: ChannelOrdering, acn: usize) -> usize {
        match ordering {
            ChannelOrdering::Acn => acn,
            ChannelOrdering::Fuma => FUMA_TO_ACN
                .iter()
                .position(|&a| a == acn)
                .unwrap_or(acn),
        }
    }

    /// Per-channel scale of a convention relative to N3D
    fn norm_factor(norm: Normalization, acn: usize) -> f32 {
        let (l, _m) = acn_to_order_degree(acn);
        match norm {
            Normalization::N3d => 1.0,
            Normalization::Sn3d => 1.0 / ((2 * l + 1) as f32).sqrt(),
            // FuMa: W carries the legacy -3 dB, the first-order set matches SN3D
            Normalization::Fuma => {
                if l == 0 {
                    1.0 / 2.0f32.sqrt()
                } else {
                    1.0 / ((2 * l + 1) as f32).sqrt()
                }
            }
        }
    }
}
