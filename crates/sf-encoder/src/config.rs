//! Encoder configuration

use serde::{Deserialize, Serialize};

use sf_core::{AmbisonicOrder, ChannelOrdering, Normalization};

/// Filter design used to invert the modal responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterDesign {
    /// Magnitude soft-limited inversion, phase preserved
    SoftLimit,
    /// Tikhonov-regularised inversion
    Tikhonov,
    /// Linear-phase inversion with per-order high-pass splits
    LinearPhase,
    /// Linear-phase with an additional max-rE order taper
    LinearPhaseMaxRe,
}

/// User-facing encoder parameters.
///
/// Purely declarative; the encoder decides when a change requires a filter
/// rebuild or a full pipeline re-initialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Target encoding order
    pub order: AmbisonicOrder,
    /// Regularisation strategy
    pub filter_design: FilterDesign,
    /// Maximum equalisation gain in dB, per sensor
    pub max_gain_db: f32,
    /// Speed of sound in m/s
    pub speed_of_sound: f32,
    /// Output post-gain in dB
    pub post_gain_db: f32,
    /// Bands centred above this frequency are not encoded
    pub max_encode_freq_hz: f32,
    /// Output channel ordering
    pub channel_ordering: ChannelOrdering,
    /// Output normalization
    pub normalization: Normalization,
    /// Flatten the diffuse-field response above spatial aliasing
    pub apply_diffuse_eq: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            order: AmbisonicOrder::First,
            filter_design: FilterDesign::Tikhonov,
            max_gain_db: 15.0,
            speed_of_sound: 343.0,
            post_gain_db: 0.0,
            max_encode_freq_hz: 24_000.0,
            channel_ordering: ChannelOrdering::Acn,
            normalization: Normalization::N3d,
            apply_diffuse_eq: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = EncoderConfig::default();
        assert_eq!(c.order, AmbisonicOrder::First);
        assert_eq!(c.filter_design, FilterDesign::Tikhonov);
        assert_eq!(c.max_gain_db, 15.0);
        assert_eq!(c.speed_of_sound, 343.0);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let c = EncoderConfig {
            order: AmbisonicOrder::Fourth,
            filter_design: FilterDesign::LinearPhaseMaxRe,
            ..Default::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: EncoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
