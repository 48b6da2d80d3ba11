//! sf-core: shared vocabulary for the Soundfield workspace
//!
//! Common types used by every other crate:
//! - `AmbisonicOrder` and ACN channel indexing
//! - Channel ordering (ACN/FuMa) and normalization (N3D/SN3D/FuMa) conversion
//! - `Direction` (azimuth/elevation, radians and degrees kept in sync)
//! - Error types and compile-time maxima

mod direction;
mod error;
mod format;
mod order;

pub use direction::Direction;
pub use error::{SpatialError, SpatialResult};
pub use format::{ChannelOrdering, FormatConverter, Normalization};
pub use order::{acn_index, acn_to_order_degree, replicate_per_channel, AmbisonicOrder};

/// Maximum number of array sensors supported.
///
/// Runtime containers are sized by the actual sensor count; this bound only
/// caps preset tables and setter arguments.
pub const MAX_NUM_SENSORS: usize = 64;

/// Maximum spherical-harmonic encoding order.
pub const MAX_SH_ORDER: usize = 7;

/// Fixed processing block size in samples.
///
/// The real-time pipeline only accepts frames of exactly this length; any
/// other frame size is a zero-filled no-op.
pub const FRAME_SIZE: usize = 128;

/// Convert decibels to a linear gain factor.
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels.
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-12).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_roundtrip() {
        for db in [-60.0f32, -6.0, 0.0, 6.0, 15.0] {
            assert!((linear_to_db(db_to_linear(db)) - db).abs() < 1e-4);
        }
    }

    #[test]
    fn test_db_floor() {
        // Zero gain clamps instead of producing -inf
        assert!(linear_to_db(0.0).is_finite());
    }
}
