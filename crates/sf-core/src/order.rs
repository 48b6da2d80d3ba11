//! Ambisonic order and ACN channel indexing

use serde::{Deserialize, Serialize};

use crate::{SpatialError, SpatialResult, MAX_SH_ORDER};

/// Spherical-harmonic encoding order (determines spatial resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbisonicOrder {
    /// First order (4 channels) - basic 3D
    First = 1,
    /// Second order (9 channels)
    Second = 2,
    /// Third order (16 channels)
    Third = 3,
    /// Fourth order (25 channels)
    Fourth = 4,
    /// Fifth order (36 channels)
    Fifth = 5,
    /// Sixth order (49 channels)
    Sixth = 6,
    /// Seventh order (64 channels) - maximum
    Seventh = 7,
}

// The enum top must track the workspace-wide maximum
const _: () = assert!(AmbisonicOrder::Seventh as usize == MAX_SH_ORDER);

impl AmbisonicOrder {
    /// Number of spherical-harmonic channels: (N+1)^2
    pub fn channel_count(&self) -> usize {
        let n = *self as usize;
        (n + 1) * (n + 1)
    }

    /// Create from order number
    pub fn from_order(order: usize) -> SpatialResult<Self> {
        match order {
            1 => Ok(AmbisonicOrder::First),
            2 => Ok(AmbisonicOrder::Second),
            3 => Ok(AmbisonicOrder::Third),
            4 => Ok(AmbisonicOrder::Fourth),
            5 => Ok(AmbisonicOrder::Fifth),
            6 => Ok(AmbisonicOrder::Sixth),
            7 => Ok(AmbisonicOrder::Seventh),
            _ => Err(SpatialError::InvalidOrder(order)),
        }
    }

    /// Get order number
    pub fn as_usize(&self) -> usize {
        *self as usize
    }
}

/// ACN channel index from (order, degree)
pub fn acn_index(order: i32, degree: i32) -> usize {
    (order * order + order + degree) as usize
}

/// Get (order, degree) from ACN index
pub fn acn_to_order_degree(acn: usize) -> (i32, i32) {
    let order = (acn as f64).sqrt().floor() as i32;
    let degree = acn as i32 - order * order - order;
    (order, degree)
}

/// Broadcast map from per-order data to per-channel data.
///
/// Returns a vector of length (N+1)^2 where entry `ch` is the order that ACN
/// channel `ch` belongs to. Order n's 2n+1 channels all map back to n, so a
/// per-order gain table can be replicated across channels with one indexed
/// lookup instead of nested loops.
pub fn replicate_per_channel(order: AmbisonicOrder) -> Vec<usize> {
    let n_sh = order.channel_count();
    (0..n_sh).map(|ch| acn_to_order_degree(ch).0 as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_count() {
        assert_eq!(AmbisonicOrder::First.channel_count(), 4);
        assert_eq!(AmbisonicOrder::Second.channel_count(), 9);
        assert_eq!(AmbisonicOrder::Fourth.channel_count(), 25);
        assert_eq!(AmbisonicOrder::Seventh.channel_count(), 64);
    }

    #[test]
    fn test_acn_index() {
        assert_eq!(acn_index(0, 0), 0); // W
        assert_eq!(acn_index(1, -1), 1); // Y
        assert_eq!(acn_index(1, 0), 2); // Z
        assert_eq!(acn_index(1, 1), 3); // X
        assert_eq!(acn_index(2, -2), 4); // V
    }

    #[test]
    fn test_acn_roundtrip() {
        for acn in 0..64 {
            let (l, m) = acn_to_order_degree(acn);
            assert_eq!(acn_index(l, m), acn);
        }
    }

    #[test]
    fn test_replication_map() {
        let map = replicate_per_channel(AmbisonicOrder::Second);
        assert_eq!(map, vec![0, 1, 1, 1, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn test_invalid_order() {
        assert!(AmbisonicOrder::from_order(0).is_err());
        assert!(AmbisonicOrder::from_order(MAX_SH_ORDER).is_ok());
        assert!(AmbisonicOrder::from_order(MAX_SH_ORDER + 1).is_err());
    }
}
