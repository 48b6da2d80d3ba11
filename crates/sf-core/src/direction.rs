//! Sensor/source direction on the unit sphere

use serde::{Deserialize, Serialize};

/// A direction given as azimuth and elevation.
///
/// Stored in radians; degree accessors convert on the fly so the two views
/// can never drift apart. Azimuth is counter-clockwise from the front
/// (+x axis), elevation is up from the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    azimuth_rad: f32,
    elevation_rad: f32,
}

impl Direction {
    /// Create from radians
    pub fn from_radians(azimuth_rad: f32, elevation_rad: f32) -> Self {
        Self {
            azimuth_rad,
            elevation_rad,
        }
    }

    /// Create from degrees
    pub fn from_degrees(azimuth_deg: f32, elevation_deg: f32) -> Self {
        Self {
            azimuth_rad: azimuth_deg.to_radians(),
            elevation_rad: elevation_deg.to_radians(),
        }
    }

    /// Azimuth in radians
    pub fn azimuth_rad(&self) -> f32 {
        self.azimuth_rad
    }

    /// Elevation in radians
    pub fn elevation_rad(&self) -> f32 {
        self.elevation_rad
    }

    /// Azimuth in degrees
    pub fn azimuth_deg(&self) -> f32 {
        self.azimuth_rad.to_degrees()
    }

    /// Elevation in degrees
    pub fn elevation_deg(&self) -> f32 {
        self.elevation_rad.to_degrees()
    }

    /// Set azimuth in radians
    pub fn set_azimuth_rad(&mut self, azimuth_rad: f32) {
        self.azimuth_rad = azimuth_rad;
    }

    /// Set elevation in radians
    pub fn set_elevation_rad(&mut self, elevation_rad: f32) {
        self.elevation_rad = elevation_rad;
    }

    /// Set azimuth in degrees
    pub fn set_azimuth_deg(&mut self, azimuth_deg: f32) {
        self.azimuth_rad = azimuth_deg.to_radians();
    }

    /// Set elevation in degrees
    pub fn set_elevation_deg(&mut self, elevation_deg: f32) {
        self.elevation_rad = elevation_deg.to_radians();
    }

    /// Unit vector (x front, y left, z up)
    pub fn unit_vector(&self) -> [f32; 3] {
        let cos_el = self.elevation_rad.cos();
        [
            cos_el * self.azimuth_rad.cos(),
            cos_el * self.azimuth_rad.sin(),
            self.elevation_rad.sin(),
        ]
    }

    /// Cosine of the great-circle angle to another direction
    pub fn cos_angle_to(&self, other: &Direction) -> f32 {
        let a = self.unit_vector();
        let b = other.unit_vector();
        (a[0] * b[0] + a[1] * b[1] + a[2] * b[2]).clamp(-1.0, 1.0)
    }
}
