//! Microphone-array geometry and preset layouts

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use sf_core::{Direction, SpatialError, SpatialResult, AmbisonicOrder, MAX_NUM_SENSORS};
use sf_math::fibonacci_sphere;

/// Physical construction of the array body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayConstruction {
    /// Sensors on a sphere
    Spherical,
    /// Sensors on a cylinder (2D arrays)
    Cylindrical,
}

/// Sensor mounting and directivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorPattern {
    /// Omnidirectional sensors on a rigid baffle
    RigidOmni,
    /// Cardioid sensors on a rigid baffle
    RigidCard,
    /// Dipole sensors on a rigid baffle
    RigidDipole,
    /// Omnidirectional sensors, open (baffle-free) array
    OpenOmni,
    /// Cardioid sensors, open array
    OpenCard,
    /// Dipole sensors, open array
    OpenDipole,
}

impl SensorPattern {
    /// Whether the sensors sit on a rigid scatterer
    pub fn is_rigid(&self) -> bool {
        matches!(
            self,
            SensorPattern::RigidOmni | SensorPattern::RigidCard | SensorPattern::RigidDipole
        )
    }

    /// Directivity mixing coefficient: 1 omni, 0.5 cardioid, 0 dipole
    pub fn directivity(&self) -> f64 {
        match self {
            SensorPattern::RigidOmni | SensorPattern::OpenOmni => 1.0,
            SensorPattern::RigidCard | SensorPattern::OpenCard => 0.5,
            SensorPattern::RigidDipole | SensorPattern::OpenDipole => 0.0,
        }
    }
}

/// Sensor-array geometry descriptor.
///
/// The baffle radius is kept clamped to at least the array radius; every
/// setter that could break that invariant re-applies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayGeometry {
    sensors: Vec<Direction>,
    array_radius: f32,
    baffle_radius: f32,
    construction: ArrayConstruction,
    pattern: SensorPattern,
}

impl ArrayGeometry {
    /// Create a geometry from explicit sensor directions.
    pub fn new(
        sensors: Vec<Direction>,
        array_radius: f32,
        construction: ArrayConstruction,
        pattern: SensorPattern,
    ) -> SpatialResult<Self> {
        if sensors.is_empty() || sensors.len() > MAX_NUM_SENSORS {
            return Err(SpatialError::InvalidSensorCount {
                got: sensors.len(),
                max: MAX_NUM_SENSORS,
            });
        }
        if array_radius <= 0.0 {
            return Err(SpatialError::InvalidGeometry(format!(
                "array radius must be positive, got {array_radius}"
            )));
        }
        Ok(Self {
            sensors,
            array_radius,
            baffle_radius: array_radius,
            construction,
            pattern,
        })
    }

    /// Number of sensors
    pub fn num_sensors(&self) -> usize {
        self.sensors.len()
    }

    /// Sensor directions
    pub fn sensor_directions(&self) -> &[Direction] {
        &self.sensors
    }

    /// Direction of one sensor
    pub fn sensor(&self, index: usize) -> SpatialResult<Direction> {
        self.sensors
            .get(index)
            .copied()
            .ok_or(SpatialError::SensorIndexOutOfRange {
                index,
                count: self.sensors.len(),
            })
    }

    /// Mutable access to one sensor direction
    pub fn sensor_mut(&mut self, index: usize) -> SpatialResult<&mut Direction> {
        let count = self.sensors.len();
        self.sensors
            .get_mut(index)
            .ok_or(SpatialError::SensorIndexOutOfRange { index, count })
    }

    /// Resize the sensor set.
    ///
    /// Existing directions are kept; added sensors are spread over a
    /// Fibonacci grid so the layout stays usable until the caller fills in
    /// real directions.
    pub fn set_num_sensors(&mut self, count: usize) -> SpatialResult<()> {
        if count == 0 || count > MAX_NUM_SENSORS {
            return Err(SpatialError::InvalidSensorCount {
                got: count,
                max: MAX_NUM_SENSORS,
            });
        }
        if count <= self.sensors.len() {
            self.sensors.truncate(count);
        } else {
            let fill = fibonacci_sphere(count);
            self.sensors.extend_from_slice(&fill[self.sensors.len()..]);
        }
        Ok(())
    }

    /// Array (sensor) radius in metres
    pub fn array_radius(&self) -> f32 {
        self.array_radius
    }

    /// Set the array radius; the baffle radius is pulled up if needed.
    pub fn set_array_radius(&mut self, radius: f32) -> SpatialResult<()> {
        if radius <= 0.0 {
            return Err(SpatialError::InvalidGeometry(format!(
                "array radius must be positive, got {radius}"
            )));
        }
        self.array_radius = radius;
        if self.baffle_radius < radius {
            self.baffle_radius = radius;
        }
        Ok(())
    }

    /// Baffle/scatterer radius in metres (>= array radius)
    pub fn baffle_radius(&self) -> f32 {
        self.baffle_radius
    }

    /// Set the baffle radius, clamped to at least the array radius.
    pub fn set_baffle_radius(&mut self, radius: f32) {
        self.baffle_radius = radius.max(self.array_radius);
    }

    /// Array construction
    pub fn construction(&self) -> ArrayConstruction {
        self.construction
    }

    /// Set the array construction
    pub fn set_construction(&mut self, construction: ArrayConstruction) {
        self.construction = construction;
    }

    /// Sensor pattern
    pub fn pattern(&self) -> SensorPattern {
        self.pattern
    }

    /// Set the sensor pattern
    pub fn set_pattern(&mut self, pattern: SensorPattern) {
        self.pattern = pattern;
    }

    /// Whether the sensors sit flush on the baffle (no stand-off)
    pub fn sensors_flush(&self) -> bool {
        (self.baffle_radius - self.array_radius).abs() < 1e-6
    }

    /// Cosine of the great-circle angle between every sensor pair (Q x Q)
    pub fn cos_angles(&self) -> Array2<f64> {
        let q = self.sensors.len();
        let mut out = Array2::<f64>::zeros((q, q));
        for i in 0..q {
            for j in i..q {
                let c = self.sensors[i].cos_angle_to(&self.sensors[j]) as f64;
                out[[i, j]] = c;
                out[[j, i]] = c;
            }
        }
        out
    }
}

/// Named microphone-array presets.
///
/// Pure data; each preset yields a geometry plus the encoding order it was
/// designed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayPreset {
    /// 4-sensor rigid sphere, tetrahedral layout, r = 4.2 cm (the default)
    TetrahedralRigid,
    /// 4-sensor open cardioid tetrahedron, r = 1.5 cm
    TetrahedralOpenCard,
    /// 19-sensor rigid sphere, r = 4.9 cm, 3rd order
    Rigid19,
    /// 32-sensor rigid sphere, r = 4.2 cm, 4th order
    Rigid32,
    /// 64-sensor open sphere, r = 8 cm, 7th order
    Open64,
}

/// Tetrahedral directions: (azimuth, elevation) in degrees
const TETRAHEDRAL_DEG: [(f32, f32); 4] = [
    (45.0, 35.264),
    (-45.0, -35.264),
    (135.0, -35.264),
    (-135.0, 35.264),
];

impl ArrayPreset {
    /// Look a preset up by name
    pub fn from_name(name: &str) -> SpatialResult<Self> {
        match name {
            "tetrahedral-rigid" => Ok(ArrayPreset::TetrahedralRigid),
            "tetrahedral-open-card" => Ok(ArrayPreset::TetrahedralOpenCard),
            "rigid-19" => Ok(ArrayPreset::Rigid19),
            "rigid-32" => Ok(ArrayPreset::Rigid32),
            "open-64" => Ok(ArrayPreset::Open64),
            other => Err(SpatialError::UnknownPreset(other.to_string())),
        }
    }

    /// Build the preset geometry
    pub fn geometry(&self) -> ArrayGeometry {
        let tetra = || {
            TETRAHEDRAL_DEG
                .iter()
                .map(|&(az, el)| Direction::from_degrees(az, el))
                .collect::<Vec<_>>()
        };
        let build = |dirs: Vec<Direction>, r: f32, pattern: SensorPattern| ArrayGeometry {
            sensors: dirs,
            array_radius: r,
            baffle_radius: r,
            construction: ArrayConstruction::Spherical,
            pattern,
        };
        match self {
            ArrayPreset::TetrahedralRigid => build(tetra(), 0.042, SensorPattern::RigidOmni),
            ArrayPreset::TetrahedralOpenCard => build(tetra(), 0.015, SensorPattern::OpenCard),
            ArrayPreset::Rigid19 => {
                build(fibonacci_sphere(19), 0.049, SensorPattern::RigidOmni)
            }
            ArrayPreset::Rigid32 => {
                build(fibonacci_sphere(32), 0.042, SensorPattern::RigidOmni)
            }
            ArrayPreset::Open64 => build(fibonacci_sphere(64), 0.08, SensorPattern::OpenOmni),
        }
    }

    /// The encoding order the preset was designed for
    pub fn recommended_order(&self) -> AmbisonicOrder {
        match self {
            ArrayPreset::TetrahedralRigid | ArrayPreset::TetrahedralOpenCard => {
                AmbisonicOrder::First
            }
            ArrayPreset::Rigid19 => AmbisonicOrder::Third,
            ArrayPreset::Rigid32 => AmbisonicOrder::Fourth,
            ArrayPreset::Open64 => AmbisonicOrder::Seventh,
        }
    }
}
