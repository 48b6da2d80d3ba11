//! sf-encoder: microphone array to Ambisonics
//!
//! Encodes the signals of a rigid or open sensor array into spherical
//! harmonic (Ambisonic) signals. The design pipeline models the array's
//! per-order frequency responses, inverts them under a noise-amplification
//! ceiling, combines the result with the pseudo-inverse of the spatial
//! sampling matrix, and optionally flattens the diffuse-field response
//! above spatial aliasing. Processing runs block-wise through the
//! sf-filterbank sub-band transform.
//!
//! ```no_run
//! use sf_encoder::{ArrayEncoder, ArrayPreset};
//!
//! let encoder = ArrayEncoder::from_preset(ArrayPreset::TetrahedralRigid)?;
//! encoder.init(48_000.0);
//! encoder.rebuild()?;
//!
//! let inputs = vec![vec![0.0f32; sf_core::FRAME_SIZE]; 4];
//! let mut outputs = vec![Vec::new(); 4];
//! encoder.process(&inputs, &mut outputs)?;
//! # Ok::<(), sf_core::SpatialError>(())
//! ```

mod config;
mod encoder;
mod evaluate;
mod geometry;
mod matrix;
mod modal;
mod regularise;

pub use config::{EncoderConfig, FilterDesign};
pub use encoder::ArrayEncoder;
pub use evaluate::{evaluate_performance, EncodingDiagnostics};
pub use geometry::{ArrayConstruction, ArrayGeometry, ArrayPreset, SensorPattern};
pub use matrix::{apply_diffuse_eq, build_encoding_matrix, EncodingMatrix};
pub use modal::{modal_coefficients, MAX_SIMULATION_ORDER};
pub use regularise::regularised_inversion;
