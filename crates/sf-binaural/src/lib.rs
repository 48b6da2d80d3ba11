//! sf-binaural: headphone monitoring for spherical-harmonic streams
//!
//! Renders ACN/N3D Ambisonic signals to stereo over virtual loudspeakers
//! with a synthetic spherical-head HRTF model. Meant for auditioning
//! encoded material, not as a measured-HRTF replacement.

mod hrir;
mod renderer;

pub use hrir::{synthetic_hrir, HrirPair, HRIR_LENGTH, HRIR_PEAK_OFFSET};
pub use renderer::{BinauralConfig, BinauralRenderer};
