//! Synthetic head-related impulse responses
//!
//! A lightweight spherical-head model good enough for monitoring encoded
//! streams without shipping a measured HRTF set: Woodworth ITD, a
//! broadband ILD from head shadowing, and a one-pole low-pass on the
//! contralateral ear.

use sf_core::Direction;

/// Impulse response length in samples.
pub const HRIR_LENGTH: usize = 256;

/// Samples before the near-ear impulse peak; leaves room for negative
/// interaural delays.
pub const HRIR_PEAK_OFFSET: usize = 32;

/// Average head radius in metres.
const HEAD_RADIUS: f32 = 0.0875;

const SPEED_OF_SOUND: f32 = 343.0;

/// A left/right impulse response pair.
#[derive(Debug, Clone)]
pub struct HrirPair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Synthesise an HRIR pair for one source direction.
///
/// The azimuth convention matches the rest of the workspace: positive
/// azimuth is to the left, so a positive-azimuth source leads at the left
/// ear.
pub fn synthetic_hrir(dir: &Direction, sample_rate: f32) -> HrirPair {
    let az = dir.azimuth_rad();
    let el = dir.elevation_rad();

    // Woodworth: lateral angle drives the interaural delay
    let lateral = az.sin() * el.cos();
    let theta = lateral.clamp(-1.0, 1.0).asin();
    let itd = HEAD_RADIUS / SPEED_OF_SOUND * (theta + lateral);
    let half = itd * 0.5 * sample_rate;

    // Shadow gain and low-pass on the far ear, strongest for fully
    // lateral sources
    let shadow = 0.5 + 0.5 * (1.0 - lateral.abs());
    let lp_far = 0.3 + 0.65 * (1.0 - lateral.abs());
    let (gain_l, gain_r, delay_l, delay_r) = if lateral >= 0.0 {
        (1.0, shadow, -half, half)
    } else {
        (shadow, 1.0, half, -half)
    };
    let lp_l = if lateral > 0.0 { 1.0 } else { lp_far };
    let lp_r = if lateral < 0.0 { 1.0 } else { lp_far };

    let base_delay = HRIR_PEAK_OFFSET as f32;
    let build = |gain: f32, delay: f32, lp: f32| -> Vec<f32> {
        let mut out = vec![0.0f32; HRIR_LENGTH];
        let centre = base_delay + delay;
        // Band-limited impulse placed with sub-sample accuracy
        for (i, v) in out.iter_mut().enumerate() {
            let x = i as f32 - centre;
            *v = gain * (-(x * x) / 2.0).exp();
        }
        // One-pole low-pass models the head shadow
        let mut state = 0.0f32;
        for v in out.iter_mut() {
            state = lp * *v + (1.0 - lp) * state;
            *v = state;
        }
        out
    };

    HrirPair {
        left: build(gain_l, delay_l, lp_l),
        right: build(gain_r, delay_r, lp_r),
    }
}
