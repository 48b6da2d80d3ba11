//! sf-filterbank: complex sub-band transform for block-based processing
//!
//! A near-critically-sampled analysis/synthesis filterbank built from a
//! sqrt-Hann weighted overlap-add STFT: hop 128 samples, window 256, giving
//! 129 complex bands per frame. One `analysis` call consumes exactly one hop
//! of input per channel and produces one sub-band frame; `synthesis` is the
//! exact inverse apart from the fixed one-hop delay.
//!
//! Band 0 of the centre-frequency table is remapped away from DC so that
//! downstream wavenumber math (kr products) never divides by zero.

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use sf_core::{SpatialError, SpatialResult};

/// Samples consumed/produced per call, per channel.
pub const HOP_SIZE: usize = 128;

/// Analysis window length.
pub const FFT_SIZE: usize = 2 * HOP_SIZE;

/// Number of complex sub-bands per frame.
pub const NUM_BANDS: usize = FFT_SIZE / 2 + 1;

/// Per-channel transform state
struct ChannelState {
    /// Previous input hop (second half of the analysis window)
    prev_input: Vec<f32>,
    /// Synthesis overlap-add tail
    overlap: Vec<f32>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            prev_input: vec![0.0; HOP_SIZE],
            overlap: vec![0.0; HOP_SIZE],
        }
    }

    fn reset(&mut self) {
        self.prev_input.fill(0.0);
        self.overlap.fill(0.0);
    }
}

/// Multichannel sub-band analysis/synthesis transform.
pub struct Filterbank {
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    /// sqrt periodic-Hann window; squared copies overlap-add to unity
    window: Vec<f32>,
    channels: Vec<ChannelState>,
    /// Time-domain scratch
    time_scratch: Vec<f32>,
    /// Frequency-domain scratch
    freq_scratch: Vec<Complex32>,
}

impl Filterbank {
    /// Create a filterbank for the given channel count.
    pub fn new(num_channels: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(FFT_SIZE);
        let fft_inverse = planner.plan_fft_inverse(FFT_SIZE);

        let window = (0..FFT_SIZE)
            .map(|i| (std::f32::consts::PI * i as f32 / FFT_SIZE as f32).sin())
            .collect();

        Self {
            fft_forward,
            fft_inverse,
            window,
            channels: (0..num_channels).map(|_| ChannelState::new()).collect(),
            time_scratch: vec![0.0; FFT_SIZE],
            freq_scratch: vec![Complex32::new(0.0, 0.0); NUM_BANDS],
        }
    }

    /// Current channel count
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Change the channel count, resetting all transform state.
    pub fn set_num_channels(&mut self, num_channels: usize) {
        self.channels = (0..num_channels).map(|_| ChannelState::new()).collect();
    }

    /// Clear all transform state.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
    }

    /// Fixed analysis+synthesis delay in samples.
    pub fn delay_samples(&self) -> usize {
        FFT_SIZE - HOP_SIZE
    }

    /// Band centre frequencies in Hz for a host sample rate.
    ///
    /// Band 0 would sit at DC; it is remapped to a quarter of band 1's
    /// centre so kr-dependent math stays finite.
    pub fn center_frequencies(sample_rate: f32) -> Vec<f32> {
        let mut freqs: Vec<f32> = (0..NUM_BANDS)
            .map(|k| k as f32 * sample_rate / FFT_SIZE as f32)
            .collect();
        freqs[0] = freqs[1] / 4.0;
        freqs
    }

    /// Forward transform of one hop per channel.
    ///
    /// `input[ch]` must hold exactly `HOP_SIZE` samples; `output[ch]` is
    /// filled with `NUM_BANDS` complex bins.
    pub fn analysis(
        &mut self,
        input: &[Vec<f32>],
        output: &mut [Vec<Complex32>],
    ) -> SpatialResult<()> {
        if input.len() != self.channels.len() || output.len() != self.channels.len() {
            return Err(SpatialError::InvalidChannelCount {
                expected: self.channels.len(),
                got: input.len().min(output.len()),
            });
        }
        for (ch, state) in self.channels.iter_mut().enumerate() {
            let frame = &input[ch];
            if frame.len() != HOP_SIZE {
                return Err(SpatialError::FrameSizeMismatch {
                    expected: HOP_SIZE,
                    got: frame.len(),
                });
            }
            for i in 0..HOP_SIZE {
                self.time_scratch[i] = state.prev_input[i] * self.window[i];
                self.time_scratch[HOP_SIZE + i] = frame[i] * self.window[HOP_SIZE + i];
            }
            state.prev_input.copy_from_slice(frame);

            self.fft_forward
                .process(&mut self.time_scratch, &mut self.freq_scratch)
                .map_err(|e| SpatialError::ProcessingError(e.to_string()))?;
            output[ch].clear();
            output[ch].extend_from_slice(&self.freq_scratch);
        }
        Ok(())
    }

    /// Inverse transform of one sub-band frame per channel.
    ///
    /// Produces `HOP_SIZE` samples per channel.
    pub fn synthesis(
        &mut self,
        input: &[Vec<Complex32>],
        output: &mut [Vec<f32>],
    ) -> SpatialResult<()> {
        if input.len() != self.channels.len() || output.len() != self.channels.len() {
            return Err(SpatialError::InvalidChannelCount {
                expected: self.channels.len(),
                got: input.len().min(output.len()),
            });
        }
        let scale = 1.0 / FFT_SIZE as f32;
        for (ch, state) in self.channels.iter_mut().enumerate() {
            if input[ch].len() != NUM_BANDS {
                return Err(SpatialError::FrameSizeMismatch {
                    expected: NUM_BANDS,
                    got: input[ch].len(),
                });
            }
            self.freq_scratch.copy_from_slice(&input[ch]);
            // realfft requires purely real DC/Nyquist bins
            self.freq_scratch[0] = Complex32::new(self.freq_scratch[0].re, 0.0);
            self.freq_scratch[NUM_BANDS - 1] =
                Complex32::new(self.freq_scratch[NUM_BANDS - 1].re, 0.0);
            self.fft_inverse
                .process(&mut self.freq_scratch, &mut self.time_scratch)
                .map_err(|e| SpatialError::ProcessingError(e.to_string()))?;

            let out = &mut output[ch];
            out.resize(HOP_SIZE, 0.0);
            for i in 0..HOP_SIZE {
                out[i] = state.overlap[i] + self.time_scratch[i] * self.window[i] * scale;
                state.overlap[i] =
                    self.time_scratch[HOP_SIZE + i] * self.window[HOP_SIZE + i] * scale;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_through(fb_in: &mut Filterbank, fb_out: &mut Filterbank, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::new();
        let mut bands = vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]];
        let mut frame_out = vec![vec![0.0f32; HOP_SIZE]];
        for chunk in input.chunks(HOP_SIZE) {
            let mut frame = chunk.to_vec();
            frame.resize(HOP_SIZE, 0.0);
            fb_in.analysis(&[frame], &mut bands).unwrap();
            fb_out.synthesis(&bands, &mut frame_out).unwrap();
            out.extend_from_slice(&frame_out[0]);
        }
        out
    }

    #[test]
    fn test_perfect_reconstruction_sine() {
        let mut fb_a = Filterbank::new(1);
        let mut fb_s = Filterbank::new(1);
        let n = HOP_SIZE * 8;
        let input: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 997.0 * i as f32 / 48000.0).sin())
            .collect();

        let output = run_through(&mut fb_a, &mut fb_s, &input);
        let delay = fb_a.delay_samples();

        // Compare past the startup transient
        for i in (2 * HOP_SIZE)..(n - delay) {
            assert!(
                (output[i + delay] - input[i]).abs() < 1e-4,
                "sample {i}: {} vs {}",
                output[i + delay],
                input[i]
            );
        }
    }

    #[test]
    fn test_perfect_reconstruction_impulse() {
        let mut fb_a = Filterbank::new(1);
        let mut fb_s = Filterbank::new(1);
        let mut input = vec![0.0f32; HOP_SIZE * 6];
        input[HOP_SIZE * 2 + 17] = 1.0;

        let output = run_through(&mut fb_a, &mut fb_s, &input);
        let delay = fb_a.delay_samples();

        let peak = HOP_SIZE * 2 + 17 + delay;
        assert!((output[peak] - 1.0).abs() < 1e-4);
        let leakage: f32 = output
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != peak)
            .map(|(_, &v)| v.abs())
            .sum();
        assert!(leakage < 1e-2);
    }

    #[test]
    fn test_center_frequencies() {
        let freqs = Filterbank::center_frequencies(48000.0);
        assert_eq!(freqs.len(), NUM_BANDS);
        assert!(freqs[0] > 0.0); // DC band remapped
        assert!((freqs[1] - 187.5).abs() < 1e-3);
        assert!((freqs[0] - 187.5 / 4.0).abs() < 1e-3);
        assert!((freqs[NUM_BANDS - 1] - 24000.0).abs() < 1e-3);
        for k in 1..NUM_BANDS {
            assert!(freqs[k] > freqs[k - 1]);
        }
    }

    #[test]
    fn test_frame_size_rejected() {
        let mut fb = Filterbank::new(1);
        let mut bands = vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]];
        let result = fb.analysis(&[vec![0.0; 64]], &mut bands);
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_count_change_resets() {
        let mut fb = Filterbank::new(2);
        fb.set_num_channels(4);
        assert_eq!(fb.num_channels(), 4);
        let frames = vec![vec![0.0f32; HOP_SIZE]; 4];
        let mut bands = vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]; 4];
        assert!(fb.analysis(&frames, &mut bands).is_ok());
    }
}
