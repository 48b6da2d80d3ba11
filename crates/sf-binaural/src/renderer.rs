//! Ambisonic to binaural rendering via virtual loudspeakers
//!
//! Decodes the spherical-harmonic stream to a Fibonacci grid of virtual
//! loudspeakers (mode-matching decode, optional max-rE taper) and
//! convolves each feed with a synthetic HRIR pair. Convolution runs in
//! the frequency domain, one FFT per speaker and one inverse per ear,
//! with overlap-add tails carried between frames.

use ndarray::Array2;
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use sf_core::{
    acn_to_order_degree, AmbisonicOrder, Direction, SpatialError, SpatialResult, FRAME_SIZE,
};
use sf_math::{fibonacci_sphere, max_re_weights, pseudo_inverse, real_sh_matrix};

use crate::hrir::{synthetic_hrir, HRIR_LENGTH, HRIR_PEAK_OFFSET};

/// FFT length for the partitioned convolution: frame + HRIR, rounded up.
const CONV_FFT_SIZE: usize = (FRAME_SIZE + HRIR_LENGTH).next_power_of_two();
const CONV_BINS: usize = CONV_FFT_SIZE / 2 + 1;

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct BinauralConfig {
    /// Input Ambisonic order
    pub order: AmbisonicOrder,
    /// Number of virtual loudspeakers
    pub num_virtual_speakers: usize,
    /// Apply the max-rE taper to the decode
    pub max_re: bool,
}

impl Default for BinauralConfig {
    fn default() -> Self {
        Self {
            order: AmbisonicOrder::First,
            num_virtual_speakers: 16,
            max_re: true,
        }
    }
}

/// Spherical-harmonic to binaural renderer.
pub struct BinauralRenderer {
    order: AmbisonicOrder,
    /// Decode matrix (speakers x nSH)
    decode: Array2<f32>,
    /// Per-speaker HRTF spectra
    hrtf_left: Vec<Vec<Complex32>>,
    hrtf_right: Vec<Vec<Complex32>>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    time_scratch: Vec<f32>,
    freq_scratch: Vec<Complex32>,
    acc_left: Vec<Complex32>,
    acc_right: Vec<Complex32>,
    tail_left: Vec<f32>,
    tail_right: Vec<f32>,
    feeds: Vec<f32>,
}

impl BinauralRenderer {
    /// Build a renderer for the given configuration and sample rate.
    pub fn new(config: &BinauralConfig, sample_rate: f32) -> SpatialResult<Self> {
        let n_sh = config.order.channel_count();
        if config.num_virtual_speakers < n_sh {
            return Err(SpatialError::InvalidChannelCount {
                expected: n_sh,
                got: config.num_virtual_speakers,
            });
        }
        let speakers: Vec<Direction> = fibonacci_sphere(config.num_virtual_speakers);
        let y = real_sh_matrix(config.order, &speakers);
        let mut decode_f64 = pseudo_inverse(&y)?; // (V x nSH)
        if config.max_re {
            let weights = max_re_weights(config.order);
            for ch in 0..n_sh {
                let (l, _) = acn_to_order_degree(ch);
                for v in 0..speakers.len() {
                    decode_f64[[v, ch]] *= weights[l as usize];
                }
            }
        }
        let decode = decode_f64.mapv(|v| v as f32);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(CONV_FFT_SIZE);
        let fft_inverse = planner.plan_fft_inverse(CONV_FFT_SIZE);

        let mut hrtf_left = Vec::with_capacity(speakers.len());
        let mut hrtf_right = Vec::with_capacity(speakers.len());
        let mut time = vec![0.0f32; CONV_FFT_SIZE];
        for dir in &speakers {
            let pair = synthetic_hrir(dir, sample_rate);
            for (ear, store) in [(&pair.left, &mut hrtf_left), (&pair.right, &mut hrtf_right)]
            {
                time.fill(0.0);
                time[..HRIR_LENGTH].copy_from_slice(ear);
                let mut spectrum = vec![Complex32::new(0.0, 0.0); CONV_BINS];
                fft_forward
                    .process(&mut time, &mut spectrum)
                    .map_err(|e| SpatialError::ProcessingError(e.to_string()))?;
                store.push(spectrum);
            }
        }

        Ok(Self {
            order: config.order,
            decode,
            hrtf_left,
            hrtf_right,
            fft_forward,
            fft_inverse,
            time_scratch: vec![0.0; CONV_FFT_SIZE],
            freq_scratch: vec![Complex32::new(0.0, 0.0); CONV_BINS],
            acc_left: vec![Complex32::new(0.0, 0.0); CONV_BINS],
            acc_right: vec![Complex32::new(0.0, 0.0); CONV_BINS],
            tail_left: vec![0.0; CONV_FFT_SIZE - FRAME_SIZE],
            tail_right: vec![0.0; CONV_FFT_SIZE - FRAME_SIZE],
            feeds: vec![0.0; FRAME_SIZE],
        })
    }

    /// Input Ambisonic order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Number of virtual loudspeakers
    pub fn num_virtual_speakers(&self) -> usize {
        self.decode.nrows()
    }

    /// Rendering latency in samples (the HRIR peak offset)
    pub fn latency_samples(&self) -> usize {
        HRIR_PEAK_OFFSET
    }

    /// Clear the convolution tails.
    pub fn reset(&mut self) {
        self.tail_left.fill(0.0);
        self.tail_right.fill(0.0);
    }

    /// Render one frame of ACN/N3D spherical-harmonic signals to stereo.
    ///
    /// `sh_input` must hold at least the channel count of the configured
    /// order, each `FRAME_SIZE` samples. `left`/`right` are resized to
    /// `FRAME_SIZE`.
    pub fn render(
        &mut self,
        sh_input: &[Vec<f32>],
        left: &mut Vec<f32>,
        right: &mut Vec<f32>,
    ) -> SpatialResult<()> {
        let n_sh = self.order.channel_count();
        if sh_input.len() < n_sh {
            return Err(SpatialError::InvalidChannelCount {
                expected: n_sh,
                got: sh_input.len(),
            });
        }
        for ch in sh_input.iter().take(n_sh) {
            if ch.len() != FRAME_SIZE {
                return Err(SpatialError::FrameSizeMismatch {
                    expected: FRAME_SIZE,
                    got: ch.len(),
                });
            }
        }

        self.acc_left.fill(Complex32::new(0.0, 0.0));
        self.acc_right.fill(Complex32::new(0.0, 0.0));
        for v in 0..self.decode.nrows() {
            // Virtual speaker feed
            for i in 0..FRAME_SIZE {
                let mut acc = 0.0f32;
                for ch in 0..n_sh {
                    acc += self.decode[[v, ch]] * sh_input[ch][i];
                }
                self.feeds[i] = acc;
            }
            self.time_scratch.fill(0.0);
            self.time_scratch[..FRAME_SIZE].copy_from_slice(&self.feeds);
            self.fft_forward
                .process(&mut self.time_scratch, &mut self.freq_scratch)
                .map_err(|e| SpatialError::ProcessingError(e.to_string()))?;
            for k in 0..CONV_BINS {
                self.acc_left[k] += self.freq_scratch[k] * self.hrtf_left[v][k];
                self.acc_right[k] += self.freq_scratch[k] * self.hrtf_right[v][k];
            }
        }

        let scale = 1.0 / CONV_FFT_SIZE as f32;
        for (acc, tail, out) in [
            (&mut self.acc_left, &mut self.tail_left, left),
            (&mut self.acc_right, &mut self.tail_right, right),
        ] {
            acc[0] = Complex32::new(acc[0].re, 0.0);
            acc[CONV_BINS - 1] = Complex32::new(acc[CONV_BINS - 1].re, 0.0);
            self.freq_scratch.copy_from_slice(acc);
            self.fft_inverse
                .process(&mut self.freq_scratch, &mut self.time_scratch)
                .map_err(|e| SpatialError::ProcessingError(e.to_string()))?;

            out.resize(FRAME_SIZE, 0.0);
            let tail_len = tail.len();
            for i in 0..FRAME_SIZE {
                out[i] = self.time_scratch[i] * scale + tail[i];
            }
            // Shift the tail forward and fold in this frame's remainder
            tail.copy_within(FRAME_SIZE.., 0);
            for t in tail.iter_mut().skip(tail_len - FRAME_SIZE) {
                *t = 0.0;
            }
            for i in 0..(CONV_FFT_SIZE - FRAME_SIZE) {
                tail[i] += self.time_scratch[FRAME_SIZE + i] * scale;
            }
        }
        Ok(())
    }
}
