//! The array encoder handle
//!
//! Owns the whole pipeline: control state (geometry + config), the
//! published encoding matrix, and the per-thread DSP state. Setters only
//! flip dirty flags; the expensive re-derivation happens in `rebuild`,
//! either called explicitly from a worker thread or lazily from `process`
//! (which mutes the block it spends rebuilding). The matrix is swapped
//! under a `RwLock` as one unit, and the audio path only ever `try_read`s
//! it, muting instead of blocking on contention.
//!
//! Dropping the encoder is safe by construction: the handle owns all
//! shared state, so exclusive ownership at drop time means no thread is
//! still inside `process` or `rebuild`.

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Array2;
use num_complex::{Complex32, Complex64};
use parking_lot::{Mutex, RwLock};

use sf_core::{
    db_to_linear, AmbisonicOrder, ChannelOrdering, Direction, FormatConverter, Normalization,
    SpatialResult, FRAME_SIZE,
};
use sf_filterbank::{Filterbank, HOP_SIZE, NUM_BANDS};

use crate::config::{EncoderConfig, FilterDesign};
use crate::evaluate::{evaluate_performance, EncodingDiagnostics};
use crate::geometry::{ArrayConstruction, ArrayGeometry, ArrayPreset, SensorPattern};
use crate::matrix::{apply_diffuse_eq, build_encoding_matrix, EncodingMatrix};
use crate::modal::modal_coefficients;
use crate::regularise::regularised_inversion;

// The filterbank hop and the pipeline frame are the same thing
const _: () = assert!(FRAME_SIZE == HOP_SIZE);

/// Modal order used when simulating the array beyond the encoding order
/// (diffuse-field EQ and evaluation).
const SIMULATION_ORDER: usize = 20;

/// Control-thread state: what the user has asked for.
struct ControlState {
    geometry: ArrayGeometry,
    config: EncoderConfig,
    sample_rate: f32,
}

/// Audio-thread state: filterbanks and scratch buffers.
struct DspState {
    analysis: Filterbank,
    synthesis: Filterbank,
    in_frames: Vec<Vec<f32>>,
    in_bands: Vec<Vec<Complex32>>,
    sh_bands: Vec<Vec<Complex32>>,
    sh_frames: Vec<Vec<f32>>,
    conv_frames: Vec<Vec<f32>>,
    converter: FormatConverter,
    post_gain: f32,
}

impl DspState {
    fn new(num_sensors: usize, n_sh: usize, converter: FormatConverter) -> Self {
        Self {
            analysis: Filterbank::new(num_sensors),
            synthesis: Filterbank::new(n_sh),
            in_frames: vec![vec![0.0; FRAME_SIZE]; num_sensors],
            in_bands: vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]; num_sensors],
            sh_bands: vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]; n_sh],
            sh_frames: vec![vec![0.0; FRAME_SIZE]; n_sh],
            conv_frames: vec![vec![0.0; FRAME_SIZE]; n_sh],
            converter,
            post_gain: 1.0,
        }
    }

    fn resize(&mut self, num_sensors: usize, n_sh: usize) {
        self.analysis.set_num_channels(num_sensors);
        self.synthesis.set_num_channels(n_sh);
        self.in_frames = vec![vec![0.0; FRAME_SIZE]; num_sensors];
        self.in_bands = vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]; num_sensors];
        self.sh_bands = vec![vec![Complex32::new(0.0, 0.0); NUM_BANDS]; n_sh];
        self.sh_frames = vec![vec![0.0; FRAME_SIZE]; n_sh];
        self.conv_frames = vec![vec![0.0; FRAME_SIZE]; n_sh];
    }
}

/// Real-time microphone-array to Ambisonic encoder.
pub struct ArrayEncoder {
    control: Mutex<ControlState>,
    dsp: Mutex<DspState>,
    matrix: RwLock<Option<EncodingMatrix>>,
    diagnostics: Mutex<Option<EncodingDiagnostics>>,
    /// Channel counts changed; filterbanks and scratch need re-sizing
    geometry_dirty: AtomicBool,
    /// Encoding matrix is stale
    filters_dirty: AtomicBool,
    /// Cached diagnostics are stale
    eval_dirty: AtomicBool,
    /// A rebuild is in flight
    rebuilding: AtomicBool,
}

impl ArrayEncoder {
    /// Create an encoder for an explicit geometry and configuration.
    ///
    /// If the geometry cannot support the configured order, the order is
    /// forced down to first.
    pub fn new(geometry: ArrayGeometry, mut config: EncoderConfig) -> SpatialResult<Self> {
        if geometry.num_sensors() < config.order.channel_count() {
            log::warn!(
                "{} sensors cannot support order {}; forcing first order",
                geometry.num_sensors(),
                config.order.as_usize()
            );
            config.order = AmbisonicOrder::First;
        }
        let converter = FormatConverter::new(
            (ChannelOrdering::Acn, Normalization::N3d),
            (config.channel_ordering, config.normalization),
            config.order,
        )?;
        let dsp = DspState::new(
            geometry.num_sensors(),
            config.order.channel_count(),
            converter,
        );
        Ok(Self {
            control: Mutex::new(ControlState {
                geometry,
                config,
                sample_rate: 48_000.0,
            }),
            dsp: Mutex::new(dsp),
            matrix: RwLock::new(None),
            diagnostics: Mutex::new(None),
            geometry_dirty: AtomicBool::new(false),
            filters_dirty: AtomicBool::new(true),
            eval_dirty: AtomicBool::new(true),
            rebuilding: AtomicBool::new(false),
        })
    }

    /// Create an encoder from a named preset at its recommended order.
    pub fn from_preset(preset: ArrayPreset) -> SpatialResult<Self> {
        let config = EncoderConfig {
            order: preset.recommended_order(),
            ..EncoderConfig::default()
        };
        Self::new(preset.geometry(), config)
    }

    /// Bind the encoder to a host sample rate.
    pub fn init(&self, sample_rate: f32) {
        let mut control = self.control.lock();
        control.sample_rate = sample_rate;
        drop(control);
        self.geometry_dirty.store(true, Ordering::Release);
        self.filters_dirty.store(true, Ordering::Release);
    }

    // --- queries ---------------------------------------------------------

    /// Current encoding order
    pub fn order(&self) -> AmbisonicOrder {
        self.control.lock().config.order
    }

    /// Spherical-harmonic channel count for the current order
    pub fn nsh(&self) -> usize {
        self.order().channel_count()
    }

    /// Current sensor count
    pub fn num_sensors(&self) -> usize {
        self.control.lock().geometry.num_sensors()
    }

    /// Snapshot of the current geometry
    pub fn geometry(&self) -> ArrayGeometry {
        self.control.lock().geometry.clone()
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> EncoderConfig {
        self.control.lock().config.clone()
    }

    /// Host sample rate
    pub fn sample_rate(&self) -> f32 {
        self.control.lock().sample_rate
    }

    /// Whether pending parameter changes still await a rebuild
    pub fn needs_reinit(&self) -> bool {
        self.geometry_dirty.load(Ordering::Acquire)
            || self.filters_dirty.load(Ordering::Acquire)
    }

    /// Whether a rebuild is currently in flight
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Spatial aliasing frequency N*c/(2*pi*r) in Hz
    pub fn aliasing_frequency(&self) -> f32 {
        let control = self.control.lock();
        control.config.order.as_usize() as f32 * control.config.speed_of_sound
            / (2.0 * std::f32::consts::PI * control.geometry.array_radius())
    }

    // --- setters (control thread) ----------------------------------------

    /// Set the encoding order; forced down to first if the sensor count
    /// cannot support it. FuMa conventions fall back to ACN/N3D above
    /// first order.
    pub fn set_order(&self, order: AmbisonicOrder) {
        let mut control = self.control.lock();
        let order = if control.geometry.num_sensors() < order.channel_count() {
            log::warn!(
                "{} sensors cannot support order {}; forcing first order",
                control.geometry.num_sensors(),
                order.as_usize()
            );
            AmbisonicOrder::First
        } else {
            order
        };
        if order.as_usize() > 1 {
            if control.config.channel_ordering == ChannelOrdering::Fuma {
                log::warn!("FuMa ordering is first-order only; falling back to ACN");
                control.config.channel_ordering = ChannelOrdering::Acn;
            }
            if control.config.normalization == Normalization::Fuma {
                log::warn!("FuMa normalization is first-order only; falling back to N3D");
                control.config.normalization = Normalization::N3d;
            }
        }
        control.config.order = order;
        drop(control);
        self.geometry_dirty.store(true, Ordering::Release);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Replace the whole geometry
    pub fn set_geometry(&self, geometry: ArrayGeometry) {
        let mut control = self.control.lock();
        if geometry.num_sensors() < control.config.order.channel_count() {
            log::warn!(
                "{} sensors cannot support order {}; forcing first order",
                geometry.num_sensors(),
                control.config.order.as_usize()
            );
            control.config.order = AmbisonicOrder::First;
        }
        control.geometry = geometry;
        drop(control);
        self.geometry_dirty.store(true, Ordering::Release);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Load a named preset (geometry and recommended order)
    pub fn apply_preset(&self, preset: ArrayPreset) {
        {
            let mut control = self.control.lock();
            control.geometry = preset.geometry();
            control.config.order = preset.recommended_order();
        }
        self.geometry_dirty.store(true, Ordering::Release);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Change the sensor count; existing directions are kept.
    pub fn set_num_sensors(&self, count: usize) -> SpatialResult<()> {
        let mut control = self.control.lock();
        control.geometry.set_num_sensors(count)?;
        if count < control.config.order.channel_count() {
            log::warn!(
                "{count} sensors cannot support order {}; forcing first order",
                control.config.order.as_usize()
            );
            control.config.order = AmbisonicOrder::First;
        }
        drop(control);
        self.geometry_dirty.store(true, Ordering::Release);
        self.filters_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Move one sensor
    pub fn set_sensor_direction(&self, index: usize, dir: Direction) -> SpatialResult<()> {
        {
            let mut control = self.control.lock();
            *control.geometry.sensor_mut(index)? = dir;
        }
        self.filters_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Set the sensor radius
    pub fn set_array_radius(&self, radius: f32) -> SpatialResult<()> {
        self.control.lock().geometry.set_array_radius(radius)?;
        self.filters_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Set the baffle radius (clamped to at least the array radius)
    pub fn set_baffle_radius(&self, radius: f32) {
        self.control.lock().geometry.set_baffle_radius(radius);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the array construction
    pub fn set_construction(&self, construction: ArrayConstruction) {
        self.control.lock().geometry.set_construction(construction);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the sensor pattern
    pub fn set_pattern(&self, pattern: SensorPattern) {
        self.control.lock().geometry.set_pattern(pattern);
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the regularisation strategy
    pub fn set_filter_design(&self, design: FilterDesign) {
        self.control.lock().config.filter_design = design;
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the maximum equalisation gain in dB
    pub fn set_max_gain_db(&self, db: f32) {
        self.control.lock().config.max_gain_db = db;
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the speed of sound in m/s
    pub fn set_speed_of_sound(&self, c: f32) {
        self.control.lock().config.speed_of_sound = c;
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the output post-gain in dB
    pub fn set_post_gain_db(&self, db: f32) {
        self.control.lock().config.post_gain_db = db;
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the encoding frequency ceiling
    pub fn set_max_encode_freq(&self, hz: f32) {
        self.control.lock().config.max_encode_freq_hz = hz;
        self.filters_dirty.store(true, Ordering::Release);
    }

    /// Set the output channel ordering; FuMa is rejected above first order.
    pub fn set_channel_ordering(&self, ordering: ChannelOrdering) -> SpatialResult<()> {
        let mut control = self.control.lock();
        if ordering == ChannelOrdering::Fuma && control.config.order.as_usize() > 1 {
            return Err(sf_core::SpatialError::FumaOrderUnsupported(
                control.config.order.as_usize(),
            ));
        }
        control.config.channel_ordering = ordering;
        drop(control);
        self.filters_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Set the output normalization; FuMa is rejected above first order.
    pub fn set_normalization(&self, normalization: Normalization) -> SpatialResult<()> {
        let mut control = self.control.lock();
        if normalization == Normalization::Fuma && control.config.order.as_usize() > 1 {
            return Err(sf_core::SpatialError::FumaOrderUnsupported(
                control.config.order.as_usize(),
            ));
        }
        control.config.normalization = normalization;
        drop(control);
        self.filters_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Enable or disable the diffuse-field equaliser
    pub fn set_diffuse_eq(&self, enabled: bool) {
        self.control.lock().config.apply_diffuse_eq = enabled;
        self.filters_dirty.store(true, Ordering::Release);
    }

    // --- rebuild ----------------------------------------------------------

    /// Re-derive the encoding matrix from the current control state and
    /// publish it. Safe to call from any non-audio thread; `process` calls
    /// it lazily when needed.
    pub fn rebuild(&self) -> SpatialResult<()> {
        self.rebuilding.store(true, Ordering::Release);
        let result = self.rebuild_inner();
        self.rebuilding.store(false, Ordering::Release);
        result
    }

    fn rebuild_inner(&self) -> SpatialResult<()> {
        let (geometry, config, sample_rate) = {
            let control = self.control.lock();
            (
                control.geometry.clone(),
                control.config.clone(),
                control.sample_rate,
            )
        };
        let design = derive_design(&geometry, &config, sample_rate)?;

        // Refresh the output conversion before publishing, so the first
        // block through the new matrix already uses the right conventions
        {
            let mut dsp = self.dsp.lock();
            dsp.converter = FormatConverter::new(
                (ChannelOrdering::Acn, Normalization::N3d),
                (config.channel_ordering, config.normalization),
                config.order,
            )?;
            dsp.post_gain = db_to_linear(config.post_gain_db);
        }

        *self.matrix.write() = Some(design.matrix);
        self.filters_dirty.store(false, Ordering::Release);
        self.eval_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Re-size filterbanks and scratch to the current channel counts.
    fn reinit_dsp(&self) {
        let (num_sensors, n_sh) = {
            let control = self.control.lock();
            (
                control.geometry.num_sensors(),
                control.config.order.channel_count(),
            )
        };
        self.dsp.lock().resize(num_sensors, n_sh);
    }

    // --- audio thread -----------------------------------------------------

    /// Encode one frame of sensor signals into spherical-harmonic signals.
    ///
    /// Inputs must be `FRAME_SIZE` samples per channel; any other length
    /// mutes the block. Missing input channels are treated as silent, and
    /// output channels beyond the harmonic count are zeroed. While a
    /// parameter change is being absorbed the block is muted rather than
    /// glitched.
    pub fn process(
        &self,
        inputs: &[Vec<f32>],
        outputs: &mut [Vec<f32>],
    ) -> SpatialResult<()> {
        if inputs.iter().any(|ch| ch.len() != FRAME_SIZE) {
            zero_outputs(outputs);
            return Ok(());
        }

        if self.geometry_dirty.swap(false, Ordering::AcqRel) {
            self.reinit_dsp();
            self.filters_dirty.store(true, Ordering::Release);
        }
        if self.filters_dirty.load(Ordering::Acquire) {
            zero_outputs(outputs);
            self.rebuild()?;
            return Ok(());
        }

        let Some(guard) = self.matrix.try_read() else {
            zero_outputs(outputs);
            return Ok(());
        };
        let Some(matrix) = guard.as_ref() else {
            zero_outputs(outputs);
            return Ok(());
        };

        let n_sh = matrix.order().channel_count();
        let q = matrix.num_sensors();
        let mut dsp = self.dsp.lock();
        let dsp = &mut *dsp;

        // A control-thread rebuild may have republished between the flag
        // check and the matrix read; mute until the sizes agree again
        if q != dsp.in_frames.len() || n_sh != dsp.sh_frames.len() {
            zero_outputs(outputs);
            return Ok(());
        }

        for s in 0..q {
            if let Some(input) = inputs.get(s) {
                dsp.in_frames[s].copy_from_slice(input);
            } else {
                dsp.in_frames[s].fill(0.0);
            }
        }
        dsp.analysis.analysis(&dsp.in_frames, &mut dsp.in_bands)?;

        for band in 0..NUM_BANDS {
            let w = matrix.band(band);
            for ch in 0..n_sh {
                let mut acc = Complex32::new(0.0, 0.0);
                for s in 0..q {
                    acc += w[[ch, s]] * dsp.in_bands[s][band];
                }
                dsp.sh_bands[ch][band] = acc;
            }
        }
        dsp.synthesis.synthesis(&dsp.sh_bands, &mut dsp.sh_frames)?;
        dsp.converter.convert_into(&dsp.sh_frames, &mut dsp.conv_frames);

        for (ch, out) in outputs.iter_mut().enumerate() {
            out.resize(FRAME_SIZE, 0.0);
            if ch < n_sh {
                for (o, &v) in out.iter_mut().zip(&dsp.conv_frames[ch]) {
                    *o = v * dsp.post_gain;
                }
            } else {
                out.fill(0.0);
            }
        }
        Ok(())
    }

    // --- diagnostics ------------------------------------------------------

    /// Evaluate the current design against simulated plane waves.
    ///
    /// Derives a matrix/filter pair from one control snapshot and never
    /// touches the published matrix or the DSP state, so it can run on a
    /// control thread while the audio thread keeps processing. Results are
    /// cached until the next parameter change.
    pub fn evaluate(&self) -> SpatialResult<EncodingDiagnostics> {
        let pending = self.geometry_dirty.load(Ordering::Acquire)
            || self.filters_dirty.load(Ordering::Acquire);
        if !pending && !self.eval_dirty.load(Ordering::Acquire) {
            if let Some(cached) = self.diagnostics.lock().as_ref() {
                return Ok(cached.clone());
            }
        }

        let (geometry, config, sample_rate) = {
            let control = self.control.lock();
            (
                control.geometry.clone(),
                control.config.clone(),
                control.sample_rate,
            )
        };
        let design = derive_design(&geometry, &config, sample_rate)?;
        let diag = evaluate_performance(
            &design.matrix,
            &design.gains,
            &design.sim_modal,
            &geometry,
            &design.freqs,
        );

        *self.diagnostics.lock() = Some(diag.clone());
        self.eval_dirty.store(false, Ordering::Release);
        Ok(diag)
    }
}

/// One coherent design derivation: matrix, filters, and the simulation
/// inputs, all from the same geometry/config snapshot.
struct DesignState {
    matrix: EncodingMatrix,
    gains: Array2<Complex64>,
    sim_modal: Array2<Complex64>,
    freqs: Vec<f32>,
}

fn derive_design(
    geometry: &ArrayGeometry,
    config: &EncoderConfig,
    sample_rate: f32,
) -> SpatialResult<DesignState> {
    let order = config.order;
    let freqs = Filterbank::center_frequencies(sample_rate);
    let kr = wavenumber_radii(&freqs, geometry.array_radius(), config.speed_of_sound);
    let krb = wavenumber_radii(&freqs, geometry.baffle_radius(), config.speed_of_sound);

    let modal = modal_coefficients(
        order.as_usize(),
        &kr,
        &krb,
        geometry.construction(),
        geometry.pattern(),
    );
    let mut gains = regularised_inversion(
        &modal,
        config.filter_design,
        config.max_gain_db,
        geometry.num_sensors(),
        order,
        &kr,
        &freqs,
    );
    for (band, &f) in freqs.iter().enumerate() {
        if f > config.max_encode_freq_hz {
            for n in 0..gains.ncols() {
                gains[[band, n]] = Complex64::new(0.0, 0.0);
            }
        }
    }
    let mut matrix = build_encoding_matrix(&gains, geometry, order)?;
    let sim_modal = modal_coefficients(
        SIMULATION_ORDER,
        &kr,
        &krb,
        geometry.construction(),
        geometry.pattern(),
    );
    if config.apply_diffuse_eq {
        apply_diffuse_eq(&mut matrix, geometry, &sim_modal, &freqs, config.speed_of_sound);
    }
    Ok(DesignState {
        matrix,
        gains,
        sim_modal,
        freqs,
    })
}

fn wavenumber_radii(freqs: &[f32], radius: f32, speed_of_sound: f32) -> Vec<f64> {
    freqs
        .iter()
        .map(|&f| {
            2.0 * std::f64::consts::PI * f as f64 * radius as f64 / speed_of_sound as f64
        })
        .collect()
}

fn zero_outputs(outputs: &mut [Vec<f32>]) {
    for ch in outputs.iter_mut() {
        ch.resize(FRAME_SIZE, 0.0);
        ch.fill(0.0);
    }
}
