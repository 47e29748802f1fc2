//! Cheap real-time stem separation for crossfade musicality
//! (SPEC_FULL.md §4.4).

use std::sync::Arc;

use crate::buffer::RingBuffer;
use crate::types::{Stem, StereoSample, NUM_STEMS};

/// One-pole-pair biquad low-pass with persisted state, used for the 250 Hz
/// bass split. Grounded on the reference engine's state-variable filter
/// (`effect/native/filter.rs`), simplified to a direct-form-II transposed
/// low-pass since only one fixed cutoff is needed here.
#[derive(Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    fn lowpass(cutoff_hz: f32, sample_rate: f32) -> Self {
        let q = std::f32::consts::FRAC_1_SQRT_2;
        let omega = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn bandpass(center_hz: f32, sample_rate: f32) -> Self {
        let q = 0.7;
        let omega = 2.0 * std::f32::consts::PI * center_hz / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Gates "real stereo" vs. "essentially mono" and scales how aggressive the
/// staggered crossfade can be.
pub struct SideMidAnalysis {
    pub ratio: f64,
    pub stagger_intensity: f32,
}

const MONO_THRESHOLD: f64 = 0.02;
const FULL_INTENSITY_THRESHOLD: f64 = 0.15;

impl SideMidAnalysis {
    fn from_ratio(ratio: f64) -> Self {
        let stagger_intensity = if ratio < MONO_THRESHOLD {
            0.0
        } else if ratio > FULL_INTENSITY_THRESHOLD {
            1.0
        } else {
            ((ratio - MONO_THRESHOLD) / (FULL_INTENSITY_THRESHOLD - MONO_THRESHOLD)) as f32
        };
        Self { ratio, stagger_intensity }
    }

    pub fn is_mono(&self) -> bool {
        self.ratio < MONO_THRESHOLD
    }
}

/// Owns the biquad state and analysis counters for one decoding source.
pub struct StemDecomposer {
    bass_filter: Biquad,
    drums_filter: Biquad,
    mid_rms_sum: f64,
    side_rms_sum: f64,
    frame_count: u64,
    vocal_fast_env: f32,
    vocal_slow_env: f32,
    vocal_drop_run_frames: u32,
    vocal_drop_sustain_frames: u32,
    outputs: [Arc<RingBuffer>; NUM_STEMS],
    full_mix_passthrough: Option<Arc<RingBuffer>>,
    bass_scratch: Vec<f32>,
    vocal_scratch: Vec<f32>,
    drums_scratch: Vec<f32>,
    atmos_scratch: Vec<f32>,
    full_mix_scratch: Vec<f32>,
    vocal_fast_coeff: f32,
    vocal_slow_coeff: f32,
}

/// One-pole envelope coefficient for the vocal-drop detector: fast
/// ballistics track the current level, slow ballistics track the recent
/// baseline. A sustained gap between the two means the vocal line dropped.
fn envelope_coeff(time_constant_secs: f32, sample_rate: f32) -> f32 {
    (-1.0 / (time_constant_secs * sample_rate)).exp()
}

const VOCAL_FAST_TIME_CONSTANT_SECS: f32 = 0.05;
const VOCAL_SLOW_TIME_CONSTANT_SECS: f32 = 2.0;
const VOCAL_DROP_RATIO: f32 = 0.3;
const VOCAL_DROP_NOISE_FLOOR: f32 = 1e-4;
const VOCAL_DROP_SUSTAIN_SECS: f32 = 0.15;

impl StemDecomposer {
    pub fn new(sample_rate: f32, outputs: [Arc<RingBuffer>; NUM_STEMS]) -> Self {
        Self {
            bass_filter: Biquad::lowpass(250.0, sample_rate),
            drums_filter: Biquad::bandpass(150.0, sample_rate),
            mid_rms_sum: 0.0,
            side_rms_sum: 0.0,
            frame_count: 0,
            vocal_fast_env: 0.0,
            vocal_slow_env: 0.0,
            vocal_drop_run_frames: 0,
            vocal_drop_sustain_frames: (VOCAL_DROP_SUSTAIN_SECS * sample_rate).ceil() as u32,
            outputs,
            full_mix_passthrough: None,
            bass_scratch: Vec::new(),
            vocal_scratch: Vec::new(),
            drums_scratch: Vec::new(),
            atmos_scratch: Vec::new(),
            full_mix_scratch: Vec::new(),
            vocal_fast_coeff: envelope_coeff(VOCAL_FAST_TIME_CONSTANT_SECS, sample_rate),
            vocal_slow_coeff: envelope_coeff(VOCAL_SLOW_TIME_CONSTANT_SECS, sample_rate),
        }
    }

    pub fn with_full_mix_passthrough(mut self, buffer: Arc<RingBuffer>) -> Self {
        self.full_mix_passthrough = Some(buffer);
        self
    }

    /// Grow the per-stem scratch buffers to hold `frames` interleaved
    /// stereo samples each. Call this off the RT thread before driving
    /// `process` with blocks of that size.
    pub fn ensure_capacity(&mut self, frames: usize) {
        let samples = frames * 2;
        for buf in [
            &mut self.bass_scratch,
            &mut self.vocal_scratch,
            &mut self.drums_scratch,
            &mut self.atmos_scratch,
            &mut self.full_mix_scratch,
        ] {
            if buf.capacity() < samples {
                buf.reserve(samples - buf.capacity());
            }
        }
    }

    /// Decompose `frames` stereo samples, writing each stem interleaved to
    /// its own ring buffer. Must not allocate in the steady state: call
    /// `ensure_capacity` ahead of time for the largest block you'll pass.
    pub fn process(&mut self, frames: &[StereoSample]) {
        self.ensure_capacity(frames.len());

        self.bass_scratch.clear();
        self.vocal_scratch.clear();
        self.drums_scratch.clear();
        self.atmos_scratch.clear();
        self.full_mix_scratch.clear();

        for &frame in frames {
            let mid = frame.mid();
            let side = frame.side();

            self.mid_rms_sum += (mid as f64) * (mid as f64);
            self.side_rms_sum += (side as f64) * (side as f64);
            self.frame_count += 1;

            let bass = self.bass_filter.process(mid);
            let vocal = mid - bass;
            let drums_lane = self.drums_filter.process(mid);

            let vocal_abs = vocal.abs();
            self.vocal_fast_env += (1.0 - self.vocal_fast_coeff) * (vocal_abs - self.vocal_fast_env);
            self.vocal_slow_env += (1.0 - self.vocal_slow_coeff) * (vocal_abs - self.vocal_slow_env);

            if self.vocal_slow_env > VOCAL_DROP_NOISE_FLOOR && self.vocal_fast_env < self.vocal_slow_env * VOCAL_DROP_RATIO {
                self.vocal_drop_run_frames = self.vocal_drop_run_frames.saturating_add(1);
            } else {
                self.vocal_drop_run_frames = 0;
            }

            self.bass_scratch.push(bass);
            self.bass_scratch.push(bass);
            self.vocal_scratch.push(vocal);
            self.vocal_scratch.push(vocal);
            self.drums_scratch.push(drums_lane);
            self.drums_scratch.push(drums_lane);
            self.atmos_scratch.push(side);
            self.atmos_scratch.push(-side);
            self.full_mix_scratch.push(frame.left);
            self.full_mix_scratch.push(frame.right);
        }

        self.outputs[Stem::Bass as usize].write(&self.bass_scratch, self.bass_scratch.len());
        self.outputs[Stem::Vocal as usize].write(&self.vocal_scratch, self.vocal_scratch.len());
        self.outputs[Stem::Drums as usize].write(&self.drums_scratch, self.drums_scratch.len());
        self.outputs[Stem::Atmosphere as usize]
            .write(&self.atmos_scratch, self.atmos_scratch.len());

        if let Some(passthrough) = &self.full_mix_passthrough {
            passthrough.write(&self.full_mix_scratch, self.full_mix_scratch.len());
        }
    }

    /// Side/mid RMS ratio accumulated so far, used to gate stem-mode
    /// crossfade musicality (SPEC_FULL.md §4.4, §4.9).
    pub fn side_mid_analysis(&self) -> SideMidAnalysis {
        if self.frame_count == 0 || self.mid_rms_sum == 0.0 {
            return SideMidAnalysis::from_ratio(0.0);
        }
        let mid_rms = (self.mid_rms_sum / self.frame_count as f64).sqrt();
        let side_rms = (self.side_rms_sum / self.frame_count as f64).sqrt();
        SideMidAnalysis::from_ratio(if mid_rms > 0.0 { side_rms / mid_rms } else { 0.0 })
    }

    /// RMS of the mid (mono-sum) signal accumulated so far. Used as a
    /// pragmatic stand-in for A-weighted loudness when computing the
    /// crossfade's loudness correction.
    pub fn mid_rms(&self) -> f64 {
        if self.frame_count == 0 {
            return 0.0;
        }
        (self.mid_rms_sum / self.frame_count as f64).sqrt()
    }

    /// True once the fast vocal envelope has sat well below the slow
    /// baseline envelope for at least `VOCAL_DROP_SUSTAIN_SECS`, i.e. the
    /// vocal line dropped out and stayed out rather than a momentary dip.
    pub fn vocal_drop_detected(&self) -> bool {
        self.vocal_drop_run_frames >= self.vocal_drop_sustain_frames
    }

    /// Clear all four stem output ring buffers. Non-RT: must not be called
    /// from the audio callback (see `RingBuffer::clear`).
    pub fn clear_outputs(&self) {
        for output in &self.outputs {
            output.clear();
        }
    }

    pub fn reset_analysis(&mut self) {
        self.mid_rms_sum = 0.0;
        self.side_rms_sum = 0.0;
        self.frame_count = 0;
    }

    pub fn reset_filters(&mut self) {
        self.bass_filter.reset();
        self.drums_filter.reset();
    }
}
