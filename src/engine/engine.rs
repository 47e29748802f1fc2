//! Audio Engine: the fixed DSP graph described in SPEC_FULL.md §4.5.
//!
//! *(slot A source → volume mixer A) ∥ (slot B source → volume mixer B)*
//! merge into a crossfade bus. In parallel, eight stem source nodes feed
//! their own smoothed mixers and sum into a stem bus which also feeds the
//! crossfade bus. The combined signal is resampled to device rate, fanned
//! out to the parametric EQ and the parallel bass chain, remixed, then
//! compressed and limited before device output.

use std::sync::Arc;

use basedrop::Handle;

use crate::buffer::{Lane, RingBufferSlot};
use crate::gc::gc_handle;
use crate::tap::LinearResampler;
use crate::types::{Stem, StereoSample, ENGINE_SAMPLE_RATE};

use super::bass_chain::BassChain;
use super::command::EngineCommand;
use super::compressor::Compressor;
use super::eq::ParametricEq;
use super::limiter::Limiter;
use super::mixer::{SmoothedGain, StemModeRamp};

const MEGA_BASS_ENGAGE_DB: f32 = 3.0;
const MEGA_BASS_BAND0_CAP_DB: f32 = 4.0;

pub struct AudioEngine {
    slot: Arc<RingBufferSlot>,

    slot_gain: [SmoothedGain; 2],
    stem_gain: [[SmoothedGain; 4]; 2],
    stem_ramp: StemModeRamp,
    stem_mode_active: bool,

    eq: ParametricEq,
    bass_chain: BassChain,
    compressor: Compressor,
    limiter: Limiter,
    device_resampler: LinearResampler,
    gc_handle: Handle,

    muted: bool,
    mega_bass_preset: bool,

    read_scratch: Vec<f32>,
    mix_scratch: Vec<StereoSample>,
    bass_input_scratch: Vec<StereoSample>,
    device_scratch: Vec<StereoSample>,
}

impl AudioEngine {
    pub fn new(slot: Arc<RingBufferSlot>, device_sample_rate: u32) -> Self {
        let sample_rate = ENGINE_SAMPLE_RATE as f32;
        Self {
            slot,
            slot_gain: [SmoothedGain::new(1.0, sample_rate), SmoothedGain::new(0.0, sample_rate)],
            stem_gain: [
                std::array::from_fn(|_| SmoothedGain::new(0.0, sample_rate)),
                std::array::from_fn(|_| SmoothedGain::new(0.0, sample_rate)),
            ],
            stem_ramp: StemModeRamp::new(),
            stem_mode_active: false,
            eq: ParametricEq::new(sample_rate),
            bass_chain: BassChain::new(sample_rate),
            compressor: Compressor::new(sample_rate),
            limiter: Limiter::new(sample_rate),
            device_resampler: LinearResampler::new(ENGINE_SAMPLE_RATE, device_sample_rate),
            gc_handle: gc_handle(),
            muted: false,
            mega_bass_preset: false,
            read_scratch: Vec::new(),
            mix_scratch: Vec::new(),
            bass_input_scratch: Vec::new(),
            device_scratch: Vec::new(),
        }
    }

    pub fn ensure_capacity(&mut self, engine_frames: usize) {
        if self.read_scratch.len() < engine_frames * 2 {
            self.read_scratch.resize(engine_frames * 2, 0.0);
        }
        if self.mix_scratch.len() < engine_frames {
            self.mix_scratch.resize(engine_frames, StereoSample::silence());
        }
        if self.bass_input_scratch.len() < engine_frames {
            self.bass_input_scratch.resize(engine_frames, StereoSample::silence());
        }
        self.device_resampler.ensure_capacity(engine_frames);
        let max_out = self.device_resampler.max_output_frames(engine_frames);
        if self.device_scratch.len() < max_out {
            self.device_scratch.resize(max_out, StereoSample::silence());
        }
    }

    /// Drain queued commands; called at the start of every render callback.
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::SetSlotVolume { lane, volume } => {
                self.slot_gain[lane_index(lane)].set_target(volume);
            }
            EngineCommand::SetStemVolume { lane, stem, volume } => {
                self.stem_gain[lane_index(lane)][stem as usize].set_target(volume);
            }
            EngineCommand::EnterStemMode => {
                self.stem_mode_active = true;
                self.stem_ramp.begin_enter();
            }
            EngineCommand::ExitStemMode => {
                self.stem_ramp.begin_exit();
            }
            EngineCommand::SetEqBandGainDb { band, gain_db } => {
                self.eq.set_band_gain_db(band, gain_db);
                self.update_mega_bass();
            }
            EngineCommand::SetBassChainEngaged(engaged) => {
                self.mega_bass_preset = engaged;
                self.update_mega_bass();
            }
            EngineCommand::Mute => self.muted = true,
            EngineCommand::Unmute => self.muted = false,
            EngineCommand::SetDeviceSampleRate(rate) => {
                let old = std::mem::replace(
                    &mut self.device_resampler,
                    LinearResampler::new(ENGINE_SAMPLE_RATE, rate),
                );
                // The outgoing resampler owns a scratch Vec sized for the
                // previous device block length; freeing it inline on this
                // callback risks a page-reclaim stall, so hand it to the
                // background collector instead (see `crate::gc`).
                drop(self.gc_handle.make_shared(old));
            }
        }
    }

    fn update_mega_bass(&mut self) {
        let should_engage = self.mega_bass_preset || self.eq.low_band_average_db() > MEGA_BASS_ENGAGE_DB;
        self.bass_chain.set_engaged(should_engage);
        self.eq.set_band0_cap_db(if should_engage { Some(MEGA_BASS_BAND0_CAP_DB) } else { None });
    }

    /// Mix, process, and resample `engine_frames` worth of audio, returning
    /// the number of device-rate frames written to `device_out`.
    pub fn process(&mut self, engine_frames: usize, device_out: &mut [StereoSample]) -> usize {
        self.ensure_capacity(engine_frames);

        for sample in self.mix_scratch[..engine_frames].iter_mut() {
            *sample = StereoSample::silence();
        }

        let (slot_ramp_gain, stem_ramp_gain) = if self.stem_ramp.is_active() || self.stem_mode_active {
            self.stem_ramp.advance()
        } else {
            (1.0, 0.0)
        };

        for (i, &lane) in [Lane::A, Lane::B].iter().enumerate() {
            let buffer = self.slot.full_mix(lane);
            buffer.read(&mut self.read_scratch[..engine_frames * 2], engine_frames * 2);
            let gain = self.slot_gain[i].tick() * slot_ramp_gain;
            for frame_idx in 0..engine_frames {
                let left = self.read_scratch[frame_idx * 2];
                let right = self.read_scratch[frame_idx * 2 + 1];
                self.mix_scratch[frame_idx] =
                    self.mix_scratch[frame_idx].add(StereoSample::new(left, right).scale(gain));
            }
        }

        for (i, &lane) in [Lane::A, Lane::B].iter().enumerate() {
            for stem in Stem::ALL {
                let buffer = self.slot.stem(lane, stem);
                let gain = self.stem_gain[i][stem as usize].tick() * stem_ramp_gain;
                if gain <= 0.0 {
                    continue;
                }
                buffer.read(&mut self.read_scratch[..engine_frames * 2], engine_frames * 2);
                for frame_idx in 0..engine_frames {
                    let left = self.read_scratch[frame_idx * 2];
                    let right = self.read_scratch[frame_idx * 2 + 1];
                    self.mix_scratch[frame_idx] =
                        self.mix_scratch[frame_idx].add(StereoSample::new(left, right).scale(gain));
                }
            }
        }

        if !self.stem_ramp.is_active() && stem_ramp_gain < 0.01 && self.stem_mode_active {
            self.stem_mode_active = false;
            // Drain any samples left over from stem mode via the lock-free
            // read path -- `RingBuffer::clear` takes a non-RT lock and must
            // not be called from this callback.
            for &lane in &[Lane::A, Lane::B] {
                for stem in Stem::ALL {
                    let buffer = self.slot.stem(lane, stem);
                    while buffer.available() > 0 {
                        let n = buffer.available().min(self.read_scratch.len());
                        buffer.read(&mut self.read_scratch[..n], n);
                    }
                }
            }
        }

        self.bass_input_scratch[..engine_frames].copy_from_slice(&self.mix_scratch[..engine_frames]);
        self.eq.process(&mut self.mix_scratch[..engine_frames]);
        self.bass_chain.process_into(
            &self.bass_input_scratch[..engine_frames],
            &mut self.mix_scratch[..engine_frames],
        );

        self.compressor.process(&mut self.mix_scratch[..engine_frames]);
        self.limiter.process(&mut self.mix_scratch[..engine_frames]);

        if self.muted {
            for sample in self.mix_scratch[..engine_frames].iter_mut() {
                *sample = StereoSample::silence();
            }
        }

        let produced = self
            .device_resampler
            .process(&self.mix_scratch[..engine_frames], &mut self.device_scratch);
        let n = produced.min(device_out.len());
        device_out[..n].copy_from_slice(&self.device_scratch[..n]);
        n
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_stem_mode_active(&self) -> bool {
        self.stem_mode_active
    }
}

fn lane_index(lane: Lane) -> usize {
    match lane {
        Lane::A => 0,
        Lane::B => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_silence(slot: &RingBufferSlot, lane: Lane, frames: usize) {
        let samples = vec![0.0f32; frames * 2];
        slot.full_mix(lane).write(&samples, samples.len());
    }

    #[test]
    fn silent_input_produces_silent_output() {
        let slot = Arc::new(RingBufferSlot::new());
        push_silence(&slot, Lane::A, 512);
        let mut engine = AudioEngine::new(slot, ENGINE_SAMPLE_RATE);

        let mut device_out = vec![StereoSample::silence(); 512];
        let n = engine.process(512, &mut device_out);
        assert!(n > 0);
        for sample in &device_out[..n] {
            assert!(sample.left.abs() < 1e-4);
        }
    }

    #[test]
    fn mute_zeroes_output() {
        let slot = Arc::new(RingBufferSlot::new());
        let samples = vec![0.5f32; 1024];
        slot.full_mix(Lane::A).write(&samples, samples.len());
        let mut engine = AudioEngine::new(slot, ENGINE_SAMPLE_RATE);
        engine.apply(EngineCommand::Mute);

        let mut device_out = vec![StereoSample::silence(); 512];
        let n = engine.process(512, &mut device_out);
        for sample in &device_out[..n] {
            assert_eq!(sample.left, 0.0);
        }
    }

    #[test]
    fn stem_buffers_are_drained_once_stem_mode_fully_exits() {
        let slot = Arc::new(RingBufferSlot::new());
        // Vocal's gain target is never set away from 0, so the ordinary
        // per-stem read (gated on gain > 0) never touches this buffer --
        // only the post-ramp drain can empty it.
        let vocal_buf = slot.stem(Lane::A, Stem::Vocal).clone();
        vocal_buf.write(&[0.1; 256], 256);

        let mut engine = AudioEngine::new(slot, ENGINE_SAMPLE_RATE);
        let mut device_out = vec![StereoSample::silence(); 64];

        engine.apply(EngineCommand::EnterStemMode);
        for _ in 0..60 {
            engine.process(64, &mut device_out);
        }
        assert!(engine.is_stem_mode_active());
        assert_eq!(vocal_buf.available(), 256);

        engine.apply(EngineCommand::ExitStemMode);
        for _ in 0..60 {
            engine.process(64, &mut device_out);
        }

        assert!(!engine.is_stem_mode_active());
        assert_eq!(vocal_buf.available(), 0);
    }

    #[test]
    fn device_sample_rate_change_swaps_resampler_and_keeps_processing() {
        let slot = Arc::new(RingBufferSlot::new());
        let samples = vec![0.25f32; 1024];
        slot.full_mix(Lane::A).write(&samples, samples.len());
        let mut engine = AudioEngine::new(slot, ENGINE_SAMPLE_RATE);
        engine.apply(EngineCommand::SetDeviceSampleRate(48_000));

        let mut device_out = vec![StereoSample::silence(); 512];
        let n = engine.process(512, &mut device_out);
        assert!(n > 0);
    }

    #[test]
    fn mega_bass_engages_past_threshold() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = AudioEngine::new(slot, ENGINE_SAMPLE_RATE);
        engine.apply(EngineCommand::SetEqBandGainDb { band: 0, gain_db: 5.0 });
        engine.apply(EngineCommand::SetEqBandGainDb { band: 1, gain_db: 5.0 });
        assert!(engine.bass_chain.is_engaged());
    }
}
