//! Tap Bridge: intercepts decoded PCM from a network decoder and redirects
//! it into a ring buffer, resampling in-line if necessary.
//!
//! See SPEC_FULL.md §4.3.

mod resampler;

pub use resampler::LinearResampler;

use std::sync::Arc;

use crate::buffer::RingBuffer;
use crate::stem::{SideMidAnalysis, StemDecomposer};
use crate::types::{StereoSample, ENGINE_SAMPLE_RATE};

/// Where a tap's resampled output goes.
enum Destination {
    FullMix(Arc<RingBuffer>),
    Stems(StemDecomposer),
}

/// One attached decode source: the source's native sample rate, a resampler
/// to the engine rate, and the buffer(s) it feeds.
pub struct TapBridge {
    resampler: LinearResampler,
    destination: Option<Destination>,
    interleave_scratch: Vec<StereoSample>,
    output_scratch: Vec<StereoSample>,
    flat_scratch: Vec<f32>,
}

impl TapBridge {
    pub fn new() -> Self {
        Self {
            resampler: LinearResampler::new(ENGINE_SAMPLE_RATE, ENGINE_SAMPLE_RATE),
            destination: None,
            interleave_scratch: Vec::new(),
            output_scratch: Vec::new(),
            flat_scratch: Vec::new(),
        }
    }

    /// Bind this tap to `target_buffer` at track load, sourcing PCM at
    /// `source_rate`. Any previous binding is replaced.
    pub fn attach(&mut self, source_rate: u32, target_buffer: Arc<RingBuffer>) {
        self.resampler.set_input_rate(source_rate);
        self.resampler.reset();
        self.destination = Some(Destination::FullMix(target_buffer));
    }

    /// Bind this tap to a Stem Decomposer instead of a single full-mix
    /// buffer, per SPEC_FULL.md §4.4's stem mode.
    pub fn attach_stems(&mut self, source_rate: u32, decomposer: StemDecomposer) {
        self.resampler.set_input_rate(source_rate);
        self.resampler.reset();
        self.destination = Some(Destination::Stems(decomposer));
    }

    /// Release the tap and clear its target buffer(s), if any.
    pub fn detach(&mut self) {
        match self.destination.take() {
            Some(Destination::FullMix(buffer)) => buffer.clear(),
            Some(Destination::Stems(decomposer)) => decomposer.clear_outputs(),
            None => {}
        }
    }

    /// Release the tap without clearing the buffer -- used when handing a
    /// decoder off to the primary playback service mid-stream.
    pub fn abandon(&mut self) {
        self.destination = None;
    }

    pub fn is_attached(&self) -> bool {
        self.destination.is_some()
    }

    /// Side/mid ratio accumulated by this tap's decomposer, if one is
    /// attached. Used by the Crossfade Engine's premium analysis pass.
    pub fn stem_side_mid_analysis(&self) -> Option<SideMidAnalysis> {
        match &self.destination {
            Some(Destination::Stems(decomposer)) => Some(decomposer.side_mid_analysis()),
            _ => None,
        }
    }

    pub fn stem_mid_rms(&self) -> Option<f64> {
        match &self.destination {
            Some(Destination::Stems(decomposer)) => Some(decomposer.mid_rms()),
            _ => None,
        }
    }

    pub fn stem_vocal_drop_detected(&self) -> bool {
        match &self.destination {
            Some(Destination::Stems(decomposer)) => decomposer.vocal_drop_detected(),
            _ => false,
        }
    }

    /// Grow internal scratch buffers to handle up to `frames` input frames.
    /// Call off the RT thread before driving `process_planar`/`process_interleaved`.
    pub fn ensure_capacity(&mut self, frames: usize) {
        self.resampler.ensure_capacity(frames);
        let max_out = self.resampler.max_output_frames(frames);
        if self.interleave_scratch.len() < frames {
            self.interleave_scratch.resize(frames, StereoSample::silence());
        }
        if self.output_scratch.len() < max_out {
            self.output_scratch.resize(max_out, StereoSample::silence());
        }
        if self.flat_scratch.len() < max_out * 2 {
            self.flat_scratch.resize(max_out * 2, 0.0);
        }
        if let Some(Destination::Stems(decomposer)) = &mut self.destination {
            decomposer.ensure_capacity(max_out);
        }
    }

    /// Process a planar two-channel block: `left`/`right` are interleaved
    /// into a scratch buffer, resampled, routed to the tap's destination,
    /// and the source buffers are zeroed so the decoder's own output path
    /// stays silent.
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let frames = left.len().min(right.len());
        self.ensure_capacity(frames);

        for i in 0..frames {
            self.interleave_scratch[i] = StereoSample::new(left[i], right[i]);
        }
        self.route(frames);

        for sample in left.iter_mut().take(frames) {
            *sample = 0.0;
        }
        for sample in right.iter_mut().take(frames) {
            *sample = 0.0;
        }
    }

    /// Process an already-interleaved block: copied directly into scratch,
    /// resampled, routed, then zeroed in place.
    pub fn process_interleaved(&mut self, interleaved: &mut [StereoSample]) {
        let frames = interleaved.len();
        self.ensure_capacity(frames);
        self.interleave_scratch[..frames].copy_from_slice(interleaved);
        self.route(frames);
        for sample in interleaved.iter_mut() {
            *sample = StereoSample::silence();
        }
    }

    fn route(&mut self, frames: usize) {
        let produced = self
            .resampler
            .process(&self.interleave_scratch[..frames], &mut self.output_scratch);

        match &mut self.destination {
            Some(Destination::FullMix(buffer)) => {
                let flat = &mut self.flat_scratch[..produced * 2];
                for (i, frame) in self.output_scratch[..produced].iter().enumerate() {
                    flat[i * 2] = frame.left;
                    flat[i * 2 + 1] = frame.right;
                }
                buffer.write(flat, flat.len());
            }
            Some(Destination::Stems(decomposer)) => {
                decomposer.process(&self.output_scratch[..produced]);
            }
            None => {}
        }
    }
}

impl Default for TapBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_input_is_interleaved_and_zeroed() {
        let mut tap = TapBridge::new();
        let buffer = Arc::new(RingBuffer::new(64));
        tap.attach(ENGINE_SAMPLE_RATE, buffer.clone());

        let mut left = vec![1.0, 2.0, 3.0];
        let mut right = vec![4.0, 5.0, 6.0];
        tap.process_planar(&mut left, &mut right);

        assert_eq!(left, vec![0.0, 0.0, 0.0]);
        assert_eq!(right, vec![0.0, 0.0, 0.0]);
        assert_eq!(buffer.available(), 6);

        let mut dst = [0.0f32; 6];
        buffer.read(&mut dst, 6);
        assert_eq!(dst, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn interleaved_input_is_copied_and_zeroed() {
        let mut tap = TapBridge::new();
        let buffer = Arc::new(RingBuffer::new(64));
        tap.attach(ENGINE_SAMPLE_RATE, buffer.clone());

        let mut block = vec![
            StereoSample::new(1.0, 2.0),
            StereoSample::new(3.0, 4.0),
        ];
        tap.process_interleaved(&mut block);

        assert!(block.iter().all(|&s| s == StereoSample::silence()));
        assert_eq!(buffer.available(), 4);
    }

    #[test]
    fn detach_clears_target_buffer() {
        let mut tap = TapBridge::new();
        let buffer = Arc::new(RingBuffer::new(64));
        tap.attach(ENGINE_SAMPLE_RATE, buffer.clone());
        buffer.write(&[1.0, 2.0], 2);
        tap.detach();
        assert_eq!(buffer.available(), 0);
        assert!(!tap.is_attached());
    }

    #[test]
    fn abandon_leaves_buffer_contents_intact() {
        let mut tap = TapBridge::new();
        let buffer = Arc::new(RingBuffer::new(64));
        tap.attach(ENGINE_SAMPLE_RATE, buffer.clone());
        buffer.write(&[1.0, 2.0], 2);
        tap.abandon();
        assert_eq!(buffer.available(), 2);
        assert!(!tap.is_attached());
    }

    #[test]
    fn resampling_source_rate_produces_scaled_frame_count() {
        let mut tap = TapBridge::new();
        let buffer = Arc::new(RingBuffer::new(8192));
        tap.attach(22_050, buffer.clone());

        let mut left = vec![0.5f32; 1000];
        let mut right = vec![0.5f32; 1000];
        tap.process_planar(&mut left, &mut right);

        let produced_frames = buffer.available() / 2;
        let expected = (1000.0 * ENGINE_SAMPLE_RATE as f64 / 22_050.0).round() as i64;
        assert!((produced_frames as i64 - expected).abs() <= 2);
    }
}
