//! Crossfade Slot: a secondary decoder wrapper with the same lifecycle as
//! the Playback Service, minus device I/O (SPEC_FULL.md §4.7). It feeds
//! the *standby* ring buffer -- full-mix normally, or the standby stem
//! buffers once stem mode is enabled for a premium analysis pass.

use std::sync::Arc;

use crate::buffer::{Lane, RingBufferSlot};
use crate::playback::{Decoder, PlaybackError, PlaybackResult};
use crate::stem::StemDecomposer;
use crate::tap::TapBridge;

pub struct CrossfadeSlot {
    slot: Arc<RingBufferSlot>,
    tap: TapBridge,
    decoder: Option<Box<dyn Decoder>>,
    playing: bool,
}

impl CrossfadeSlot {
    pub fn new(slot: Arc<RingBufferSlot>) -> Self {
        Self { slot, tap: TapBridge::new(), decoder: None, playing: false }
    }

    fn standby_lane(&self) -> Lane {
        self.slot.standby_lane()
    }

    /// Load a decoder for the upcoming song and attach its tap to the
    /// standby full-mix buffer.
    pub fn load(&mut self, decoder: Box<dyn Decoder>) {
        let target = self.slot.full_mix(self.standby_lane()).clone();
        target.clear();
        self.tap.attach(decoder.native_sample_rate(), target);
        self.decoder = Some(decoder);
        self.playing = false;
    }

    /// Re-point the tap at the standby stem buffers for premium analysis.
    /// The decomposer is constructed by the caller so its stem buffers can
    /// be wired from `RingBufferSlot::standby_stem`.
    pub fn enable_stem_analysis(&mut self, decomposer: StemDecomposer) -> PlaybackResult<()> {
        let decoder = self.decoder.as_ref().ok_or(PlaybackError::NoTrackLoaded)?;
        self.tap.attach_stems(decoder.native_sample_rate(), decomposer);
        Ok(())
    }

    /// Start the standby decoder playing silently so its buffers prefill
    /// ahead of the fade trigger.
    pub fn play_silently(&mut self) -> PlaybackResult<()> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_native_volume(0.0);
        decoder.set_playing(true);
        self.playing = true;
        Ok(())
    }

    pub fn play(&mut self) -> PlaybackResult<()> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_native_volume(1.0);
        decoder.set_playing(true);
        self.playing = true;
        Ok(())
    }

    pub fn pause(&mut self) -> PlaybackResult<()> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_playing(false);
        self.playing = false;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_loaded(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn current_time_secs(&self) -> Option<f64> {
        self.decoder.as_ref().map(|d| d.current_time_secs())
    }

    /// Give up this slot's decoder, to be fed to `PlaybackService::adopt_player`.
    /// The tap *abandons* rather than detaches: decoding must not glitch, and
    /// the buffer it was writing to is about to become the active lane.
    pub fn hand_off_player(&mut self) -> PlaybackResult<Box<dyn Decoder>> {
        let decoder = self.decoder.take().ok_or(PlaybackError::NoTrackLoaded)?;
        self.tap.abandon();
        self.playing = false;
        Ok(decoder)
    }

    /// Drop the decoder and clear its tap target without handing anything
    /// off -- used by `cancel_crossfade`.
    pub fn discard(&mut self) {
        self.tap.detach();
        self.decoder = None;
        self.playing = false;
    }

    pub fn tap_mut(&mut self) -> &mut TapBridge {
        &mut self.tap
    }
}
