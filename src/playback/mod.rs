//! Playback Service: owns the primary decoder and the one-track playback
//! lifecycle (SPEC_FULL.md §4.6).
//!
//! Observer callbacks from the platform decoder (ready/failed/buffer state)
//! are modeled as methods the host calls when its own observers fire,
//! rather than as callbacks this crate registers itself -- consistent with
//! SPEC_FULL.md §5's "main coordination task" owning all such marshalling.
//! Timed effects (song-end detection, deferred unmute) are driven by
//! `tick`, so tests can pass a synthetic clock instead of sleeping.

pub(crate) mod decoder;
mod error;

pub use decoder::{Decoder, DecoderStatus};
pub use error::{PlaybackError, PlaybackResult};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::{Lane, RingBufferSlot};
use crate::engine::EngineCommand;
use crate::tap::TapBridge;

const RETRY_BACKOFFS_SECS: [f64; 3] = [0.5, 1.0, 2.0];
const UNMUTE_DELAY: Duration = Duration::from_millis(100);
const SEEK_UNMUTE_DELAY: Duration = Duration::from_millis(80);
const SONG_END_LEAD_SECS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    SongEnded,
    Unmuted,
    RetriesExhausted,
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub url: String,
    pub expected_duration_secs: Option<f64>,
    pub auto_play: bool,
    pub seek_to_secs: Option<f64>,
}

pub struct PlaybackService {
    slot: Arc<RingBufferSlot>,
    lane: Lane,
    tap: TapBridge,
    decoder: Option<Box<dyn Decoder>>,
    request: Option<LoadRequest>,
    state: ServiceState,
    retry_count: u32,
    song_end_fired: bool,
    unmute_at: Option<Instant>,
}

impl PlaybackService {
    pub fn new(slot: Arc<RingBufferSlot>, lane: Lane) -> Self {
        Self {
            slot,
            lane,
            tap: TapBridge::new(),
            decoder: None,
            request: None,
            state: ServiceState::Idle,
            retry_count: 0,
            song_end_fired: false,
            unmute_at: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Begin loading a new decoder. Resets retry state; the caller should
    /// mute the engine (`EngineCommand::Mute`) before swapping decoders.
    pub fn load(&mut self, decoder: Box<dyn Decoder>, request: LoadRequest, engine_commands: &mut rtrb::Producer<EngineCommand>) {
        let _ = engine_commands.push(EngineCommand::Mute);
        self.decoder = Some(decoder);
        self.request = Some(request);
        self.state = ServiceState::Loading;
        self.retry_count = 0;
        self.song_end_fired = false;
        self.unmute_at = None;
    }

    /// Called once the host observes the decoder transition to `Ready`.
    pub fn on_decoder_ready(&mut self) -> PlaybackResult<()> {
        let request = self.request.clone().ok_or(PlaybackError::NoTrackLoaded)?;
        let sample_rate = {
            let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
            if let Some(seek) = request.seek_to_secs {
                decoder.seek(seek);
            }
            decoder.native_sample_rate()
        };

        let target = self.slot.full_mix(self.lane).clone();
        self.tap.attach(sample_rate, target.clone());
        target.clear();

        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_playing(request.auto_play);

        self.state = if request.auto_play { ServiceState::Playing } else { ServiceState::Ready };
        self.unmute_at = Some(Instant::now() + UNMUTE_DELAY);
        Ok(())
    }

    /// Called when the host observes the decoder fail. Returns the backoff
    /// duration to wait before the host should request a fresh URL and
    /// call `load` again, or `None` once attempts are exhausted (state is
    /// now `Failed`).
    pub fn on_decoder_failed(&mut self, reason: &str) -> Option<Duration> {
        if (self.retry_count as usize) < RETRY_BACKOFFS_SECS.len() {
            let delay = RETRY_BACKOFFS_SECS[self.retry_count as usize];
            self.retry_count += 1;
            self.state = ServiceState::Loading;
            Some(Duration::from_secs_f64(delay))
        } else {
            self.state = ServiceState::Failed;
            log::debug!("playback retries exhausted: {reason}");
            None
        }
    }

    pub fn play(&mut self) -> PlaybackResult<()> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_playing(true);
        self.state = ServiceState::Playing;
        Ok(())
    }

    /// Pause also stops the engine (host drops media-session activity);
    /// modeled here as muting, since this crate has no session API.
    pub fn pause(&mut self, engine_commands: &mut rtrb::Producer<EngineCommand>) -> PlaybackResult<()> {
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        decoder.set_playing(false);
        self.state = ServiceState::Paused;
        let _ = engine_commands.push(EngineCommand::Mute);
        Ok(())
    }

    pub fn toggle(&mut self, engine_commands: &mut rtrb::Producer<EngineCommand>) -> PlaybackResult<()> {
        match self.state {
            ServiceState::Playing => self.pause(engine_commands),
            _ => self.play(),
        }
    }

    /// Mute, seek, then request the caller confirm with `on_seek_confirmed`
    /// once the decoder reports the new position.
    pub fn seek(&mut self, position_secs: f64, engine_commands: &mut rtrb::Producer<EngineCommand>) -> PlaybackResult<()> {
        let _ = engine_commands.push(EngineCommand::Mute);
        let decoder = self.decoder.as_mut().ok_or(PlaybackError::NoTrackLoaded)?;
        if let Some(duration) = decoder.duration_secs() {
            if position_secs < 0.0 || position_secs > duration {
                return Err(PlaybackError::SeekOutOfRange { requested: position_secs, duration });
            }
        }
        decoder.seek(position_secs);
        Ok(())
    }

    /// Flush the ring buffer and schedule the seek-specific unmute delay.
    pub fn on_seek_confirmed(&mut self) {
        self.slot.full_mix(self.lane).clear();
        self.song_end_fired = false;
        self.unmute_at = Some(Instant::now() + SEEK_UNMUTE_DELAY);
    }

    /// Remove observers, detach the tap, and stop the engine unless
    /// `manage_engine` is false (crossfade handoff keeps it running).
    pub fn cleanup(&mut self, manage_engine: bool, engine_commands: &mut rtrb::Producer<EngineCommand>) {
        self.tap.detach();
        self.decoder = None;
        self.request = None;
        self.state = ServiceState::Idle;
        if manage_engine {
            let _ = engine_commands.push(EngineCommand::Mute);
        }
    }

    /// Take over an already-playing decoder from a Crossfade Slot without
    /// restarting the engine or re-attaching its tap.
    pub fn adopt_player(&mut self, decoder: Box<dyn Decoder>, expected_duration_secs: Option<f64>) {
        self.request = Some(LoadRequest {
            url: String::new(),
            expected_duration_secs,
            auto_play: true,
            seek_to_secs: None,
        });
        self.decoder = Some(decoder);
        self.state = ServiceState::Playing;
        self.song_end_fired = false;
    }

    /// Advance timed state. The host calls this on its own ~0.5 s
    /// periodic observer tick (or more often; detection is level-triggered).
    pub fn tick(&mut self, now: Instant, engine_commands: &mut rtrb::Producer<EngineCommand>) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();

        if let Some(unmute_at) = self.unmute_at {
            if now >= unmute_at {
                let _ = engine_commands.push(EngineCommand::Unmute);
                self.unmute_at = None;
                events.push(PlaybackEvent::Unmuted);
            }
        }

        if let Some(decoder) = &self.decoder {
            if let Some(duration) = decoder.duration_secs() {
                if !self.song_end_fired && decoder.current_time_secs() >= duration - SONG_END_LEAD_SECS {
                    self.song_end_fired = true;
                    events.push(PlaybackEvent::SongEnded);
                }
            }
        }

        events
    }

    pub fn current_time_secs(&self) -> Option<f64> {
        self.decoder.as_ref().map(|d| d.current_time_secs())
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.decoder.as_ref().and_then(|d| d.duration_secs())
    }

    pub fn native_sample_rate(&self) -> Option<u32> {
        self.decoder.as_ref().map(|d| d.native_sample_rate())
    }

    /// Exposed so the Crossfade Engine can re-point this tap at a
    /// `StemDecomposer` during premium analysis of the outgoing track.
    pub fn tap_mut(&mut self) -> &mut TapBridge {
        &mut self.tap
    }
}
