//! Crossfade Engine: the state machine orchestrating one transition
//! between the active and standby decoders (SPEC_FULL.md §4.9).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffer::RingBufferSlot;
use crate::engine::EngineCommand;
use crate::playback::{Decoder, PlaybackResult, PlaybackService};
use crate::stem::StemDecomposer;
use crate::tap::TapBridge;
use crate::types::{Stem, ENGINE_SAMPLE_RATE, NUM_STEMS};

use super::choreographer::{FadeProfile, TransitionChoreographer, SMOOTH_PROFILE};
use super::slot::CrossfadeSlot;

const PRELOAD_LEAD_SECS: f64 = 20.0;
const ANALYZE_DURATION: Duration = Duration::from_millis(300);
const LOUDNESS_CLAMP_DB: f32 = 6.0;
const SMART_EARLY_MAX_SECS: f64 = 10.0;
const SMART_EARLY_MIN_PLAYBACK_SECS: f64 = 30.0;
const BEAT_SNAP_WINDOW_SECS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadeState {
    Idle,
    Preloading,
    Analyzing,
    Ready,
    Fading,
    StemFading,
    Completing,
}

/// Opaque host-owned RAII handle kept alive for the duration of a
/// transition, so the app survives background transitions. The host
/// constructs the concrete type (wrapping whatever OS facility it uses)
/// and this crate only holds and drops it at the right times.
pub struct BackgroundAudioGuard(#[allow(dead_code)] Box<dyn std::any::Any + Send>);

impl BackgroundAudioGuard {
    pub fn new<T: std::any::Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }
}

/// Candidate downbeat timestamps (seconds into the track) a beat-tracking
/// host component may supply; the engine snaps the ideal trigger time to
/// the nearest one within `BEAT_SNAP_WINDOW_SECS`.
pub struct BeatGrid<'a>(pub &'a [f64]);

impl<'a> BeatGrid<'a> {
    fn nearest_within(&self, ideal_secs: f64, window_secs: f64) -> Option<f64> {
        self.0
            .iter()
            .copied()
            .map(|beat| (beat, (beat - ideal_secs).abs()))
            .filter(|&(_, distance)| distance <= window_secs)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(beat, _)| beat)
    }
}

pub struct CrossfadeEngine {
    slot: Arc<RingBufferSlot>,
    state: CrossfadeState,
    standby: CrossfadeSlot,
    choreographer: TransitionChoreographer,
    fade_duration_secs: f64,
    preloaded_song_id: Option<String>,
    analyze_started_at: Option<Instant>,
    loudness_correction: f32,
    trigger_time_secs: Option<f64>,
    fade_started_at: Option<Instant>,
    fade_progress: f32,
    stem_mode: bool,
    smart_early_transition: bool,
    background_token: Option<BackgroundAudioGuard>,
}

impl CrossfadeEngine {
    pub fn new(slot: Arc<RingBufferSlot>, fade_duration_secs: f64) -> Self {
        let standby = CrossfadeSlot::new(slot.clone());
        Self {
            slot,
            state: CrossfadeState::Idle,
            standby,
            choreographer: TransitionChoreographer::new(SMOOTH_PROFILE),
            fade_duration_secs,
            preloaded_song_id: None,
            analyze_started_at: None,
            loudness_correction: 1.0,
            trigger_time_secs: None,
            fade_started_at: None,
            fade_progress: 0.0,
            stem_mode: false,
            smart_early_transition: false,
            background_token: None,
        }
    }

    /// Enable/disable the "smart early transition" (firing the fade up to
    /// `SMART_EARLY_MAX_SECS` before the scheduled trigger when a sustained
    /// vocal drop is detected). Defaults to `false`.
    pub fn set_smart_early_transition(&mut self, enabled: bool) {
        self.smart_early_transition = enabled;
    }

    pub fn state(&self) -> CrossfadeState {
        self.state
    }

    pub fn set_profile(&mut self, profile: FadeProfile) {
        self.choreographer.set_profile(profile);
    }

    pub fn preloaded_song_id(&self) -> Option<&str> {
        self.preloaded_song_id.as_deref()
    }

    /// Whether preload should begin now. Refuses short tracks where the fade
    /// wouldn't leave a meaningful playback window (duration must be at
    /// least `3 * fade_duration_secs`).
    pub fn should_begin_preload(&self, remaining_secs: f64, duration_secs: f64) -> bool {
        self.state == CrossfadeState::Idle
            && remaining_secs <= PRELOAD_LEAD_SECS
            && duration_secs >= 3.0 * self.fade_duration_secs
    }

    /// Begin preloading `next_song_id`'s decoder. Returns `false` without
    /// changing state if it's the same song as currently playing (loop-one).
    pub fn begin_preload(
        &mut self,
        next_song_id: &str,
        current_song_id: &str,
        decoder: Box<dyn Decoder>,
        background_token: BackgroundAudioGuard,
    ) -> bool {
        if next_song_id == current_song_id {
            return false;
        }
        self.standby.load(decoder);
        let _ = self.standby.play_silently();
        self.preloaded_song_id = Some(next_song_id.to_string());
        self.background_token = Some(background_token);
        self.state = CrossfadeState::Preloading;
        true
    }

    /// Called once the standby decoder reports ready. `premium` selects
    /// stem-mode analysis; `outgoing_tap` is the currently-playing
    /// service's tap, re-pointed at a decomposer alongside the standby's.
    pub fn on_preload_ready(&mut self, premium: bool, outgoing_tap: &mut TapBridge, outgoing_sample_rate: u32) -> PlaybackResult<()> {
        if !premium {
            self.state = CrossfadeState::Ready;
            return Ok(());
        }

        let standby_lane = self.slot.standby_lane();
        let active_lane = self.slot.active_lane();
        let standby_outputs: [_; NUM_STEMS] =
            std::array::from_fn(|i| self.slot.stem(standby_lane, Stem::from_index(i).unwrap()).clone());
        let active_outputs: [_; NUM_STEMS] =
            std::array::from_fn(|i| self.slot.stem(active_lane, Stem::from_index(i).unwrap()).clone());

        self.standby
            .enable_stem_analysis(StemDecomposer::new(ENGINE_SAMPLE_RATE as f32, standby_outputs))?;
        outgoing_tap.attach_stems(outgoing_sample_rate, StemDecomposer::new(ENGINE_SAMPLE_RATE as f32, active_outputs));

        self.analyze_started_at = Some(Instant::now());
        self.state = CrossfadeState::Analyzing;
        Ok(())
    }

    /// Poll analysis progress. Once 300 ms have accumulated, decides
    /// simple-vs-stem mode and computes the loudness correction and an
    /// optional beat-aligned trigger. `song_duration_secs` and
    /// `now_playing_secs` locate the ideal trigger time; `beats`, if given,
    /// snaps it to the nearest confident downbeat.
    pub fn tick_analysis(
        &mut self,
        now: Instant,
        outgoing_tap: &TapBridge,
        song_duration_secs: f64,
        beats: Option<BeatGrid>,
    ) -> bool {
        let Some(started_at) = self.analyze_started_at else { return false };
        if now.duration_since(started_at) < ANALYZE_DURATION {
            return false;
        }

        let standby_analysis = self.standby.tap_mut().stem_side_mid_analysis();
        let use_stem_mode = standby_analysis.map(|a| !a.is_mono()).unwrap_or(false);

        let incoming_rms = self.standby.tap_mut().stem_mid_rms();
        if let (Some(outgoing_rms), Some(incoming_rms)) = (outgoing_tap.stem_mid_rms(), incoming_rms) {
            self.loudness_correction = loudness_correction_gain(outgoing_rms, incoming_rms);
        }

        let ideal_trigger = song_duration_secs - self.fade_duration_secs;
        self.trigger_time_secs = match beats {
            Some(grid) => grid.nearest_within(ideal_trigger, BEAT_SNAP_WINDOW_SECS).or(Some(ideal_trigger)),
            None => Some(ideal_trigger),
        };

        self.stem_mode = use_stem_mode;
        self.state = CrossfadeState::Ready;
        true
    }

    /// Whether the fade should fire now: beat-aligned/ideal trigger time
    /// reached, or a smart early transition on a detected vocal drop after
    /// `SMART_EARLY_MIN_PLAYBACK_SECS` of playback.
    pub fn should_trigger_fade(&self, current_time_secs: f64, outgoing_tap: &TapBridge) -> bool {
        if self.state != CrossfadeState::Ready {
            return false;
        }
        let Some(trigger) = self.trigger_time_secs else { return false };
        if current_time_secs >= trigger {
            return true;
        }
        if !self.smart_early_transition {
            return false;
        }
        let smart_early_floor = trigger - SMART_EARLY_MAX_SECS;
        current_time_secs >= smart_early_floor
            && current_time_secs >= SMART_EARLY_MIN_PLAYBACK_SECS
            && outgoing_tap.stem_vocal_drop_detected()
    }

    pub fn begin_fade(&mut self, now: Instant, engine_commands: &mut rtrb::Producer<EngineCommand>) {
        self.fade_started_at = Some(now);
        self.fade_progress = 0.0;
        if self.stem_mode {
            self.state = CrossfadeState::StemFading;
            let _ = engine_commands.push(EngineCommand::EnterStemMode);
        } else {
            self.state = CrossfadeState::Fading;
        }
    }

    /// Advance the fade by wall-clock `now`; pushes updated volumes onto
    /// `engine_commands`. Returns `true` once the fade has completed.
    pub fn tick_fade(&mut self, now: Instant, engine_commands: &mut rtrb::Producer<EngineCommand>) -> bool {
        let Some(started_at) = self.fade_started_at else { return false };
        let elapsed = now.duration_since(started_at).as_secs_f64();
        self.fade_progress = (elapsed / self.fade_duration_secs).clamp(0.0, 1.0) as f32;

        let active_lane = self.slot.active_lane();
        let standby_lane = self.slot.standby_lane();

        match self.state {
            CrossfadeState::Fading => {
                let outgoing = (self.fade_progress * std::f32::consts::FRAC_PI_2).cos();
                let incoming = (self.fade_progress * std::f32::consts::FRAC_PI_2).sin() * self.loudness_correction;
                let _ = engine_commands.push(EngineCommand::SetSlotVolume { lane: active_lane, volume: outgoing });
                let _ = engine_commands.push(EngineCommand::SetSlotVolume { lane: standby_lane, volume: incoming });
            }
            CrossfadeState::StemFading => {
                let gains = self.choreographer.gains_at(self.fade_progress);
                for stem in Stem::ALL {
                    let i = stem as usize;
                    let _ = engine_commands.push(EngineCommand::SetStemVolume {
                        lane: active_lane,
                        stem,
                        volume: gains.outgoing[i],
                    });
                    let _ = engine_commands.push(EngineCommand::SetStemVolume {
                        lane: standby_lane,
                        stem,
                        volume: gains.incoming[i] * self.loudness_correction,
                    });
                }
            }
            _ => {}
        }

        if self.fade_progress >= 1.0 {
            self.state = CrossfadeState::Completing;
            true
        } else {
            false
        }
    }

    /// Finish the transition: swap the active lane, stop stem mode, flush
    /// the (now-standby) old-active buffer, and hand the decoder off to
    /// the Playback Service without restarting the engine.
    pub fn complete(
        &mut self,
        playback: &mut PlaybackService,
        next_song_duration_secs: Option<f64>,
        engine_commands: &mut rtrb::Producer<EngineCommand>,
    ) -> PlaybackResult<()> {
        if self.stem_mode {
            let _ = engine_commands.push(EngineCommand::ExitStemMode);
        }
        let decoder = self.standby.hand_off_player()?;
        self.slot.swap_active();
        let old_active = self.slot.full_mix(self.slot.standby_lane()).clone();
        old_active.clear();

        playback.adopt_player(decoder, next_song_duration_secs);

        self.reset();
        Ok(())
    }

    /// Abort the transition from any non-idle state (queue change, seek,
    /// explicit stop).
    pub fn cancel(&mut self, engine_commands: &mut rtrb::Producer<EngineCommand>) {
        if self.stem_mode {
            let _ = engine_commands.push(EngineCommand::ExitStemMode);
        }
        self.standby.discard();
        self.reset();
    }

    fn reset(&mut self) {
        self.state = CrossfadeState::Idle;
        self.preloaded_song_id = None;
        self.analyze_started_at = None;
        self.loudness_correction = 1.0;
        self.trigger_time_secs = None;
        self.fade_started_at = None;
        self.fade_progress = 0.0;
        self.stem_mode = false;
        self.background_token = None;
    }
}

fn loudness_correction_gain(outgoing_rms: f64, incoming_rms: f64) -> f32 {
    let outgoing_db = 20.0 * outgoing_rms.max(1e-9).log10();
    let incoming_db = 20.0 * incoming_rms.max(1e-9).log10();
    let diff_db = (outgoing_db - incoming_db).clamp(-LOUDNESS_CLAMP_DB as f64, LOUDNESS_CLAMP_DB as f64);
    10f64.powf(diff_db / 20.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command_channel;
    use crate::playback::decoder::fake::FakeDecoder;

    #[test]
    fn begin_preload_refuses_same_song_loop_one() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = CrossfadeEngine::new(slot, 8.0);
        let started = engine.begin_preload("song-1", "song-1", Box::new(FakeDecoder::new(180.0)), BackgroundAudioGuard::new(()));
        assert!(!started);
        assert_eq!(engine.state(), CrossfadeState::Idle);
    }

    #[test]
    fn begin_preload_accepts_different_song() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = CrossfadeEngine::new(slot, 8.0);
        let started = engine.begin_preload("song-2", "song-1", Box::new(FakeDecoder::new(180.0)), BackgroundAudioGuard::new(()));
        assert!(started);
        assert_eq!(engine.state(), CrossfadeState::Preloading);
    }

    #[test]
    fn simple_fade_completes_at_full_progress() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = CrossfadeEngine::new(slot, 1.0);
        engine.begin_preload("song-2", "song-1", Box::new(FakeDecoder::new(180.0)), BackgroundAudioGuard::new(()));
        engine.state = CrossfadeState::Ready;
        let (mut tx, _rx) = command_channel();

        let now = Instant::now();
        engine.begin_fade(now, &mut tx);
        assert_eq!(engine.state(), CrossfadeState::Fading);

        let done = engine.tick_fade(now + Duration::from_millis(1100), &mut tx);
        assert!(done);
        assert_eq!(engine.state(), CrossfadeState::Completing);
    }

    #[test]
    fn cancel_returns_to_idle_from_any_state() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = CrossfadeEngine::new(slot, 8.0);
        engine.begin_preload("song-2", "song-1", Box::new(FakeDecoder::new(180.0)), BackgroundAudioGuard::new(()));
        let (mut tx, _rx) = command_channel();
        engine.cancel(&mut tx);
        assert_eq!(engine.state(), CrossfadeState::Idle);
    }

    #[test]
    fn should_begin_preload_refuses_short_track() {
        let slot = Arc::new(RingBufferSlot::new());
        let engine = CrossfadeEngine::new(slot, 6.0);
        // 10 s track, 6 s fade: 10 < 3*6, so preload must not begin.
        assert!(!engine.should_begin_preload(8.0, 10.0));
    }

    #[test]
    fn should_begin_preload_accepts_track_long_enough_for_fade() {
        let slot = Arc::new(RingBufferSlot::new());
        let engine = CrossfadeEngine::new(slot, 6.0);
        assert!(engine.should_begin_preload(18.0, 200.0));
    }

    #[test]
    fn smart_early_transition_is_off_by_default() {
        let slot = Arc::new(RingBufferSlot::new());
        let mut engine = CrossfadeEngine::new(slot, 8.0);
        engine.state = CrossfadeState::Ready;
        engine.trigger_time_secs = Some(100.0);
        let tap = TapBridge::new();
        // Within the smart-early window and past the min-playback floor, but
        // smart_early_transition defaults to false, so it must not fire
        // even though stem_vocal_drop_detected() would be false anyway here.
        assert!(!engine.should_trigger_fade(95.0, &tap));

        engine.set_smart_early_transition(true);
        assert!(!engine.should_trigger_fade(95.0, &tap));
    }

    #[test]
    fn loudness_correction_clamps_to_six_db() {
        let gain = loudness_correction_gain(1.0, 0.001);
        let expected_max = 10f64.powf(LOUDNESS_CLAMP_DB as f64 / 20.0) as f32;
        assert!((gain - expected_max).abs() < 1e-4);
    }

    #[test]
    fn beat_grid_snaps_to_nearest_within_window() {
        let beats = [10.0, 12.5, 20.0];
        let grid = BeatGrid(&beats);
        assert_eq!(grid.nearest_within(12.0, 2.0), Some(12.5));
        assert_eq!(grid.nearest_within(50.0, 2.0), None);
    }
}
