//! Decoder abstraction the Playback Service drives. The concrete decoder
//! (symphonia reading from an HTTP byte stream) lives at the host
//! integration boundary; this crate only needs the lifecycle surface.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStatus {
    Opening,
    Ready,
    Failed,
    BufferEmpty,
    Ended,
}

/// One open network audio decode, as seen by the Playback Service and
/// Crossfade Slot. Implementations push samples into whatever `TapBridge`
/// they were constructed with; this trait only exposes lifecycle control.
pub trait Decoder: Send {
    fn status(&self) -> DecoderStatus;
    fn native_sample_rate(&self) -> u32;
    fn current_time_secs(&self) -> f64;
    fn duration_secs(&self) -> Option<f64>;
    fn seek(&mut self, position_secs: f64);
    fn set_playing(&mut self, playing: bool);
    fn is_playing(&self) -> bool;
    /// Set output volume on the underlying decoder/player itself, used only
    /// to start a standby decoder silently during crossfade preload.
    fn set_native_volume(&mut self, volume: f32);
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// Minimal in-memory `Decoder` used by this crate's own tests.
    pub struct FakeDecoder {
        pub status: DecoderStatus,
        pub sample_rate: u32,
        pub current_time: f64,
        pub duration: Option<f64>,
        pub playing: bool,
        pub volume: f32,
    }

    impl FakeDecoder {
        pub fn new(duration: f64) -> Self {
            Self {
                status: DecoderStatus::Opening,
                sample_rate: 44_100,
                current_time: 0.0,
                duration: Some(duration),
                playing: false,
                volume: 1.0,
            }
        }
    }

    impl Decoder for FakeDecoder {
        fn status(&self) -> DecoderStatus {
            self.status
        }
        fn native_sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn current_time_secs(&self) -> f64 {
            self.current_time
        }
        fn duration_secs(&self) -> Option<f64> {
            self.duration
        }
        fn seek(&mut self, position_secs: f64) {
            self.current_time = position_secs;
        }
        fn set_playing(&mut self, playing: bool) {
            self.playing = playing;
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
        fn set_native_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
    }
}
