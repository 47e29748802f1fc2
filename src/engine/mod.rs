//! Audio Engine: fixed DSP graph, command queue, and RT-safe gain
//! smoothing (SPEC_FULL.md §4.5).

mod bass_chain;
mod command;
mod compressor;
mod engine;
mod eq;
mod limiter;
mod mixer;

pub use bass_chain::BassChain;
pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use compressor::Compressor;
pub use engine::AudioEngine;
pub use eq::{ParametricEq, BAND_FREQUENCIES_HZ, NUM_BANDS};
pub use limiter::Limiter;
pub use mixer::{SmoothedGain, StemModeRamp};
