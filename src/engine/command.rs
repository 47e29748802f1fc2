//! Lock-free command queue carrying control messages from the main
//! coordination task to the real-time audio thread (SPEC_FULL.md §5).
//!
//! Same rationale as a mutex-free UI→audio bridge generally: the render
//! callback can never block on a lock, so mutations are queued and drained
//! at the start of each callback instead.

use crate::buffer::Lane;
use crate::types::Stem;

#[derive(Debug, Clone, Copy)]
pub enum EngineCommand {
    SetSlotVolume { lane: Lane, volume: f32 },
    SetStemVolume { lane: Lane, stem: Stem, volume: f32 },
    EnterStemMode,
    ExitStemMode,
    SetEqBandGainDb { band: usize, gain_db: f32 },
    SetBassChainEngaged(bool),
    Mute,
    Unmute,
    SetDeviceSampleRate(u32),
}

/// Capacity of the command queue: generous headroom for a 60 Hz
/// choreographer driving ten gain surfaces plus occasional EQ/mute calls.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_channel_round_trips() {
        let (mut tx, mut rx) = command_channel();
        tx.push(EngineCommand::SetSlotVolume { lane: Lane::A, volume: 0.5 }).unwrap();
        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::SetSlotVolume { lane: Lane::A, .. }));
    }

    #[test]
    fn command_size_stays_small() {
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 16, "EngineCommand is {size} bytes");
    }
}
