//! Active/standby ring buffer pairing used by the crossfade pipeline.

use std::sync::Arc;

use crate::types::{Stem, FULL_MIX_CAPACITY, NUM_STEMS, STEM_CAPACITY};

use super::ring_buffer::RingBuffer;

/// Which of the two full-mix lanes is currently feeding the device output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    A,
    B,
}

impl Lane {
    pub fn other(self) -> Lane {
        match self {
            Lane::A => Lane::B,
            Lane::B => Lane::A,
        }
    }
}

/// Per-lane full-mix buffer plus its four stem buffers.
struct LaneBuffers {
    full_mix: Arc<RingBuffer>,
    stems: [Arc<RingBuffer>; NUM_STEMS],
}

impl LaneBuffers {
    fn new() -> Self {
        Self {
            full_mix: Arc::new(RingBuffer::new(FULL_MIX_CAPACITY)),
            stems: std::array::from_fn(|_| Arc::new(RingBuffer::new(STEM_CAPACITY))),
        }
    }
}

/// Holds the A/B pair of full-mix buffers and their stem buffers, and which
/// lane is presently "active" (audible). Swapping is an O(1) atomic-enum
/// flip observed by the next render callback.
pub struct RingBufferSlot {
    a: LaneBuffers,
    b: LaneBuffers,
    active: std::sync::atomic::AtomicU8,
    last_overflow_seen: std::sync::atomic::AtomicU64,
    last_underrun_seen: std::sync::atomic::AtomicU64,
}

impl RingBufferSlot {
    pub fn new() -> Self {
        Self {
            a: LaneBuffers::new(),
            b: LaneBuffers::new(),
            active: std::sync::atomic::AtomicU8::new(0),
            last_overflow_seen: std::sync::atomic::AtomicU64::new(0),
            last_underrun_seen: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// All nine buffers (two full-mix plus eight stem) across both lanes.
    fn all_buffers(&self) -> impl Iterator<Item = &Arc<RingBuffer>> {
        [&self.a.full_mix, &self.b.full_mix]
            .into_iter()
            .chain(self.a.stems.iter())
            .chain(self.b.stems.iter())
    }

    /// Sum of `overflow_count`/`underrun_count` across every buffer in the
    /// slot, as of this call.
    fn counter_totals(&self) -> (u64, u64) {
        self.all_buffers()
            .fold((0u64, 0u64), |(overflow, underrun), buf| {
                (overflow + buf.overflow_count(), underrun + buf.underrun_count())
            })
    }

    /// Non-RT health check: logs a warning if any buffer's overflow or
    /// underrun counters have advanced since the last call. Caller is
    /// responsible for rate-limiting (SPEC_FULL.md §10.1 calls for at most
    /// once per second); never call this from the audio callback, since it
    /// walks every buffer and touches a `log` sink.
    pub fn log_buffer_health(&self) {
        let (overflow, underrun) = self.counter_totals();
        let prev_overflow = self.last_overflow_seen.swap(overflow, std::sync::atomic::Ordering::Relaxed);
        let prev_underrun = self.last_underrun_seen.swap(underrun, std::sync::atomic::Ordering::Relaxed);
        if overflow > prev_overflow {
            log::warn!(
                "ring buffer overflow: +{} since last check ({} total)",
                overflow - prev_overflow,
                overflow
            );
        }
        if underrun > prev_underrun {
            log::warn!(
                "ring buffer underrun: +{} since last check ({} total)",
                underrun - prev_underrun,
                underrun
            );
        }
    }

    pub fn active_lane(&self) -> Lane {
        match self.active.load(std::sync::atomic::Ordering::Acquire) {
            0 => Lane::A,
            _ => Lane::B,
        }
    }

    pub fn standby_lane(&self) -> Lane {
        self.active_lane().other()
    }

    /// Swap active/standby designation. O(1); no buffer contents move.
    pub fn swap_active(&self) {
        let next = match self.active_lane() {
            Lane::A => 1,
            Lane::B => 0,
        };
        self.active.store(next, std::sync::atomic::Ordering::Release);
    }

    fn lane(&self, lane: Lane) -> &LaneBuffers {
        match lane {
            Lane::A => &self.a,
            Lane::B => &self.b,
        }
    }

    pub fn full_mix(&self, lane: Lane) -> &Arc<RingBuffer> {
        &self.lane(lane).full_mix
    }

    pub fn stem(&self, lane: Lane, stem: Stem) -> &Arc<RingBuffer> {
        &self.lane(lane).stems[stem as usize]
    }

    pub fn active_full_mix(&self) -> &Arc<RingBuffer> {
        self.full_mix(self.active_lane())
    }

    pub fn standby_full_mix(&self) -> &Arc<RingBuffer> {
        self.full_mix(self.standby_lane())
    }

    pub fn active_stem(&self, stem: Stem) -> &Arc<RingBuffer> {
        self.stem(self.active_lane(), stem)
    }

    pub fn standby_stem(&self, stem: Stem) -> &Arc<RingBuffer> {
        self.stem(self.standby_lane(), stem)
    }
}

impl Default for RingBufferSlot {
    fn default() -> Self {
        Self::new()
    }
}
