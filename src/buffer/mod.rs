//! Lock-free ring buffers and the active/standby slot pairing built on them.

mod ring_buffer;
mod slot;

pub use ring_buffer::RingBuffer;
pub use slot::{Lane, RingBufferSlot};
