//! Lock-free single-producer/single-consumer float sample queue.
//!
//! This is a hand-rolled SPSC ring rather than a wrapped crate: the contract
//! the real-time audio thread depends on is specific (monotonic indices,
//! release/acquire barrier placement, a non-RT-locked `clear`), so the
//! indices are raw atomics rather than delegated to `rtrb`/`ringbuf`.
//!
//! Capacity is fixed at construction and the backing storage is a single
//! heap allocation made once, up front; `write`/`read` never allocate.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A fixed-capacity SPSC float ring buffer.
///
/// `write_index` and `read_index` are monotonically increasing (never wrap);
/// the physical slot is `index % capacity`. The writer publishes a new
/// `write_index` with `Release`; the reader acquires it with `Acquire` before
/// reading the slots it implies are valid, then publishes its own
/// `read_index` with `Release` so the writer can observe how much space it
/// freed.
pub struct RingBuffer {
    capacity: usize,
    storage: Box<[AtomicF32Cell]>,
    write_index: AtomicUsize,
    read_index: AtomicUsize,
    overflow_count: AtomicU64,
    underrun_count: AtomicU64,
    clear_lock: Mutex<()>,
}

/// A single `f32` slot, stored as bit patterns in an `AtomicU32` so the
/// storage array itself never requires a lock for single-slot access.
struct AtomicF32Cell(std::sync::atomic::AtomicU32);

impl AtomicF32Cell {
    fn new(v: f32) -> Self {
        Self(std::sync::atomic::AtomicU32::new(v.to_bits()))
    }
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
    fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

impl RingBuffer {
    /// Allocate a new ring buffer of the given sample capacity.
    pub fn new(capacity: usize) -> Self {
        let storage = (0..capacity)
            .map(|_| AtomicF32Cell::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            capacity,
            storage,
            write_index: AtomicUsize::new(0),
            read_index: AtomicUsize::new(0),
            overflow_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            clear_lock: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently available to read. A racy snapshot by design: the
    /// writer may advance between this call and a subsequent `read`, which
    /// is harmless (the reader would simply see more data than expected).
    pub fn available(&self) -> usize {
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Write `count` samples from `src` into the buffer. Returns `false` and
    /// drops the entire block if there isn't room; never partially writes.
    /// Must not allocate, lock, or suspend — callable from the RT thread.
    pub fn write(&self, src: &[f32], count: usize) -> bool {
        debug_assert!(src.len() >= count);
        let w = self.write_index.load(Ordering::Relaxed);
        let r = self.read_index.load(Ordering::Acquire);
        let free = self.capacity - (w.wrapping_sub(r));
        if free < count {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        for (i, &sample) in src.iter().take(count).enumerate() {
            let slot = (w + i) % self.capacity;
            self.storage[slot].store(sample);
        }
        self.write_index.store(w + count, Ordering::Release);
        true
    }

    /// Read `count` samples into `dst`. Reads `min(available, count)` real
    /// samples and zero-pads the rest. Returns the number of real samples
    /// read; `0` means a full underrun (dst is entirely zeroed).
    pub fn read(&self, dst: &mut [f32], count: usize) -> usize {
        debug_assert!(dst.len() >= count);
        let w = self.write_index.load(Ordering::Acquire);
        let r = self.read_index.load(Ordering::Relaxed);
        let available = w.wrapping_sub(r);
        let n = available.min(count);
        for i in 0..n {
            let slot = (r + i) % self.capacity;
            dst[i] = self.storage[slot].load();
        }
        for slot in dst.iter_mut().take(count).skip(n) {
            *slot = 0.0;
        }
        if n > 0 {
            self.read_index.store(r + n, Ordering::Release);
        }
        if n == 0 {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        n
    }

    /// Reset both indices to zero and zero the backing storage. Serialized
    /// by a non-RT lock; must never be called from the audio callback.
    pub fn clear(&self) {
        let _guard = self.clear_lock.lock().unwrap();
        for cell in self.storage.iter() {
            cell.store(0.0);
        }
        self.write_index.store(0, Ordering::Release);
        self.read_index.store(0, Ordering::Release);
        self.overflow_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

// SAFETY: RingBuffer is designed for exactly one writer thread and one
// reader thread operating concurrently; the atomic index protocol above is
// the synchronization.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let rb = RingBuffer::new(16);
        let src = [1.0, 2.0, 3.0, 4.0];
        assert!(rb.write(&src, 4));
        assert_eq!(rb.available(), 4);

        let mut dst = [0.0f32; 4];
        let n = rb.read(&mut dst, 4);
        assert_eq!(n, 4);
        assert_eq!(dst, src);
        assert_eq!(rb.available(), 0);
    }

    #[test]
    fn overflow_drops_whole_block_and_counts_once() {
        let rb = RingBuffer::new(4);
        let src = [1.0; 3];
        assert!(rb.write(&src, 3));
        // Only 1 slot remains; writing 2 more must be rejected outright.
        assert!(!rb.write(&[9.0, 9.0], 2));
        assert_eq!(rb.overflow_count(), 1);
        assert_eq!(rb.available(), 3);
    }

    #[test]
    fn underrun_zero_pads_and_counts_once() {
        let rb = RingBuffer::new(8);
        let mut dst = [1.0f32; 4];
        let n = rb.read(&mut dst, 4);
        assert_eq!(n, 0);
        assert_eq!(dst, [0.0; 4]);
        assert_eq!(rb.underrun_count(), 1);
    }

    #[test]
    fn partial_read_zero_pads_tail() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0, 2.0], 2);
        let mut dst = [9.0f32; 4];
        let n = rb.read(&mut dst, 4);
        assert_eq!(n, 2);
        assert_eq!(dst, [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn clear_resets_everything() {
        let rb = RingBuffer::new(8);
        rb.write(&[1.0, 2.0, 3.0], 3);
        rb.clear();
        assert_eq!(rb.available(), 0);
        let mut dst = [9.0f32; 2];
        let n = rb.read(&mut dst, 2);
        assert_eq!(n, 0);
        assert_eq!(dst, [0.0, 0.0]);
    }

    #[test]
    fn wraps_around_capacity() {
        let rb = RingBuffer::new(4);
        rb.write(&[1.0, 2.0, 3.0], 3);
        let mut dst = [0.0f32; 2];
        rb.read(&mut dst, 2); // consume 1.0, 2.0; read_index = 2
        rb.write(&[4.0, 5.0], 2); // wraps: slots (3,0)
        let mut dst2 = [0.0f32; 3];
        let n = rb.read(&mut dst2, 3);
        assert_eq!(n, 3);
        assert_eq!(dst2, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_fifo_order() {
        use std::sync::Arc;
        use std::thread;

        let rb = Arc::new(RingBuffer::new(64));
        let writer_rb = rb.clone();
        let writer = thread::spawn(move || {
            for chunk in 0..200u32 {
                let block = [chunk as f32; 4];
                // Spin until there's room; overflow is acceptable but we
                // want a deterministic expected sequence for this test.
                while !writer_rb.write(&block, 4) {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::new();
        let mut got = 0u32;
        while got < 200 {
            let mut dst = [0.0f32; 4];
            let n = rb.read(&mut dst, 4);
            if n == 4 {
                received.push(dst[0] as u32);
                got += 1;
            } else {
                thread::yield_now();
            }
        }
        writer.join().unwrap();

        let sorted_is_monotonic = received.windows(2).all(|w| w[0] <= w[1]);
        assert!(sorted_is_monotonic, "FIFO order violated: {:?}", received);
    }
}
