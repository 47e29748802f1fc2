//! Background thread for RT-safe deferred deallocation.
//!
//! Dropping a multi-hundred-KB ring buffer (or an `Arc` to one) on the
//! real-time audio thread risks a page-reclaim stall (munmap/madvise can
//! block for milliseconds under memory pressure). `basedrop::Shared<T>`
//! defers the actual `drop` to a background collector thread instead.
//!
//! ```ignore
//! let handle = gc_handle();
//! let shared = handle.make_shared(ring_buffer_slot);
//! // `shared` can be cloned and dropped from the RT thread; the backing
//! // allocation is freed later, off the RT thread, by the collector loop.
//! ```

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = std::sync::mpsc::channel();
    thread::Builder::new()
        .name("wavify-gc".into())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("gc handle channel closed");
            loop {
                collector.collect();
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("failed to spawn gc thread");
    rx.recv().expect("gc thread died before sending handle")
}

/// Get the process-wide GC handle, spawning the collector thread on first
/// use.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_reusable_across_calls() {
        let a = gc_handle();
        let b = gc_handle();
        // Both handles point at the same collector.
        let shared_a = a.make_shared(1u32);
        let shared_b = b.make_shared(2u32);
        assert_eq!(*shared_a, 1);
        assert_eq!(*shared_b, 2);
    }
}
