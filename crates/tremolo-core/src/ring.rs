//! Lock-free single-producer/single-consumer ring of interleaved samples.
//!
//! The decode thread writes whole PCM blocks; the CPAL callback drains
//! whatever it needs for one hardware buffer. Neither side ever takes a
//! lock, so the callback cannot be stalled by a slow decoder:
//! - writes are all-or-nothing (`try_write`), the producer parks and
//!   retries when the ring is full
//! - reads return however many frames are buffered (`try_read`), the
//!   caller fills the shortfall with silence and counts the underrun
//!
//! A seek flushes the ring without stopping the stream: the producer
//! publishes a skip marker and the consumer fast-forwards its cursor past
//! the stale region on its next callback, before reading any data.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// No flush pending. Cursors are logical positions that wrap the address
/// space long before they wrap this sentinel.
const NO_SKIP: usize = usize::MAX;

/// Fixed-capacity SPSC ring buffer of interleaved `f32` samples.
///
/// ## Cursors
/// `write_pos` and `read_pos` are *logical* sample positions that only
/// ever increase (wrapping arithmetic); the storage index is the position
/// masked by `capacity - 1`. Buffered count is `write - read`, so the full
/// capacity is usable and empty/full are never ambiguous.
///
/// ## Ownership
/// Exactly one thread writes (`try_write`, `flush`) and exactly one thread
/// reads (`try_read`). All accessors are safe from any thread.
pub struct SampleRing {
    buf: Box<[UnsafeCell<f32>]>,
    /// Advanced only by the producer.
    write_pos: AtomicUsize,
    /// Advanced only by the consumer.
    read_pos: AtomicUsize,
    /// Producer-published flush target; [`NO_SKIP`] when none pending.
    skip_to: AtomicUsize,
    mask: usize,
    capacity: usize,
    channels: usize,
}

// The raw buffer is only touched through the cursor protocol above:
// the producer writes [write, write+n) before publishing write_pos with
// Release, the consumer reads [read, read+n) after an Acquire load of
// write_pos. No index is ever accessed by both sides at once.
unsafe impl Send for SampleRing {}
unsafe impl Sync for SampleRing {}

impl SampleRing {
    /// Create a ring holding at least `min_frames` frames of `channels`-channel
    /// audio. Capacity is rounded up to a power of two (in samples) for cheap
    /// index masking, so the usable size is never below the request.
    pub fn new(min_frames: usize, channels: usize) -> Self {
        assert!(channels > 0, "ring requires at least one channel");
        let min_samples = min_frames.max(1) * channels;
        let capacity = min_samples.next_power_of_two();
        let buf = (0..capacity).map(|_| UnsafeCell::new(0.0)).collect();
        Self {
            buf,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            skip_to: AtomicUsize::new(NO_SKIP),
            mask: capacity - 1,
            capacity,
            channels,
        }
    }

    /// Ring sized to cover `millis` of audio at `sample_rate`, the decode
    /// jitter budget. Callers pass at least 200ms.
    pub fn with_capacity_ms(sample_rate: u32, channels: usize, millis: u32) -> Self {
        let frames = (sample_rate as usize * millis as usize).div_ceil(1000);
        Self::new(frames, channels)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity / self.channels
    }

    /// Append one block of interleaved samples. Returns `false` without
    /// writing anything if the free space cannot hold the whole block.
    ///
    /// Producer thread only. `samples.len()` must be a multiple of the
    /// channel count so cursors stay frame-aligned.
    pub fn try_write(&self, samples: &[f32]) -> bool {
        debug_assert_eq!(samples.len() % self.channels, 0);
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        let used = write.wrapping_sub(read);
        if samples.len() > self.capacity - used {
            return false;
        }

        for (i, &sample) in samples.iter().enumerate() {
            let idx = write.wrapping_add(i) & self.mask;
            // Sole producer, and the consumer never reads past write_pos,
            // so this slot is unobserved until the store below.
            unsafe { *self.buf[idx].get() = sample };
        }

        self.write_pos
            .store(write.wrapping_add(samples.len()), Ordering::Release);
        true
    }

    /// Drain up to `out.len()` samples, whole frames only. Returns the
    /// number of *frames* copied; the tail of `out` is left untouched on a
    /// short read. Never blocks.
    ///
    /// Consumer thread only. Applies any pending flush before reading, so
    /// samples written before the flush are skipped, not played.
    pub fn try_read(&self, out: &mut [f32]) -> usize {
        let mut read = self.read_pos.load(Ordering::Relaxed);

        let skip = self.skip_to.swap(NO_SKIP, Ordering::AcqRel);
        if skip != NO_SKIP {
            // The marker was the producer's write_pos at flush time and the
            // consumer can never be ahead of that, so this only moves forward.
            read = skip;
            self.read_pos.store(read, Ordering::Release);
        }

        let write = self.write_pos.load(Ordering::Acquire);
        let available = write.wrapping_sub(read);
        let samples = (out.len().min(available) / self.channels) * self.channels;
        if samples == 0 {
            return 0;
        }

        for (i, slot) in out[..samples].iter_mut().enumerate() {
            let idx = read.wrapping_add(i) & self.mask;
            // Published by the producer's Release store of write_pos.
            *slot = unsafe { *self.buf[idx].get() };
        }

        self.read_pos
            .store(read.wrapping_add(samples), Ordering::Release);
        samples / self.channels
    }

    /// Discard everything buffered so far without stopping the consumer.
    ///
    /// Producer thread only. The consumer applies the skip at the start of
    /// its next `try_read`, so blocks pushed after this call are the first
    /// audible data. Two flushes before a read coalesce into the later one.
    pub fn flush(&self) {
        let write = self.write_pos.load(Ordering::Relaxed);
        self.skip_to.store(write, Ordering::Release);
    }

    /// Reset both cursors to zero. Only valid while no consumer is running
    /// (stream stopped); use [`flush`](Self::flush) for a live seek.
    pub fn clear(&self) {
        self.skip_to.store(NO_SKIP, Ordering::SeqCst);
        self.read_pos.store(0, Ordering::SeqCst);
        self.write_pos.store(0, Ordering::SeqCst);
    }

    /// Frames buffered and ready to read. Consumer-accurate; the producer
    /// may observe a momentarily stale (smaller) value.
    pub fn available_frames(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) / self.channels
    }

    /// Frames of free space. Producer-accurate; ignores a pending flush
    /// until the consumer applies it.
    pub fn free_frames(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        (self.capacity - write.wrapping_sub(read)) / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.available_frames() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn fill(ring: &SampleRing, frames: usize, value: f32) -> bool {
        ring.try_write(&vec![value; frames * ring.channels()])
    }

    #[test]
    fn capacity_rounds_up_and_covers_request() {
        let ring = SampleRing::new(1000, 2);
        assert!(ring.capacity_frames() >= 1000);
        assert!((ring.capacity_frames() * 2).is_power_of_two());

        let ring = SampleRing::with_capacity_ms(44_100, 2, 200);
        assert!(ring.capacity_frames() >= 8820);
    }

    #[test]
    fn write_read_round_trip_preserves_order() {
        let ring = SampleRing::new(8, 2);
        assert!(ring.try_write(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(ring.available_frames(), 2);

        let mut out = [0.0; 4];
        assert_eq!(ring.try_read(&mut out), 2);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn write_fails_when_full_and_leaves_contents_intact() {
        let ring = SampleRing::new(4, 1);
        let cap = ring.capacity_frames();
        assert!(fill(&ring, cap, 0.5));
        assert!(!ring.try_write(&[1.0]));
        assert_eq!(ring.available_frames(), cap);

        let mut out = vec![0.0; cap];
        assert_eq!(ring.try_read(&mut out), cap);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn short_read_reports_what_it_copied() {
        let ring = SampleRing::new(16, 2);
        assert!(ring.try_write(&[0.1, 0.2]));

        let mut out = [9.0; 8];
        assert_eq!(ring.try_read(&mut out), 1);
        assert_eq!(&out[..2], &[0.1, 0.2]);
        // Shortfall untouched; the callback fills it with silence itself.
        assert!(out[2..].iter().all(|&s| s == 9.0));
    }

    #[test]
    fn read_never_consumes_partial_frames() {
        let ring = SampleRing::new(8, 2);
        assert!(ring.try_write(&[1.0, 2.0, 3.0, 4.0]));

        let mut out = [0.0; 3];
        assert_eq!(ring.try_read(&mut out), 1);
        assert_eq!(ring.available_frames(), 1);
    }

    #[test]
    fn cursors_wrap_across_the_storage_boundary() {
        let ring = SampleRing::new(4, 1);
        let cap = ring.capacity_frames();
        let mut out = vec![0.0; cap];

        // Push/drain more than twice the capacity so positions lap the
        // storage at least twice.
        let mut next = 0.0f32;
        for _ in 0..5 {
            let chunk: Vec<f32> = (0..cap)
                .map(|_| {
                    next += 1.0;
                    next
                })
                .collect();
            assert!(ring.try_write(&chunk));
            assert_eq!(ring.try_read(&mut out), cap);
            assert_eq!(out, chunk);
        }
    }

    #[test]
    fn flush_skips_everything_written_before_it() {
        let ring = SampleRing::new(8, 1);
        assert!(ring.try_write(&[1.0, 2.0, 3.0]));
        ring.flush();
        assert!(ring.try_write(&[7.0, 8.0]));

        let mut out = [0.0; 8];
        assert_eq!(ring.try_read(&mut out), 2);
        assert_eq!(&out[..2], &[7.0, 8.0]);
    }

    #[test]
    fn flush_with_no_following_writes_reads_empty() {
        let ring = SampleRing::new(8, 2);
        assert!(ring.try_write(&[1.0, 2.0, 3.0, 4.0]));
        ring.flush();

        let mut out = [0.0; 4];
        assert_eq!(ring.try_read(&mut out), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn clear_returns_to_the_initial_state() {
        let ring = SampleRing::new(8, 2);
        assert!(ring.try_write(&[1.0; 6]));
        ring.flush();
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.free_frames(), ring.capacity_frames());
        assert!(ring.try_write(&[2.0, 3.0]));
        let mut out = [0.0; 2];
        assert_eq!(ring.try_read(&mut out), 1);
        assert_eq!(out, [2.0, 3.0]);
    }

    #[test]
    fn concurrent_producer_consumer_sees_a_gapless_sequence() {
        let ring = Arc::new(SampleRing::new(64, 1));
        let total: usize = 10_000;

        let producer = {
            let ring = ring.clone();
            thread::spawn(move || {
                let mut next = 0usize;
                while next < total {
                    let end = (next + 17).min(total);
                    let chunk: Vec<f32> = (next..end).map(|v| v as f32).collect();
                    if ring.try_write(&chunk) {
                        next = end;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut seen = 0usize;
        let mut out = [0.0f32; 23];
        while seen < total {
            let frames = ring.try_read(&mut out);
            for &sample in &out[..frames] {
                assert_eq!(sample, seen as f32);
                seen += 1;
            }
            if frames == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn reader_never_observes_unwritten_data() {
        // frames_read <= frames_available for arbitrary interleavings.
        let ring = Arc::new(SampleRing::new(32, 2));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let producer = {
            let ring = ring.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let block = [0.25f32; 6];
                while !stop.load(Ordering::Relaxed) {
                    let _ = ring.try_write(&block);
                }
            })
        };

        let mut out = [1.0f32; 10];
        for _ in 0..50_000 {
            let frames = ring.try_read(&mut out);
            assert!(frames * ring.channels() <= out.len());
            for &sample in &out[..frames * ring.channels()] {
                // Initial zeros are never handed out; only produced data is.
                assert_eq!(sample, 0.25);
            }
        }
        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    }
}
