//! Single-producer/single-consumer byte ring with overwrite-oldest
//! semantics (spec §4.4). Unlike a bounded SPSC channel that rejects pushes
//! once full, this ring always accepts a write — on overflow it advances
//! the read cursor to make room, because for real-time audio "preserving
//! freshness beats preserving completeness" (spec rationale).
//!
//! The producer/consumer split mirrors the handle-splitting shape of a
//! lock-free ring (e.g. `rtrb`, used elsewhere in this crate for the
//! microphone capture path), but overwrite-oldest eviction isn't something
//! a plain bounded SPSC queue can express, so this one is hand-rolled.

use crate::audio::format::AudioFormat;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    discarded_bytes: AtomicU64,
    overflow_count: AtomicU64,
    underflow_count: AtomicU64,
}

/// Byte ring buffer, fixed capacity. Not `Clone`/`Sync`-shared directly —
/// obtain a producer/consumer pair via [`RingBuffer::split`] so the type
/// system enforces the single-writer/single-reader discipline (spec §9:
/// "the type system should make mis-sharing impossible").
pub struct RingBuffer {
    capacity: usize,
    counters: Arc<Counters>,
}

pub struct RingProducer {
    inner: Arc<std::sync::Mutex<VecDeque<u8>>>,
    capacity: usize,
    counters: Arc<Counters>,
}

pub struct RingConsumer {
    inner: Arc<std::sync::Mutex<VecDeque<u8>>>,
    counters: Arc<Counters>,
}

impl RingBuffer {
    /// `capacity` is in bytes. Sizing by milliseconds of audio at a given
    /// format is the caller's job (see [`crate::audio::format::AudioFormat::bytes_for_duration`]).
    pub fn split(capacity: usize) -> (RingProducer, RingConsumer) {
        let inner = Arc::new(std::sync::Mutex::new(VecDeque::with_capacity(capacity)));
        let counters = Arc::new(Counters::default());
        (
            RingProducer { inner: inner.clone(), capacity, counters: counters.clone() },
            RingConsumer { inner, counters },
        )
    }
}

impl RingProducer {
    /// Never blocks. If `bytes` doesn't fit, evicts the oldest bytes first
    /// (overwrite-oldest) and counts the eviction.
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut buf = self.inner.lock().unwrap();

        if bytes.len() >= self.capacity {
            // The new data alone doesn't fit even in an empty ring; keep
            // only its tail.
            let discarded = buf.len() as u64 + (bytes.len() - self.capacity) as u64;
            buf.clear();
            buf.extend(&bytes[bytes.len() - self.capacity..]);
            if discarded > 0 {
                self.counters.discarded_bytes.fetch_add(discarded, Ordering::Relaxed);
                self.counters.overflow_count.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        let available = self.capacity - buf.len();
        if bytes.len() > available {
            let deficit = bytes.len() - available;
            for _ in 0..deficit {
                buf.pop_front();
            }
            self.counters.discarded_bytes.fetch_add(deficit as u64, Ordering::Relaxed);
            self.counters.overflow_count.fetch_add(1, Ordering::Relaxed);
        }
        buf.extend(bytes);
    }

    pub fn fill_level_bytes(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn fill_level_ms(&self, format: AudioFormat) -> u32 {
        format.duration_ms_for_bytes(self.fill_level_bytes())
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.counters.discarded_bytes.load(Ordering::Relaxed)
    }

    pub fn overflow_count(&self) -> u64 {
        self.counters.overflow_count.load(Ordering::Relaxed)
    }
}

impl RingConsumer {
    /// Returns whatever is currently available, up to `max_len` bytes.
    /// Never blocks; may return an empty vec.
    pub fn read(&self, max_len: usize) -> Vec<u8> {
        let mut buf = self.inner.lock().unwrap();
        let n = max_len.min(buf.len());
        if n == 0 {
            if max_len > 0 {
                self.counters.underflow_count.fetch_add(1, Ordering::Relaxed);
            }
            return Vec::new();
        }
        buf.drain(..n).collect()
    }

    pub fn fill_level_bytes(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn fill_level_ms(&self, format: AudioFormat) -> u32 {
        format.duration_ms_for_bytes(self.fill_level_bytes())
    }

    pub fn overflow_count(&self) -> u64 {
        self.counters.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underflow_count(&self) -> u64 {
        self.counters.underflow_count.load(Ordering::Relaxed)
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.counters.discarded_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_all_available_up_to_max_len() {
        let (p, c) = RingBuffer::split(16);
        p.write(&[1, 2, 3, 4]);
        assert_eq!(c.read(2), vec![1, 2]);
        assert_eq!(c.read(10), vec![3, 4]);
        assert_eq!(c.read(10), Vec::<u8>::new());
    }

    /// P4: after write(n) into a ring of capacity C < n, the last min(n, C)
    /// bytes are readable and no earlier bytes are.
    #[test]
    fn p4_ring_freshness_overwrite_oldest() {
        let (p, c) = RingBuffer::split(4);
        let input: Vec<u8> = (0..10).collect();
        p.write(&input);
        let out = c.read(100);
        assert_eq!(out, input[input.len() - 4..]);
        assert_eq!(c.discarded_bytes(), 6);
        assert_eq!(c.overflow_count(), 1);
    }

    #[test]
    fn p4_overwrite_oldest_across_multiple_writes() {
        let (p, c) = RingBuffer::split(4);
        p.write(&[1, 2, 3]);
        p.write(&[4, 5]); // 3 + 2 = 5 > 4: evict oldest 1 byte (the "1")
        assert_eq!(c.read(100), vec![2, 3, 4, 5]);
    }

    #[test]
    fn fill_level_ms_reports_occupancy() {
        let fmt = AudioFormat::for_decode_type(4).unwrap(); // 48kHz stereo 16-bit
        let bytes_for_100ms = fmt.bytes_for_duration(100);
        let (p, c) = RingBuffer::split(bytes_for_100ms * 2);
        p.write(&vec![0u8; bytes_for_100ms]);
        assert_eq!(c.fill_level_ms(fmt), 100);
    }

    #[test]
    fn empty_write_is_noop() {
        let (p, c) = RingBuffer::split(8);
        p.write(&[]);
        assert_eq!(c.fill_level_bytes(), 0);
    }

    #[test]
    fn write_larger_than_capacity_keeps_only_the_tail() {
        let (p, c) = RingBuffer::split(4);
        let input: Vec<u8> = (0..20).collect();
        p.write(&input);
        assert_eq!(c.read(100), input[16..]);
    }
}
