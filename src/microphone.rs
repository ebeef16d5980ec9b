//! Microphone uplink (spec §4.6, C6): Idle -> Arming -> Capturing -> Stopping
//! -> Idle, backed by an `rtrb` ring fed by the capture collaborator and
//! drained by a fixed-cadence send loop.

use crate::message::{AudioBody, AudioCommand, AudioPacket};
use rtrb::RingBuffer as RtrbRing;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;

/// Fixed wire parameters for every uplink packet (spec §4.6): the adapter
/// expects exactly these regardless of what the platform mic actually runs.
pub const MIC_DECODE_TYPE: u32 = 5;
pub const MIC_AUDIO_TYPE: u32 = 3;
pub const MIC_VOLUME: f32 = 0.0;
pub const SEND_INTERVAL_MS: u64 = 20;
pub const WARMUP_CHUNKS_TO_DISCARD: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MicrophoneError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("microphone device unavailable")]
    DeviceUnavailable,
}

/// The external microphone capture collaborator (spec §6.4). Implementations
/// live outside this crate; they own the real audio device and continuously
/// feed a ring this module reads from at a fixed cadence.
pub trait MicrophoneSource: Send + Sync {
    fn arm(&self) -> Result<(), MicrophoneError>;
    fn disarm(&self);
    /// Non-blocking: returns whatever is available, up to `max_len` bytes.
    fn read_chunk(&self, max_len: usize) -> Vec<u8>;
    fn has_permission(&self) -> bool;
    fn is_capturing(&self) -> bool;
}

impl MicrophoneSource for Box<dyn MicrophoneSource> {
    fn arm(&self) -> Result<(), MicrophoneError> {
        (**self).arm()
    }
    fn disarm(&self) {
        (**self).disarm()
    }
    fn read_chunk(&self, max_len: usize) -> Vec<u8> {
        (**self).read_chunk(max_len)
    }
    fn has_permission(&self) -> bool {
        (**self).has_permission()
    }
    fn is_capturing(&self) -> bool {
        (**self).is_capturing()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    Idle,
    Arming,
    Capturing,
    Stopping,
}

/// Drives one `MicrophoneSource` through the uplink lifecycle, applying
/// warm-up suppression before any chunk reaches the wire (spec §4.6: the
/// first few chunks out of a freshly-armed device are often garbage).
pub struct MicrophoneUplink<S: MicrophoneSource> {
    source: S,
    state: std::sync::Mutex<MicState>,
    chunks_since_arm: AtomicU32,
    warmup_chunks: u32,
    muted: AtomicBool,
    warmup_discarded_total: AtomicU32,
}

impl<S: MicrophoneSource> MicrophoneUplink<S> {
    pub fn new(source: S) -> Self {
        Self::with_warmup(source, WARMUP_CHUNKS_TO_DISCARD)
    }

    pub fn with_warmup(source: S, warmup_chunks: u32) -> Self {
        Self {
            source,
            state: std::sync::Mutex::new(MicState::Idle),
            chunks_since_arm: AtomicU32::new(0),
            warmup_chunks,
            muted: AtomicBool::new(false),
            warmup_discarded_total: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> MicState {
        *self.state.lock().unwrap()
    }

    pub fn warmup_discarded_total(&self) -> u32 {
        self.warmup_discarded_total.load(Ordering::Relaxed)
    }

    pub fn has_permission(&self) -> bool {
        self.source.has_permission()
    }

    /// spec §4.6 `start_capture()`.
    pub fn start_capture(&self) -> Result<(), MicrophoneError> {
        {
            let mut state = self.state.lock().unwrap();
            *state = MicState::Arming;
        }
        self.chunks_since_arm.store(0, Ordering::Relaxed);
        match self.source.arm() {
            Ok(()) => {
                *self.state.lock().unwrap() = MicState::Capturing;
                Ok(())
            }
            Err(e) => {
                *self.state.lock().unwrap() = MicState::Idle;
                tracing::warn!(error = %e, "microphone arm failed");
                Err(e)
            }
        }
    }

    /// spec §4.6 `stop_capture()`.
    pub fn stop_capture(&self) {
        *self.state.lock().unwrap() = MicState::Stopping;
        self.source.disarm();
        *self.state.lock().unwrap() = MicState::Idle;
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// One 20ms tick of the send loop (spec §4.6). Returns `None` while
    /// warming up, muted, idle, or when the source had nothing ready.
    pub fn tick(&self, chunk_bytes: usize) -> Option<AudioPacket> {
        if self.state() != MicState::Capturing {
            return None;
        }
        let bytes = self.source.read_chunk(chunk_bytes);
        if bytes.is_empty() {
            return None;
        }

        let seen = self.chunks_since_arm.fetch_add(1, Ordering::Relaxed);
        if seen < self.warmup_chunks {
            self.warmup_discarded_total.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(seen, "discarding microphone warm-up chunk");
            return None;
        }

        if self.muted.load(Ordering::Relaxed) {
            return None;
        }

        Some(AudioPacket {
            decode_type: MIC_DECODE_TYPE,
            volume: MIC_VOLUME,
            audio_type: MIC_AUDIO_TYPE,
            body: AudioBody::Pcm(bytes),
        })
    }
}

/// Sizes an `rtrb` ring for the capture-thread-to-send-loop handoff at the
/// configured ring duration (spec §4.6 `mic_ring_ms`), mirroring the
/// producer/consumer split shape used for the real-time capture path this
/// module descends from.
pub fn new_capture_ring(capacity_bytes: usize) -> (rtrb::Producer<u8>, rtrb::Consumer<u8>) {
    RtrbRing::new(capacity_bytes.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_mic::MockMicrophoneSource;

    #[test]
    fn warmup_chunks_are_discarded() {
        let uplink = MicrophoneUplink::with_warmup(MockMicrophoneSource::default(), 3);
        uplink.start_capture().unwrap();
        assert!(uplink.tick(320).is_none());
        assert!(uplink.tick(320).is_none());
        assert!(uplink.tick(320).is_none());
        let packet = uplink.tick(320).expect("4th chunk should pass warm-up");
        assert_eq!(packet.decode_type, MIC_DECODE_TYPE);
        assert_eq!(packet.audio_type, MIC_AUDIO_TYPE);
        assert_eq!(packet.volume, MIC_VOLUME);
    }

    #[test]
    fn idle_source_produces_nothing() {
        let uplink = MicrophoneUplink::new(MockMicrophoneSource::default());
        assert!(uplink.tick(320).is_none());
    }

    #[test]
    fn arm_failure_returns_to_idle() {
        let source = MockMicrophoneSource::default();
        source.set_fail_arm(true);
        let uplink = MicrophoneUplink::new(source);
        assert!(uplink.start_capture().is_err());
        assert_eq!(uplink.state(), MicState::Idle);
    }

    #[test]
    fn muted_uplink_emits_nothing_after_warmup() {
        let uplink = MicrophoneUplink::with_warmup(MockMicrophoneSource::default(), 0);
        uplink.start_capture().unwrap();
        uplink.set_muted(true);
        assert!(uplink.tick(320).is_none());
    }

    #[test]
    fn stop_capture_returns_to_idle_and_halts_ticks() {
        let uplink = MicrophoneUplink::with_warmup(MockMicrophoneSource::default(), 0);
        uplink.start_capture().unwrap();
        assert!(uplink.tick(320).is_some());
        uplink.stop_capture();
        assert_eq!(uplink.state(), MicState::Idle);
        assert!(uplink.tick(320).is_none());
    }
}
