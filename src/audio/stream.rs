//! Per-context audio stream state (spec §3 `AudioStream`).

use super::format::AudioFormat;
use super::sink::AudioSink;
use crate::message::AudioContext;
use crate::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use std::time::Instant;

/// Engine-visible lifecycle state for one context's stream (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    PreFill,
    Playing,
    Paused,
    ReleaseScheduled,
}

pub struct AudioStream {
    pub context: AudioContext,
    pub format: AudioFormat,
    pub producer: RingProducer,
    pub consumer: RingConsumer,
    pub sink: Box<dyn AudioSink>,
    pub state: StreamState,
    pub pre_filled: bool,
    pub started_at: Instant,
    pub last_underrun_count: u64,
    pub base_volume: f32,
    /// Ducking multiplier; only ever non-1.0 for the media context.
    pub ducking_level: f32,
}

impl AudioStream {
    pub fn new(
        context: AudioContext,
        format: AudioFormat,
        ring_capacity_ms: u32,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        let capacity_bytes = format.bytes_for_duration(ring_capacity_ms);
        let (producer, consumer) = RingBuffer::split(capacity_bytes.max(1));
        Self {
            context,
            format,
            producer,
            consumer,
            sink,
            state: StreamState::Idle,
            pre_filled: false,
            started_at: Instant::now(),
            last_underrun_count: 0,
            base_volume: 1.0,
            ducking_level: 1.0,
        }
    }

    pub fn effective_volume(&self) -> f32 {
        if self.context == AudioContext::Media {
            self.base_volume * self.ducking_level
        } else {
            self.base_volume
        }
    }
}
