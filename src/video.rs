//! Video forwarder (spec §4.7, C7): a bounded backpressure queue between
//! the frame parser and the platform decoder, dropping the oldest queued
//! frames when the decoder falls behind rather than blocking the read loop.

use crate::error::Anomaly;
use crate::message::VideoPacket;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VideoError {
    #[error("decoder rejected frame: {0}")]
    DecoderRejected(String),
}

/// The platform H.264 decoder/renderer (spec §6.5). Out-of-scope
/// collaborator; a platform binding owns the actual decode pipeline.
pub trait VideoDecoder: Send {
    fn decode(&mut self, frame: &VideoPacket) -> Result<(), VideoError>;
}

/// Queues frames for a `VideoDecoder`, enforcing the backpressure policy
/// from spec §4.7: once the queue exceeds `backpressure_threshold`, drop
/// the oldest queued frames until back down to `target_queue_depth`.
pub struct VideoForwarder {
    decoder: Box<dyn VideoDecoder>,
    queue: Mutex<VecDeque<VideoPacket>>,
    backpressure_threshold: usize,
    target_queue_depth: usize,
    frames_dropped: AtomicU64,
}

impl VideoForwarder {
    pub fn new(
        decoder: Box<dyn VideoDecoder>,
        backpressure_threshold: usize,
        target_queue_depth: usize,
    ) -> Self {
        Self {
            decoder,
            queue: Mutex::new(VecDeque::new()),
            backpressure_threshold,
            target_queue_depth,
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// spec §4.7 `push_frame(packet)`.
    pub fn push_frame(&self, packet: VideoPacket) -> Option<Anomaly> {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(packet);

        let mut anomaly = None;
        if queue.len() > self.backpressure_threshold {
            let mut dropped = 0u64;
            while queue.len() > self.target_queue_depth {
                queue.pop_front();
                dropped += 1;
            }
            self.frames_dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::warn!(dropped, queue_len = queue.len(), "video backpressure: dropping stale frames");
            anomaly = Some(Anomaly::BackpressureExceeded { frames_dropped: dropped });
        }
        anomaly
    }

    /// Drains and decodes whatever is currently queued, in order. Mirrors
    /// the engine's `run_iteration` shape: a synchronous pass a caller
    /// drives from its own loop rather than a thread owned by this type.
    pub fn drain(&mut self) -> Result<usize, VideoError> {
        let frames: Vec<VideoPacket> = {
            let mut queue = self.queue.lock().unwrap();
            queue.drain(..).collect()
        };
        let count = frames.len();
        for frame in frames {
            self.decoder.decode(&frame)?;
        }
        Ok(count)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}
