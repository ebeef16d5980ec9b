//! Session timers (spec §4.8): pair timeout, frame interval, heartbeat.
//! Modeled as plain deadline tracking over `Instant` rather than spawned
//! tasks, so the controller can be driven by a single cooperative tick the
//! same way [`crate::audio::AudioStreamEngine::run_iteration`] is — tests
//! advance a fake `now` instead of racing real sleeps.

use std::time::{Duration, Instant};

pub struct SessionTimers {
    pair_deadline: Option<Instant>,
    next_heartbeat: Option<Instant>,
    next_frame_trigger: Option<Instant>,
    heartbeat_interval: Duration,
    frame_interval: Duration,
    pair_timeout: Duration,
}

impl SessionTimers {
    pub fn new(heartbeat_ms: u64, frame_interval_ms: u64, pair_timeout_ms: u64) -> Self {
        Self {
            pair_deadline: None,
            next_heartbeat: None,
            next_frame_trigger: None,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            frame_interval: Duration::from_millis(frame_interval_ms),
            pair_timeout: Duration::from_millis(pair_timeout_ms),
        }
    }

    /// Arms the pair-Wi-Fi deadline (spec §4.8 "15s after start").
    pub fn arm_pair_timeout(&mut self, now: Instant) {
        self.pair_deadline = Some(now + self.pair_timeout);
    }

    pub fn clear_pair_timeout(&mut self) {
        self.pair_deadline = None;
    }

    /// Consumes the pair deadline if it has elapsed, returning whether the
    /// pair-Wi-Fi command should be sent. One-shot: calling again after a
    /// `true` result returns `false` until re-armed.
    pub fn poll_pair_timeout(&mut self, now: Instant) -> bool {
        match self.pair_deadline {
            Some(deadline) if now >= deadline => {
                self.pair_deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Starts the heartbeat/frame-trigger cadence from `now` (spec §4.8:
    /// both begin once `Connected` is reached).
    pub fn start_cadence(&mut self, now: Instant) {
        self.next_heartbeat = Some(now + self.heartbeat_interval);
        self.next_frame_trigger = Some(now + self.frame_interval);
    }

    pub fn stop_cadence(&mut self) {
        self.next_heartbeat = None;
        self.next_frame_trigger = None;
    }

    /// Returns true (and reschedules) if a heartbeat is due.
    pub fn poll_heartbeat(&mut self, now: Instant) -> bool {
        match self.next_heartbeat {
            Some(deadline) if now >= deadline => {
                self.next_heartbeat = Some(now + self.heartbeat_interval);
                true
            }
            _ => false,
        }
    }

    /// Returns true (and reschedules) if a frame-trigger command is due.
    pub fn poll_frame_trigger(&mut self, now: Instant) -> bool {
        match self.next_frame_trigger {
            Some(deadline) if now >= deadline => {
                self.next_frame_trigger = Some(now + self.frame_interval);
                true
            }
            _ => false,
        }
    }

    pub fn set_frame_interval(&mut self, frame_interval: Duration) {
        self.frame_interval = frame_interval;
    }
}
