//! Session configuration (spec §6.5).
//!
//! A plain serde-derived record. The core never parses argv or reads
//! environment variables directly — the host application owns config
//! persistence and hands this struct to [`crate::facade::AdapterSession::new`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Phone type inferred from the adapter's `Open` handshake `mode` field
/// (spec §11, "Configurable `frame_interval_ms_per_phone_type`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhoneType {
    CarPlay,
    AndroidAuto,
    AndroidAutoWireless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub dpi: u32,

    pub audio_enabled: bool,
    pub microphone_enabled: bool,

    /// Pre-fill threshold, general default (spec §4.5).
    pub media_prefill_ms: u32,
    pub nav_prefill_ms: u32,

    pub min_media_play_ms: u32,
    pub min_nav_play_ms: u32,
    pub min_voice_play_ms: u32,
    pub min_call_play_ms: u32,

    pub mic_ring_ms: u32,
    pub mic_warmup_chunks: u32,

    pub underrun_threshold: u32,

    pub video_backpressure_threshold: usize,
    pub video_target_queue_depth: usize,

    pub heartbeat_ms: u64,
    pub pair_timeout_ms: u64,

    /// How long the `DeviceOpened` transition waits after `reset()` for the
    /// device to disappear and reappear before re-opening (spec §4.8:
    /// "open + reset + wait ~3 s + re-open").
    pub device_reset_wait_ms: u64,

    /// Per-phone-type frame-trigger interval (spec §6.5, §11). Looked up by
    /// the [`PhoneType`] inferred from the handshake; falls back to
    /// `default_frame_interval_ms` for a mode this table has no entry for.
    pub frame_interval_ms_per_phone_type: HashMap<PhoneType, u64>,
    pub default_frame_interval_ms: u64,

    pub max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut frame_interval_ms_per_phone_type = HashMap::new();
        frame_interval_ms_per_phone_type.insert(PhoneType::CarPlay, 5000);
        frame_interval_ms_per_phone_type.insert(PhoneType::AndroidAuto, 5000);
        frame_interval_ms_per_phone_type.insert(PhoneType::AndroidAutoWireless, 8000);

        Self {
            width: 800,
            height: 480,
            fps: 30,
            dpi: 160,

            audio_enabled: true,
            microphone_enabled: true,

            media_prefill_ms: 150,
            nav_prefill_ms: 65,

            min_media_play_ms: 0,
            min_nav_play_ms: 300,
            min_voice_play_ms: 200,
            min_call_play_ms: 200,

            mic_ring_ms: 500,
            mic_warmup_chunks: 5,

            underrun_threshold: 10,

            video_backpressure_threshold: 8,
            video_target_queue_depth: 2,

            heartbeat_ms: 2000,
            pair_timeout_ms: 15_000,
            device_reset_wait_ms: 3000,

            frame_interval_ms_per_phone_type,
            default_frame_interval_ms: 5000,

            max_retries: 3,
        }
    }
}

impl SessionConfig {
    /// Media pre-fill threshold for a given sample rate (spec §4.5: "130ms
    /// for 44.1/48kHz media, 65ms for navigation" — navigation uses
    /// [`Self::nav_prefill_ms`] directly; this covers the media-rate split).
    pub fn media_prefill_ms_for_rate(&self, rate_hz: u32) -> u32 {
        if rate_hz == 44_100 || rate_hz == 48_000 {
            130
        } else {
            self.media_prefill_ms
        }
    }

    pub fn frame_interval_ms(&self, phone_type: Option<PhoneType>) -> u64 {
        phone_type
            .and_then(|p| self.frame_interval_ms_per_phone_type.get(&p).copied())
            .unwrap_or(self.default_frame_interval_ms)
    }
}
