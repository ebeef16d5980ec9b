//! Status monitor (spec §4.10, part of C9): a passive observer tapped onto
//! every dispatched message. It never commands the adapter — it only
//! reflects what has already been observed.

use crate::message::{AdapterPhase, AudioContext, Message};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const RECENT_ACTIVITY_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Wired,
    Wireless,
}

#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub adapter_phase: Option<AdapterPhase>,
    pub connection_type: Option<ConnectionType>,
    pub firmware_version: Option<String>,
    pub manufacturer_info: Option<Vec<u8>>,
    pub box_settings: Option<serde_json::Value>,
    pub network_metadata: Vec<(u32, Vec<u8>)>,
}

/// Observes the message stream (via the facade's `on_message_intercepted`
/// hook — spec §4.9) and derives a read-only status snapshot, including a
/// pruned 5-second ring of recent audio activity per context.
pub struct StatusMonitor {
    phase: Option<AdapterPhase>,
    connection_type: Option<ConnectionType>,
    firmware_version: Option<String>,
    manufacturer_info: Option<Vec<u8>>,
    box_settings: Option<serde_json::Value>,
    network_metadata: Vec<(u32, Vec<u8>)>,
    recent_audio: HashMap<AudioContext, VecDeque<Instant>>,
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self {
            phase: None,
            connection_type: None,
            firmware_version: None,
            manufacturer_info: None,
            box_settings: None,
            network_metadata: Vec::new(),
            recent_audio: HashMap::new(),
        }
    }

    /// Feeds one dispatched message. Call for every message the session
    /// observes, adapter-to-host or host-to-adapter alike.
    pub fn observe(&mut self, message: &Message, now: Instant) {
        match message {
            Message::Phase(phase) => self.phase = Some(*phase),
            Message::SoftwareVersion(version) => self.firmware_version = Some(version.clone()),
            Message::ManufacturerInfo(bytes) => self.manufacturer_info = Some(bytes.clone()),
            Message::BoxSettings(value) => self.box_settings = Some(value.clone()),
            Message::NetworkMetadata { kind, raw } => self.network_metadata.push((*kind, raw.clone())),
            Message::Plugged => self.connection_type = Some(ConnectionType::Wired),
            Message::AudioData(packet) => {
                if let Some(context) = AudioContext::from_audio_type(packet.audio_type) {
                    self.record_audio_activity(context, now);
                }
            }
            _ => {}
        }
    }

    pub fn set_connection_type(&mut self, connection_type: ConnectionType) {
        self.connection_type = Some(connection_type);
    }

    fn record_audio_activity(&mut self, context: AudioContext, now: Instant) {
        let ring = self.recent_audio.entry(context).or_default();
        ring.push_back(now);
        self.prune(ring, now);
    }

    fn prune(&self, ring: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = ring.front() {
            if now.duration_since(front) > RECENT_ACTIVITY_WINDOW {
                ring.pop_front();
            } else {
                break;
            }
        }
    }

    /// True if `context` has had audio activity within the trailing window,
    /// pruning stale entries as a side effect (spec §4.10).
    pub fn is_recently_active(&mut self, context: AudioContext, now: Instant) -> bool {
        match self.recent_audio.get_mut(&context) {
            Some(ring) => {
                while let Some(&front) = ring.front() {
                    if now.duration_since(front) > RECENT_ACTIVITY_WINDOW {
                        ring.pop_front();
                    } else {
                        break;
                    }
                }
                !ring.is_empty()
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            adapter_phase: self.phase,
            connection_type: self.connection_type,
            firmware_version: self.firmware_version.clone(),
            manufacturer_info: self.manufacturer_info.clone(),
            box_settings: self.box_settings.clone(),
            network_metadata: self.network_metadata.clone(),
        }
    }
}
