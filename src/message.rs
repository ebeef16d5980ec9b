//! Message model (spec §3, §4.3, §6.2): a tagged sum type over every wire
//! message variant, with a total `Opaque` fallback so an unrecognized type
//! never fails the codec (spec §4.3: "parsing is total").

use crate::frame::RawFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MessageError {
    #[error("{what} payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid JSON in BoxSettings payload: {0}")]
    InvalidJson(String),
}

/// Audio routing context (spec §3). The *only* truthful routing signal —
/// always trust the adapter's tag, never override from internal state
/// (spec §9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioContext {
    Media = 1,
    Navigation = 2,
    PhoneCall = 3,
    VoiceAssistant = 4,
}

impl AudioContext {
    pub fn from_audio_type(audio_type: u32) -> Option<Self> {
        match audio_type {
            1 => Some(Self::Media),
            2 => Some(Self::Navigation),
            3 => Some(Self::PhoneCall),
            4 => Some(Self::VoiceAssistant),
            _ => None,
        }
    }

    pub const ALL: [AudioContext; 4] =
        [Self::Media, Self::Navigation, Self::PhoneCall, Self::VoiceAssistant];
}

/// Session phase, externally visible (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Disconnected,
    Searching,
    DeviceOpened,
    Handshaking,
    Connected,
    Streaming,
    Error,
}

/// Adapter-reported phase carried in a `Phase` message (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterPhase {
    Idle = 0,
    Initializing = 1,
    Active = 2,
    Error = 3,
    ShuttingDown = 4,
}

impl AdapterPhase {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Initializing),
            2 => Some(Self::Active),
            3 => Some(Self::Error),
            4 => Some(Self::ShuttingDown),
            _ => None,
        }
    }
}

/// First-byte audio command of a 13-byte audio command payload (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCommand {
    OutputStart = 1,
    OutputStop = 2,
    InputConfig = 3,
    PhoneCallStart = 4,
    PhoneCallStop = 5,
    NaviStart = 6,
    NaviStop = 7,
    SiriStart = 8,
    SiriStop = 9,
    MediaStart = 10,
    MediaStop = 11,
    AlertStart = 12,
    AlertStop = 13,
}

impl AudioCommand {
    pub fn from_u8(v: u8) -> Option<Self> {
        use AudioCommand::*;
        Some(match v {
            1 => OutputStart,
            2 => OutputStop,
            3 => InputConfig,
            4 => PhoneCallStart,
            5 => PhoneCallStop,
            6 => NaviStart,
            7 => NaviStop,
            8 => SiriStart,
            9 => SiriStop,
            10 => MediaStart,
            11 => MediaStop,
            12 => AlertStart,
            13 => AlertStop,
            _ => return None,
        })
    }
}

/// One audio packet's parsed fields (spec §3 "Audio Payload Header").
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub decode_type: u32,
    pub volume: f32,
    pub audio_type: u32,
    pub body: AudioBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioBody {
    Command(AudioCommand),
    /// Ducking: payload length 16, a 4-byte float duration follows the header.
    Ducking { duration_ms: f32 },
    /// Raw 16-bit LE PCM, held as a byte range view — never includes the
    /// 12-byte header (spec §3 invariant, P2).
    Pcm(Vec<u8>),
}

/// Handshake `Open` payload (spec §6.2, 28 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPayload {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: u32,
    pub max_pkt: u32,
    pub version: u32,
    pub mode: u32,
}

/// Touch payload (spec §6.2, 16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPayload {
    pub action: u32,
    pub x: u32,
    pub y: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiTouchPoint {
    pub action: u32,
    pub x: f32,
    pub y: f32,
    pub id: u32,
}

/// Video payload (spec §4.7, §6.2).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoPacket {
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub h264: Vec<u8>,
}

/// Media metadata (spec §3). Optional fields; last-good values retained by
/// the caller across partial updates (not this struct's job — see
/// `status_monitor.rs`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub song_title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub app_name: Option<String>,
    pub album_art_bytes: Option<Vec<u8>>,
    pub duration_ms: Option<u64>,
}

/// The full tagged union of every wire message (spec §4.3, §6.2). Every
/// parse is total: unrecognized types land in `Opaque`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // Host -> Adapter
    Open(OpenPayload),
    Touch(TouchPayload),
    SendAudio(AudioPacket),
    Command(u32),
    LogoType(u32),
    DisconnectPhone,
    CloseAdapter,
    MultiTouch(Vec<MultiTouchPoint>),
    BoxSettings(serde_json::Value),
    SendFile { name: String, content: Vec<u8> },
    Heartbeat,

    // Adapter -> Host
    Plugged,
    Phase(AdapterPhase),
    Unplugged,
    VideoData(VideoPacket),
    AudioData(AudioPacket),
    NetworkMetadata { kind: u32, raw: Vec<u8> },
    ManufacturerInfo(Vec<u8>),
    MediaData(MediaMetadata),
    SoftwareVersion(String),

    /// Anything the codec doesn't recognize. Forwarded to the message
    /// interceptor unchanged (spec §4.3).
    Opaque { msg_type: u32, bytes: Vec<u8> },
}

pub const TYPE_OPEN: u32 = 0x01;
pub const TYPE_TOUCH: u32 = 0x05;
pub const TYPE_SEND_AUDIO: u32 = 0x07;
pub const TYPE_COMMAND: u32 = 0x08;
pub const TYPE_LOGO: u32 = 0x09;
pub const TYPE_DISCONNECT_PHONE: u32 = 0x0F;
pub const TYPE_CLOSE_ADAPTER: u32 = 0x15;
pub const TYPE_MULTI_TOUCH: u32 = 0x17;
pub const TYPE_BOX_SETTINGS: u32 = 0x19;
pub const TYPE_SEND_FILE: u32 = 0x99;
pub const TYPE_HEARTBEAT: u32 = 0xAA;

pub const TYPE_PLUGGED: u32 = 0x02;
pub const TYPE_PHASE: u32 = 0x03;
pub const TYPE_UNPLUGGED: u32 = 0x04;
pub const TYPE_VIDEO_DATA: u32 = 0x06;
pub const TYPE_NETWORK_METADATA_LOW: u32 = 0x0A;
pub const TYPE_NETWORK_METADATA_HIGH: u32 = 0x0E;
pub const TYPE_MANUFACTURER_INFO: u32 = 0x14;
pub const TYPE_MEDIA_DATA: u32 = 0x2A;
pub const TYPE_SOFTWARE_VERSION: u32 = 0xCC;

fn parse_audio_payload(what: &'static str, payload: &[u8]) -> Result<AudioPacket, MessageError> {
    if payload.len() < 12 {
        return Err(MessageError::TooShort { what, expected: 12, actual: payload.len() });
    }
    let decode_type = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let volume = f32::from_le_bytes(payload[4..8].try_into().unwrap());
    let audio_type = u32::from_le_bytes(payload[8..12].try_into().unwrap());
    let rest = &payload[12..];

    let body = if rest.len() == 1 {
        match AudioCommand::from_u8(rest[0]) {
            Some(cmd) => AudioBody::Command(cmd),
            // Not a recognized command byte; treat conservatively as a
            // single-sample PCM chunk rather than erroring (total parsing).
            None => AudioBody::Pcm(rest.to_vec()),
        }
    } else if rest.len() == 4 {
        let duration_ms = f32::from_le_bytes(rest.try_into().unwrap());
        AudioBody::Ducking { duration_ms }
    } else {
        // Header-view discipline (P2): this is exactly `payload[12..]`, a
        // fresh copy, never sharing the header bytes.
        AudioBody::Pcm(rest.to_vec())
    };

    Ok(AudioPacket { decode_type, volume, audio_type, body })
}

/// Parse a raw decoded frame into a typed [`Message`]. Total: unrecognized
/// types and malformed-but-framed payloads become `Opaque` rather than an
/// error, so a single bad payload never kills the dispatch loop.
pub fn parse(frame: &RawFrame) -> Message {
    let p = &frame.payload;
    match frame.msg_type {
        TYPE_OPEN if p.len() >= 28 => Message::Open(OpenPayload {
            width: le_u32(p, 0),
            height: le_u32(p, 4),
            fps: le_u32(p, 8),
            format: le_u32(p, 12),
            max_pkt: le_u32(p, 16),
            version: le_u32(p, 20),
            mode: le_u32(p, 24),
        }),
        TYPE_TOUCH if p.len() >= 16 => Message::Touch(TouchPayload {
            action: le_u32(p, 0),
            x: le_u32(p, 4),
            y: le_u32(p, 8),
            flags: le_u32(p, 12),
        }),
        // Wire type 0x07 is shared by both directions (spec §6.2); a
        // decoded `RawFrame` only ever comes from the inbound adapter->host
        // stream (outbound messages are built directly via `encode`, never
        // round-tripped through `parse`), so this is always `AudioData`.
        TYPE_SEND_AUDIO => match parse_audio_payload("AudioData", p) {
            Ok(pkt) => Message::AudioData(pkt),
            Err(_) => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
        },
        TYPE_COMMAND if p.len() >= 4 => Message::Command(le_u32(p, 0)),
        TYPE_LOGO if p.len() >= 4 => Message::LogoType(le_u32(p, 0)),
        TYPE_DISCONNECT_PHONE => Message::DisconnectPhone,
        TYPE_CLOSE_ADAPTER => Message::CloseAdapter,
        TYPE_MULTI_TOUCH => Message::MultiTouch(parse_multi_touch(p)),
        TYPE_BOX_SETTINGS => match serde_json::from_slice(p) {
            Ok(v) => Message::BoxSettings(v),
            Err(_) => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
        },
        TYPE_SEND_FILE => match parse_send_file(p) {
            Some(msg) => msg,
            None => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
        },
        TYPE_HEARTBEAT => Message::Heartbeat,

        TYPE_PLUGGED => Message::Plugged,
        TYPE_PHASE if p.len() >= 4 => match AdapterPhase::from_u32(le_u32(p, 0)) {
            Some(phase) => Message::Phase(phase),
            None => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
        },
        TYPE_UNPLUGGED => Message::Unplugged,
        TYPE_VIDEO_DATA => match parse_video(p) {
            Some(pkt) => Message::VideoData(pkt),
            None => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
        },
        TYPE_NETWORK_METADATA_LOW..=TYPE_NETWORK_METADATA_HIGH => {
            Message::NetworkMetadata { kind: frame.msg_type, raw: p.clone() }
        }
        TYPE_MANUFACTURER_INFO => Message::ManufacturerInfo(p.clone()),
        TYPE_MEDIA_DATA => Message::MediaData(parse_media_data(p)),
        TYPE_SOFTWARE_VERSION => {
            Message::SoftwareVersion(String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
        }

        _ => Message::Opaque { msg_type: frame.msg_type, bytes: p.clone() },
    }
}

fn le_u32(p: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(p[off..off + 4].try_into().unwrap())
}

fn parse_multi_touch(p: &[u8]) -> Vec<MultiTouchPoint> {
    const POINT_LEN: usize = 16;
    p.chunks_exact(POINT_LEN)
        .map(|c| MultiTouchPoint {
            action: le_u32(c, 0),
            x: f32::from_le_bytes(c[4..8].try_into().unwrap()),
            y: f32::from_le_bytes(c[8..12].try_into().unwrap()),
            id: le_u32(c, 12),
        })
        .collect()
}

fn parse_video(p: &[u8]) -> Option<VideoPacket> {
    // width(4) height(4) flags(4) h264_len(4) reserved(4) then H.264.
    if p.len() < 20 {
        return None;
    }
    let width = le_u32(p, 0);
    let height = le_u32(p, 4);
    let flags = le_u32(p, 8);
    let h264_len = le_u32(p, 12) as usize;
    if p.len() < 20 + h264_len {
        return None;
    }
    Some(VideoPacket { width, height, flags, h264: p[20..20 + h264_len].to_vec() })
}

fn parse_send_file(p: &[u8]) -> Option<Message> {
    if p.len() < 4 {
        return None;
    }
    let name_len = le_u32(p, 0) as usize;
    if p.len() < 4 + name_len + 4 {
        return None;
    }
    let name = String::from_utf8_lossy(&p[4..4 + name_len]).to_string();
    let content_len_off = 4 + name_len;
    let content_len = le_u32(p, content_len_off) as usize;
    let content_off = content_len_off + 4;
    if p.len() < content_off + content_len {
        return None;
    }
    Some(Message::SendFile { name, content: p[content_off..content_off + content_len].to_vec() })
}

fn parse_media_data(p: &[u8]) -> MediaMetadata {
    serde_json::from_slice(p).unwrap_or_default()
}

/// Encode a [`Message`] that the host sends to the adapter into its wire
/// `(type, payload)` pair; the frame codec (§4.2) wraps this with the
/// magic/length/checksum header. Only host->adapter variants are
/// meaningful here; adapter->host variants are never encoded by this side.
pub fn encode(msg: &Message) -> Result<(u32, Vec<u8>), MessageError> {
    let (msg_type, payload): (u32, Vec<u8>) = match msg {
        Message::Open(p) => (
            TYPE_OPEN,
            [p.width, p.height, p.fps, p.format, p.max_pkt, p.version, p.mode]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        ),
        Message::Touch(t) => (
            TYPE_TOUCH,
            [t.action, t.x, t.y, t.flags].iter().flat_map(|v| v.to_le_bytes()).collect(),
        ),
        Message::SendAudio(pkt) => (TYPE_SEND_AUDIO, encode_audio_packet(pkt)),
        Message::Command(c) => (TYPE_COMMAND, c.to_le_bytes().to_vec()),
        Message::LogoType(l) => (TYPE_LOGO, l.to_le_bytes().to_vec()),
        Message::DisconnectPhone => (TYPE_DISCONNECT_PHONE, Vec::new()),
        Message::CloseAdapter => (TYPE_CLOSE_ADAPTER, Vec::new()),
        Message::MultiTouch(points) => (
            TYPE_MULTI_TOUCH,
            points
                .iter()
                .flat_map(|pt| {
                    let mut b = Vec::with_capacity(16);
                    b.extend_from_slice(&pt.action.to_le_bytes());
                    b.extend_from_slice(&pt.x.to_le_bytes());
                    b.extend_from_slice(&pt.y.to_le_bytes());
                    b.extend_from_slice(&pt.id.to_le_bytes());
                    b
                })
                .collect(),
        ),
        Message::BoxSettings(v) => (
            TYPE_BOX_SETTINGS,
            serde_json::to_vec(v).map_err(|e| MessageError::InvalidJson(e.to_string()))?,
        ),
        Message::SendFile { name, content } => {
            let mut b = Vec::with_capacity(8 + name.len() + content.len());
            b.extend_from_slice(&(name.len() as u32).to_le_bytes());
            b.extend_from_slice(name.as_bytes());
            b.extend_from_slice(&(content.len() as u32).to_le_bytes());
            b.extend_from_slice(content);
            (TYPE_SEND_FILE, b)
        }
        Message::Heartbeat => (TYPE_HEARTBEAT, Vec::new()),
        other => {
            return Err(MessageError::InvalidJson(format!(
                "{other:?} is an adapter->host message and cannot be encoded by the host"
            )))
        }
    };
    Ok((msg_type, payload))
}

fn encode_audio_packet(pkt: &AudioPacket) -> Vec<u8> {
    let mut b = Vec::with_capacity(16);
    b.extend_from_slice(&pkt.decode_type.to_le_bytes());
    b.extend_from_slice(&pkt.volume.to_le_bytes());
    b.extend_from_slice(&pkt.audio_type.to_le_bytes());
    match &pkt.body {
        AudioBody::Command(cmd) => b.push(*cmd as u8),
        AudioBody::Ducking { duration_ms } => b.extend_from_slice(&duration_ms.to_le_bytes()),
        AudioBody::Pcm(samples) => b.extend_from_slice(samples),
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;

    fn raw(msg_type: u32, payload: Vec<u8>) -> RawFrame {
        RawFrame { msg_type, payload }
    }

    #[test]
    fn unknown_type_becomes_opaque() {
        let msg = parse(&raw(0xDEAD, vec![1, 2, 3]));
        assert_eq!(msg, Message::Opaque { msg_type: 0xDEAD, bytes: vec![1, 2, 3] });
    }

    #[test]
    fn heartbeat_has_empty_payload() {
        assert_eq!(parse(&raw(TYPE_HEARTBEAT, vec![])), Message::Heartbeat);
    }

    #[test]
    fn touch_parses_fields() {
        let mut p = Vec::new();
        for v in [1u32, 5000, 2500, 0] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        let msg = parse(&raw(TYPE_TOUCH, p));
        assert_eq!(
            msg,
            Message::Touch(TouchPayload { action: 1, x: 5000, y: 2500, flags: 0 })
        );
    }

    /// P2: header-view discipline — the PCM body is exactly payload[12..].
    #[test]
    fn p2_audio_pcm_excludes_header_bytes() {
        let mut payload = vec![0u8; 12];
        payload[0..4].copy_from_slice(&4u32.to_le_bytes()); // decode_type
        payload[4..8].copy_from_slice(&1.0f32.to_le_bytes()); // volume
        payload[8..12].copy_from_slice(&1u32.to_le_bytes()); // audio_type (media)
        let pcm: Vec<u8> = (0..960u16).flat_map(|s| s.to_le_bytes()).collect();
        payload.extend_from_slice(&pcm);

        let msg = parse(&raw(TYPE_SEND_AUDIO, payload.clone()));
        match msg {
            Message::AudioData(AudioPacket { body: AudioBody::Pcm(bytes), .. }) => {
                assert_eq!(bytes, payload[12..]);
                assert_ne!(bytes, payload);
            }
            other => panic!("expected Pcm body, got {other:?}"),
        }
    }

    #[test]
    fn ducking_payload_parses_16_bytes() {
        let mut payload = vec![0u8; 12];
        payload[4..8].copy_from_slice(&0.2f32.to_le_bytes());
        payload.extend_from_slice(&500.0f32.to_le_bytes());
        let msg = parse(&raw(TYPE_SEND_AUDIO, payload));
        match msg {
            Message::AudioData(AudioPacket { volume, body: AudioBody::Ducking { duration_ms }, .. }) => {
                assert!((volume - 0.2).abs() < f32::EPSILON);
                assert!((duration_ms - 500.0).abs() < f32::EPSILON);
            }
            other => panic!("expected Ducking body, got {other:?}"),
        }
    }

    #[test]
    fn audio_command_byte_parses() {
        let mut payload = vec![0u8; 12];
        payload.push(AudioCommand::SiriStart as u8);
        let msg = parse(&raw(TYPE_SEND_AUDIO, payload));
        match msg {
            Message::AudioData(AudioPacket { body: AudioBody::Command(cmd), .. }) => {
                assert_eq!(cmd, AudioCommand::SiriStart);
            }
            other => panic!("expected Command body, got {other:?}"),
        }
    }

    #[test]
    fn box_settings_round_trips_unknown_keys() {
        let json = serde_json::json!({ "known": 1, "firmware_extra_field": "unrecognized" });
        let bytes = serde_json::to_vec(&json).unwrap();
        let msg = parse(&raw(TYPE_BOX_SETTINGS, bytes));
        assert_eq!(msg, Message::BoxSettings(json));
    }

    #[test]
    fn video_data_parses_header_and_h264_slice() {
        let h264 = vec![0x00, 0x00, 0x00, 0x01, 0x67];
        let mut p = Vec::new();
        p.extend_from_slice(&1280u32.to_le_bytes());
        p.extend_from_slice(&720u32.to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&(h264.len() as u32).to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&h264);

        let msg = parse(&raw(TYPE_VIDEO_DATA, p));
        match msg {
            Message::VideoData(pkt) => {
                assert_eq!(pkt.width, 1280);
                assert_eq!(pkt.height, 720);
                assert_eq!(pkt.h264, h264);
            }
            other => panic!("expected VideoData, got {other:?}"),
        }
    }

    #[test]
    fn open_encode_decode_roundtrip() {
        let payload = OpenPayload {
            width: 800,
            height: 480,
            fps: 60,
            format: 5,
            max_pkt: 49152,
            version: 1,
            mode: 2,
        };
        let (msg_type, bytes) = encode(&Message::Open(payload)).unwrap();
        assert_eq!(msg_type, TYPE_OPEN);
        let msg = parse(&raw(TYPE_OPEN, bytes));
        assert_eq!(msg, Message::Open(payload));
    }
}
