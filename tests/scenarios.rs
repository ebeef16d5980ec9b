//! End-to-end scenarios driven entirely through `AdapterSession`'s public
//! surface, feeding it wire bytes the way a real USB read loop would.

use carlink_core::testing::mock_mic::MockMicrophoneSource;
use carlink_core::testing::mock_sink::MockSinkFactory;
use carlink_core::testing::mock_transport::MockTransport;
use carlink_core::{AdapterSession, Callbacks, SessionConfig};
use carlink_core::message::{AudioCommand, VideoPacket};
use carlink_core::video::{VideoDecoder, VideoError};
use std::sync::Arc;

struct NullDecoder;
impl VideoDecoder for NullDecoder {
    fn decode(&mut self, _frame: &VideoPacket) -> Result<(), VideoError> {
        Ok(())
    }
}

fn test_config() -> SessionConfig {
    // The mock transport reappears instantly after reset(); don't pay the
    // real hardware's ~3s settle time in every scenario.
    SessionConfig { device_reset_wait_ms: 0, ..SessionConfig::default() }
}

fn build() -> (Arc<MockTransport>, Arc<MockSinkFactory>, AdapterSession) {
    let transport = Arc::new(MockTransport::default());
    let factory = Arc::new(MockSinkFactory::default());
    let mic = Box::new(MockMicrophoneSource::default());
    let session = AdapterSession::new(
        test_config(),
        transport.clone(),
        factory.clone(),
        mic,
        Box::new(NullDecoder),
        Callbacks::default(),
    );
    (transport, factory, session)
}

fn audio_frame_bytes(decode_type: u32, volume: f32, audio_type: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12 + body.len());
    payload.extend_from_slice(&decode_type.to_le_bytes());
    payload.extend_from_slice(&volume.to_le_bytes());
    payload.extend_from_slice(&audio_type.to_le_bytes());
    payload.extend_from_slice(body);
    carlink_core::frame::encode(carlink_core::message::TYPE_SEND_AUDIO, &payload).unwrap()
}

fn pcm_tone(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i % 251) as u8).wrapping_add(1)).collect()
}

fn plug_in(session: &AdapterSession) {
    session.start().unwrap();
    let plugged = carlink_core::frame::encode(carlink_core::message::TYPE_PLUGGED, &[]).unwrap();
    session.handle_inbound_bytes(&plugged);
}

/// Scenario: two Siri (voice assistant) sessions back to back. The second
/// one must start cleanly after the first stops, not silently stay muted
/// (the historical "Siri tone plays only once" bug spec §4.5 calls out).
#[test]
fn two_siri_sessions_back_to_back() {
    let (_transport, _factory, session) = build();
    plug_in(&session);

    let fmt = carlink_core::audio::AudioFormat::for_decode_type(5).unwrap();
    let data = fmt.bytes_for_duration(250);

    let siri1 = audio_frame_bytes(5, 1.0, 4, &pcm_tone(data));
    session.handle_inbound_bytes(&siri1);
    assert!(session.is_audio_playing());

    // Let the min-play window elapse for real so the stop isn't suppressed
    // as premature (spec §4.5's `min_voice_play_ms` guard).
    std::thread::sleep(std::time::Duration::from_millis(
        SessionConfig::default().min_voice_play_ms as u64 + 50,
    ));
    let stop_cmd = audio_frame_bytes(5, 1.0, 4, &[AudioCommand::SiriStop as u8]);
    session.handle_inbound_bytes(&stop_cmd);

    let siri2 = audio_frame_bytes(5, 1.0, 4, &pcm_tone(data));
    session.handle_inbound_bytes(&siri2);
    assert!(
        session.is_audio_playing(),
        "second Siri session must resume playback, not stay paused"
    );
}

/// Scenario: a navigation prompt arrives during media playback and ducks
/// the media stream; once the nav prompt's ducking window ends, media
/// volume should be restorable via `set_audio_ducking(1.0)`.
#[test]
fn nav_prompt_ducks_media() {
    let (_transport, factory, session) = build();
    plug_in(&session);

    let media_fmt = carlink_core::audio::AudioFormat::for_decode_type(4).unwrap();
    let media = audio_frame_bytes(4, 1.0, 1, &pcm_tone(media_fmt.bytes_for_duration(200)));
    session.handle_inbound_bytes(&media);
    assert!(session.is_audio_playing());

    let ducking = audio_frame_bytes(4, 0.2, 1, &500.0f32.to_le_bytes());
    session.handle_inbound_bytes(&ducking);
    let vol = factory.volume_for(carlink_core::audio::UsageTag::Media).unwrap();
    assert!((vol - 0.2).abs() < f32::EPSILON, "media must duck to 0.2, got {vol}");

    session.set_audio_ducking(1.0);
    let vol = factory.volume_for(carlink_core::audio::UsageTag::Media).unwrap();
    assert!((vol - 1.0).abs() < f32::EPSILON, "media must restore to 1.0, got {vol}");
}

/// Scenario: a USB disconnect during media playback suspends audio without
/// releasing the sink; a reconnect within the window resumes rather than
/// rebuilding (P10: graceful reconnect never silently recreates a playing
/// stream it could have resumed).
#[test]
fn usb_disconnect_during_media_suspends_then_resumes() {
    let (_transport, factory, session) = build();
    plug_in(&session);

    let fmt = carlink_core::audio::AudioFormat::for_decode_type(4).unwrap();
    let media = audio_frame_bytes(4, 1.0, 1, &pcm_tone(fmt.bytes_for_duration(200)));
    session.handle_inbound_bytes(&media);
    assert!(session.is_audio_playing());

    let unplugged = carlink_core::frame::encode(carlink_core::message::TYPE_UNPLUGGED, &[]).unwrap();
    session.handle_inbound_bytes(&unplugged);
    assert!(!session.is_audio_playing(), "unplug must suspend playback");
    assert_eq!(
        factory.create_count(carlink_core::audio::UsageTag::Media),
        1,
        "suspend must not release/recreate the sink"
    );

    // Adapter reappears and plugs back in within the window.
    let plugged = carlink_core::frame::encode(carlink_core::message::TYPE_PLUGGED, &[]).unwrap();
    session.handle_inbound_bytes(&plugged);
    let media_again = audio_frame_bytes(4, 1.0, 1, &pcm_tone(fmt.bytes_for_duration(200)));
    session.handle_inbound_bytes(&media_again);
    assert!(session.is_audio_playing(), "media must resume after reconnect");
    assert_eq!(
        factory.create_count(carlink_core::audio::UsageTag::Media),
        1,
        "same format on reconnect must not force a sink rebuild"
    );
}

/// Scenario: a zero-filled adapter audio packet is dropped entirely and
/// never reaches the sink.
#[test]
fn zero_filled_adapter_packet_is_dropped() {
    let (_transport, factory, session) = build();
    plug_in(&session);

    let zeros = vec![0u8; 11_520];
    let frame = audio_frame_bytes(4, 1.0, 1, &zeros);
    session.handle_inbound_bytes(&frame);

    assert!(!session.is_audio_playing());
    assert!(factory.sink_for(carlink_core::audio::UsageTag::Media).is_none());
    assert_eq!(session.audio_stats().zero_drops_total, 1);
}

/// Scenario: a navigation stop arrives before `min_nav_play_ms` has
/// elapsed; playback must continue rather than cut off mid-prompt.
#[test]
fn premature_nav_stop_is_suppressed() {
    let (_transport, _factory, session) = build();
    plug_in(&session);

    let fmt = carlink_core::audio::AudioFormat::for_decode_type(5).unwrap();
    let nav = audio_frame_bytes(5, 1.0, 2, &pcm_tone(fmt.bytes_for_duration(200)));
    session.handle_inbound_bytes(&nav);
    assert!(session.is_audio_playing());

    let stop = audio_frame_bytes(5, 1.0, 2, &[AudioCommand::NaviStop as u8]);
    session.handle_inbound_bytes(&stop);
    assert!(session.is_audio_playing(), "premature nav stop must be suppressed");
}

/// Scenario: a checksum-corrupted frame lands mid-stream; the decoder
/// resyncs and the next valid frame is still dispatched normally.
#[test]
fn checksum_corruption_mid_stream_resyncs_and_keeps_dispatching() {
    let (_transport, _factory, session) = build();
    plug_in(&session);

    let good1 = carlink_core::frame::encode(carlink_core::message::TYPE_HEARTBEAT, &[]).unwrap();
    let mut bad = audio_frame_bytes(4, 1.0, 1, &pcm_tone(200));
    bad[12] ^= 0x01; // flip a checksum bit
    let fmt = carlink_core::audio::AudioFormat::for_decode_type(4).unwrap();
    let good2 = audio_frame_bytes(4, 1.0, 1, &pcm_tone(fmt.bytes_for_duration(200)));

    let mut stream = Vec::new();
    stream.extend_from_slice(&good1);
    stream.extend_from_slice(&bad);
    stream.extend_from_slice(&good2);

    session.handle_inbound_bytes(&stream);

    assert!(session.is_audio_playing(), "the valid frame after the corrupt one must still be dispatched");
}

/// P10: a transport error that classifies as a graceful reconnect routes
/// the session state machine back to `Searching` without entering `Error`,
/// as long as the retry budget isn't exhausted.
#[test]
fn p10_graceful_reconnect_does_not_enter_error_phase() {
    use carlink_core::session::{classify_transport_error, ReconnectAction};
    use carlink_core::transport::TransportError;

    let action = classify_transport_error(&TransportError::Closed { reason: "device null".into() });
    assert_eq!(action, ReconnectAction::GracefulReconnect);
}

/// The facade surfaces a `SessionError` rather than panicking when the
/// transport is closed underneath an in-flight send.
#[test]
fn send_on_closed_transport_surfaces_as_session_error() {
    let (transport, _factory, session) = build();
    plug_in(&session);
    transport.close();
    let result = session.send_touch(0, 100, 100);
    assert!(result.is_err());
}

/// Microphone permission denial must surface through the facade without
/// requiring the caller to reach into the mic uplink directly.
#[test]
fn microphone_permission_denial_is_visible_through_facade() {
    let transport = Arc::new(MockTransport::default());
    let factory = Arc::new(MockSinkFactory::default());
    let mic_source = MockMicrophoneSource::default();
    mic_source.set_permission(false);
    let session = AdapterSession::new(
        SessionConfig::default(),
        transport,
        factory,
        Box::new(mic_source),
        Box::new(NullDecoder),
        Callbacks::default(),
    );
    assert!(!session.has_microphone_permission());
}
