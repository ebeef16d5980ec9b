//! Adapter facade (spec §4.9, C9): the stable public surface application
//! code programs against. Wires the frame codec, message model, session
//! controller, audio engine, video forwarder, and microphone uplink
//! together; owns the one outbound-write lock the concurrency model
//! requires (spec §5 "Outbound frames are strictly serialized").

use crate::audio::{AudioSinkFactory, AudioStats, AudioStreamEngine, AudioFormat};
use crate::config::SessionConfig;
use crate::error::{Anomaly, Result, SessionError};
use crate::frame::{self, FrameDecoder};
use crate::message::{
    self, AudioBody, AudioContext, AudioPacket, Message, MultiTouchPoint, OpenPayload, SessionPhase,
    TouchPayload,
};
use crate::microphone::{MicrophoneSource, MicrophoneUplink};
use crate::preferences::{LogLevel, LogSink};
use crate::session::{classify_transport_error, SessionStateMachine, SessionTimers};
use crate::status_monitor::{StatusMonitor, StatusSnapshot};
use crate::transport::UsbTransport;
use crate::video::{VideoDecoder, VideoForwarder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const HOST_OUTBOUND_ENDPOINT: u8 = 0x02;
pub const HOST_INBOUND_ENDPOINT: u8 = 0x81;

#[derive(Debug, Default, Clone, Copy)]
pub struct MicStats {
    pub warmup_chunks_discarded: u64,
}

/// User-registered reactions (spec §4.9: `on_state_changed`, `on_media_info`,
/// `on_log`, `on_host_ui`, `on_message_intercepted`). All are best-effort:
/// a callback that panics is not this crate's problem to survive, but the
/// dispatch loop never lets a *missing* callback short-circuit anything
/// else (spec §7: "User callbacks that fail are logged and isolated").
#[derive(Default)]
pub struct Callbacks {
    pub on_state_changed: Option<Box<dyn Fn(SessionPhase) + Send + Sync>>,
    pub on_media_info: Option<Box<dyn Fn(&crate::message::MediaMetadata) + Send + Sync>>,
    pub on_log: Option<Arc<dyn LogSink>>,
    pub on_host_ui: Option<Box<dyn Fn(crate::message::AdapterPhase) + Send + Sync>>,
    pub on_message_intercepted: Option<Box<dyn Fn(&Message) + Send + Sync>>,
}

pub struct AdapterSession {
    config: SessionConfig,
    transport: Arc<dyn UsbTransport>,
    outbound_lock: Mutex<()>,
    decoder: Mutex<FrameDecoder>,
    state_machine: Mutex<SessionStateMachine>,
    timers: Mutex<SessionTimers>,
    audio: AudioStreamEngine,
    video: Mutex<VideoForwarder>,
    mic: MicrophoneUplink<Box<dyn MicrophoneSource>>,
    status_monitor: Mutex<StatusMonitor>,
    callbacks: Mutex<Callbacks>,
    audio_enabled: AtomicBool,
    mic_enabled: AtomicBool,
    running: AtomicBool,
}

impl AdapterSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn UsbTransport>,
        sink_factory: Arc<dyn AudioSinkFactory>,
        mic_source: Box<dyn MicrophoneSource>,
        video_decoder: Box<dyn VideoDecoder>,
        callbacks: Callbacks,
    ) -> Self {
        let state_machine = SessionStateMachine::new(config.max_retries);
        let timers = SessionTimers::new(config.heartbeat_ms, config.default_frame_interval_ms, config.pair_timeout_ms);
        let audio = AudioStreamEngine::new(config.clone(), sink_factory);
        let video = VideoForwarder::new(
            video_decoder,
            config.video_backpressure_threshold,
            config.video_target_queue_depth,
        );
        let mic = MicrophoneUplink::with_warmup(mic_source, config.mic_warmup_chunks);
        let audio_enabled = config.audio_enabled;
        let mic_enabled = config.microphone_enabled;

        Self {
            config,
            transport,
            outbound_lock: Mutex::new(()),
            decoder: Mutex::new(FrameDecoder::default()),
            state_machine: Mutex::new(state_machine),
            timers: Mutex::new(timers),
            audio,
            video: Mutex::new(video),
            mic,
            status_monitor: Mutex::new(StatusMonitor::new()),
            callbacks: Mutex::new(callbacks),
            audio_enabled: AtomicBool::new(audio_enabled),
            mic_enabled: AtomicBool::new(mic_enabled),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn notify_state(&self, phase: SessionPhase) {
        tracing::debug!(?phase, "session phase changed");
        if let Some(cb) = &self.callbacks.lock().unwrap().on_state_changed {
            cb(phase);
        }
    }

    fn notify_log(&self, level: LogLevel, message: &str) {
        if let Some(sink) = &self.callbacks.lock().unwrap().on_log {
            sink.on_log(level, message);
        }
    }

    fn transport_err(e: crate::transport::TransportError) -> SessionError {
        match e {
            crate::transport::TransportError::PermissionDenied(msg) => SessionError::PermissionDenied(msg),
            crate::transport::TransportError::Timeout { endpoint, elapsed_ms } => {
                SessionError::TransportTimeout { endpoint, elapsed_ms }
            }
            crate::transport::TransportError::Closed { reason } => SessionError::TransportClosed { reason },
            crate::transport::TransportError::NotFound => {
                SessionError::TransportClosed { reason: "device not found".into() }
            }
        }
    }

    /// spec §4.9 `start()`. Idempotent once past `Disconnected` (P9: a
    /// second `start()` on an already-connected session must not re-send
    /// `Open`).
    pub fn start(&self) -> Result<()> {
        let already_running = {
            let sm = self.state_machine.lock().unwrap();
            sm.phase() != SessionPhase::Disconnected
        };
        if already_running {
            return Ok(());
        }
        self.running.store(true, Ordering::Relaxed);

        self.transport.open().map_err(Self::transport_err)?;

        {
            let mut sm = self.state_machine.lock().unwrap();
            sm.start();
        }
        self.notify_state(SessionPhase::Searching);

        // spec §4.8 DeviceOpened action: "open + reset + wait ~3 s +
        // re-open" — the device is expected to drop off the bus and come
        // back before the interface is claimed.
        self.transport.reset().map_err(Self::transport_err)?;
        std::thread::sleep(std::time::Duration::from_millis(self.config.device_reset_wait_ms));
        self.transport.open().map_err(Self::transport_err)?;
        self.transport
            .claim(crate::transport::CLAIMED_INTERFACE)
            .map_err(Self::transport_err)?;

        {
            let mut sm = self.state_machine.lock().unwrap();
            sm.device_found();
        }
        self.notify_state(SessionPhase::DeviceOpened);

        self.send_open_handshake()?;

        {
            let mut sm = self.state_machine.lock().unwrap();
            sm.handshake_sent();
        }
        self.notify_state(SessionPhase::Handshaking);
        self.timers.lock().unwrap().arm_pair_timeout(Instant::now());
        Ok(())
    }

    fn send_open_handshake(&self) -> Result<()> {
        let open = OpenPayload {
            width: self.config.width,
            height: self.config.height,
            fps: self.config.fps,
            format: 5,
            max_pkt: 49_152,
            version: 1,
            mode: 0,
        };
        self.send_message(&Message::Open(open))
    }

    /// spec §4.9 `stop()`: cancels timers, releases audio, closes transport.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.timers.lock().unwrap().stop_cadence();
        self.audio.release();
        self.transport.release(crate::transport::CLAIMED_INTERFACE);
        self.transport.close();
        self.state_machine.lock().unwrap().stop();
        self.notify_state(SessionPhase::Disconnected);
    }

    pub fn restart(&self) -> Result<()> {
        self.stop();
        self.start()
    }

    pub fn dispose(&self) {
        self.stop();
        self.mic.stop_capture();
    }

    /// Called by the adapter->host read loop with the raw bulk-IN bytes
    /// it received. Decodes every complete frame currently bufferable and
    /// dispatches each one; never blocks.
    pub fn handle_inbound_bytes(&self, bytes: &[u8]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut decoder = self.decoder.lock().unwrap();
        decoder.feed(bytes);
        loop {
            match decoder.try_decode() {
                Ok(Some(raw)) => {
                    let message = message::parse(&raw);
                    self.dispatch(&message, &mut anomalies);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "corrupt frame dropped during resync");
                    break;
                }
            }
        }
        anomalies
    }

    fn dispatch(&self, message: &Message, anomalies: &mut Vec<Anomaly>) {
        {
            let mut monitor = self.status_monitor.lock().unwrap();
            monitor.observe(message, Instant::now());
        }
        if let Some(cb) = &self.callbacks.lock().unwrap().on_message_intercepted {
            cb(message);
        }

        match message {
            Message::Plugged => {
                let phone_type = self.config.frame_interval_ms_per_phone_type.keys().next().copied();
                let mut sm = self.state_machine.lock().unwrap();
                sm.plugged(phone_type);
                drop(sm);
                self.timers.lock().unwrap().clear_pair_timeout();
                let interval = self.config.frame_interval_ms(phone_type);
                self.timers.lock().unwrap().set_frame_interval(std::time::Duration::from_millis(interval));
                self.timers.lock().unwrap().start_cadence(Instant::now());
                self.notify_state(SessionPhase::Connected);
            }
            Message::Unplugged => {
                self.state_machine.lock().unwrap().unplugged();
                self.audio.suspend_all();
                self.notify_state(SessionPhase::Disconnected);
            }
            Message::VideoData(packet) => {
                {
                    let mut sm = self.state_machine.lock().unwrap();
                    sm.video_data_received();
                }
                self.notify_state(SessionPhase::Streaming);
                if let Some(anomaly) = self.video.lock().unwrap().push_frame(packet.clone()) {
                    anomalies.push(anomaly);
                }
            }
            Message::AudioData(packet) => self.handle_audio_packet(packet, anomalies),
            Message::MediaData(metadata) => {
                if let Some(cb) = &self.callbacks.lock().unwrap().on_media_info {
                    cb(metadata);
                }
            }
            Message::Phase(adapter_phase) => {
                if let Some(cb) = &self.callbacks.lock().unwrap().on_host_ui {
                    cb(*adapter_phase);
                }
            }
            _ => {}
        }
    }

    fn handle_audio_packet(&self, packet: &AudioPacket, anomalies: &mut Vec<Anomaly>) {
        if !self.audio_enabled.load(Ordering::Relaxed) {
            return;
        }
        let Some(context) = AudioContext::from_audio_type(packet.audio_type) else {
            return;
        };
        match &packet.body {
            AudioBody::Pcm(bytes) => {
                let Some(format) = AudioFormat::for_decode_type(packet.decode_type) else {
                    return;
                };
                anomalies.extend(self.audio.write(context, format, bytes, packet.volume));
            }
            AudioBody::Ducking { duration_ms: _ } => {
                self.audio.set_ducking(packet.volume);
            }
            AudioBody::Command(command) => {
                use crate::message::AudioCommand::*;
                match command {
                    OutputStop | NaviStop | SiriStop | MediaStop | PhoneCallStop | AlertStop => {
                        if let Some(anomaly) = self.audio.stop_stream(context) {
                            anomalies.push(anomaly);
                        }
                    }
                    _ => {}
                }
                match command {
                    SiriStart | PhoneCallStart => {
                        let _ = self.mic.start_capture();
                    }
                    SiriStop | PhoneCallStop => {
                        self.mic.stop_capture();
                    }
                    _ => {}
                }
            }
        }
    }

    /// Serializes one outbound message through the single send mutex
    /// (spec §5 "Outbound frames are strictly serialized").
    pub fn send_message(&self, message: &Message) -> Result<()> {
        let (msg_type, payload) = message::encode(message).map_err(SessionError::from)?;
        let bytes = frame::encode(msg_type, &payload).map_err(SessionError::from)?;
        let _guard = self.outbound_lock.lock().unwrap();
        self.transport
            .bulk_out(HOST_OUTBOUND_ENDPOINT, &bytes)
            .map_err(Self::transport_err)?;
        Ok(())
    }

    pub fn send_touch(&self, action: u32, x: u32, y: u32) -> Result<()> {
        self.send_message(&Message::Touch(TouchPayload { action, x, y, flags: 0 }))
    }

    pub fn send_multi_touch(&self, touches: Vec<MultiTouchPoint>) -> Result<()> {
        self.send_message(&Message::MultiTouch(touches))
    }

    pub fn send_key(&self, command: u32) -> Result<()> {
        self.send_message(&Message::Command(command))
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.audio.suspend_all();
        }
    }

    pub fn set_audio_ducking(&self, level: f32) {
        self.audio.set_ducking(level);
    }

    pub fn is_audio_playing(&self) -> bool {
        self.audio.is_any_playing()
    }

    pub fn audio_stats(&self) -> AudioStats {
        self.audio.stats()
    }

    pub fn stop_audio_stream(&self, context: AudioContext) -> Option<Anomaly> {
        self.audio.stop_stream(context)
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        self.mic_enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            let _ = self.mic.start_capture();
        } else {
            self.mic.stop_capture();
        }
    }

    pub fn microphone_enabled(&self) -> bool {
        self.mic_enabled.load(Ordering::Relaxed)
    }

    pub fn has_microphone_permission(&self) -> bool {
        self.mic.has_permission()
    }

    pub fn microphone_stats(&self) -> MicStats {
        MicStats { warmup_chunks_discarded: self.mic.warmup_discarded_total() as u64 }
    }

    /// Runs one tick of the microphone send loop (spec §4.6: a 20ms-cadence
    /// ticker task drains the capture ring). Returns the packet to encode
    /// and send, if any passed warm-up/mute filtering.
    pub fn mic_tick(&self) -> Option<AudioPacket> {
        if !self.mic_enabled.load(Ordering::Relaxed) {
            return None;
        }
        let chunk_bytes = AudioFormat::for_decode_type(crate::microphone::MIC_DECODE_TYPE)?
            .bytes_for_duration(crate::microphone::SEND_INTERVAL_MS as u32);
        self.mic.tick(chunk_bytes)
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.status_monitor.lock().unwrap().snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state_machine.lock().unwrap().phase()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cooperative tick driving timers and the audio engine's playback
    /// loop (spec §5: "equivalent single-threaded cooperative loop"). A
    /// host application calls this from whatever scheduling primitive it
    /// prefers (a timer, a dedicated thread's loop, an async interval).
    pub fn run_iteration(&self) -> Vec<Anomaly> {
        let now = Instant::now();
        let mut anomalies = self.audio.run_iteration();

        let mut timers = self.timers.lock().unwrap();
        if timers.poll_pair_timeout(now) {
            drop(timers);
            tracing::info!("pair timeout elapsed, requesting Wi-Fi pairing");
            self.notify_log(LogLevel::Info, "pair timeout elapsed");
            let _ = self.send_message(&Message::Command(0x01));
            timers = self.timers.lock().unwrap();
        }
        if timers.poll_heartbeat(now) {
            drop(timers);
            let _ = self.send_message(&Message::Heartbeat);
            timers = self.timers.lock().unwrap();
        }
        if timers.poll_frame_trigger(now) {
            drop(timers);
            let _ = self.send_message(&Message::Command(0x02));
        } else {
            drop(timers);
        }

        if let Err(e) = self.video.lock().unwrap().drain() {
            tracing::warn!(error = %e, "video decode failed");
        }

        anomalies
    }

    /// Async equivalent of driving [`Self::run_iteration`] from a dedicated
    /// scheduler task (spec §5 "Timer/scheduler task"). Runs until
    /// [`Self::stop`] is called. Intended for a host built on `tokio`
    /// rather than its own thread; the synchronous `run_iteration` remains
    /// the primitive both this and tests drive.
    pub async fn run_scheduler(self: &Arc<Self>, tick: std::time::Duration) {
        let mut interval = tokio::time::interval(tick);
        while self.is_running() {
            interval.tick().await;
            for anomaly in self.run_iteration() {
                tracing::trace!(%anomaly, "anomaly during scheduled tick");
            }
        }
    }

    /// Async USB inbound read loop (spec §5 "USB I/O thread(s)... producing
    /// decoded frames on an internal queue"). `bulk_in` is a blocking call
    /// by contract (§5 "Suspension points"), so each read runs on the
    /// blocking pool; a timeout is treated as the retry-with-backoff route,
    /// everything else is handed to [`Self::handle_inbound_bytes`].
    pub async fn run_io_loop(self: Arc<Self>, read_chunk_len: usize) {
        while self.is_running() {
            let transport = self.transport.clone();
            let read = tokio::task::spawn_blocking(move || {
                transport.bulk_in(HOST_INBOUND_ENDPOINT, read_chunk_len)
            })
            .await;

            match read {
                Ok(Ok(bytes)) if !bytes.is_empty() => {
                    self.handle_inbound_bytes(&bytes);
                }
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    let action = classify_transport_error(&error);
                    self.state_machine.lock().unwrap().on_transport_error(action);
                    if action == crate::session::ReconnectAction::RetryWithBackoff {
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
                Err(_join_error) => break,
            }
        }
    }
}
