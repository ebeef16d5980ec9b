//! Audio Stream Engine (spec §4.5): one engine managing four per-context
//! streams — format negotiation, pre-fill, ducking, underrun recovery,
//! premature-stop suppression, and pause-to-deprioritize lifecycle.

use super::format::AudioFormat;
use super::sink::{AudioSinkFactory, SinkState, UsageTag};
use super::stream::{AudioStream, StreamState};
use crate::config::SessionConfig;
use crate::error::Anomaly;
use crate::message::AudioContext;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Five 4-byte samples at fixed relative offsets into the PCM region (spec
/// §4.5 "Zero-packet filter"): start, 25%, 50%, 75%, near-end.
fn is_all_zero_payload(pcm: &[u8]) -> bool {
    if pcm.len() < 4 {
        return false;
    }
    let last_ok_start = pcm.len() - 4;
    let offsets = [
        0,
        (pcm.len() / 4).min(last_ok_start),
        (pcm.len() / 2).min(last_ok_start),
        (pcm.len() * 3 / 4).min(last_ok_start),
        last_ok_start,
    ];
    offsets.iter().all(|&o| pcm[o..o + 4].iter().all(|&b| b == 0))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AudioStats {
    pub underrun_total: u64,
    pub overflow_total: u64,
    pub zero_drops_total: u64,
}

pub struct AudioStreamEngine {
    config: SessionConfig,
    factory: Arc<dyn AudioSinkFactory>,
    streams: Mutex<HashMap<AudioContext, AudioStream>>,
    zero_drop_counts: Mutex<HashMap<AudioContext, u64>>,
    underrun_total: AtomicU64,
    overflow_total: AtomicU64,
}

impl AudioStreamEngine {
    pub fn new(config: SessionConfig, factory: Arc<dyn AudioSinkFactory>) -> Self {
        Self {
            config,
            factory,
            streams: Mutex::new(HashMap::new()),
            zero_drop_counts: Mutex::new(HashMap::new()),
            underrun_total: AtomicU64::new(0),
            overflow_total: AtomicU64::new(0),
        }
    }

    fn prefill_threshold_ms(&self, context: AudioContext, format: AudioFormat) -> u32 {
        match context {
            AudioContext::Media => self.config.media_prefill_ms_for_rate(format.rate_hz),
            AudioContext::Navigation => self.config.nav_prefill_ms,
            AudioContext::PhoneCall | AudioContext::VoiceAssistant => self.config.media_prefill_ms,
        }
    }

    fn min_play_duration(&self, context: AudioContext) -> Duration {
        let ms = match context {
            AudioContext::Media => self.config.min_media_play_ms,
            AudioContext::Navigation => self.config.min_nav_play_ms,
            AudioContext::PhoneCall => self.config.min_call_play_ms,
            AudioContext::VoiceAssistant => self.config.min_voice_play_ms,
        };
        Duration::from_millis(ms as u64)
    }

    /// spec §4.5 `write(context, format, pcm_bytes, volume_hint)`.
    pub fn write(
        &self,
        context: AudioContext,
        format: AudioFormat,
        pcm: &[u8],
        volume_hint: f32,
    ) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        // C10 zero-packet filter runs before anything touches the ring.
        if is_all_zero_payload(pcm) {
            let mut counts = self.zero_drop_counts.lock().unwrap();
            let count = counts.entry(context).or_insert(0);
            *count += 1;
            if *count % 50 == 0 {
                tracing::warn!(?context, total = *count, "zero-filled audio payload dropped");
            }
            anomalies.push(Anomaly::ZeroPayloadDropped { context, total_dropped: *count });
            return anomalies;
        }

        let mut streams = self.streams.lock().unwrap();
        let needs_rebuild = streams.get(&context).map(|s| s.format != format).unwrap_or(true);

        if needs_rebuild {
            if let Some(mut old) = streams.remove(&context) {
                old.sink.release();
            }
            tracing::debug!(?context, decode_type = format.decode_type, "rebuilding sink for format switch");
            let sink = self.factory.create(UsageTag::from(context), format);
            let ring_capacity_ms = (self.prefill_threshold_ms(context, format) as u64 * 4) as u32;
            streams.insert(context, AudioStream::new(context, format, ring_capacity_ms.max(200), sink));
        }

        let stream = streams.get_mut(&context).unwrap();
        stream.base_volume = volume_hint;

        // spec §4.5 step 3: a paused sink with a matching format must be
        // resumed, not left paused (the "Siri tone plays only once" fix).
        if stream.state == StreamState::Paused {
            stream.sink.resume();
            stream.state = StreamState::Playing;
            stream.started_at = Instant::now();
        }

        let discarded_before = stream.producer.discarded_bytes();
        stream.producer.write(pcm);
        let discarded_bytes = stream.producer.discarded_bytes() - discarded_before;
        if discarded_bytes > 0 {
            self.overflow_total.fetch_add(discarded_bytes, Ordering::Relaxed);
            anomalies.push(Anomaly::Overflow { context, discarded_bytes: discarded_bytes as usize });
        }

        if !stream.pre_filled {
            let threshold = self.prefill_threshold_ms(context, format);
            if stream.producer.fill_level_ms(format) >= threshold {
                stream.pre_filled = true;
                stream.state = StreamState::Playing;
                stream.started_at = Instant::now();
                stream.sink.resume();
                tracing::debug!(?context, threshold, "pre-fill complete, starting sink");
            } else {
                stream.state = StreamState::PreFill;
            }
        }

        anomalies
    }

    /// spec §4.5 `stop_stream(context)`.
    pub fn stop_stream(&self, context: AudioContext) -> Option<Anomaly> {
        let mut streams = self.streams.lock().unwrap();
        let Some(stream) = streams.get_mut(&context) else { return None };

        let elapsed = stream.started_at.elapsed();
        let fill_ms = stream.consumer.fill_level_ms(stream.format);

        if elapsed < self.min_play_duration(context) && fill_ms > 50 {
            tracing::debug!(?context, elapsed_ms = elapsed.as_millis() as u64, fill_ms, "suppressing premature stop");
            return Some(Anomaly::PrematureStopSuppressed { context });
        }

        stream.sink.pause();
        stream.state = StreamState::Paused;
        None
    }

    /// spec §4.5 `set_ducking(level)`: media stream only.
    pub fn set_ducking(&self, level: f32) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(stream) = streams.get_mut(&AudioContext::Media) {
            stream.ducking_level = level;
            stream.sink.set_volume(stream.effective_volume());
        }
    }

    /// spec §4.5 `suspend_all()`: used on transient USB disconnects.
    pub fn suspend_all(&self) {
        let mut streams = self.streams.lock().unwrap();
        for stream in streams.values_mut() {
            stream.sink.pause();
            stream.state = StreamState::Paused;
            stream.pre_filled = false;
        }
    }

    /// spec §4.5 `resume_all()`.
    pub fn resume_all(&self) {
        let mut streams = self.streams.lock().unwrap();
        for stream in streams.values_mut() {
            if stream.state == StreamState::Paused {
                stream.sink.resume();
                stream.state = StreamState::Playing;
                stream.started_at = Instant::now();
            }
        }
    }

    /// spec §4.5 `release()`: full teardown.
    pub fn release(&self) {
        let mut streams = self.streams.lock().unwrap();
        for (_, mut stream) in streams.drain() {
            stream.sink.release();
        }
    }

    /// One pass of the playback/underrun-recovery loop (spec §4.5
    /// "dedicated playback thread... or equivalent single-threaded
    /// cooperative loop"). Drains ring bytes into each playing sink and
    /// checks for the underrun-recovery condition. Exposed directly so
    /// tests can drive it deterministically instead of racing a real
    /// background thread.
    pub fn run_iteration(&self) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut streams = self.streams.lock().unwrap();
        for stream in streams.values_mut() {
            if stream.state != StreamState::Playing {
                continue;
            }

            let chunk_len = stream.format.bytes_for_duration(20).max(1);
            let bytes = stream.consumer.read(chunk_len);
            if !bytes.is_empty() {
                stream.sink.write(&bytes);
            }

            let current_underruns = stream.sink.underrun_count();
            let delta = current_underruns.saturating_sub(stream.last_underrun_count);
            stream.last_underrun_count = current_underruns;
            if delta > 0 {
                self.underrun_total.fetch_add(delta, Ordering::Relaxed);
            }

            if delta >= self.config.underrun_threshold as u64
                && stream.consumer.fill_level_ms(stream.format) < 50
            {
                tracing::warn!(context = ?stream.context, delta, "underrun recovery: clearing pre-fill");
                stream.pre_filled = false;
                stream.state = StreamState::PreFill;
                anomalies.push(Anomaly::Underrun { context: stream.context, count: delta });
            }
        }
        anomalies
    }

    pub fn is_playing(&self, context: AudioContext) -> bool {
        self.streams
            .lock()
            .unwrap()
            .get(&context)
            .map(|s| s.state == StreamState::Playing)
            .unwrap_or(false)
    }

    pub fn is_any_playing(&self) -> bool {
        self.streams.lock().unwrap().values().any(|s| s.state == StreamState::Playing)
    }

    pub fn sink_state(&self, context: AudioContext) -> Option<SinkState> {
        self.streams.lock().unwrap().get(&context).map(|s| s.sink.state())
    }

    pub fn stats(&self) -> AudioStats {
        let zero_drops_total = self.zero_drop_counts.lock().unwrap().values().sum();
        AudioStats {
            underrun_total: self.underrun_total.load(Ordering::Relaxed),
            overflow_total: self.overflow_total.load(Ordering::Relaxed),
            zero_drops_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_sink::MockSinkFactory;

    fn engine_with(config: SessionConfig) -> (Arc<MockSinkFactory>, AudioStreamEngine) {
        let factory = Arc::new(MockSinkFactory::default());
        let engine = AudioStreamEngine::new(config, factory.clone());
        (factory, engine)
    }

    fn pcm_tone(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i % 251) as u8).wrapping_add(1)).collect()
    }

    #[test]
    fn p3_zero_filter_drops_all_zero_payload() {
        let (factory, engine) = engine_with(SessionConfig::default());
        let format = AudioFormat::for_decode_type(4).unwrap();
        let zeros = vec![0u8; 11_520];
        let anomalies = engine.write(AudioContext::Media, format, &zeros, 1.0);
        assert!(matches!(anomalies[0], Anomaly::ZeroPayloadDropped { total_dropped: 1, .. }));
        assert!(factory.sink_for(UsageTag::Media).is_none());
    }

    #[test]
    fn p7_format_switch_rebuilds_sink_exactly_once() {
        let (factory, engine) = engine_with(SessionConfig::default());
        let fmt1 = AudioFormat::for_decode_type(1).unwrap();
        let fmt2 = AudioFormat::for_decode_type(4).unwrap();

        engine.write(AudioContext::Media, fmt1, &pcm_tone(200), 1.0);
        assert_eq!(factory.create_count(UsageTag::Media), 1);

        engine.write(AudioContext::Media, fmt2, &pcm_tone(200), 1.0);
        assert_eq!(factory.create_count(UsageTag::Media), 2);

        engine.write(AudioContext::Media, fmt2, &pcm_tone(200), 1.0);
        assert_eq!(factory.create_count(UsageTag::Media), 2, "same format must not rebuild");
    }

    #[test]
    fn prefill_then_start_sink() {
        let (_factory, engine) = engine_with(SessionConfig::default());
        let fmt = AudioFormat::for_decode_type(4).unwrap(); // 48k stereo, 130ms threshold
        let small = fmt.bytes_for_duration(50);
        engine.write(AudioContext::Media, fmt, &pcm_tone(small), 1.0);
        assert!(!engine.is_playing(AudioContext::Media));

        let rest = fmt.bytes_for_duration(100);
        engine.write(AudioContext::Media, fmt, &pcm_tone(rest), 1.0);
        assert!(engine.is_playing(AudioContext::Media));
    }

    /// P5: stop within min_play_ms while fill > 50ms is suppressed.
    #[test]
    fn p5_premature_nav_stop_suppressed() {
        let (_factory, engine) = engine_with(SessionConfig::default());
        let fmt = AudioFormat::for_decode_type(5).unwrap(); // 16k mono voice-ish, used for nav here
        let data = fmt.bytes_for_duration(200);
        engine.write(AudioContext::Navigation, fmt, &pcm_tone(data), 1.0);
        assert!(engine.is_playing(AudioContext::Navigation));

        let anomaly = engine.stop_stream(AudioContext::Navigation);
        assert!(matches!(anomaly, Some(Anomaly::PrematureStopSuppressed { .. })));
        assert!(engine.is_playing(AudioContext::Navigation));
    }

    /// P6: resume after pause on next write with the same format.
    #[test]
    fn p6_resume_after_pause() {
        let (_factory, engine) = engine_with(SessionConfig::default());
        let fmt = AudioFormat::for_decode_type(5).unwrap();
        let data = fmt.bytes_for_duration(250);
        engine.write(AudioContext::VoiceAssistant, fmt, &pcm_tone(data), 1.0);
        assert!(engine.is_playing(AudioContext::VoiceAssistant));

        // Force past the min-play window so the stop isn't suppressed.
        {
            let mut streams = engine.streams.lock().unwrap();
            let s = streams.get_mut(&AudioContext::VoiceAssistant).unwrap();
            s.started_at = Instant::now() - Duration::from_millis(500);
            s.consumer.read(usize::MAX);
        }
        engine.stop_stream(AudioContext::VoiceAssistant);
        assert!(!engine.is_playing(AudioContext::VoiceAssistant));

        engine.write(AudioContext::VoiceAssistant, fmt, &pcm_tone(data), 1.0);
        assert!(engine.is_playing(AudioContext::VoiceAssistant));
    }

    /// P8: k >= underrun_threshold new underruns while fill < 50ms clears pre_filled.
    #[test]
    fn p8_underrun_recovery_clears_prefill() {
        let mut config = SessionConfig::default();
        config.underrun_threshold = 3;
        let (factory, engine) = engine_with(config);
        let fmt = AudioFormat::for_decode_type(5).unwrap();
        let data = fmt.bytes_for_duration(250);
        engine.write(AudioContext::VoiceAssistant, fmt, &pcm_tone(data), 1.0);
        assert!(engine.is_playing(AudioContext::VoiceAssistant));

        // Drain the ring so fill < 50ms, then bump the mock sink's underrun counter.
        {
            let mut streams = engine.streams.lock().unwrap();
            let s = streams.get_mut(&AudioContext::VoiceAssistant).unwrap();
            s.consumer.read(usize::MAX);
        }
        factory.bump_underruns(UsageTag::VoiceAssistant, 5);

        engine.run_iteration();

        let mut streams = engine.streams.lock().unwrap();
        let s = streams.get_mut(&AudioContext::VoiceAssistant).unwrap();
        assert!(!s.pre_filled);
    }

    #[test]
    fn ducking_scales_media_only() {
        let (factory, engine) = engine_with(SessionConfig::default());
        let fmt = AudioFormat::for_decode_type(4).unwrap();
        engine.write(AudioContext::Media, fmt, &pcm_tone(fmt.bytes_for_duration(200)), 1.0);
        engine.set_ducking(0.2);
        let vol = factory.volume_for(UsageTag::Media).unwrap();
        assert!((vol - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn suspend_all_pauses_without_releasing() {
        let (factory, engine) = engine_with(SessionConfig::default());
        let fmt = AudioFormat::for_decode_type(4).unwrap();
        engine.write(AudioContext::Media, fmt, &pcm_tone(fmt.bytes_for_duration(200)), 1.0);
        engine.suspend_all();
        assert!(!engine.is_playing(AudioContext::Media));
        assert_eq!(factory.create_count(UsageTag::Media), 1, "suspend must not release/recreate");

        engine.resume_all();
        assert!(engine.is_playing(AudioContext::Media));
        assert_eq!(factory.create_count(UsageTag::Media), 1);
    }
}
