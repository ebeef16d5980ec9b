//! External audio sink contract (spec §6.3). The platform audio sink is an
//! out-of-scope collaborator — the engine depends only on this trait, and
//! a platform binding (not part of this crate) implements it.

use super::format::AudioFormat;
use crate::message::AudioContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Playing,
    Paused,
    Stopped,
}

/// Usage tag the external mixer groups sinks by (spec §6.3). One-to-one
/// with [`AudioContext`] but kept distinct: this is what crosses the
/// collaborator boundary, while `AudioContext` is the wire routing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageTag {
    Media,
    Navigation,
    PhoneCall,
    VoiceAssistant,
}

impl From<AudioContext> for UsageTag {
    fn from(ctx: AudioContext) -> Self {
        match ctx {
            AudioContext::Media => UsageTag::Media,
            AudioContext::Navigation => UsageTag::Navigation,
            AudioContext::PhoneCall => UsageTag::PhoneCall,
            AudioContext::VoiceAssistant => UsageTag::VoiceAssistant,
        }
    }
}

/// A platform-provided audio output sink, one per active [`AudioContext`].
///
/// Implementations MUST NOT block in `write` beyond what their underlying
/// device buffer requires, and `pause` MUST be treated as an authoritative
/// "this context is no longer active" signal by whatever mixer owns the
/// sink (spec §6.3) — this is the mechanism that resolves the "stuck
/// volume" pathology the spec calls out.
pub trait AudioSink: Send {
    fn write(&mut self, bytes: &[u8]) -> usize;
    fn pause(&mut self);
    fn resume(&mut self);
    fn flush(&mut self);
    fn release(&mut self);
    fn underrun_count(&self) -> u64;
    fn state(&self) -> SinkState;
    fn set_volume(&mut self, volume: f32);
}

/// Constructs sinks for a given context/format. Out-of-scope collaborator
/// (spec §1, §9): platform bindings provide the concrete factory.
pub trait AudioSinkFactory: Send + Sync {
    fn create(&self, usage: UsageTag, format: AudioFormat) -> Box<dyn AudioSink>;
}
