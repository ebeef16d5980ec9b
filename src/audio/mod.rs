//! Audio subsystem (spec §4.5, C5): format table, sink contract, per-context
//! stream state, and the engine that ties them together.

pub mod engine;
pub mod format;
pub mod sink;
pub mod stream;

pub use engine::{AudioStats, AudioStreamEngine};
pub use format::AudioFormat;
pub use sink::{AudioSink, AudioSinkFactory, SinkState, UsageTag};
pub use stream::{AudioStream, StreamState};
