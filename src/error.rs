//! Crate-wide error taxonomy (spec §7).
//!
//! Mirrors the semantic categories named in the spec rather than inventing
//! new ones: every variant here is something a caller can act on (retry,
//! reconnect, surface to the user) without downcasting.

use std::fmt;

/// Top-level session error. Every component-local error type converts into
/// this one; the facade never exposes anything else across its boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A bulk transfer did not complete within its timeout. Retriable.
    #[error("transport timed out on endpoint {endpoint:#x} after {elapsed_ms}ms")]
    TransportTimeout { endpoint: u8, elapsed_ms: u64 },

    /// The transport reported the device is gone. Triggers a graceful
    /// reconnect rather than a hard failure.
    #[error("transport closed: {reason}")]
    TransportClosed { reason: String },

    /// The host does not have permission to open/claim the device. Fatal
    /// until the user grants permission and restarts.
    #[error("permission denied opening adapter: {0}")]
    PermissionDenied(String),

    /// A frame failed its checksum invariant and was discarded.
    #[error("corrupt frame: {0}")]
    CorruptFrame(#[from] crate::frame::FrameError),

    /// An audio payload asked for a `decode_type` this stream isn't
    /// currently using; the sink must be rebuilt.
    #[error("format mismatch on context {context:?}: stream has {current:?}, payload wants {wanted:?}")]
    FormatMismatch {
        context: crate::message::AudioContext,
        current: crate::audio::format::AudioFormat,
        wanted: crate::audio::format::AudioFormat,
    },

    #[error("message parse error: {0}")]
    Message(#[from] crate::message::MessageError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Non-fatal diagnostics a component may want to surface alongside a
/// counter bump without tearing the session down (spec §7: "self-recovered
/// with a counter bump"). Distinct from [`SessionError`], which always
/// represents something the session controller must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Anomaly {
    Underrun { context: crate::message::AudioContext, count: u64 },
    Overflow { context: crate::message::AudioContext, discarded_bytes: usize },
    PrematureStopSuppressed { context: crate::message::AudioContext },
    ZeroPayloadDropped { context: crate::message::AudioContext, total_dropped: u64 },
    BackpressureExceeded { frames_dropped: u64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Underrun { context, count } => {
                write!(f, "underrun recovery on {context:?}: {count} new underruns")
            }
            Anomaly::Overflow { context, discarded_bytes } => {
                write!(f, "ring overflow on {context:?}: discarded {discarded_bytes} bytes")
            }
            Anomaly::PrematureStopSuppressed { context } => {
                write!(f, "premature stop suppressed on {context:?}")
            }
            Anomaly::ZeroPayloadDropped { context, total_dropped } => {
                write!(f, "zero-filled payload dropped on {context:?} (total: {total_dropped})")
            }
            Anomaly::BackpressureExceeded { frames_dropped } => {
                write!(f, "video backpressure exceeded, {frames_dropped} frames dropped total")
            }
        }
    }
}
