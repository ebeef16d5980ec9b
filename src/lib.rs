//! Host-side session and streaming engine for a wireless CarPlay / Android
//! Auto USB adapter.
//!
//! The crate owns the USB framing codec, the message model, the session
//! state machine and its timers, the per-context audio pipeline, the
//! microphone uplink, and the video forwarding path. Everything this crate
//! does not own — the real USB transport, the platform audio sink, the
//! platform microphone, the H.264 decoder, and user preference storage —
//! is expressed as a trait the host application implements; see
//! [`transport`], [`audio::sink`], [`microphone`], [`video`], and
//! [`preferences`].
//!
//! [`facade::AdapterSession`] is the entry point: construct one with your
//! platform bindings and a [`config::SessionConfig`], feed it inbound bytes
//! from your USB read loop, and call [`facade::AdapterSession::run_iteration`]
//! from whatever cooperative scheduling primitive your host prefers.

pub mod audio;
pub mod config;
pub mod error;
pub mod facade;
pub mod frame;
pub mod message;
pub mod microphone;
pub mod preferences;
pub mod ring_buffer;
pub mod session;
pub mod status_monitor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod video;

pub use config::SessionConfig;
pub use error::{Anomaly, Result, SessionError};
pub use facade::{AdapterSession, Callbacks};
