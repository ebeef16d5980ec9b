//! Session state machine and error classifier (spec §4.8, C8).

use crate::config::PhoneType;
use crate::message::SessionPhase;
use crate::transport::TransportError;

/// The three routes the error classifier resolves a transport failure to
/// (spec §4.8 "Error classifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// "device null" / disconnect: close, wait, rediscover.
    GracefulReconnect,
    /// timeout or a -1 actual-length read: retry with backoff.
    RetryWithBackoff,
    /// permission: surface to the user and halt until they act.
    PermissionHalt,
}

pub fn classify_transport_error(error: &TransportError) -> ReconnectAction {
    match error {
        TransportError::Closed { .. } | TransportError::NotFound => ReconnectAction::GracefulReconnect,
        TransportError::Timeout { .. } => ReconnectAction::RetryWithBackoff,
        TransportError::PermissionDenied(_) => ReconnectAction::PermissionHalt,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MaxRetriesExceeded,
    PermissionDenied,
}

/// Drives [`SessionPhase`] transitions per spec §4.8's table. Pure state —
/// no I/O; the facade feeds it events derived from transport/message
/// activity and reacts to the transitions it returns.
pub struct SessionStateMachine {
    phase: SessionPhase,
    attempt_count: u32,
    max_retries: u32,
    phone_type: Option<PhoneType>,
    error_kind: Option<ErrorKind>,
}

impl SessionStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            attempt_count: 0,
            max_retries,
            phone_type: None,
            error_kind: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn phone_type(&self) -> Option<PhoneType> {
        self.phone_type
    }

    /// `Disconnected --start()--> Searching`. Also the re-entry point after
    /// `stop()`; idempotent if already searching/connected (spec P9).
    pub fn start(&mut self) {
        if self.phase == SessionPhase::Disconnected {
            self.phase = SessionPhase::Searching;
        }
    }

    pub fn device_found(&mut self) {
        if self.phase == SessionPhase::Searching {
            self.phase = SessionPhase::DeviceOpened;
        }
    }

    pub fn handshake_sent(&mut self) {
        if self.phase == SessionPhase::DeviceOpened {
            self.phase = SessionPhase::Handshaking;
        }
    }

    /// `Handshaking --Plugged--> Connected`. Resets the attempt counter
    /// (SPEC_FULL.md §11: a successful connect means prior failures no
    /// longer count toward `max_retries`).
    pub fn plugged(&mut self, phone_type: Option<PhoneType>) {
        self.phase = SessionPhase::Connected;
        self.attempt_count = 0;
        self.error_kind = None;
        if phone_type.is_some() {
            self.phone_type = phone_type;
        }
    }

    /// `Connected --VideoData--> Streaming`. Purely observable (spec §4.8);
    /// no action beyond the phase flip.
    pub fn video_data_received(&mut self) {
        if self.phase == SessionPhase::Connected {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// `any --Unplugged--> Disconnected`, triggering `restart()`.
    pub fn unplugged(&mut self) {
        self.phase = SessionPhase::Disconnected;
    }

    pub fn stop(&mut self) {
        self.phase = SessionPhase::Disconnected;
        self.phone_type = None;
        self.error_kind = None;
    }

    /// Applies a classified transport error's phase effect and bumps the
    /// attempt counter on every route that implies a restart, entering
    /// `Error` once `max_retries` is exceeded.
    pub fn on_transport_error(&mut self, action: ReconnectAction) {
        match action {
            ReconnectAction::PermissionHalt => {
                self.phase = SessionPhase::Error;
                self.error_kind = Some(ErrorKind::PermissionDenied);
                return;
            }
            ReconnectAction::GracefulReconnect => {
                self.phase = SessionPhase::Searching;
            }
            ReconnectAction::RetryWithBackoff => {
                // phase stays; caller retries within the same state.
            }
        }
        self.attempt_count += 1;
        if self.attempt_count > self.max_retries {
            self.phase = SessionPhase::Error;
            self.error_kind = Some(ErrorKind::MaxRetriesExceeded);
        }
    }
}
