//! Session controller (spec §4.8, C8): state machine, timers, and error
//! classification tying the transport to the rest of the engine.

pub mod state;
pub mod timers;

pub use state::{classify_transport_error, ErrorKind, ReconnectAction, SessionStateMachine};
pub use timers::SessionTimers;
