//! Persistence and logging collaborators (spec §6.6, C11). Both are
//! out-of-scope platform concerns: the facade only ever calls through
//! these traits.

/// Small key/value persistence surface for things like the last-known
/// `PhoneType` or paired-device identity (spec §4.8, §6.6). A platform
/// binding backs this with whatever local storage it has.
pub trait Preferences: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for the facade's `on_log` callback (SPEC_FULL.md §10.1). This is
/// deliberately separate from the crate's internal `tracing` usage: this
/// trait is the *outward-facing* hook a host application registers to
/// surface engine activity in its own UI/telemetry, not a replacement for
/// `tracing` spans emitted internally.
pub trait LogSink: Send + Sync {
    fn on_log(&self, level: LogLevel, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for RecordingSink {
        fn on_log(&self, level: LogLevel, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn log_sink_records_calls() {
        let sink = RecordingSink { lines: Mutex::new(Vec::new()) };
        sink.on_log(LogLevel::Warn, "underrun detected");
        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, LogLevel::Warn);
    }
}
