//! Test doubles for every out-of-scope collaborator trait (spec §9). Kept
//! in the crate (not a dev-dependency) so both unit tests and `tests/`
//! integration suites can share them.

#![cfg(any(test, feature = "testing"))]

pub mod mock_sink {
    use crate::audio::{AudioFormat, AudioSink, AudioSinkFactory, SinkState, UsageTag};
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub struct MockSink {
        state: SinkState,
        volume: f32,
        underrun_count: u64,
        written_bytes: usize,
        released: bool,
    }

    impl MockSink {
        fn new() -> Self {
            Self { state: SinkState::Paused, volume: 1.0, underrun_count: 0, written_bytes: 0, released: false }
        }
    }

    impl AudioSink for MockSink {
        fn write(&mut self, bytes: &[u8]) -> usize {
            self.written_bytes += bytes.len();
            bytes.len()
        }
        fn pause(&mut self) {
            self.state = SinkState::Paused;
        }
        fn resume(&mut self) {
            self.state = SinkState::Playing;
        }
        fn flush(&mut self) {}
        fn release(&mut self) {
            self.released = true;
            self.state = SinkState::Stopped;
        }
        fn underrun_count(&self) -> u64 {
            self.underrun_count
        }
        fn state(&self) -> SinkState {
            self.state
        }
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
    }

    /// Shared handle so tests can inspect/perturb a sink after the engine
    /// owns it as a `Box<dyn AudioSink>`.
    struct Handle {
        volume: f32,
        underrun_count: u64,
        written_bytes: usize,
        create_count: u32,
    }

    struct ForwardingSink {
        usage: UsageTag,
        shared: std::sync::Arc<Mutex<HashMap<UsageTag, Handle>>>,
        inner: MockSink,
    }

    impl AudioSink for ForwardingSink {
        fn write(&mut self, bytes: &[u8]) -> usize {
            let n = self.inner.write(bytes);
            let mut map = self.shared.lock().unwrap();
            map.get_mut(&self.usage).unwrap().written_bytes += n;
            n
        }
        fn pause(&mut self) {
            self.inner.pause();
        }
        fn resume(&mut self) {
            self.inner.resume();
        }
        fn flush(&mut self) {
            self.inner.flush();
        }
        fn release(&mut self) {
            self.inner.release();
        }
        fn underrun_count(&self) -> u64 {
            self.shared.lock().unwrap().get(&self.usage).map(|h| h.underrun_count).unwrap_or(0)
        }
        fn state(&self) -> SinkState {
            self.inner.state()
        }
        fn set_volume(&mut self, volume: f32) {
            self.inner.set_volume(volume);
            self.shared.lock().unwrap().get_mut(&self.usage).unwrap().volume = volume;
        }
    }

    #[derive(Default)]
    pub struct MockSinkFactory {
        handles: std::sync::Arc<Mutex<HashMap<UsageTag, Handle>>>,
    }

    impl MockSinkFactory {
        pub fn create_count(&self, usage: UsageTag) -> u32 {
            self.handles.lock().unwrap().get(&usage).map(|h| h.create_count).unwrap_or(0)
        }

        pub fn volume_for(&self, usage: UsageTag) -> Option<f32> {
            self.handles.lock().unwrap().get(&usage).map(|h| h.volume)
        }

        pub fn sink_for(&self, usage: UsageTag) -> Option<()> {
            self.handles.lock().unwrap().contains_key(&usage).then_some(())
        }

        pub fn bump_underruns(&self, usage: UsageTag, delta: u64) {
            let mut map = self.handles.lock().unwrap();
            if let Some(h) = map.get_mut(&usage) {
                h.underrun_count += delta;
            }
        }

        pub fn written_bytes(&self, usage: UsageTag) -> usize {
            self.handles.lock().unwrap().get(&usage).map(|h| h.written_bytes).unwrap_or(0)
        }
    }

    impl AudioSinkFactory for MockSinkFactory {
        fn create(&self, usage: UsageTag, _format: AudioFormat) -> Box<dyn AudioSink> {
            let mut map = self.handles.lock().unwrap();
            let entry = map.entry(usage).or_insert_with(|| Handle {
                volume: 1.0,
                underrun_count: 0,
                written_bytes: 0,
                create_count: 0,
            });
            entry.create_count += 1;
            drop(map);
            Box::new(ForwardingSink { usage, shared: self.handles.clone(), inner: MockSink::new() })
        }
    }
}

pub mod mock_transport {
    use crate::transport::{TransportError, UsbTransport};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory transport double: bulk-in reads are served from a queue the
    /// test pushes into, bulk-out writes are recorded for assertion.
    #[derive(Default)]
    pub struct MockTransport {
        inbound: Mutex<VecDeque<Vec<u8>>>,
        outbound: Mutex<Vec<Vec<u8>>>,
        open: Mutex<bool>,
        fail_next_read: Mutex<bool>,
        reset_count: Mutex<u32>,
        claimed_interface: Mutex<Option<u8>>,
    }

    impl MockTransport {
        pub fn push_inbound(&self, bytes: Vec<u8>) {
            self.inbound.lock().unwrap().push_back(bytes);
        }

        pub fn fail_next_read(&self) {
            *self.fail_next_read.lock().unwrap() = true;
        }

        pub fn outbound_writes(&self) -> Vec<Vec<u8>> {
            self.outbound.lock().unwrap().clone()
        }

        pub fn reset_count(&self) -> u32 {
            *self.reset_count.lock().unwrap()
        }

        pub fn claimed_interface(&self) -> Option<u8> {
            *self.claimed_interface.lock().unwrap()
        }
    }

    impl UsbTransport for MockTransport {
        fn open(&self) -> Result<(), TransportError> {
            *self.open.lock().unwrap() = true;
            Ok(())
        }

        fn close(&self) {
            *self.open.lock().unwrap() = false;
        }

        fn is_open(&self) -> bool {
            *self.open.lock().unwrap()
        }

        fn reset(&self) -> Result<(), TransportError> {
            *self.reset_count.lock().unwrap() += 1;
            Ok(())
        }

        fn claim(&self, interface_index: u8) -> Result<(), TransportError> {
            *self.claimed_interface.lock().unwrap() = Some(interface_index);
            Ok(())
        }

        fn release(&self, interface_index: u8) {
            let mut claimed = self.claimed_interface.lock().unwrap();
            if *claimed == Some(interface_index) {
                *claimed = None;
            }
        }

        fn bulk_out(&self, endpoint: u8, bytes: &[u8]) -> Result<usize, TransportError> {
            if !*self.open.lock().unwrap() {
                return Err(TransportError::Closed { reason: "not open".into() });
            }
            let _ = endpoint;
            self.outbound.lock().unwrap().push(bytes.to_vec());
            Ok(bytes.len())
        }

        fn bulk_in(&self, endpoint: u8, max_len: usize) -> Result<Vec<u8>, TransportError> {
            let _ = endpoint;
            if std::mem::take(&mut *self.fail_next_read.lock().unwrap()) {
                return Err(TransportError::Timeout { endpoint, elapsed_ms: 5000 });
            }
            let mut inbound = self.inbound.lock().unwrap();
            match inbound.pop_front() {
                Some(mut bytes) => {
                    bytes.truncate(max_len);
                    Ok(bytes)
                }
                None => Ok(Vec::new()),
            }
        }
    }
}

pub mod mock_mic {
    use crate::microphone::{MicrophoneError, MicrophoneSource};
    use std::sync::Mutex;

    pub struct MockMicrophoneSource {
        armed: Mutex<bool>,
        fail_arm: Mutex<bool>,
        permission: Mutex<bool>,
    }

    impl Default for MockMicrophoneSource {
        fn default() -> Self {
            Self { armed: Mutex::new(false), fail_arm: Mutex::new(false), permission: Mutex::new(true) }
        }
    }

    impl MockMicrophoneSource {
        pub fn set_fail_arm(&self, fail: bool) {
            *self.fail_arm.lock().unwrap() = fail;
        }

        pub fn set_permission(&self, granted: bool) {
            *self.permission.lock().unwrap() = granted;
        }
    }

    impl MicrophoneSource for MockMicrophoneSource {
        fn arm(&self) -> Result<(), MicrophoneError> {
            if *self.fail_arm.lock().unwrap() {
                return Err(MicrophoneError::PermissionDenied);
            }
            *self.armed.lock().unwrap() = true;
            Ok(())
        }

        fn disarm(&self) {
            *self.armed.lock().unwrap() = false;
        }

        fn read_chunk(&self, max_len: usize) -> Vec<u8> {
            if !*self.armed.lock().unwrap() {
                return Vec::new();
            }
            vec![7u8; max_len.min(320)]
        }

        fn has_permission(&self) -> bool {
            *self.permission.lock().unwrap()
        }

        fn is_capturing(&self) -> bool {
            *self.armed.lock().unwrap()
        }
    }
}
