//! USB transport contract (spec §4.1, C1). Raw bulk-transfer I/O against
//! the physical adapter is an out-of-scope collaborator (spec §1: "the USB
//! transport driver (bulk transfer primitives)") — this module only defines
//! the trait the rest of the crate programs against, plus the known-device
//! table used to recognize a plugged adapter.

use thiserror::Error;

/// Vendor/product ID pairs the session controller recognizes as a
/// supported dongle (spec §4.1 "Known device table").
pub const KNOWN_DEVICES: &[(u16, u16)] = &[
    (0x1314, 0x1520),
    (0x1314, 0x1521),
    (0x08E4, 0x01C0),
];

pub fn is_known_device(vendor_id: u16, product_id: u16) -> bool {
    KNOWN_DEVICES.contains(&(vendor_id, product_id))
}

/// The only interface this protocol ever claims (spec §4.1: "Interface 0
/// is claimed").
pub const CLAIMED_INTERFACE: u8 = 0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("bulk transfer on endpoint {endpoint} timed out after {elapsed_ms}ms")]
    Timeout { endpoint: u8, elapsed_ms: u64 },
    #[error("transport closed: {reason}")]
    Closed { reason: String },
    #[error("permission denied opening device: {0}")]
    PermissionDenied(String),
    #[error("device not found")]
    NotFound,
}

/// One plugged device's identity, as reported by whatever enumerates USB
/// devices on the host (spec §4.1 `enumerate()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceDescriptor {
    pub fn is_known(&self) -> bool {
        is_known_device(self.vendor_id, self.product_id)
    }
}

/// The external collaborator that performs raw bulk transfers against the
/// adapter (spec §4.1, §9 "Interface abstractions for collaborators").
/// Implementations live outside this crate; the session controller only
/// ever holds a `dyn UsbTransport`.
pub trait UsbTransport: Send + Sync {
    fn open(&self) -> Result<(), TransportError>;
    fn close(&self);
    fn is_open(&self) -> bool;
    /// Clears whatever state the device carried from a prior session. Per
    /// spec §4.1/§4.8, the device is expected to disappear and reappear
    /// within ~3s of a reset; the caller re-`open`s afterward.
    fn reset(&self) -> Result<(), TransportError>;
    fn claim(&self, interface_index: u8) -> Result<(), TransportError>;
    fn release(&self, interface_index: u8);
    fn bulk_out(&self, endpoint: u8, bytes: &[u8]) -> Result<usize, TransportError>;
    fn bulk_in(&self, endpoint: u8, max_len: usize) -> Result<Vec<u8>, TransportError>;
}

/// Enumerates candidate devices. Out-of-scope collaborator; a platform
/// binding queries the OS device list and reports descriptors here.
pub trait UsbEnumerator: Send + Sync {
    fn enumerate(&self) -> Vec<DeviceDescriptor>;
}
