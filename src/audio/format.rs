//! Audio format table (spec §3), keyed by the wire `decode_type`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub decode_type: u32,
    pub rate_hz: u32,
    pub channels: u16,
    pub bits: u16,
}

impl AudioFormat {
    pub fn for_decode_type(decode_type: u32) -> Option<Self> {
        let (rate_hz, channels, bits) = match decode_type {
            1 | 2 => (44_100, 2, 16),
            3 => (8_000, 1, 16),
            4 => (48_000, 2, 16),
            5 => (16_000, 1, 16),
            6 => (24_000, 1, 16),
            7 => (16_000, 2, 16),
            _ => return None,
        };
        Some(Self { decode_type, rate_hz, channels, bits })
    }

    /// Bytes-per-second at this format.
    pub fn byte_rate(&self) -> u32 {
        self.rate_hz * self.channels as u32 * (self.bits as u32 / 8)
    }

    pub fn bytes_for_duration(&self, duration_ms: u32) -> usize {
        (self.byte_rate() as u64 * duration_ms as u64 / 1000) as usize
    }

    pub fn duration_ms_for_bytes(&self, bytes: usize) -> u32 {
        let rate = self.byte_rate() as u64;
        if rate == 0 {
            return 0;
        }
        ((bytes as u64 * 1000) / rate) as u32
    }
}
