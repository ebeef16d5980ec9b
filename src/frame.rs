//! Frame codec (spec §3, §4.2): the 16-byte framed wire unit.
//!
//! `magic(4) | length(4) | type(4) | checksum(4) | payload[length]`, all
//! fields little-endian. `checksum == type ^ 0xFFFFFFFF`.

use std::collections::VecDeque;

pub const MAGIC: u32 = 0x55AA_55AA;
pub const HEADER_LEN: usize = 16;
pub const MAX_PAYLOAD_LEN: usize = 1 << 20; // 1 MiB (spec §9 Open Questions: pinned at 1 MiB)

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("checksum mismatch for type {msg_type:#x}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        msg_type: u32,
        expected: u32,
        actual: u32,
    },
    #[error("payload length {0} exceeds maximum of {MAX_PAYLOAD_LEN}")]
    PayloadTooLarge(usize),
}

/// A decoded frame: message type plus raw payload bytes. Parsing into a
/// typed [`crate::message::Message`] happens one layer up (C3); this layer
/// only validates the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub msg_type: u32,
    pub payload: Vec<u8>,
}

/// Encode a single frame: header + payload.
pub fn encode(msg_type: u32, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&msg_type.to_le_bytes());
    out.extend_from_slice(&checksum_for(msg_type).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn checksum_for(msg_type: u32) -> u32 {
    msg_type ^ 0xFFFF_FFFF
}

/// Streaming decoder: fed bytes from the transport as they arrive, yields
/// fully-assembled [`RawFrame`]s. Corrupt frames trigger a magic resync
/// rather than propagating an error that would kill the read loop (spec
/// §4.2: "never panic").
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: VecDeque<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: VecDeque::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Pull the next complete, valid frame out of the buffer, if any.
    /// Returns `Ok(None)` if more bytes are needed. On checksum failure the
    /// offending frame is dropped internally (resync to the next magic),
    /// matching the scenario in spec §8.6: "a resync finds the next
    /// magic... the next valid frame is parsed normally."
    pub fn try_decode(&mut self) -> Result<Option<RawFrame>, FrameError> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }

            let Some(magic_pos) = self.find_magic() else {
                // No magic anywhere in the buffer; keep only the last 3
                // bytes in case magic straddles the next `feed`.
                let keep = self.buf.len().min(3);
                let drop = self.buf.len() - keep;
                self.buf.drain(..drop);
                return Ok(None);
            };

            if magic_pos > 0 {
                self.buf.drain(..magic_pos);
                continue;
            }

            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }

            let header: Vec<u8> = self.buf.iter().take(HEADER_LEN).copied().collect();
            let length = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
            let msg_type = u32::from_le_bytes(header[8..12].try_into().unwrap());
            let checksum = u32::from_le_bytes(header[12..16].try_into().unwrap());

            if length > MAX_PAYLOAD_LEN {
                // Can't trust this header at all; resync past the magic we
                // just matched on and keep looking.
                self.buf.drain(..4);
                continue;
            }

            if self.buf.len() < HEADER_LEN + length {
                return Ok(None);
            }

            let expected = checksum_for(msg_type);
            if checksum != expected {
                tracing::warn!(msg_type, expected, actual = checksum, "corrupt frame, resyncing");
                self.buf.drain(..4);
                continue;
            }

            self.buf.drain(..HEADER_LEN);
            let payload: Vec<u8> = self.buf.drain(..length).collect();
            return Ok(Some(RawFrame { msg_type, payload }));
        }
    }

    fn find_magic(&self) -> Option<usize> {
        let magic_bytes = MAGIC.to_le_bytes();
        if self.buf.len() < 4 {
            return None;
        }
        'outer: for start in 0..=(self.buf.len() - 4) {
            for i in 0..4 {
                if self.buf[start + i] != magic_bytes[i] {
                    continue 'outer;
                }
            }
            return Some(start);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let payload = vec![1, 2, 3, 4, 5];
        let bytes = encode(0x05, &payload).unwrap();
        let mut dec = FrameDecoder::new();
        dec.feed(&bytes);
        let frame = dec.try_decode().unwrap().unwrap();
        assert_eq!(frame.msg_type, 0x05);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn payload_too_large_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(encode(0x07, &payload), Err(FrameError::PayloadTooLarge(payload.len())));
    }

    #[test]
    fn partial_feed_returns_none_until_complete() {
        let bytes = encode(0x01, &[9; 28]).unwrap();
        let mut dec = FrameDecoder::new();
        dec.feed(&bytes[..10]);
        assert!(dec.try_decode().unwrap().is_none());
        dec.feed(&bytes[10..]);
        let frame = dec.try_decode().unwrap().unwrap();
        assert_eq!(frame.msg_type, 0x01);
    }

    /// P1: checksum invariant holds for any accepted frame.
    #[test]
    fn p1_checksum_invariant_on_every_accepted_frame() {
        for t in [0x01u32, 0x05, 0x07, 0xAA, 0x99] {
            let bytes = encode(t, &[0u8; 4]).unwrap();
            let mut dec = FrameDecoder::new();
            dec.feed(&bytes);
            let frame = dec.try_decode().unwrap().unwrap();
            assert_eq!(checksum_for(frame.msg_type), checksum_for(t));
        }
    }

    /// Scenario 6 / P1: corrupt frame mid-stream is dropped, resync finds
    /// the next magic, no callback fires for the bad frame, next frame
    /// parses normally.
    #[test]
    fn scenario_checksum_corruption_mid_stream_resyncs() {
        let good1 = encode(0x08, &[1, 2, 3, 4]).unwrap();
        let mut bad = encode(0x08, &[5, 6, 7, 8]).unwrap();
        // Flip one bit of the checksum field.
        bad[12] ^= 0x01;
        let good2 = encode(0x08, &[9, 10, 11, 12]).unwrap();

        let mut stream = Vec::new();
        stream.extend_from_slice(&good1);
        stream.extend_from_slice(&bad);
        stream.extend_from_slice(&good2);

        let mut dec = FrameDecoder::new();
        dec.feed(&stream);

        let f1 = dec.try_decode().unwrap().unwrap();
        assert_eq!(f1.payload, vec![1, 2, 3, 4]);

        let f2 = dec.try_decode().unwrap().unwrap();
        assert_eq!(f2.payload, vec![9, 10, 11, 12]);

        assert!(dec.try_decode().unwrap().is_none());
    }

    #[test]
    fn garbage_before_magic_is_skipped() {
        let mut stream = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00];
        stream.extend_from_slice(&encode(0x02, &[]).unwrap());
        let mut dec = FrameDecoder::new();
        dec.feed(&stream);
        let frame = dec.try_decode().unwrap().unwrap();
        assert_eq!(frame.msg_type, 0x02);
    }
}
