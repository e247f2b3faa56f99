use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Size of the fixed frame preamble.
pub const HEADER_LEN: usize = 8;

/// Upper bound on the JSON metadata section of a frame.
pub const MAX_METADATA_LEN: usize = 8 * 1024 * 1024;

/// Upper bound on the binary payload section of a frame.
pub const MAX_BINARY_LEN: usize = 1024 * 1024 * 1024;

/// Fixed preamble of every frame: two big-endian u32 lengths, metadata
/// bytes first, then binary payload bytes.
///
/// ```text
/// [metadata_len: u32 BE][binary_len: u32 BE][metadata][binary]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub metadata_len: u32,
    pub binary_len: u32,
}

impl FrameHeader {
    pub fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(&self.metadata_len.to_be_bytes());
        buf[4..].copy_from_slice(&self.binary_len.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; HEADER_LEN]) -> Self {
        let metadata_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let binary_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self { metadata_len, binary_len }
    }

    /// Reject absurd section lengths before any allocation happens.
    pub fn validate(self) -> ProtocolResult<()> {
        if self.metadata_len as usize > MAX_METADATA_LEN {
            return Err(ProtocolError::FrameTooLarge {
                section: "metadata",
                len: self.metadata_len as u64,
                max: MAX_METADATA_LEN as u64,
            });
        }
        if self.binary_len as usize > MAX_BINARY_LEN {
            return Err(ProtocolError::FrameTooLarge {
                section: "binary",
                len: self.binary_len as u64,
                max: MAX_BINARY_LEN as u64,
            });
        }
        Ok(())
    }

    /// Total frame size including the preamble itself.
    pub fn frame_len(self) -> usize {
        HEADER_LEN + self.metadata_len as usize + self.binary_len as usize
    }
}

/// One wire frame: JSON metadata plus an optional binary payload.
///
/// A `binary_len` of zero on the wire means a metadata-only packet; that
/// is how every control message travels. Packets are built, sent, and
/// dropped within a single request/response exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub metadata: Value,
    pub binary: Vec<u8>,
}

impl Packet {
    /// Metadata-only packet.
    pub fn new(metadata: Value) -> Self {
        Self { metadata, binary: Vec::new() }
    }

    pub fn with_binary(metadata: Value, binary: Vec<u8>) -> Self {
        Self { metadata, binary }
    }

    /// Encode with framing. Section lengths are measured from the
    /// serialized bytes, never trusted from elsewhere.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let metadata = serde_json::to_vec(&self.metadata)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        if metadata.len() > MAX_METADATA_LEN {
            return Err(ProtocolError::FrameTooLarge {
                section: "metadata",
                len: metadata.len() as u64,
                max: MAX_METADATA_LEN as u64,
            });
        }
        if self.binary.len() > MAX_BINARY_LEN {
            return Err(ProtocolError::FrameTooLarge {
                section: "binary",
                len: self.binary.len() as u64,
                max: MAX_BINARY_LEN as u64,
            });
        }
        let header = FrameHeader {
            metadata_len: metadata.len() as u32,
            binary_len: self.binary.len() as u32,
        };
        let mut buf = Vec::with_capacity(header.frame_len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&metadata);
        buf.extend_from_slice(&self.binary);
        Ok(buf)
    }

    /// Decode one packet from a complete buffer. Returns (packet, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(Packet, usize)> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::Framing(format!(
                "too short: have {}, need at least {}",
                data.len(),
                HEADER_LEN
            )));
        }
        let mut header_buf = [0u8; HEADER_LEN];
        header_buf.copy_from_slice(&data[..HEADER_LEN]);
        let header = FrameHeader::from_bytes(header_buf);
        header.validate()?;

        let total = header.frame_len();
        if data.len() < total {
            return Err(ProtocolError::Framing(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let metadata_end = HEADER_LEN + header.metadata_len as usize;
        let metadata: Value = serde_json::from_slice(&data[HEADER_LEN..metadata_end])
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        let binary = data[metadata_end..total].to_vec();
        Ok((Packet { metadata, binary }, total))
    }
}
