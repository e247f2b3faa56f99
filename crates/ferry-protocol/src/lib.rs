//! Wire protocol for the ferry upload service.
//!
//! Every frame is an 8-byte big-endian preamble (JSON metadata length,
//! binary payload length) followed by the UTF-8 JSON metadata and the raw
//! payload bytes. Control messages travel as metadata-only frames; file
//! blocks ride in the binary section of an UPLOAD frame. The stream layer
//! reads exact byte counts per section, so the protocol needs no framing
//! support from the transport.

pub mod error;
pub mod message;
pub mod packet;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{Request, ServerResponse, DEFAULT_PORT, STATUS_KEY_CONFLICT};
pub use packet::{FrameHeader, Packet, HEADER_LEN, MAX_BINARY_LEN, MAX_METADATA_LEN};
pub use wire::{read_packet, write_packet};
