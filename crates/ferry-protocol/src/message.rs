use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::Packet;

/// TCP port the upload service listens on by default.
pub const DEFAULT_PORT: u16 = 1379;

/// Status a SAVE response carries when the requested storage key is
/// already taken.
pub const STATUS_KEY_CONFLICT: u64 = 402;

/// Client-to-server requests.
///
/// Every request serializes with uppercase `type` / `operation` /
/// `direction` discriminators; the client only ever sends
/// `direction: "REQUEST"`. An `Upload` travels with the block bytes in
/// the binary section of its packet; the other two are metadata-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Login { username: String, password: String },
    Save { token: String, key: String, size: u64 },
    Upload { token: String, key: String, block_index: u32 },
}

impl Request {
    /// Wire metadata for this request.
    pub fn metadata(&self) -> Value {
        match self {
            Self::Login { username, password } => json!({
                "type": "AUTH",
                "operation": "LOGIN",
                "direction": "REQUEST",
                "username": username,
                "password": password,
            }),
            Self::Save { token, key, size } => json!({
                "type": "FILE",
                "operation": "SAVE",
                "direction": "REQUEST",
                "token": token,
                "key": key,
                "size": size,
            }),
            Self::Upload { token, key, block_index } => json!({
                "type": "FILE",
                "operation": "UPLOAD",
                "direction": "REQUEST",
                "token": token,
                "key": key,
                "block_index": block_index,
            }),
        }
    }

    /// Packet carrying this request; `binary` is empty for everything
    /// except `Upload` block payloads.
    pub fn into_packet(self, binary: Vec<u8>) -> Packet {
        Packet::with_binary(self.metadata(), binary)
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::Login { .. } => "LOGIN",
            Self::Save { .. } => "SAVE",
            Self::Upload { .. } => "UPLOAD",
        }
    }
}

/// Lenient view of a server response.
///
/// Servers omit fields freely depending on the phase, so every field is
/// optional here and the `require_*` accessors turn an absent field into
/// `MissingField` at the point a phase actually needs it. Unknown fields
/// are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ServerResponse {
    pub status: Option<u64>,
    pub token: Option<String>,
    pub key: Option<String>,
    pub total_block: Option<u64>,
    pub block_size: Option<u64>,
    pub md5: Option<String>,
}

impl ServerResponse {
    pub fn from_metadata(metadata: Value) -> ProtocolResult<Self> {
        serde_json::from_value(metadata).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    pub fn is_key_conflict(&self) -> bool {
        self.status == Some(STATUS_KEY_CONFLICT)
    }

    pub fn require_token(&self) -> ProtocolResult<&str> {
        self.token
            .as_deref()
            .ok_or(ProtocolError::MissingField { field: "token" })
    }

    pub fn require_key(&self) -> ProtocolResult<&str> {
        self.key
            .as_deref()
            .ok_or(ProtocolError::MissingField { field: "key" })
    }

    pub fn require_total_block(&self) -> ProtocolResult<u64> {
        self.total_block
            .ok_or(ProtocolError::MissingField { field: "total_block" })
    }

    pub fn require_block_size(&self) -> ProtocolResult<u64> {
        self.block_size
            .ok_or(ProtocolError::MissingField { field: "block_size" })
    }

    pub fn require_md5(&self) -> ProtocolResult<&str> {
        self.md5
            .as_deref()
            .ok_or(ProtocolError::MissingField { field: "md5" })
    }
}
