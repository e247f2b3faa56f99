use std::time::Duration;

use thiserror::Error;

use ferry_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source file {path}: {reason}")]
    SourceFile { path: String, reason: String },

    #[error("storage key still conflicts after rename: {key}")]
    KeyConflictUnresolved { key: String },

    #[error("server sent an unusable transfer plan: {reason}")]
    InvalidTransferPlan { reason: String },

    #[error("no server response within {waited:?}")]
    ResponseTimeout { waited: Duration },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type ClientResult<T> = Result<T, ClientError>;
