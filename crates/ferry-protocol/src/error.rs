use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame section too large: {section} is {len} bytes (max {max})")]
    FrameTooLarge {
        section: &'static str,
        len: u64,
        max: u64,
    },

    #[error("framing error: {0}")]
    Framing(String),

    #[error("metadata encode error: {0}")]
    Encode(String),

    #[error("metadata decode error: {0}")]
    Decode(String),

    #[error("response is missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("stream closed by peer mid-frame")]
    StreamClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
