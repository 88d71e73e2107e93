//! Error types for the framed message protocol.

use thiserror::Error;

/// Errors while reading or writing protocol frames.
///
/// All of these are transport failures and end the session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame of {len} bytes is outside the allowed 1..={max} range")]
    FrameSize { len: usize, max: usize },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
