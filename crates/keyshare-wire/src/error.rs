//! Errors from the wire layer.

use keyshare_types::error::KeyShareError;
use thiserror::Error;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Protocol(#[from] KeyShareError),
    #[error("Datagram too large: {size} bytes (max {max})")]
    DatagramTooLarge { size: usize, max: usize },
}

impl WireError {
    /// The protocol error inside, if this is one.
    pub fn as_protocol(&self) -> Option<&KeyShareError> {
        match self {
            Self::Protocol(e) => Some(e),
            _ => None,
        }
    }
}
