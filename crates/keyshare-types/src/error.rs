//! Shared error types for the KeyShare system.

use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the KeyShare system.
///
/// Per-item variants (`UnknownOid` through `QuotaExceeded`) are recovered
/// locally by the agent and reported in a response's error list. Protocol
/// variants abort the whole request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyShareError {
    /// The OID does not address any instance in the MIB.
    #[error("Unknown OID: {0}")]
    UnknownOid(String),

    /// A network request tried to write a read-only instance.
    #[error("OID {0} is read-only")]
    ReadOnlyViolation(String),

    /// The supplied value does not match (and cannot be coerced to) the instance kind.
    #[error("OID {oid} expects a value of kind {expected}")]
    TypeMismatch {
        /// The OID that was written.
        oid: String,
        /// The kind the instance holds.
        expected: ValueKind,
    },

    /// `get_next` was called on the last instance of the MIB.
    #[error("OID {0} is the last entry in the MIB")]
    EndOfMib(String),

    /// The row id encoded in the OID is not the one the caller expected.
    #[error("OID {oid} does not belong to row {expected}")]
    RowMismatch {
        /// The OID that was walked.
        oid: String,
        /// The row id the caller expected.
        expected: u64,
    },

    /// The key row is not visible to the caller.
    #[error("Key at OID {0} is not visible to this requester")]
    KeyInvisible(String),

    /// Issuing another key would exceed the configured maximum.
    #[error("Key quota exceeded: {current} valid keys (max {max})")]
    QuotaExceeded {
        /// Currently valid keys.
        current: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The PDU carries a primitive type the receiver cannot serve.
    #[error("Invalid primitive type: {0}")]
    InvalidPrimitive(i64),

    /// A request id was reused inside the minimum retry interval.
    #[error("Duplicate request id {0}")]
    DuplicateRequest(u64),

    /// The PDU could not be decoded.
    #[error("Malformed PDU: {0}")]
    MalformedPdu(String),

    /// No response arrived before the deadline.
    #[error("No response within {0:?}")]
    RequestTimeout(Duration),

    /// A configuration value is out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A key row with this id is already present.
    #[error("Key row {0} already exists")]
    DuplicateRow(u64),
}

impl KeyShareError {
    /// Stable numeric code carried next to the description in PDU error lists.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownOid(_) => ErrorCode::UnknownOid,
            Self::ReadOnlyViolation(_) => ErrorCode::ReadOnlyViolation,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::EndOfMib(_) => ErrorCode::EndOfMib,
            Self::RowMismatch { .. } => ErrorCode::RowMismatch,
            Self::KeyInvisible(_) => ErrorCode::KeyInvisible,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::InvalidPrimitive(_) => ErrorCode::InvalidPrimitive,
            Self::DuplicateRequest(_) => ErrorCode::DuplicateRequest,
            Self::MalformedPdu(_) => ErrorCode::MalformedPdu,
            Self::RequestTimeout(_) => ErrorCode::RequestTimeout,
            Self::Config(_) => ErrorCode::Config,
            Self::DuplicateRow(_) => ErrorCode::DuplicateRow,
        }
    }
}

/// Alias for Result with KeyShareError.
pub type KeyShareResult<T> = Result<T, KeyShareError>;

/// Wire representation of an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    UnknownOid = 1,
    ReadOnlyViolation = 2,
    TypeMismatch = 3,
    EndOfMib = 4,
    RowMismatch = 5,
    KeyInvisible = 6,
    QuotaExceeded = 7,
    InvalidPrimitive = 8,
    DuplicateRequest = 9,
    MalformedPdu = 10,
    RequestTimeout = 11,
    Config = 12,
    DuplicateRow = 13,
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::UnknownOid,
            2 => Self::ReadOnlyViolation,
            3 => Self::TypeMismatch,
            4 => Self::EndOfMib,
            5 => Self::RowMismatch,
            6 => Self::KeyInvisible,
            7 => Self::QuotaExceeded,
            8 => Self::InvalidPrimitive,
            9 => Self::DuplicateRequest,
            10 => Self::MalformedPdu,
            11 => Self::RequestTimeout,
            12 => Self::Config,
            13 => Self::DuplicateRow,
            other => return Err(format!("unknown error code {other}")),
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnknownOid => "unknown_oid",
            Self::ReadOnlyViolation => "read_only",
            Self::TypeMismatch => "type_mismatch",
            Self::EndOfMib => "end_of_mib",
            Self::RowMismatch => "row_mismatch",
            Self::KeyInvisible => "key_invisible",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidPrimitive => "invalid_primitive",
            Self::DuplicateRequest => "duplicate_request",
            Self::MalformedPdu => "malformed_pdu",
            Self::RequestTimeout => "request_timeout",
            Self::Config => "config",
            Self::DuplicateRow => "duplicate_row",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(u16::from(ErrorCode::UnknownOid), 1);
        assert_eq!(u16::from(ErrorCode::DuplicateRow), 13);
        for raw in 1..=13u16 {
            let code = ErrorCode::try_from(raw).unwrap();
            assert_eq!(u16::from(code), raw);
        }
        assert!(ErrorCode::try_from(0).is_err());
        assert!(ErrorCode::try_from(14).is_err());
    }

    #[test]
    fn test_error_maps_to_code() {
        let err = KeyShareError::QuotaExceeded { current: 3, max: 3 };
        assert_eq!(err.code(), ErrorCode::QuotaExceeded);
        assert!(err.to_string().contains("max 3"));
        assert_eq!(
            KeyShareError::KeyInvisible("3.2.1.2.1".into()).code(),
            ErrorCode::KeyInvisible
        );
    }

    #[test]
    fn test_code_serializes_as_number() {
        let json = serde_json::to_string(&ErrorCode::KeyInvisible).unwrap();
        assert_eq!(json, "6");
        let back: ErrorCode = serde_json::from_str("4").unwrap();
        assert_eq!(back, ErrorCode::EndOfMib);
        assert!(serde_json::from_str::<ErrorCode>("99").is_err());
    }
}
