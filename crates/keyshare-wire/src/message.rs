//! PDU types and codec.
//!
//! Every PDU is a single JSON object. Count fields (`NS`, `NL_or_NW`, `NR`)
//! travel alongside their lists and must agree with them on decode.

use crate::error::WireError;
use keyshare_types::error::{ErrorCode, KeyShareError, KeyShareResult};
use keyshare_types::oid::PROTOCOL_ERROR_OID;
use keyshare_types::value::MibValue;
use serde::{Deserialize, Serialize};

/// Largest datagram either side will send or accept (64 KiB).
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Primitive type carried in `Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Primitive {
    Response,
    Get,
    Set,
    /// Any other integer. Decodes fine; the agent rejects it.
    Unknown(i64),
}

impl From<i64> for Primitive {
    fn from(raw: i64) -> Self {
        match raw {
            0 => Self::Response,
            1 => Self::Get,
            2 => Self::Set,
            other => Self::Unknown(other),
        }
    }
}

impl From<Primitive> for i64 {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Response => 0,
            Primitive::Get => 1,
            Primitive::Set => 2,
            Primitive::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response => write!(f, "Response"),
            Self::Get => write!(f, "Get"),
            Self::Set => write!(f, "Set"),
            Self::Unknown(_) => write!(f, "Unknown"),
        }
    }
}

/// One `(oid, value)` pair.
///
/// In a GET request the value is the follow count; in a SET request it is
/// the value to write; in a response it is the value read or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarBind {
    pub oid: String,
    pub value: MibValue,
}

impl VarBind {
    pub fn new(oid: impl Into<String>, value: impl Into<MibValue>) -> Self {
        Self {
            oid: oid.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// One entry of the error list `R`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduError {
    pub oid: String,
    pub code: ErrorCode,
    pub description: String,
}

impl PduError {
    /// Error entry for `oid` describing `err`.
    pub fn new(oid: impl Into<String>, err: &KeyShareError) -> Self {
        Self {
            oid: oid.into(),
            code: err.code(),
            description: err.to_string(),
        }
    }
}

impl std::fmt::Display for PduError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.oid, self.code, self.description)
    }
}

/// A protocol data unit. Immutable once built; the constructors keep every
/// count field consistent with its list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdu {
    /// Security model. Carried, not interpreted.
    #[serde(rename = "S")]
    pub security_model: i64,
    #[serde(rename = "NS")]
    pub security_param_count: u64,
    /// Security model parameters. Carried, not interpreted.
    #[serde(rename = "Q")]
    pub security_params: Vec<serde_json::Value>,
    /// Request id.
    #[serde(rename = "P")]
    pub request_id: u64,
    #[serde(rename = "Y")]
    pub primitive: Primitive,
    #[serde(rename = "NL_or_NW")]
    pub list_len: u64,
    #[serde(rename = "L_or_W")]
    pub list: Vec<VarBind>,
    #[serde(rename = "NR")]
    pub error_count: u64,
    #[serde(rename = "R")]
    pub errors: Vec<PduError>,
}

impl Pdu {
    fn build(
        request_id: u64,
        primitive: Primitive,
        list: Vec<VarBind>,
        errors: Vec<PduError>,
    ) -> Self {
        Self {
            security_model: 0,
            security_param_count: 0,
            security_params: Vec::new(),
            request_id,
            primitive,
            list_len: list.len() as u64,
            list,
            error_count: errors.len() as u64,
            errors,
        }
    }

    /// GET request: each OID plus how many following instances to walk.
    pub fn get<I, S>(request_id: u64, items: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let list = items
            .into_iter()
            .map(|(oid, follow)| VarBind::new(oid, i64::from(follow)))
            .collect();
        Self::build(request_id, Primitive::Get, list, Vec::new())
    }

    /// SET request.
    pub fn set(request_id: u64, list: Vec<VarBind>) -> Self {
        Self::build(request_id, Primitive::Set, list, Vec::new())
    }

    /// Response carrying partial results and the per-item errors.
    pub fn response(request_id: u64, list: Vec<VarBind>, errors: Vec<PduError>) -> Self {
        Self::build(request_id, Primitive::Response, list, errors)
    }

    /// Response rejecting the whole request: no results, one error under
    /// the sentinel OID.
    pub fn protocol_error(request_id: u64, err: &KeyShareError) -> Self {
        Self::response(
            request_id,
            Vec::new(),
            vec![PduError::new(PROTOCOL_ERROR_OID, err)],
        )
    }

    /// Check that every count field agrees with its list.
    pub fn validate(&self) -> KeyShareResult<()> {
        let checks = [
            ("NS", self.security_param_count, self.security_params.len()),
            ("NL_or_NW", self.list_len, self.list.len()),
            ("NR", self.error_count, self.errors.len()),
        ];
        for (field, declared, actual) in checks {
            if declared != actual as u64 {
                return Err(KeyShareError::MalformedPdu(format!(
                    "{field} is {declared} but the list holds {actual} entries"
                )));
            }
        }
        Ok(())
    }

    pub fn is_response(&self) -> bool {
        self.primitive == Primitive::Response
    }
}

impl std::fmt::Display for Pdu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let q: Vec<String> = self.security_params.iter().map(|v| v.to_string()).collect();
        let l: Vec<String> = self.list.iter().map(|v| v.to_string()).collect();
        let r: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        writeln!(f, "S  (security model):       {}", self.security_model)?;
        writeln!(f, "NS (security params):      {}", self.security_param_count)?;
        writeln!(f, "Q  (security param list):  [{}]", q.join(", "))?;
        writeln!(f)?;
        writeln!(f, "P  (request id):           {}", self.request_id)?;
        writeln!(
            f,
            "Y  (primitive):            {} ({})",
            i64::from(self.primitive),
            self.primitive
        )?;
        writeln!(f)?;
        writeln!(f, "NL/NW (instance count):    {}", self.list_len)?;
        writeln!(f, "L/W   (instances):         [{}]", l.join(", "))?;
        writeln!(f)?;
        writeln!(f, "NR    (error count):       {}", self.error_count)?;
        write!(f, "R     (errors):            [{}]", r.join(", "))
    }
}

/// Encode a PDU into one datagram.
pub fn encode_pdu(pdu: &Pdu) -> Result<Vec<u8>, WireError> {
    let bytes = serde_json::to_vec(pdu)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(WireError::DatagramTooLarge {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode and validate one datagram.
pub fn decode_pdu(bytes: &[u8]) -> KeyShareResult<Pdu> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(KeyShareError::MalformedPdu(format!(
            "datagram of {} bytes exceeds {MAX_DATAGRAM_SIZE}",
            bytes.len()
        )));
    }
    let pdu: Pdu =
        serde_json::from_slice(bytes).map_err(|e| KeyShareError::MalformedPdu(e.to_string()))?;
    pdu.validate()?;
    Ok(pdu)
}

/// Best-effort extraction of `P` from a datagram that failed to decode, so
/// the error can still be addressed to the right request.
pub fn peek_request_id(bytes: &[u8]) -> Option<u64> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()?
        .get("P")?
        .as_u64()
}
