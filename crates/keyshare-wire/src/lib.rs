//! KeyShare wire protocol: PDUs over UDP datagrams.
//!
//! One PDU travels per datagram, encoded as a JSON object whose fields are
//! named after the protocol letters (`S`, `NS`, `Q`, `P`, `Y`, ...).
//!
//! ## Architecture
//!
//! - **Pdu**: request/response message and its codec
//! - **AgentEndpoint**: UDP receive loop that hands decoded PDUs to a
//!   [`PduHandler`] and sends back whatever it returns
//! - **ManagerClient**: one request, one response, bounded by a timeout
//! - **RequestLedger**: request-id reuse window shared by both sides

pub mod endpoint;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod message;

pub use endpoint::{AgentEndpoint, PduHandler};
pub use error::WireError;
pub use ledger::RequestLedger;
pub use manager::ManagerClient;
pub use message::{decode_pdu, encode_pdu, Pdu, PduError, Primitive, VarBind};
