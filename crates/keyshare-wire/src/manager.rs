//! ManagerClient: sends one request and waits for its response.

use crate::error::WireError;
use crate::ledger::RequestLedger;
use crate::message::{decode_pdu, encode_pdu, Pdu, VarBind, MAX_DATAGRAM_SIZE};
use keyshare_types::config::ManagerConfig;
use keyshare_types::error::KeyShareError;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Client side of the protocol.
///
/// Request ids are checked against a local ledger before anything is sent,
/// so reusing an id inside the retry interval fails without a round trip.
#[derive(Debug)]
pub struct ManagerClient {
    agent_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    timeout: Duration,
    ledger: RequestLedger,
}

impl ManagerClient {
    pub fn new(agent_addr: SocketAddr, timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            agent_addr,
            local_addr: None,
            timeout,
            ledger: RequestLedger::new(retry_interval),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config.agent_addr, config.timeout(), config.retry_interval())
            .with_local_addr(config.local_addr)
    }

    /// Send every request from `local_addr` instead of an ephemeral port.
    pub fn with_local_addr(mut self, local_addr: Option<SocketAddr>) -> Self {
        self.local_addr = local_addr;
        self
    }

    pub fn agent_addr(&self) -> SocketAddr {
        self.agent_addr
    }

    /// GET each OID plus `follow` instances after it.
    pub async fn get<S: Into<String>>(
        &self,
        request_id: u64,
        items: impl IntoIterator<Item = (S, u32)>,
    ) -> Result<Pdu, WireError> {
        self.request(Pdu::get(request_id, items)).await
    }

    /// SET each `(oid, value)` pair.
    pub async fn set(&self, request_id: u64, items: Vec<VarBind>) -> Result<Pdu, WireError> {
        self.request(Pdu::set(request_id, items)).await
    }

    /// Send `pdu` and wait for the response carrying the same request id.
    ///
    /// Datagrams for other request ids are ignored. Fails `RequestTimeout`
    /// if nothing matching arrives in time; timeouts are not retried.
    /// The request id is only held in the ledger once the datagram is sent.
    pub async fn request(&self, pdu: Pdu) -> Result<Pdu, WireError> {
        let request_id = pdu.request_id;
        let bytes = encode_pdu(&pdu)?;
        self.ledger.check_and_record(request_id)?;
        self.ledger.prune();

        let socket = match self.send(&bytes).await {
            Ok(socket) => socket,
            Err(e) => {
                self.ledger.forget(request_id);
                return Err(e.into());
            }
        };
        debug!(request_id, agent = %self.agent_addr, primitive = %pdu.primitive, "Request sent");

        match tokio::time::timeout(self.timeout, Self::await_response(&socket, request_id)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id, timeout_ms = self.timeout.as_millis() as u64, "Agent did not answer");
                Err(KeyShareError::RequestTimeout(self.timeout).into())
            }
        }
    }

    async fn send(&self, bytes: &[u8]) -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind(self.bind_addr()).await?;
        socket.connect(self.agent_addr).await?;
        socket.send(bytes).await?;
        Ok(socket)
    }

    fn bind_addr(&self) -> SocketAddr {
        match self.local_addr {
            Some(addr) => addr,
            None if self.agent_addr.is_ipv4() => (Ipv4Addr::UNSPECIFIED, 0).into(),
            None => (Ipv6Addr::UNSPECIFIED, 0).into(),
        }
    }

    async fn await_response(socket: &UdpSocket, request_id: u64) -> Result<Pdu, WireError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        loop {
            let len = socket.recv(&mut buf).await?;
            match decode_pdu(&buf[..len]) {
                Ok(pdu) if pdu.request_id == request_id && pdu.is_response() => return Ok(pdu),
                Ok(pdu) => {
                    debug!(expected = request_id, got = pdu.request_id, "Ignoring unrelated datagram");
                }
                Err(e) => warn!(request_id, error = %e, "Ignoring undecodable response"),
            }
        }
    }
}
