//! AgentEndpoint: the agent's UDP receive loop.
//!
//! An [`AgentEndpoint`] binds a UDP socket and serves one datagram at a time
//! until the shutdown signal flips. Each decoded PDU goes to a [`PduHandler`];
//! the handler's answer (if any) is sent back to the datagram's source.

use crate::error::WireError;
use crate::message::{decode_pdu, encode_pdu, peek_request_id, Pdu, MAX_DATAGRAM_SIZE};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Trait for the agent to answer incoming PDUs.
#[async_trait]
pub trait PduHandler: Send + Sync + 'static {
    /// Answer one request from `source`. `None` means no reply is sent.
    async fn handle_pdu(&self, pdu: Pdu, source: SocketAddr) -> Option<Pdu>;
}

/// The agent's network endpoint.
#[derive(Debug)]
pub struct AgentEndpoint {
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
}

impl AgentEndpoint {
    /// Bind `bind_addr` and spawn the receive loop.
    pub async fn start(
        bind_addr: SocketAddr,
        handler: Arc<dyn PduHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;
        info!(addr = %local_addr, "Agent endpoint listening");

        let endpoint = Arc::new(Self { local_addr });
        let task = tokio::spawn(Self::receive_loop(socket, handler, shutdown));
        Ok((endpoint, task))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn receive_loop(
        socket: UdpSocket,
        handler: Arc<dyn PduHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // One spare byte so an oversized datagram is seen as oversized.
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        loop {
            let received = tokio::select! {
                received = socket.recv_from(&mut buf) => received,
                _ = shutdown.changed() => {
                    info!("Agent endpoint: shutdown signal received");
                    break;
                }
            };
            match received {
                Ok((len, source)) => {
                    if let Some(reply) = Self::process(&buf[..len], source, &*handler).await {
                        Self::reply(&socket, &reply, source).await;
                    }
                }
                Err(e) => warn!(error = %e, "Agent endpoint: receive failed"),
            }
        }
    }

    /// Decode one datagram and run it through the handler.
    async fn process(bytes: &[u8], source: SocketAddr, handler: &dyn PduHandler) -> Option<Pdu> {
        match decode_pdu(bytes) {
            Ok(pdu) => {
                debug!(
                    request_id = pdu.request_id,
                    primitive = %pdu.primitive,
                    items = pdu.list.len(),
                    %source,
                    "Agent endpoint: request received"
                );
                handler.handle_pdu(pdu, source).await
            }
            Err(e) => match peek_request_id(bytes) {
                Some(request_id) => {
                    warn!(request_id, %source, error = %e, "Malformed PDU; answering with an error");
                    Some(Pdu::protocol_error(request_id, &e))
                }
                None => {
                    warn!(%source, len = bytes.len(), error = %e, "Malformed datagram dropped");
                    None
                }
            },
        }
    }

    async fn reply(socket: &UdpSocket, pdu: &Pdu, dest: SocketAddr) {
        let bytes = match encode_pdu(pdu) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(request_id = pdu.request_id, error = %e, "Could not encode response");
                return;
            }
        };
        if let Err(e) = socket.send_to(&bytes, dest).await {
            warn!(request_id = pdu.request_id, %dest, error = %e, "Could not send response");
        }
    }
}
