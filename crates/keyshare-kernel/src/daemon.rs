//! AgentDaemon: the running agent, its UDP endpoint and maintenance loop.

use crate::agent::KeyShareAgent;
use crate::error::KernelResult;
use crate::maintenance::spawn_maintenance;
use keyshare_wire::{AgentEndpoint, PduHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A booted agent serving requests.
///
/// Both background tasks share one shutdown signal; [`AgentDaemon::shutdown`]
/// raises it, waits for them and writes the snapshot.
pub struct AgentDaemon {
    agent: Arc<KeyShareAgent>,
    endpoint: Arc<AgentEndpoint>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentDaemon {
    /// Bind the configured address and start serving.
    pub async fn start(agent: KeyShareAgent) -> KernelResult<Self> {
        let bind_addr = agent.config().network.bind_addr;
        Self::start_on(agent, bind_addr).await
    }

    /// Like [`AgentDaemon::start`], on an explicit address.
    pub async fn start_on(agent: KeyShareAgent, bind_addr: SocketAddr) -> KernelResult<Self> {
        let agent = Arc::new(agent);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handler: Arc<dyn PduHandler> = agent.clone();
        let (endpoint, endpoint_task) =
            AgentEndpoint::start(bind_addr, handler, shutdown_rx.clone()).await?;
        let maintenance_task = spawn_maintenance(agent.clone(), shutdown_rx);

        info!(addr = %endpoint.local_addr(), "KeyShare agent started");
        Ok(Self {
            agent,
            endpoint,
            shutdown_tx,
            tasks: vec![endpoint_task, maintenance_task],
        })
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn agent(&self) -> &Arc<KeyShareAgent> {
        &self.agent
    }

    /// Stop both loops and persist the MIB.
    pub async fn shutdown(self) -> KernelResult<()> {
        info!("Shutting down KeyShare agent");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        if let Some(path) = self.agent.persist()? {
            info!(path = %path.display(), "MIB snapshot written");
        }
        info!(
            uptime_secs = self.agent.uptime().as_secs(),
            "KeyShare agent stopped"
        );
        Ok(())
    }
}
