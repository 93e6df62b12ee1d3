//! `keyshare agent`: boot the agent and serve until Ctrl+C.

use crate::ui;
use keyshare_kernel::clock::SystemClock;
use keyshare_kernel::{AgentDaemon, KeyShareAgent};
use keyshare_types::config::KeyShareConfig;
use std::net::SocketAddr;
use std::sync::Arc;

pub fn cmd_agent(mut config: KeyShareConfig, bind: Option<SocketAddr>) {
    if let Some(bind) = bind {
        config.network.bind_addr = bind;
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start the tokio runtime: {e}"));
            std::process::exit(1);
        }
    };
    rt.block_on(async {
        let agent = match KeyShareAgent::boot(config, Arc::new(SystemClock)) {
            Ok(agent) => agent,
            Err(e) => {
                ui::error_with_fix(
                    &format!("Agent failed to boot: {e}"),
                    "Check [key_maintenance] in your config file",
                );
                std::process::exit(1);
            }
        };
        let daemon = match AgentDaemon::start(agent).await {
            Ok(daemon) => daemon,
            Err(e) => {
                ui::error_with_fix(
                    &format!("Could not bind the agent endpoint: {e}"),
                    "Pick another address with --bind or [network] bind_addr",
                );
                std::process::exit(1);
            }
        };

        ui::success(&format!("Agent listening on {}", daemon.local_addr()));
        ui::kv("Key size", &daemon.agent().matrix_size().to_string());
        ui::hint("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler failed, shutting down");
        }
        if let Err(e) = daemon.shutdown().await {
            ui::error(&format!("Shutdown did not complete cleanly: {e}"));
            std::process::exit(1);
        }
        ui::success("Agent stopped");
    });
}
