//! Key maintenance loop: evolves Z and retires expired keys on a timer.

use crate::agent::KeyShareAgent;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the maintenance loop.
///
/// Each iteration runs one tick, then sleeps for the interval currently
/// stored at 1.4.0, so a SET on that OID takes effect from the next sleep.
/// The loop exits when `shutdown` changes.
pub fn spawn_maintenance(
    agent: Arc<KeyShareAgent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(
        interval_ms = agent.update_interval().as_millis() as u64,
        "Starting key maintenance loop"
    );
    tokio::spawn(async move {
        let mut ticks: u64 = 0;
        loop {
            agent.maintenance_tick();
            ticks += 1;
            let interval = agent.update_interval();
            debug!(ticks, next_in_ms = interval.as_millis() as u64, "Maintenance tick");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!(ticks, "Maintenance loop: shutdown signal received");
                    break;
                }
            }
        }
    })
}
