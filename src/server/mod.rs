// src/server/mod.rs

//! Process wiring: turns a loaded [`crate::config::ManagerConfig`] into a
//! running Manager — builds the shared state, spawns the health checker and
//! traffic flush background tasks, and runs the control-channel accept loop.

mod connection_loop;
mod initialization;
mod spawner;

pub use initialization::build_state;

use tokio::sync::watch;
use tracing::info;

use crate::config::ManagerConfig;

/// Runs the Manager until `shutdown` resolves: spawns background tasks and
/// blocks on the control-channel accept loop.
pub async fn run(config: ManagerConfig, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let state = build_state(&config);
    let background = spawner::spawn_all(state.clone(), &config, shutdown.clone());

    info!("manager listening on {} (channel path {})", config.bind_addr(), config.channel_path);

    tokio::select! {
        result = connection_loop::run(state.clone(), &config) => {
            result?;
        }
        _ = shutdown.changed() => {
            info!("shutdown signal received, stopping accept loop");
        }
    }

    background.shutdown().await;
    Ok(())
}
