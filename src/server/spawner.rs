// src/server/spawner.rs

//! Spawns and supervises the Manager's background tasks (health checker,
//! traffic flush) in a `tokio::task::JoinSet`: a task exit is a critical
//! condition to log, not something to silently drop (§5).

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::error;

use crate::config::ManagerConfig;
use crate::core::health::HealthChecker;
use crate::core::rpc::ManagerState;

pub struct BackgroundTasks {
    tasks: JoinSet<()>,
}

impl BackgroundTasks {
    /// Awaits every spawned task, logging any that exited with a panic.
    /// Tasks are expected to have already observed the shutdown signal and
    /// returned on their own by the time this is called.
    pub async fn shutdown(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("background task panicked: {e}");
            }
        }
    }
}

pub fn spawn_all(state: Arc<ManagerState>, config: &ManagerConfig, shutdown: watch::Receiver<bool>) -> BackgroundTasks {
    let mut tasks = JoinSet::new();

    let health_checker = Arc::new(HealthChecker::new(
        state.registry.clone(),
        state.groups.clone(),
        state.nodes.clone(),
    ));
    let health_interval = config.health_sweep_interval;
    let health_shutdown = shutdown.clone();
    tasks.spawn(async move {
        health_checker.run_tick_loop(health_interval, health_shutdown).await;
    });

    let traffic = state.traffic.clone();
    let flush_interval = config.flush_interval;
    let flush_shutdown = shutdown.clone();
    tasks.spawn(async move {
        traffic.run_flush_loop(flush_interval, flush_shutdown).await;
    });

    BackgroundTasks { tasks }
}
