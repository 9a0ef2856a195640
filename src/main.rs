// src/main.rs

use std::env;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use messageboy::config::ManagerConfig;

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match env::args().nth(1) {
        Some(path) => ManagerConfig::from_file(&path)?,
        None => ManagerConfig::default(),
    };

    init_logging(&config.log_level);
    info!("starting MessageBoy manager");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = messageboy::server::run(config, shutdown_rx).await {
        error!("manager exited with error: {e}");
        return Err(e);
    }

    Ok(())
}
