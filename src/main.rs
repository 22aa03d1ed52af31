//! `ccg-arena-server`: JSON-lines battle server backed by in-memory stores.

use std::sync::Arc;

use ccg_arena::{BattleConfig, BattleServer, Gateway, MemoryStore};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ccg_arena=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = BattleConfig::load()?;
    tracing::info!(
        addr = %config.listen_addr,
        policy = ?config.turn_timeout_policy,
        "Configuration loaded"
    );
    let listener = TcpListener::bind(config.listen_addr).await?;

    let store = Arc::new(MemoryStore::new());
    let (handle, engine_task) = BattleServer::spawn(config, store.clone(), store.clone());
    let gateway = Gateway::new(handle.clone(), store.clone());

    tokio::select! {
        served = gateway.serve(listener) => {
            if let Err(err) = served {
                tracing::error!(error = %err, "Listener failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    let drained = handle.shutdown().await?;
    tracing::info!(drained, leaders = ?store.top(5), "Sessions drained");
    engine_task.await?;
    Ok(())
}
