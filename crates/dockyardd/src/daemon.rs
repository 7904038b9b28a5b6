//! Long-running roles: the worker loop and the edge router.

use std::net::SocketAddr;
use std::sync::Arc;

use dockyard_router::RouterState;
use dockyard_worker::{Pipeline, Worker};
use tokio::sync::watch;
use tracing::{error, info};

use crate::backends::Backends;

pub async fn run_worker(backends: Backends) -> anyhow::Result<()> {
    let worker_config = backends.config.worker.clone();
    std::fs::create_dir_all(&worker_config.work_dir)?;
    if let Some(parent) = worker_config.lease_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pipeline = Pipeline::new(
        backends.artifacts.clone(),
        backends.supervisor(),
        backends.ports(),
        worker_config.clone(),
    );
    let worker = Worker::new(
        backends.queue.clone(),
        backends.config.store.queue.clone(),
        backends.coordinator.clone(),
        backends.records.clone(),
        pipeline,
    )
    .with_backoff(worker_config.backoff());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    info!("waiting for the current job to finish");
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("worker stopped");
    Ok(())
}

pub async fn run_router(backends: Backends, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut config = backends.config.router.clone();
    if let Some(addr) = listen {
        config.listen = addr;
    }

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    let state = Arc::new(RouterState::new(
        backends.coordinator.clone(),
        backends.artifacts.clone(),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    dockyard_router::serve(listener, state.clone(), shutdown_rx).await?;

    let stats = state.cache_stats();
    info!(
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        cache_evictions = stats.evictions,
        "router stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
