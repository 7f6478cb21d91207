//! Signal handling for graceful shutdown.

use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, watch};

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Spawns a task that flips the returned watch channel to `true` on
/// SIGTERM/SIGINT.
///
/// Returns the shutdown receiver and a Notify that stops the handler task
/// once the simulation has finished on its own.
pub fn spawn_shutdown_handler() -> (watch::Receiver<bool>, Arc<Notify>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let done_notify = Arc::new(Notify::new());
    let done_notify_clone = done_notify.clone();

    tokio::spawn(async move {
        tokio::select! {
            result = shutdown_signal() => {
                if let Err(e) = result {
                    tracing::error!("Failed to install signal handlers: {}", e);
                    return;
                }
                let _ = shutdown_tx.send(true);
            }
            _ = done_notify_clone.notified() => {
                tracing::debug!("Shutdown handler exiting");
            }
        }
    });

    (shutdown_rx, done_notify)
}
