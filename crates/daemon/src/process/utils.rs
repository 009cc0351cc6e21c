use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ServiceConfig;

const REQUEST_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Spawn a task that resolves on SIGINT, SIGTERM or a send on the returned
/// sender, then tells every receiver to stop.
///
/// SIGTERM waits out `REQUEST_GRACE_PERIOD` first so in-flight requests and
/// the session purger can finish.
pub fn graceful_shutdown_blocker() -> (JoinHandle<()>, watch::Sender<()>, watch::Receiver<()>) {
    let mut sigint = signal(SignalKind::interrupt()).expect("installing a SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("installing a SIGTERM handler");

    let (tx, rx) = watch::channel(());
    let signal_tx = tx.clone();
    let mut programmatic_rx = rx.clone();

    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, shutting down");
            }
            _ = sigterm.recv() => {
                tokio::time::sleep(REQUEST_GRACE_PERIOD).await;
                tracing::info!("SIGTERM grace period over, shutting down");
            }
            _ = programmatic_rx.changed() => {
                tracing::info!("shutdown requested");
            }
        }

        let _ = signal_tx.send(());
    });

    (handle, tx, rx)
}

/// Registers a panic hook that logs panics using the `tracing` crate
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

/// Log the build and the effective server settings once logging is up.
pub fn report_build_info(service_config: &ServiceConfig) {
    let build = common::prelude::build_info();

    tracing::info!(
        version = %build.version,
        build_profile = %build.build_profile,
        listen_addr = %service_config.listen_addr,
        workers = ?service_config.workers,
        config_dir = %service_config.config_dir.display(),
        "canopy starting up"
    );
}
