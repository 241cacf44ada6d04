//! Stop signalling between the OS and the consumer loop.
//!
//! The consumer checks [`StopSignal::is_stop_requested`] between loop
//! iterations, so a signal never interrupts a batch write in progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the consumer loop to stop after its current iteration.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Raise `stop` on SIGINT or SIGTERM.
///
/// Spawns a task that lives until the first signal arrives.
pub fn listen_for_signals(stop: StopSignal) {
    tokio::spawn(async move {
        wait_for_signal().await;
        stop.request_stop();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to register SIGTERM handler, listening for SIGINT only");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received SIGINT, shutting down"),
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    }
}
