//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT (Ctrl+C) and SIGTERM
//! - Translate the first signal into the shared cancellation signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The default termination is suppressed so tasks can unwind cooperatively
//! - A second signal forces an immediate exit

use tokio::signal;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Exit code used when a second interrupt forces termination.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the interrupt listener for the lifetime of the process.
pub fn spawn_interrupt_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        match next_signal().await {
            Ok(name) => {
                tracing::info!(signal = name, "Shutdown requested");
                shutdown.trigger();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        }

        if let Ok(name) = next_signal().await {
            tracing::warn!(signal = name, "Second signal received, forcing exit");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
}

async fn next_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
