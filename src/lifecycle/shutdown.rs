//! Shutdown coordination for the seed node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::network::Transport;

/// The process-wide cancellation signal.
///
/// Every long-lived or periodic task receives a clone of [`Shutdown::token`].
/// The token moves from not-cancelled to cancelled once and never reverts.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token shared with every supervised task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the shared signal. Returns `true` only for the call that
    /// actually cancelled it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Bounded transport teardown, run once the task group has unwound.
pub struct ShutdownCoordinator {
    transport: Arc<dyn Transport>,
    stop_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(transport: Arc<dyn Transport>, stop_timeout: Duration) -> Self {
        Self {
            transport,
            stop_timeout,
        }
    }

    /// Issue the single stop request. Returns within `stop_timeout` even if the
    /// transport never finishes draining. Consumes the coordinator so the stop
    /// cannot be issued twice.
    pub async fn stop_transport(self) -> bool {
        tracing::info!(timeout = ?self.stop_timeout, "Stopping transport");
        match tokio::time::timeout(self.stop_timeout, self.transport.stop(self.stop_timeout)).await {
            Ok(Ok(())) => {
                tracing::info!("Transport stopped cleanly");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Transport stop incomplete");
                false
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.stop_timeout, "Transport stop timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use crate::network::{InboundHandler, Message, TransportError};

    #[test]
    fn test_trigger_fires_once() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(token.is_cancelled());
        assert!(shutdown.clone().is_triggered());
    }

    /// Transport whose stop never returns.
    struct HangingTransport {
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn run(&self, _: CancellationToken) -> Result<(), TransportError> {
            Ok(())
        }

        async fn await_ready(&self) -> Result<SocketAddr, TransportError> {
            Err(TransportError::Stopped)
        }

        async fn stop(&self, _: Duration) -> Result<(), TransportError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn request(
            &self,
            _: &str,
            _: Message,
            _: Duration,
            _: &CancellationToken,
        ) -> Result<Message, TransportError> {
            Err(TransportError::Stopped)
        }

        fn local_endpoint(&self) -> String {
            "127.0.0.1:1".into()
        }

        fn bind_handler(&self, _: Arc<dyn InboundHandler>) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_bounded() {
        let transport = Arc::new(HangingTransport {
            stops: AtomicUsize::new(0),
        });
        let coordinator = ShutdownCoordinator::new(transport.clone(), Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        assert!(!coordinator.stop_transport().await);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(transport.stops.load(Ordering::SeqCst), 1);
    }
}
