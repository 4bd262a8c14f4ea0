//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce the worker limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::network::TransportError;

/// A bounded TCP listener that limits concurrently served connections.
///
/// When all worker slots are taken, `accept` waits until one is released.
pub struct Listener {
    inner: TcpListener,
    workers: Arc<Semaphore>,
    max_workers: usize,
}

impl Listener {
    pub async fn bind(address: &str, max_workers: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(TransportError::Bind)?;

        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_workers = max_workers,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            workers: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        })
    }

    /// Accept a new connection, respecting the worker limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit), TransportError> {
        // Acquire permit first (backpressure)
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Stopped)?;

        let (stream, addr) = self.inner.accept().await.map_err(TransportError::Io)?;

        tracing::trace!(
            peer_addr = %addr,
            available = self.workers.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, permit))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.local_addr().map_err(TransportError::Io)
    }

    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}
