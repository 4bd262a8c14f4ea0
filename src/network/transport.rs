//! Transport lifecycle and the TCP implementation.
//!
//! # States
//! ```text
//! NotStarted → Running(local_addr) → Stopped
//! ```
//!
//! # Design Decisions
//! - `run` is the single long-lived start call; readiness is published on a watch channel
//! - The inbound handler is bound after the transport is running (ArcSwap)
//! - Outbound requests use one short-lived connection per exchange
//! - `stop` is bounded by its timeout whether or not connections drained

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ValidatedConfig;
use crate::network::listener::Listener;
use crate::network::message::{read_message, write_message, Message};
use crate::network::TransportError;
use crate::observability::metrics;

/// Idle connections are closed after this long without a message.
const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed accept (EMFILE and friends) before the next attempt.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Direct,
    RelayAssisted,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(TransportKind::Direct),
            "relay-assisted" | "relay_assisted" | "relay" => Ok(TransportKind::RelayAssisted),
            other => Err(format!("unknown transport kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Direct => write!(f, "direct"),
            TransportKind::RelayAssisted => write!(f, "relay-assisted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    NotStarted,
    Running(SocketAddr),
    Stopped,
}

/// Receives every inbound message once the discovery protocol is bound.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Returns the reply to send, if any.
    async fn handle(&self, message: Message, remote: SocketAddr) -> Option<Message>;
}

/// Network transport driven by the supervisor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Long-lived: serves until `token` is cancelled or `stop` is called.
    async fn run(&self, token: CancellationToken) -> Result<(), TransportError>;

    /// Resolves once the transport is accepting connections.
    async fn await_ready(&self) -> Result<SocketAddr, TransportError>;

    /// Best-effort stop, returning after at most `timeout`.
    async fn stop(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Send one message to `endpoint` and wait for its reply.
    async fn request(
        &self,
        endpoint: &str,
        message: Message,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<Message, TransportError>;

    /// Endpoint announced to other peers.
    fn local_endpoint(&self) -> String;

    fn bind_handler(&self, handler: Arc<dyn InboundHandler>);
}

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub kind: TransportKind,
    pub bind_address: String,
    pub advertised_endpoint: String,
    pub max_workers: usize,
    pub node_address: Address,
    pub protocol_version: String,
}

impl TransportSettings {
    pub fn from_config(config: &ValidatedConfig, node_address: Address) -> Self {
        Self {
            kind: config.transport_kind,
            bind_address: config.bind_address.clone(),
            advertised_endpoint: config.advertised_endpoint.clone(),
            max_workers: config.config.node.worker_count,
            node_address,
            protocol_version: config.config.node.protocol_version.clone(),
        }
    }
}

struct Inner {
    settings: TransportSettings,
    state: watch::Sender<TransportState>,
    handler: ArcSwapOption<Arc<dyn InboundHandler>>,
    stop: CancellationToken,
}

/// Newline-delimited JSON over TCP.
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<Inner>,
}

impl TcpTransport {
    pub fn new(settings: TransportSettings) -> Self {
        let (state, _) = watch::channel(TransportState::NotStarted);
        Self {
            inner: Arc::new(Inner {
                settings,
                state,
                handler: ArcSwapOption::empty(),
                stop: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> TransportState {
        *self.inner.state.borrow()
    }

    fn mark_stopped(&self) {
        self.inner.state.send_replace(TransportState::Stopped);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn run(&self, token: CancellationToken) -> Result<(), TransportError> {
        if self.state() != TransportState::NotStarted {
            return Err(TransportError::AlreadyStarted);
        }
        let settings = &self.inner.settings;

        let listener = match Listener::bind(&settings.bind_address, settings.max_workers).await {
            Ok(listener) => listener,
            Err(e) => {
                self.mark_stopped();
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;
        self.inner.state.send_replace(TransportState::Running(local_addr));

        tracing::info!(
            kind = %settings.kind,
            local = %local_addr,
            advertised = %settings.advertised_endpoint,
            max_workers = listener.max_workers(),
            "Transport running"
        );

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.inner.stop.cancelled() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote, permit)) => {
                        metrics::record_busy_workers(
                            listener.max_workers().saturating_sub(listener.available_workers()),
                        );
                        let inner = self.inner.clone();
                        let token = token.clone();
                        connections.spawn(serve_connection(inner, stream, remote, permit, token));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        if !accept_backoff(&token, &self.inner.stop).await {
                            break;
                        }
                    }
                },
            }
        }

        drop(listener);
        connections.shutdown().await;
        self.mark_stopped();
        tracing::info!("Transport stopped");
        Ok(())
    }

    async fn await_ready(&self) -> Result<SocketAddr, TransportError> {
        let mut rx = self.inner.state.subscribe();
        let state = *rx
            .wait_for(|s| !matches!(s, TransportState::NotStarted))
            .await
            .map_err(|_| TransportError::Stopped)?;
        match state {
            TransportState::Running(addr) => Ok(addr),
            _ => Err(TransportError::Stopped),
        }
    }

    async fn stop(&self, timeout: Duration) -> Result<(), TransportError> {
        self.inner.stop.cancel();
        if self.state() == TransportState::NotStarted {
            self.mark_stopped();
            return Ok(());
        }

        let mut rx = self.inner.state.subscribe();
        let stopped = tokio::time::timeout(timeout, rx.wait_for(|s| *s == TransportState::Stopped))
            .await
            .is_ok();
        if stopped {
            Ok(())
        } else {
            Err(TransportError::Timeout(timeout))
        }
    }

    async fn request(
        &self,
        endpoint: &str,
        message: Message,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<Message, TransportError> {
        let exchange = async {
            let stream = TcpStream::connect(endpoint).await.map_err(TransportError::Io)?;
            let (read_half, mut write_half) = stream.into_split();
            write_message(&mut write_half, &message).await?;

            let mut reader = BufReader::new(read_half);
            match read_message(&mut reader).await? {
                Some(Message::Error { reason }) => Err(TransportError::Remote(reason)),
                Some(reply) => Ok(reply),
                None => Err(TransportError::UnexpectedEof),
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = tokio::time::timeout(timeout, exchange) => {
                result.map_err(|_| TransportError::Timeout(timeout))?
            }
        }
    }

    fn local_endpoint(&self) -> String {
        self.inner.settings.advertised_endpoint.clone()
    }

    fn bind_handler(&self, handler: Arc<dyn InboundHandler>) {
        self.inner.handler.store(Some(Arc::new(handler)));
        tracing::debug!("Inbound handler bound to transport");
    }
}

/// Wait out [`ACCEPT_BACKOFF`]. Returns false when the transport is shutting down instead.
async fn accept_backoff(token: &CancellationToken, stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

async fn serve_connection(
    inner: Arc<Inner>,
    stream: TcpStream,
    remote: SocketAddr,
    _permit: OwnedSemaphorePermit,
    token: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return,
            next = tokio::time::timeout(CONNECTION_IDLE_TIMEOUT, read_message(&mut reader)) => next,
        };

        let message = match next {
            Ok(Ok(Some(message))) => message,
            Ok(Ok(None)) | Err(_) => return,
            Ok(Err(e)) => {
                tracing::debug!(remote = %remote, error = %e, "Dropping connection");
                let reply = Message::Error { reason: e.to_string() };
                let _ = write_message(&mut write_half, &reply).await;
                return;
            }
        };

        metrics::record_inbound(message.kind());

        let reply = match inner.handler.load_full() {
            Some(handler) => handler.handle(message, remote).await,
            None => Some(answer_unbound(&inner.settings, message)),
        };

        if let Some(reply) = reply {
            if let Err(e) = write_message(&mut write_half, &reply).await {
                tracing::debug!(remote = %remote, error = %e, "Reply failed");
                return;
            }
        }
    }
}

/// Before the discovery protocol is bound only pings are answered.
fn answer_unbound(settings: &TransportSettings, message: Message) -> Message {
    match message {
        Message::Ping { version, .. } if version == settings.protocol_version => Message::Pong {
            from: settings.node_address,
            endpoint: settings.advertised_endpoint.clone(),
        },
        Message::Ping { version, .. } => Message::Error {
            reason: format!("protocol version mismatch: {}", version),
        },
        _ => Message::Error {
            reason: "node starting".to_string(),
        },
    }
}
