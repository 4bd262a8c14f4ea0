//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use seed_node::discovery::{DiscoveryError, DiscoveryProtocol, RoutingTable, StaticPeer};
use seed_node::error::TaskError;
use seed_node::lifecycle::supervisor::BindProtocol;
use seed_node::lifecycle::{Components, Phase, Service};
use seed_node::maintenance::MaintenanceSchedule;
use seed_node::network::{InboundHandler, Message, Transport, TransportError};

/// How the scripted transport behaves.
#[derive(Debug, Clone, Copy, Default)]
pub enum RunScript {
    /// Ready immediately, serves until cancelled.
    #[default]
    Serve,
    /// Fails before becoming ready.
    FailToBind,
    /// Becomes ready, then dies after the given delay.
    DieAfter(Duration),
    /// Never becomes ready.
    NeverReady,
}

/// Transport with scripted run behavior that counts lifecycle calls.
pub struct MockTransport {
    script: RunScript,
    hang_on_stop: bool,
    ready: watch::Sender<Option<bool>>,
    pub runs: AtomicUsize,
    pub stops: AtomicUsize,
    pub binds: AtomicUsize,
}

impl MockTransport {
    pub fn new(script: RunScript) -> Arc<Self> {
        Self::build(script, false)
    }

    /// Transport whose stop call never completes.
    pub fn hanging() -> Arc<Self> {
        Self::build(RunScript::Serve, true)
    }

    fn build(script: RunScript, hang_on_stop: bool) -> Arc<Self> {
        let (ready, _) = watch::channel(None);
        Arc::new(Self {
            script,
            hang_on_stop,
            ready,
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            binds: AtomicUsize::new(0),
        })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn run(&self, token: CancellationToken) -> Result<(), TransportError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.script {
            RunScript::FailToBind => {
                self.ready.send_replace(Some(false));
                Err(TransportError::Bind(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "address in use",
                )))
            }
            RunScript::NeverReady => {
                token.cancelled().await;
                Ok(())
            }
            RunScript::Serve => {
                self.ready.send_replace(Some(true));
                token.cancelled().await;
                Ok(())
            }
            RunScript::DieAfter(delay) => {
                self.ready.send_replace(Some(true));
                tokio::select! {
                    _ = token.cancelled() => Ok(()),
                    _ = tokio::time::sleep(delay) => Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "socket closed",
                    ))),
                }
            }
        }
    }

    async fn await_ready(&self) -> Result<SocketAddr, TransportError> {
        let mut rx = self.ready.subscribe();
        let ready = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TransportError::Stopped)?;
        match ready {
            Some(true) => Ok(SocketAddr::from(([127, 0, 0, 1], 30303))),
            _ => Err(TransportError::Stopped),
        }
    }

    async fn stop(&self, _timeout: Duration) -> Result<(), TransportError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_stop {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn request(
        &self,
        _endpoint: &str,
        _message: Message,
        _timeout: Duration,
        _token: &CancellationToken,
    ) -> Result<Message, TransportError> {
        Err(TransportError::Stopped)
    }

    fn local_endpoint(&self) -> String {
        "127.0.0.1:30303".into()
    }

    fn bind_handler(&self, _handler: Arc<dyn InboundHandler>) {
        self.binds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Discovery protocol that records every call.
#[derive(Default)]
pub struct MockProtocol {
    pub refreshes: AtomicUsize,
    pub cache_checks: AtomicUsize,
    pub rebuilds: Mutex<Vec<usize>>,
    pub added: Mutex<Vec<Vec<Address>>>,
    pub fail_refresh: bool,
}

impl MockProtocol {
    pub fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::default()
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryProtocol for MockProtocol {
    async fn refresh_table(
        &self,
        _staleness_threshold: Duration,
        _token: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(DiscoveryError::AllPeersFailed(1));
        }
        Ok(())
    }

    async fn check_replacement_cache(&self, _token: &CancellationToken) -> Result<(), DiscoveryError> {
        self.cache_checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rebuild_connections(
        &self,
        max_depth: usize,
        _token: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        self.rebuilds.lock().unwrap().push(max_depth);
        Ok(())
    }

    async fn add_peers(
        &self,
        peers: &[StaticPeer],
        _per_peer_timeout: Duration,
        _token: &CancellationToken,
    ) -> Result<usize, DiscoveryError> {
        self.added
            .lock()
            .unwrap()
            .push(peers.iter().map(|p| p.address).collect());
        Ok(peers.len())
    }

    fn max_depth(&self) -> usize {
        8
    }
}

/// Service that fails (or panics) after a delay.
pub struct FailingService {
    pub after: Duration,
    pub panic: bool,
}

#[async_trait]
impl Service for FailingService {
    fn name(&self) -> &'static str {
        "flaky-service"
    }

    async fn run(&self, token: CancellationToken) -> Result<(), TaskError> {
        tokio::select! {
            _ = token.cancelled() => Err(TaskError::Cancelled),
            _ = tokio::time::sleep(self.after) => {
                if self.panic {
                    panic!("service blew up");
                }
                Err(TaskError::failed(self.name(), "exploded"))
            }
        }
    }
}

pub fn static_peer(n: u8) -> StaticPeer {
    StaticPeer {
        address: Address::repeat_byte(n),
        endpoint: format!("10.0.0.{}:30303", n),
    }
}

/// Components wired to the given mocks, with default cadence and a 1 s stop bound.
pub fn components(
    transport: Arc<MockTransport>,
    protocol: Arc<MockProtocol>,
    table: RoutingTable,
    static_peers: Vec<StaticPeer>,
    services: Vec<Arc<dyn Service>>,
) -> (Components, watch::Receiver<Phase>) {
    let (phase, phase_rx) = watch::channel(Phase::Validating);
    let bind_protocol: BindProtocol = Box::new(move |transport: Arc<dyn Transport>| {
        transport.bind_handler(Arc::new(NoopHandler));
        protocol as Arc<dyn DiscoveryProtocol>
    });

    (
        Components {
            table,
            transport,
            bind_protocol,
            services,
            static_peers,
            schedule: MaintenanceSchedule::default(),
            stop_timeout: Duration::from_secs(1),
            phase,
        },
        phase_rx,
    )
}

struct NoopHandler;

#[async_trait]
impl InboundHandler for NoopHandler {
    async fn handle(&self, _message: Message, _remote: SocketAddr) -> Option<Message> {
        None
    }
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
