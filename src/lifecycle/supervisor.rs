//! Top-level task supervision.
//!
//! ```text
//! Validating ──(invalid)──▶ exit 1
//!     │
//! Starting:   identity, routing table, transport → ensure_running
//!     │
//! Running:    { transport.run, services, table-refresh, connection-rebuild, [static-peers] }
//!     │        one JoinSet, one CancellationToken
//!     │
//! ShuttingDown: token cancelled → group drains → one bounded transport stop
//!     │
//! Stopped
//! ```
//!
//! Cancellation is the expected way out. Any other task error cancels the
//! group and is returned as [`SeedError::TaskFailure`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiState, NodeInfo, QueryApi};
use crate::config::{validate_config, ConfigError, SeedConfig, ValidationError};
use crate::discovery::{DiscoveryProtocol, NodeIdentity, PingDiscovery, RoutingTable, StaticPeer};
use crate::error::{SeedError, SeedResult, TaskError};
use crate::lifecycle::shutdown::{Shutdown, ShutdownCoordinator};
use crate::lifecycle::startup;
use crate::maintenance::{loops, MaintenanceSchedule};
use crate::network::{TcpTransport, Transport, TransportSettings};
use crate::observability::metrics;

/// Process-level lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validating => "validating",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::ShuttingDown => "shutting_down",
            Phase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-lived task run alongside the maintenance loops, such as the query API.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Serve until `token` is cancelled.
    async fn run(&self, token: CancellationToken) -> Result<(), TaskError>;
}

/// Named top-level tasks joined as one group.
#[derive(Default)]
pub struct TaskGroup {
    tasks: JoinSet<(String, Result<(), TaskError>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &str, task: F)
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let name = name.to_string();
        tracing::debug!(task = %name, "Task spawned");
        self.tasks.spawn(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(TaskError::failed(
                    name.as_str(),
                    format!("panicked: {}", panic_message(payload.as_ref())),
                )),
            };
            (name, outcome)
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next task to finish. A panic counts as a failure.
    pub async fn join_next(&mut self) -> Option<Result<(), TaskError>> {
        let joined = self.tasks.join_next().await?;
        Some(match joined {
            Ok((name, Ok(()))) => {
                tracing::info!(task = %name, "Task finished");
                Ok(())
            }
            Ok((name, Err(TaskError::Cancelled))) => {
                tracing::debug!(task = %name, "Task cancelled");
                Err(TaskError::Cancelled)
            }
            Ok((_, Err(e))) => Err(e),
            Err(e) if e.is_panic() => Err(TaskError::failed("unknown", "panicked")),
            Err(_) => Err(TaskError::Cancelled),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string payload"
    }
}

/// Binds the discovery protocol once the transport is running.
pub type BindProtocol = Box<dyn FnOnce(Arc<dyn Transport>) -> Arc<dyn DiscoveryProtocol> + Send>;

/// Everything the supervisor runs, already constructed.
pub struct Components {
    pub table: RoutingTable,
    pub transport: Arc<dyn Transport>,
    pub bind_protocol: BindProtocol,
    pub services: Vec<Arc<dyn Service>>,
    pub static_peers: Vec<StaticPeer>,
    pub schedule: MaintenanceSchedule,
    pub stop_timeout: Duration,
    pub phase: watch::Sender<Phase>,
}

/// Validate `config`, construct the node and supervise it until shutdown.
pub async fn run(config: SeedConfig, shutdown: Shutdown) -> SeedResult<()> {
    let (phase, _) = watch::channel(Phase::Validating);
    tracing::info!(phase = %Phase::Validating, "Lifecycle phase");

    let validated = validate_config(&config).map_err(ConfigError::from)?;
    for warning in &validated.warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }
    tracing::info!(
        transport = %validated.transport_kind,
        endpoint = %validated.advertised_endpoint,
        static_peers = validated.static_peers.len(),
        "Configuration validated"
    );

    if let Some(addr) = validated.metrics_address {
        metrics::init_metrics(addr);
    }

    let identity = NodeIdentity::from_config(config.node.node_key.as_deref())
        .map_err(|e| ConfigError::from(vec![ValidationError::InvalidNodeKey(e.to_string())]))?;
    let address = identity.address();
    let table = RoutingTable::new();
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(TransportSettings::from_config(
        &validated,
        address,
    )));

    let mut services: Vec<Arc<dyn Service>> = Vec::new();
    if let Some(bind) = validated.api_bind {
        let state = ApiState::new(
            table.clone(),
            NodeInfo {
                address,
                endpoint: validated.advertised_endpoint.clone(),
                transport_kind: validated.transport_kind,
                protocol_version: config.node.protocol_version.clone(),
                static_peers: validated.static_peers.len(),
            },
            phase.subscribe(),
            config.api.api_key.clone(),
        );
        services.push(Arc::new(QueryApi::new(bind, state)));
    }

    let protocol_table = table.clone();
    let protocol_version = config.node.protocol_version.clone();
    let broadcast_target = config.node.minimum_broadcast_target;
    let bind_protocol: BindProtocol = Box::new(move |transport| -> Arc<dyn DiscoveryProtocol> {
        PingDiscovery::bind(
            protocol_table,
            transport,
            address,
            protocol_version,
            broadcast_target,
        )
    });

    let maintenance = validated.maintenance();
    supervise(
        Components {
            table,
            transport,
            bind_protocol,
            services,
            static_peers: validated.static_peers.clone(),
            schedule: MaintenanceSchedule::from(maintenance),
            stop_timeout: maintenance.transport_stop_timeout(),
            phase,
        },
        shutdown,
    )
    .await
}

/// Start the transport, launch every task, and wait for the group to unwind.
pub async fn supervise(components: Components, shutdown: Shutdown) -> SeedResult<()> {
    let Components {
        table,
        transport,
        bind_protocol,
        services,
        static_peers,
        schedule,
        stop_timeout,
        phase,
    } = components;

    let token = shutdown.token();
    let coordinator = ShutdownCoordinator::new(transport.clone(), stop_timeout);
    let mut group = TaskGroup::new();
    let mut failure = None;

    set_phase(&phase, Phase::Starting);
    match startup::ensure_running(transport.clone(), &mut group, &token).await {
        Ok(_) => {
            let protocol = bind_protocol(transport);
            launch(&mut group, protocol, table, services, static_peers, schedule, &token);
            set_phase(&phase, Phase::Running);
        }
        Err(TaskError::Cancelled) => {
            tracing::info!("Shutdown requested before the transport was ready");
        }
        Err(e) => {
            tracing::error!(error = %e, "Transport failed to start");
            shutdown.trigger();
            failure = Some(e);
        }
    }

    while let Some(outcome) = group.join_next().await {
        if token.is_cancelled() {
            set_phase(&phase, Phase::ShuttingDown);
        }
        match outcome {
            Ok(()) | Err(TaskError::Cancelled) => {}
            Err(e) if failure.is_none() => {
                tracing::error!(error = %e, "Top-level task failed, shutting down");
                shutdown.trigger();
                set_phase(&phase, Phase::ShuttingDown);
                failure = Some(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Additional task failure during shutdown");
            }
        }
    }

    set_phase(&phase, Phase::ShuttingDown);
    coordinator.stop_transport().await;
    set_phase(&phase, Phase::Stopped);

    match failure {
        Some(e) => Err(SeedError::TaskFailure(e)),
        None => Ok(()),
    }
}

fn launch(
    group: &mut TaskGroup,
    protocol: Arc<dyn DiscoveryProtocol>,
    table: RoutingTable,
    services: Vec<Arc<dyn Service>>,
    static_peers: Vec<StaticPeer>,
    schedule: MaintenanceSchedule,
    token: &CancellationToken,
) {
    for service in services {
        let token = token.clone();
        group.spawn(service.name(), async move { service.run(token).await });
    }

    group.spawn(
        loops::TABLE_REFRESH,
        loops::table_refresh(protocol.clone(), schedule, token.clone()),
    );
    group.spawn(
        loops::CONNECTION_REBUILD,
        loops::connection_rebuild(protocol.clone(), schedule, token.clone()),
    );

    if static_peers.is_empty() {
        tracing::debug!("No static peers configured, reconciliation loop omitted");
    } else {
        group.spawn(
            loops::STATIC_PEERS,
            loops::static_peer_reconciliation(
                protocol,
                table,
                Arc::from(static_peers),
                schedule,
                token.clone(),
            ),
        );
    }
}

fn set_phase(phase: &watch::Sender<Phase>, next: Phase) {
    let changed = phase.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
    if changed {
        tracing::info!(phase = %next, "Lifecycle phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_reports_panic_as_failure() {
        let mut group = TaskGroup::new();
        group.spawn("doomed", async {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        match group.join_next().await.unwrap() {
            Err(TaskError::Failed { task, reason }) => {
                assert_eq!(task, "doomed");
                assert_eq!(reason, "panicked: boom");
            }
            other => panic!("expected a named failure, got {other:?}"),
        }
        assert!(group.join_next().await.is_none());
    }

    #[tokio::test]
    async fn test_group_distinguishes_outcomes() {
        let mut group = TaskGroup::new();
        group.spawn("ok", async { Ok(()) });
        assert_eq!(group.len(), 1);
        assert!(group.join_next().await.unwrap().is_ok());

        group.spawn("cancelled", async { Err(TaskError::Cancelled) });
        assert!(group.join_next().await.unwrap().unwrap_err().is_cancelled());
        assert!(group.is_empty());
    }

    #[test]
    fn test_set_phase_only_logs_changes() {
        let (tx, rx) = watch::channel(Phase::Starting);
        set_phase(&tx, Phase::Starting);
        assert!(!rx.has_changed().unwrap());
        set_phase(&tx, Phase::Running);
        assert_eq!(*rx.borrow(), Phase::Running);
    }
}
