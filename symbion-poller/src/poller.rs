//! Poll orchestration: one inventory cycle and one stats cycle per node
//!
//! A cycle fans its sub-queries out with `futures::join!`. Each sub-query
//! receives `&mut` borrows of distinct node fields only, so concurrent
//! sub-queries cannot write the same collection or stream.
//!
//! Siblings are never cancelled: when one sub-query fails the others still
//! run to completion and keep their effects. The first error in sub-query
//! order decides the outcome and the node becomes `Unreachable`. Nothing is
//! rolled back; the next cycle converges.

use crate::capabilities::CapabilitySession;
use crate::health::{CycleKind, HealthTracker};
use crate::inventory::{poll_interfaces, poll_machine, poll_volumes};
use crate::model::{Node, NodeStatus};
use crate::normalize::NameNormalizer;
use crate::state::SharedNode;
use crate::stats::{poll_cpu, poll_memory, poll_network, poll_volume_performance};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use symbion_query::{QueryService, TransportError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Process-wide, read-only inputs shared by every node.
#[derive(Debug, Clone, Default)]
pub struct PollContext {
    pub normalizer: Arc<NameNormalizer>,
    /// Domain of the machine running the poller, resolved once at startup.
    pub machine_domain: Option<Arc<str>>,
}

impl PollContext {
    pub fn new(machine_domain: Option<Arc<str>>) -> Self {
        Self {
            normalizer: Arc::new(NameNormalizer::new()),
            machine_domain,
        }
    }
}

/// Result of one cycle. Errors stop here and never reach the caller as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed,
    Failed(TransportError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed)
    }

    fn from_results(results: impl IntoIterator<Item = Result<(), TransportError>>) -> Self {
        results
            .into_iter()
            .find_map(Result::err)
            .map_or(CycleOutcome::Completed, CycleOutcome::Failed)
    }
}

fn settle(node: &mut Node, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed => {
            node.status = NodeStatus::Active;
            node.last_sync = Some(Utc::now());
        }
        CycleOutcome::Failed(_) => node.status = NodeStatus::Unreachable,
    }
}

/// Inventory cycle: probe capabilities in a fresh session, then machine data,
/// interfaces and volumes concurrently.
pub async fn poll_info<Q>(service: &Q, ctx: &PollContext, node: &mut Node) -> CycleOutcome
where
    Q: QueryService + ?Sized,
{
    let endpoint = node.id.clone();
    let capabilities = CapabilitySession::new(service, &endpoint).resolve_all().await;
    node.capabilities = capabilities;

    let (machine, interfaces, volumes) = futures::join!(
        poll_machine(service, &endpoint, ctx.machine_domain.as_deref(), &mut node.inventory),
        poll_interfaces(service, &endpoint, &endpoint, capabilities, &mut node.interfaces),
        poll_volumes(service, &endpoint, &endpoint, &mut node.volumes),
    );

    let outcome = CycleOutcome::from_results([machine, interfaces, volumes]);
    settle(node, &outcome);
    outcome
}

/// Stats cycle: CPU, memory, network and volume throughput concurrently,
/// using the capabilities found by the last inventory cycle.
pub async fn poll_stats<Q>(service: &Q, ctx: &PollContext, node: &mut Node) -> CycleOutcome
where
    Q: QueryService + ?Sized,
{
    let endpoint = node.id.as_str();
    let capabilities = node.capabilities;
    let normalizer = ctx.normalizer.as_ref();

    let (cpu, memory, network, volumes) = futures::join!(
        poll_cpu(service, endpoint, capabilities.is_vm_host, &mut node.cpu_load, &mut node.cpu_history),
        poll_memory(service, endpoint, &mut node.inventory, &mut node.memory_history),
        poll_network(
            service,
            endpoint,
            capabilities.can_query_adapter_utilization,
            normalizer,
            &node.primary_interfaces,
            &mut node.interfaces,
            &mut node.net_history,
        ),
        poll_volume_performance(service, endpoint, normalizer, &mut node.volumes, &mut node.volume_history),
    );

    let outcome = CycleOutcome::from_results([cpu, memory, network, volumes]);
    settle(node, &outcome);
    outcome
}

/// Drives the cycles of one node and reports them.
#[derive(Clone)]
pub struct NodePoller {
    service: Arc<dyn QueryService>,
    ctx: PollContext,
    node: SharedNode,
    health: HealthTracker,
}

impl NodePoller {
    pub fn new(service: Arc<dyn QueryService>, ctx: PollContext, node: SharedNode, health: HealthTracker) -> Self {
        Self {
            service,
            ctx,
            node,
            health,
        }
    }

    pub fn node(&self) -> &SharedNode {
        &self.node
    }

    pub async fn run_info_cycle(&self) -> CycleOutcome {
        let mut node = self.node.write().await;
        let before = node.status;
        let outcome = poll_info(self.service.as_ref(), &self.ctx, &mut node).await;
        self.report(&node, before, CycleKind::Info, &outcome);
        outcome
    }

    pub async fn run_stats_cycle(&self) -> CycleOutcome {
        let mut node = self.node.write().await;
        let before = node.status;
        let outcome = poll_stats(self.service.as_ref(), &self.ctx, &mut node).await;
        self.report(&node, before, CycleKind::Stats, &outcome);
        outcome
    }

    fn report(&self, node: &Node, before: NodeStatus, kind: CycleKind, outcome: &CycleOutcome) {
        self.health.record_cycle(kind);
        match outcome {
            CycleOutcome::Completed => debug!(
                "[{}] {} cycle done ({} interfaces, {} volumes)",
                node.id,
                kind.as_str(),
                node.interfaces.len(),
                node.volumes.len()
            ),
            CycleOutcome::Failed(e) => {
                warn!("[{}] {} cycle failed: {}", node.id, kind.as_str(), e);
                self.health.record_failure(&node.id, kind, &e.to_string());
            }
        }
        if before != node.status {
            info!("[{}] status {:?} -> {:?}", node.id, before, node.status);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub info: Duration,
    pub stats: Duration,
}

/// One task per node. Both timers fire immediately, inventory first, so the
/// first stats cycle already knows the node's capabilities.
pub fn spawn_node_worker(poller: NodePoller, intervals: PollIntervals) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut info_timer = interval(intervals.info);
        let mut stats_timer = interval(intervals.stats);
        info_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = info_timer.tick() => {
                    poller.run_info_cycle().await;
                }

                _ = stats_timer.tick() => {
                    poller.run_stats_cycle().await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_devkit::fixtures::{classes, logical_disk};
    use symbion_devkit::{FailureKind, HostFixture, ScriptedQueryService};

    #[test]
    fn test_first_error_in_order_wins() {
        let a = TransportError::AccessDenied { endpoint: "a".into() };
        let b = TransportError::Unreachable { endpoint: "b".into(), reason: "x".into() };
        let outcome = CycleOutcome::from_results([Ok(()), Err(a.clone()), Err(b)]);
        assert_eq!(outcome, CycleOutcome::Failed(a));
        assert!(CycleOutcome::from_results([Ok(()), Ok(())]).is_completed());
    }

    #[tokio::test]
    async fn test_info_then_stats_on_healthy_host() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").install(&stub);

        let ctx = PollContext::default();
        let mut node = Node::new("web01", vec![], 16);
        assert!(poll_info(&stub, &ctx, &mut node).await.is_completed());
        assert_eq!(node.status, NodeStatus::Active);
        assert!(node.last_sync.is_some());

        assert!(poll_stats(&stub, &ctx, &mut node).await.is_completed());
        assert_eq!(node.cpu_history.len(), 1);
        assert_eq!(node.memory_history.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_failure_marks_unreachable_and_keeps_siblings() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").install(&stub);

        let ctx = PollContext::default();
        let mut node = Node::new("web01", vec![], 16);
        poll_info(&stub, &ctx, &mut node).await;

        stub.fail(classes::MEMORY_PERF, FailureKind::Unreachable);
        let outcome = poll_stats(&stub, &ctx, &mut node).await;

        assert!(matches!(outcome, CycleOutcome::Failed(TransportError::Unreachable { .. })));
        assert_eq!(node.status, NodeStatus::Unreachable);
        assert_eq!(node.cpu_history.len(), 1);
        assert!(node.net_history.combined().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sibling_finishes_after_early_failure() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").with_disk(logical_disk("C:", 1000, 250)).install(&stub);
        stub.fail(classes::COMPUTER_SYSTEM, FailureKind::AccessDenied);
        stub.delay(classes::LOGICAL_DISK, Duration::from_secs(5));

        let ctx = PollContext::default();
        let mut node = Node::new("web01", vec![], 16);
        let outcome = poll_info(&stub, &ctx, &mut node).await;

        assert!(matches!(outcome, CycleOutcome::Failed(TransportError::AccessDenied { .. })));
        assert_eq!(node.volumes.get("C:").map(|v| v.percent_used), Some(75));
    }

    #[tokio::test]
    async fn test_node_poller_reports_to_health() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").install(&stub);
        stub.fail(classes::LOGICAL_DISK, FailureKind::AccessDenied);

        let health = HealthTracker::new();
        let node = crate::state::new_node(Node::new("web01", vec![], 16));
        let poller = NodePoller::new(Arc::new(stub), PollContext::default(), node.clone(), health.clone());

        assert!(!poller.run_info_cycle().await.is_completed());
        assert_eq!(node.read().await.status, NodeStatus::Unreachable);

        let registry = crate::state::NodeRegistry::default();
        let report = health.get_health(&registry).await;
        assert_eq!((report.info_cycles, report.failed_cycles), (1, 1));
    }
}
