use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::state::NodeRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollerHealth {
    pub uptime_seconds: u64,
    pub nodes_tracked: usize,
    pub nodes_active: usize,
    pub nodes_unreachable: usize,
    pub nodes_unknown: usize,
    pub info_cycles: u64,
    pub stats_cycles: u64,
    pub failed_cycles: u64,
    pub last_failure: Option<CycleFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleFailure {
    pub node_id: String,
    pub cycle: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Info,
    Stats,
}

impl CycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleKind::Info => "info",
            CycleKind::Stats => "stats",
        }
    }
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    info_cycles: Arc<AtomicU64>,
    stats_cycles: Arc<AtomicU64>,
    failed_cycles: Arc<AtomicU64>,
    last_failure: Arc<Mutex<Option<CycleFailure>>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            info_cycles: Arc::new(AtomicU64::new(0)),
            stats_cycles: Arc::new(AtomicU64::new(0)),
            failed_cycles: Arc::new(AtomicU64::new(0)),
            last_failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn record_cycle(&self, kind: CycleKind) {
        let counter = match kind {
            CycleKind::Info => &self.info_cycles,
            CycleKind::Stats => &self.stats_cycles,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, node_id: &str, kind: CycleKind, error: &str) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(CycleFailure {
            node_id: node_id.to_string(),
            cycle: kind.as_str().to_string(),
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub async fn get_health(&self, nodes: &NodeRegistry) -> PollerHealth {
        let [unknown, active, unreachable] = nodes.status_counts().await;
        PollerHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            nodes_tracked: nodes.len(),
            nodes_active: active,
            nodes_unreachable: unreachable,
            nodes_unknown: unknown,
            info_cycles: self.info_cycles.load(Ordering::Relaxed),
            stats_cycles: self.stats_cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    #[tokio::test]
    async fn test_counters() {
        let tracker = HealthTracker::new();
        tracker.record_cycle(CycleKind::Info);
        tracker.record_cycle(CycleKind::Stats);
        tracker.record_cycle(CycleKind::Stats);
        tracker.record_failure("web01", CycleKind::Stats, "web01 unreachable: timeout");

        let registry = NodeRegistry::from_nodes([Node::new("web01", vec![], 4)]);
        let health = tracker.clone().get_health(&registry).await;

        assert_eq!((health.info_cycles, health.stats_cycles, health.failed_cycles), (1, 2, 1));
        assert_eq!(health.nodes_tracked, 1);
        assert_eq!(health.nodes_unknown, 1);
        let failure = health.last_failure.unwrap();
        assert_eq!(failure.node_id, "web01");
        assert_eq!(failure.cycle, "stats");
    }
}
