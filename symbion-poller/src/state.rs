use crate::config::PollerConfig;
use crate::model::{Node, NodeStatus, NodeSummary};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A node behind its lock. A poll cycle holds the write half for its whole
/// duration, so readers always see complete cycles.
pub type SharedNode = Arc<RwLock<Node>>;

pub fn new_node(node: Node) -> SharedNode {
    Arc::new(RwLock::new(node))
}

/// Every configured node, fixed at startup.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<BTreeMap<String, SharedNode>>,
}

impl NodeRegistry {
    pub fn from_config(cfg: &PollerConfig) -> Self {
        Self::from_nodes(cfg.nodes.iter().map(|conf| {
            Node::new(conf.endpoint.clone(), conf.primary_interfaces.clone(), cfg.history_capacity)
        }))
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), new_node(n))).collect();
        Self { nodes: Arc::new(nodes) }
    }

    pub fn get(&self, id: &str) -> Option<SharedNode> {
        self.nodes.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub async fn summaries(&self) -> Vec<NodeSummary> {
        let mut list = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            list.push(node.read().await.summary());
        }
        list
    }

    /// Number of nodes per status, in `Unknown, Active, Unreachable` order.
    pub async fn status_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for node in self.nodes.values() {
            let slot = match node.read().await.status {
                NodeStatus::Unknown => 0,
                NodeStatus::Active => 1,
                NodeStatus::Unreachable => 2,
            };
            counts[slot] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConf;

    #[tokio::test]
    async fn test_registry_from_config() {
        let cfg = PollerConfig {
            history_capacity: 16,
            nodes: vec![
                NodeConf { endpoint: "web01".into(), primary_interfaces: vec!["Public".into()] },
                NodeConf { endpoint: "db01".into(), primary_interfaces: vec![] },
            ],
            ..PollerConfig::default()
        };
        let registry = NodeRegistry::from_config(&cfg);

        assert_eq!(registry.len(), 2);
        let web = registry.get("web01").unwrap();
        assert_eq!(web.read().await.primary_interfaces, vec!["Public".to_string()]);
        assert_eq!(web.read().await.cpu_history.capacity(), 16);
        assert!(registry.get("nope").is_none());

        let ids: Vec<_> = registry.summaries().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["db01", "web01"]);
        assert_eq!(registry.status_counts().await, [2, 0, 0]);
    }
}
