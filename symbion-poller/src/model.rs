//! Node entity graph: one node per endpoint, with the interfaces and volumes it owns

use crate::capabilities::Capabilities;
use crate::history::{
    CpuSample, HistoryBuffer, HistorySample, HistoryStore, InterfaceSample, MemorySample, StreamKey,
    VolumeSample,
};
use crate::prefix::IpPrefix;
use crate::reconcile::{Entity, EntityCollection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Active,
    Unreachable,
}

/// Machine identity and memory, written by the machine-data sub-query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeInventory {
    /// Host name, qualified with its domain when that differs from ours.
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// OS caption and version, e.g. `Microsoft Windows Server 2019 Standard 10.0.17763`.
    pub machine_type: Option<String>,
    pub os_version: Option<String>,
    pub last_boot: Option<DateTime<Utc>>,
    /// Bytes.
    pub total_memory: Option<u64>,
    /// Bytes.
    pub memory_used: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    pub id: String,
    pub node_id: String,
    /// Canonical name from the PnP entity; what counters are matched against.
    pub name: Option<String>,
    pub caption: Option<String>,
    pub full_name: Option<String>,
    pub physical_address: Option<String>,
    pub speed: Option<u64>,
    pub ips: Vec<IpPrefix>,
    pub team_members: Vec<String>,
    pub dhcp_enabled: Option<bool>,
    pub in_bps: Option<u64>,
    pub out_bps: Option<u64>,
    pub in_pps: Option<u64>,
    pub out_pps: Option<u64>,
    pub status: NodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Interface {
    pub fn new(node_id: &str, id: String) -> Self {
        Self {
            id,
            node_id: node_id.to_string(),
            name: None,
            caption: None,
            full_name: None,
            physical_address: None,
            speed: None,
            ips: Vec::new(),
            team_members: Vec::new(),
            dhcp_enabled: None,
            in_bps: None,
            out_bps: None,
            in_pps: None,
            out_pps: None,
            status: NodeStatus::Unknown,
            last_sync: None,
        }
    }

    fn answers_to(&self, wanted: &str) -> bool {
        [self.name.as_deref(), self.caption.as_deref()]
            .into_iter()
            .flatten()
            .any(|n| n.eq_ignore_ascii_case(wanted))
    }
}

impl Entity for Interface {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Volume {
    pub id: String,
    pub node_id: String,
    pub name: String,
    /// Volume serial number.
    pub caption: Option<String>,
    pub description: String,
    pub size: u64,
    pub available: u64,
    pub used: u64,
    pub percent_used: u8,
    pub read_bps: Option<u64>,
    pub write_bps: Option<u64>,
    pub status: NodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Volume {
    pub fn new(node_id: &str, id: String) -> Self {
        Self {
            name: id.clone(),
            id,
            node_id: node_id.to_string(),
            caption: None,
            description: String::new(),
            size: 0,
            available: 0,
            used: 0,
            percent_used: 0,
            read_bps: None,
            write_bps: None,
            status: NodeStatus::Unknown,
            last_sync: None,
        }
    }
}

impl Entity for Volume {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One managed host and everything polled from it.
///
/// Fields are public so that a cycle can hand disjoint `&mut` borrows to
/// concurrently running sub-queries.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub inventory: NodeInventory,
    pub status: NodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub capabilities: Capabilities,
    pub interfaces: EntityCollection<Interface>,
    pub volumes: EntityCollection<Volume>,
    pub cpu_load: Option<u64>,
    /// Configured primary interface names; empty means "every non-member".
    pub primary_interfaces: Vec<String>,
    #[serde(skip)]
    pub cpu_history: HistoryBuffer<CpuSample>,
    #[serde(skip)]
    pub memory_history: HistoryBuffer<MemorySample>,
    #[serde(skip)]
    pub net_history: HistoryStore<InterfaceSample>,
    #[serde(skip)]
    pub volume_history: HistoryStore<VolumeSample>,
}

/// List view of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSummary {
    pub id: String,
    pub name: Option<String>,
    pub status: NodeStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub interfaces: usize,
    pub volumes: usize,
    pub cpu_load: Option<u64>,
    pub memory_used: Option<u64>,
    pub total_memory: Option<u64>,
}

impl Node {
    pub fn new(id: impl Into<String>, primary_interfaces: Vec<String>, history_capacity: usize) -> Self {
        Self {
            id: id.into(),
            inventory: NodeInventory::default(),
            status: NodeStatus::Unknown,
            last_sync: None,
            capabilities: Capabilities::default(),
            interfaces: EntityCollection::new(),
            volumes: EntityCollection::new(),
            cpu_load: None,
            primary_interfaces,
            cpu_history: HistoryBuffer::new(history_capacity),
            memory_history: HistoryBuffer::new(history_capacity),
            net_history: HistoryStore::new(history_capacity),
            volume_history: HistoryStore::new(history_capacity),
        }
    }

    /// Ids of the interfaces whose samples feed the combined network stream.
    pub fn primary_interface_ids(&self) -> HashSet<String> {
        primary_interface_ids(&self.interfaces, &self.primary_interfaces)
    }

    /// Most recent `window` samples of `key` (all when `None`), oldest first.
    pub fn history(&self, key: &StreamKey, window: Option<usize>) -> Option<Vec<HistorySample>> {
        fn widen<S: Into<HistorySample> + crate::history::Sample>(
            buffer: &HistoryBuffer<S>,
            window: Option<usize>,
        ) -> Vec<HistorySample> {
            buffer.recent(window).into_iter().map(Into::into).collect()
        }

        match key {
            StreamKey::Cpu => Some(widen(&self.cpu_history, window)),
            StreamKey::Memory => Some(widen(&self.memory_history, window)),
            StreamKey::Net(name) => self.net_history.lookup(name).map(|b| widen(b, window)),
            StreamKey::Volume(name) => self.volume_history.lookup(name).map(|b| widen(b, window)),
        }
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            name: self.inventory.name.clone(),
            status: self.status,
            last_sync: self.last_sync,
            interfaces: self.interfaces.len(),
            volumes: self.volumes.len(),
            cpu_load: self.cpu_load,
            memory_used: self.inventory.memory_used,
            total_memory: self.inventory.total_memory,
        }
    }
}

/// Configured names win; otherwise every interface that is not a member of
/// a team on this node, so a team and its members are not counted twice.
pub fn primary_interface_ids(interfaces: &EntityCollection<Interface>, configured: &[String]) -> HashSet<String> {
    if !configured.is_empty() {
        return interfaces
            .iter()
            .filter(|i| configured.iter().any(|c| i.answers_to(c)))
            .map(|i| i.id.clone())
            .collect();
    }

    let members: HashSet<&str> = interfaces
        .iter()
        .flat_map(|i| i.team_members.iter().map(String::as_str))
        .collect();
    interfaces
        .iter()
        .filter(|i| !members.contains(i.id.as_str()))
        .map(|i| i.id.clone())
        .collect()
}
