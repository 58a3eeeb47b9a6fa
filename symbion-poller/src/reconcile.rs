//! Merge-by-identity of polled rows into a node's entity collections
//!
//! Contract of every operation here:
//! - an entity is looked up by its identity key; created only when absent
//! - mutable fields are overwritten in place, identity and slot never change
//! - replaying the same rows yields the same collection (no duplicates)
//! - entities are never removed, even when a later poll no longer reports them
//! - rows that reference nothing known (dangling team, bad subnet) are skipped

use crate::model::{Interface, Volume};
use crate::prefix::IpPrefix;
use crate::rows::{AdapterConfigRow, LogicalDiskRow, NetworkAdapterRow, TeamMemberRow, TeamRow};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

/// Something with a stable identity within its node.
pub trait Entity {
    fn id(&self) -> &str;
}

/// Creation and in-place update of an entity from one decoded row shape.
pub trait Reconcile<R>: Entity {
    fn identity(row: &R) -> String;
    fn create(node_id: &str, id: String) -> Self;
    fn apply(&mut self, row: &R);
}

/// Insertion-ordered entities with an id → slot index.
#[derive(Debug, Clone)]
pub struct EntityCollection<T> {
    items: Vec<T>,
    slots: HashMap<String, usize>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T: Entity> EntityCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity for `id`, built with `create` the first time it is seen.
    pub fn upsert_with(&mut self, id: &str, create: impl FnOnce() -> T) -> &mut T {
        let slot = match self.slots.get(id) {
            Some(&slot) => slot,
            None => {
                let slot = self.items.len();
                self.items.push(create());
                self.slots.insert(id.to_string(), slot);
                slot
            }
        };
        &mut self.items[slot]
    }

    /// Upsert then overwrite from `row`.
    pub fn reconcile<R>(&mut self, node_id: &str, row: &R) -> &mut T
    where
        T: Reconcile<R>,
    {
        let id = T::identity(row);
        let entity = self.upsert_with(&id, || T::create(node_id, id.clone()));
        entity.apply(row);
        entity
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.slots.get(id).map(|&slot| &self.items[slot])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.slots.get(id).map(|&slot| &mut self.items[slot])
    }

    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Serialize> Serialize for EntityCollection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

/// An adapter row together with the canonical name resolved for it.
#[derive(Debug, Clone)]
pub struct AdapterObservation {
    pub adapter: NetworkAdapterRow,
    pub canonical_name: Option<String>,
}

impl Reconcile<AdapterObservation> for Interface {
    fn identity(row: &AdapterObservation) -> String {
        row.adapter.device_id.clone()
    }

    fn create(node_id: &str, id: String) -> Self {
        Interface::new(node_id, id)
    }

    fn apply(&mut self, row: &AdapterObservation) {
        let adapter = &row.adapter;
        self.name = row.canonical_name.clone();
        self.caption = adapter.net_connection_id.clone();
        self.full_name = adapter.description.clone();
        self.physical_address = adapter.mac_address.clone();
        self.speed = adapter.speed;
        self.status = crate::model::NodeStatus::Active;
        self.last_sync = Some(chrono::Utc::now());
        // Rebuilt by the team and IP passes of the same enumeration.
        self.ips.clear();
        self.team_members.clear();
    }
}

impl Reconcile<LogicalDiskRow> for Volume {
    fn identity(row: &LogicalDiskRow) -> String {
        row.device_id.clone()
    }

    fn create(node_id: &str, id: String) -> Self {
        Volume::new(node_id, id)
    }

    fn apply(&mut self, row: &LogicalDiskRow) {
        self.name = row.name.clone();
        self.caption = row.volume_serial_number.clone();
        self.description = match &row.description {
            Some(description) => format!("{} - {}", row.name, description),
            None => row.name.clone(),
        };
        self.size = row.size;
        self.available = row.free_space;
        self.used = row.size.saturating_sub(row.free_space);
        self.percent_used = if row.size > 0 {
            (u128::from(self.used) * 100 / u128::from(row.size)) as u8
        } else {
            0
        };
        self.status = crate::model::NodeStatus::Active;
        self.last_sync = Some(chrono::Utc::now());
    }
}

/// Enumeration pass for one adapter: upsert it and record its adapter index
/// in the one-shot index → interface id map consumed by [`attach_ip_config`].
pub fn reconcile_adapter(
    interfaces: &mut EntityCollection<Interface>,
    node_id: &str,
    observation: &AdapterObservation,
    index_map: &mut HashMap<u32, String>,
) {
    let iface = interfaces.reconcile(node_id, observation);
    index_map.insert(observation.adapter.interface_index, iface.id.clone());
}

/// Three-stage team join.
///
/// 1. interfaces are already indexed by id
/// 2. each team resolves to the interface whose caption equals the team name
/// 3. each member resolves, by canonical name, to the interface it links into its team
///
/// Returns the number of membership links added.
pub fn join_team_members(
    interfaces: &mut EntityCollection<Interface>,
    teams: &[TeamRow],
    members: &[TeamMemberRow],
) -> usize {
    let mut team_interfaces: HashMap<&str, String> = HashMap::new();
    for team in teams {
        match interfaces.iter().find(|i| i.caption.as_deref() == Some(team.name.as_str())) {
            Some(iface) => {
                team_interfaces.entry(team.name.as_str()).or_insert_with(|| iface.id.clone());
            }
            None => debug!("Team '{}' matches no interface caption, skipping", team.name),
        }
    }

    let mut links = 0;
    for member in members {
        let Some(team_id) = team_interfaces.get(member.team.as_str()) else {
            debug!("Member '{}' names unknown team '{}', skipping", member.name, member.team);
            continue;
        };
        let Some(member_id) = interfaces
            .iter()
            .find(|i| i.name.as_deref() == Some(member.name.as_str()))
            .map(|i| i.id.clone())
        else {
            debug!("Member '{}' of team '{}' matches no interface, skipping", member.name, member.team);
            continue;
        };

        if let Some(team_iface) = interfaces.get_mut(team_id) {
            if !team_iface.team_members.contains(&member_id) {
                team_iface.team_members.push(member_id);
                links += 1;
            }
        }
    }
    links
}

/// Attach DHCP flag and address prefixes through the adapter index map.
///
/// Returns the number of prefixes attached. Malformed address/subnet pairs
/// are skipped.
pub fn attach_ip_config(
    interfaces: &mut EntityCollection<Interface>,
    index_map: &HashMap<u32, String>,
    configs: &[AdapterConfigRow],
) -> usize {
    let mut attached = 0;
    for config in configs {
        let Some(iface) = index_map
            .get(&config.interface_index)
            .and_then(|id| interfaces.get_mut(id))
        else {
            continue;
        };

        iface.dhcp_enabled = config.dhcp_enabled;

        let (Some(addresses), Some(subnets)) = (&config.ip_addresses, &config.ip_subnets) else {
            continue;
        };
        for (address, subnet) in addresses.iter().zip(subnets) {
            match IpPrefix::parse(address, subnet) {
                Some(prefix) if !iface.ips.contains(&prefix) => {
                    iface.ips.push(prefix);
                    attached += 1;
                }
                Some(_) => {}
                None => debug!("Skipping malformed prefix {} / {} on {}", address, subnet, iface.id),
            }
        }
    }
    attached
}
