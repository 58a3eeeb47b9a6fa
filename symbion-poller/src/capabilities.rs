//! Optional host capabilities, detected with trial queries
//!
//! A capability decides which statements an inventory or stats cycle issues:
//! - `VmHost`: CPU load comes from the hypervisor logical processor counters
//! - `AdapterUtilization`: network counters come from the adapter table
//! - `Teaming`: team and team-member classes exist and are joined
//!
//! Probing never fails: any transport error on a trial query means "absent".
//! Results are cached per `CapabilitySession`, and every inventory cycle opens
//! a fresh session, so a host that gains or loses a feature is picked up on
//! the next cycle.

use crate::rows::AnyRow;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use symbion_query::{QueryService, QueryServiceExt, DEFAULT_NAMESPACE, STANDARD_CIMV2_NAMESPACE};
use tracing::debug;

/// Capability flags as stored on a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub is_vm_host: bool,
    pub can_query_adapter_utilization: bool,
    pub can_query_teaming_information: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    VmHost,
    AdapterUtilization,
    Teaming,
}

/// How a trial query's answer maps to "supported".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeRule {
    /// The statement runs without error.
    Succeeds,
    /// The statement runs and returns at least one row.
    ReturnsRows,
}

/// Trial statement, namespace and rule for one capability.
#[derive(Debug, Clone, Copy)]
pub struct Trial {
    pub statement: &'static str,
    pub namespace: &'static str,
    pub rule: ProbeRule,
}

impl Capability {
    pub fn trial(self) -> Trial {
        match self {
            Capability::VmHost => Trial {
                statement: "SELECT Name FROM Win32_OptionalFeature WHERE (Name = 'Microsoft-Hyper-V' OR Name = 'Microsoft-Hyper-V-Hypervisor') AND InstallState = 1",
                namespace: DEFAULT_NAMESPACE,
                rule: ProbeRule::ReturnsRows,
            },
            Capability::AdapterUtilization => Trial {
                statement: "SELECT Name FROM Win32_PerfFormattedData_Tcpip_NetworkAdapter",
                namespace: DEFAULT_NAMESPACE,
                rule: ProbeRule::Succeeds,
            },
            Capability::Teaming => Trial {
                statement: "SELECT InstanceID FROM MSFT_NetLbfoTeamMember",
                namespace: STANDARD_CIMV2_NAMESPACE,
                rule: ProbeRule::Succeeds,
            },
        }
    }
}

/// Run one trial query. Errors read as `false` and are only logged at debug.
pub async fn probe<Q>(service: &Q, endpoint: &str, statement: &str, namespace: &str, rule: ProbeRule) -> bool
where
    Q: QueryService + ?Sized,
{
    let outcome = match rule {
        ProbeRule::Succeeds => service.query(endpoint, statement, Some(namespace)).await.map(|_| true),
        ProbeRule::ReturnsRows => service
            .fetch_first::<AnyRow>(endpoint, statement, Some(namespace))
            .await
            .map(|row| row.is_some()),
    };

    match outcome {
        Ok(supported) => supported,
        Err(e) => {
            debug!("[{}] probe '{}' failed, treating as absent: {}", endpoint, statement, e);
            false
        }
    }
}

/// Capability answers for one endpoint, valid for one inventory cycle.
pub struct CapabilitySession<'a, Q: ?Sized> {
    service: &'a Q,
    endpoint: &'a str,
    cache: DashMap<Capability, bool>,
}

impl<'a, Q: QueryService + ?Sized> CapabilitySession<'a, Q> {
    pub fn new(service: &'a Q, endpoint: &'a str) -> Self {
        Self {
            service,
            endpoint,
            cache: DashMap::new(),
        }
    }

    /// Probe `capability` unless this session already knows the answer.
    pub async fn supports(&self, capability: Capability) -> bool {
        let known = self.cache.get(&capability).map(|answer| *answer);
        if let Some(known) = known {
            return known;
        }
        let trial = capability.trial();
        let supported = probe(self.service, self.endpoint, trial.statement, trial.namespace, trial.rule).await;
        debug!("[{}] {:?} supported: {}", self.endpoint, capability, supported);
        *self.cache.entry(capability).or_insert(supported)
    }

    /// Probe all capabilities concurrently.
    pub async fn resolve_all(&self) -> Capabilities {
        let (is_vm_host, can_query_adapter_utilization, can_query_teaming_information) = futures::join!(
            self.supports(Capability::VmHost),
            self.supports(Capability::AdapterUtilization),
            self.supports(Capability::Teaming),
        );
        Capabilities {
            is_vm_host,
            can_query_adapter_utilization,
            can_query_teaming_information,
        }
    }

    pub fn probed(&self) -> usize {
        self.cache.len()
    }
}
