//! Inventory sub-queries: machine data, interfaces, volumes
//!
//! Each function writes exactly one part of the node, taken as `&mut`, so the
//! three can run concurrently within an inventory cycle. A transport error
//! returns immediately; whatever was already applied stays applied.

use crate::capabilities::Capabilities;
use crate::model::{Interface, NodeInventory, Volume};
use crate::reconcile::{attach_ip_config, join_team_members, reconcile_adapter, AdapterObservation, EntityCollection};
use crate::rows::{
    AdapterConfigRow, ComputerSystemRow, LogicalDiskRow, NetworkAdapterRow, OperatingSystemRow, PnpEntityRow,
    TeamMemberRow, TeamRow,
};
use std::collections::HashMap;
use symbion_query::{QueryService, QueryServiceExt, TransportError, STANDARD_CIMV2_NAMESPACE};
use tracing::debug;

const COMPUTER_SYSTEM_QUERY: &str = "SELECT DNSHostName, Domain, Manufacturer, Model FROM Win32_ComputerSystem";

const OPERATING_SYSTEM_QUERY: &str =
    "SELECT Caption, LastBootUpTime, Version, FreePhysicalMemory, TotalVisibleMemorySize FROM Win32_OperatingSystem";

// Connected adapters only.
const ADAPTERS_QUERY: &str = "SELECT Name, PNPDeviceID, DeviceID, NetConnectionID, Description, MACAddress, Speed, InterfaceIndex
  FROM Win32_NetworkAdapter
 WHERE NetConnectionStatus = 2";

const TEAMS_QUERY: &str = "SELECT InstanceID, Name FROM MSFT_NetLbfoTeam";

const TEAM_MEMBERS_QUERY: &str = "SELECT InstanceID, Name, Team FROM MSFT_NetLbfoTeamMember";

const IP_CONFIG_QUERY: &str = "SELECT InterfaceIndex, IPAddress, IPSubnet, DHCPEnabled
  FROM Win32_NetworkAdapterConfiguration
 WHERE IPEnabled = 'True'";

// Fixed disks only.
const VOLUMES_QUERY: &str = "SELECT Caption, DeviceID, Description, FreeSpace, Name, Size, VolumeSerialNumber
  FROM Win32_LogicalDisk
 WHERE DriveType = 3";

/// Host name as displayed: qualified only when the host sits in a domain other
/// than ours. Without a known domain of our own, the bare name is used.
pub fn display_name(dns_host_name: &str, host_domain: Option<&str>, machine_domain: Option<&str>) -> String {
    match (host_domain, machine_domain) {
        (Some(host), Some(ours)) if !host.is_empty() && !host.eq_ignore_ascii_case(ours) => {
            format!("{}.{}", dns_host_name, host)
        }
        _ => dns_host_name.to_string(),
    }
}

/// Statement resolving the canonical (PnP) name of an adapter.
pub fn pnp_name_query(pnp_device_id: &str) -> String {
    format!(
        "SELECT Name FROM Win32_PnPEntity WHERE DeviceId = '{}'",
        pnp_device_id.replace('\\', "\\\\")
    )
}

/// Computer system, then operating system.
pub async fn poll_machine<Q>(
    service: &Q,
    endpoint: &str,
    machine_domain: Option<&str>,
    inventory: &mut NodeInventory,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    if let Some(cs) = service
        .fetch_first::<ComputerSystemRow>(endpoint, COMPUTER_SYSTEM_QUERY, None)
        .await?
    {
        inventory.name = Some(display_name(&cs.dns_host_name, cs.domain.as_deref(), machine_domain));
        inventory.manufacturer = cs.manufacturer;
        inventory.model = cs.model;
    }

    if let Some(os) = service
        .fetch_first::<OperatingSystemRow>(endpoint, OPERATING_SYSTEM_QUERY, None)
        .await?
    {
        let total = os.total_visible_kib.saturating_mul(1024);
        inventory.last_boot = os.last_boot;
        inventory.total_memory = Some(total);
        inventory.memory_used = Some(total.saturating_sub(os.free_physical_kib.saturating_mul(1024)));
        inventory.machine_type = Some(format!("{} {}", os.caption, os.version));
        inventory.os_version = Some(os.version);
    }

    Ok(())
}

/// Adapters, then teams and members (when supported), then IP configuration.
/// Strictly sequential: every step writes the same collection.
pub async fn poll_interfaces<Q>(
    service: &Q,
    endpoint: &str,
    node_id: &str,
    capabilities: Capabilities,
    interfaces: &mut EntityCollection<Interface>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let adapters: Vec<NetworkAdapterRow> = service.fetch_all(endpoint, ADAPTERS_QUERY, None).await?;

    let mut index_map = HashMap::with_capacity(adapters.len());
    for adapter in adapters {
        let canonical_name = match adapter.pnp_device_id.as_deref() {
            Some(pnp_id) => service
                .fetch_first::<PnpEntityRow>(endpoint, &pnp_name_query(pnp_id), None)
                .await?
                .and_then(|row| row.name),
            None => None,
        };
        let observation = AdapterObservation { adapter, canonical_name };
        reconcile_adapter(interfaces, node_id, &observation, &mut index_map);
    }

    if capabilities.can_query_teaming_information {
        let teams: Vec<TeamRow> = service
            .fetch_all(endpoint, TEAMS_QUERY, Some(STANDARD_CIMV2_NAMESPACE))
            .await?;
        let members: Vec<TeamMemberRow> = service
            .fetch_all(endpoint, TEAM_MEMBERS_QUERY, Some(STANDARD_CIMV2_NAMESPACE))
            .await?;
        let links = join_team_members(interfaces, &teams, &members);
        debug!("[{}] {} team(s), {} membership link(s)", endpoint, teams.len(), links);
    }

    let configs: Vec<AdapterConfigRow> = service.fetch_all(endpoint, IP_CONFIG_QUERY, None).await?;
    let prefixes = attach_ip_config(interfaces, &index_map, &configs);
    debug!("[{}] {} interface(s), {} prefix(es)", endpoint, interfaces.len(), prefixes);

    Ok(())
}

pub async fn poll_volumes<Q>(
    service: &Q,
    endpoint: &str,
    node_id: &str,
    volumes: &mut EntityCollection<Volume>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let disks: Vec<LogicalDiskRow> = service.fetch_all(endpoint, VOLUMES_QUERY, None).await?;
    for disk in &disks {
        volumes.reconcile(node_id, disk);
    }
    debug!("[{}] {} volume(s)", endpoint, volumes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_devkit::fixtures::{classes, ip_config, logical_disk};
    use symbion_devkit::{adapter, FailureKind, HostFixture, ScriptedQueryService};

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("web01", Some("corp.example"), None), "web01");
        assert_eq!(display_name("web01", Some("corp.example"), Some("corp.example")), "web01");
        assert_eq!(display_name("web01", Some("dmz.example"), Some("corp.example")), "web01.dmz.example");
        assert_eq!(display_name("web01", None, Some("corp.example")), "web01");
    }

    #[test]
    fn test_pnp_query_doubles_backslashes() {
        assert_eq!(
            pnp_name_query(r"PCI\VEN_8086&DEV_10D3\3&1"),
            r"SELECT Name FROM Win32_PnPEntity WHERE DeviceId = 'PCI\\VEN_8086&DEV_10D3\\3&1'"
        );
    }

    #[tokio::test]
    async fn test_poll_machine() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").domain("dmz.example").memory(4096, 1024).install(&stub);

        let mut inventory = NodeInventory::default();
        poll_machine(&stub, "web01", Some("corp.example"), &mut inventory).await.unwrap();

        assert_eq!(inventory.name.as_deref(), Some("web01.dmz.example"));
        assert_eq!(inventory.total_memory, Some(4096 * 1024));
        assert_eq!(inventory.memory_used, Some(3072 * 1024));
        assert_eq!(
            inventory.machine_type.as_deref(),
            Some("Microsoft Windows Server 2019 Standard 10.0.17763")
        );
        assert!(inventory.last_boot.is_some());
    }

    #[tokio::test]
    async fn test_poll_machine_keeps_first_half_on_failure() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").install(&stub);
        stub.fail(classes::OPERATING_SYSTEM, FailureKind::Unreachable);

        let mut inventory = NodeInventory::default();
        assert!(poll_machine(&stub, "web01", None, &mut inventory).await.is_err());
        assert_eq!(inventory.name.as_deref(), Some("web01"));
        assert!(inventory.total_memory.is_none());
    }

    #[tokio::test]
    async fn test_poll_interfaces_full_join() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01")
            .teaming(true)
            .with_adapter(adapter("1", 11, "Team1", "Microsoft Network Adapter Multiplexor Driver"))
            .with_adapter(adapter("2", 12, "Ethernet", "Intel NIC"))
            .with_team("Team1")
            .with_team_member("Intel NIC", "Team1")
            .with_ip_config(ip_config(11, &["10.0.0.5"], &["255.255.255.0"], false))
            .install(&stub);

        let caps = Capabilities { can_query_teaming_information: true, ..Capabilities::default() };
        let mut interfaces = EntityCollection::new();
        poll_interfaces(&stub, "web01", "web01", caps, &mut interfaces).await.unwrap();

        assert_eq!(interfaces.len(), 2);
        let team = interfaces.get("1").unwrap();
        assert_eq!(team.team_members, vec!["2".to_string()]);
        assert_eq!(team.ips.iter().map(|p| p.to_string()).collect::<Vec<_>>(), vec!["10.0.0.5/24"]);
        assert_eq!(interfaces.get("2").unwrap().name.as_deref(), Some("Intel NIC"));
    }

    #[tokio::test]
    async fn test_poll_interfaces_skips_teams_without_capability() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01").with_adapter(adapter("2", 12, "Ethernet", "Intel NIC")).install(&stub);

        let mut interfaces = EntityCollection::new();
        poll_interfaces(&stub, "web01", "web01", Capabilities::default(), &mut interfaces)
            .await
            .unwrap();

        assert_eq!(stub.calls_to(classes::TEAM), 0);
        assert_eq!(stub.calls_to(classes::TEAM_MEMBER), 0);
        assert_eq!(stub.calls_to(classes::PNP_ENTITY), 1);
    }

    #[tokio::test]
    async fn test_poll_interfaces_replay_converges() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01")
            .with_adapter(adapter("2", 12, "Ethernet", "Intel NIC"))
            .with_ip_config(ip_config(12, &["10.0.0.5", "fe80::1"], &["24", "64"], true))
            .install(&stub);

        let mut interfaces = EntityCollection::new();
        for _ in 0..3 {
            poll_interfaces(&stub, "web01", "web01", Capabilities::default(), &mut interfaces)
                .await
                .unwrap();
        }
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces.get("2").unwrap().ips.len(), 2);
    }

    #[tokio::test]
    async fn test_poll_volumes() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01")
            .with_disk(logical_disk("C:", 100, 40))
            .with_disk(logical_disk("D:", 0, 0))
            .install(&stub);

        let mut volumes = EntityCollection::new();
        poll_volumes(&stub, "web01", "web01", &mut volumes).await.unwrap();

        let c = volumes.get("C:").unwrap();
        assert_eq!((c.used, c.percent_used), (60, 60));
        assert_eq!(c.caption.as_deref(), Some("A1B2C3D4"));
        assert_eq!(volumes.get("D:").unwrap().percent_used, 0);
    }
}
