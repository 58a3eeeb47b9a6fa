/*!
Row fixtures shaped like the management classes the poller queries

Single-row builders for each class, plus `HostFixture` which scripts a whole
healthy host into a `ScriptedQueryService` in one call.
*/

use crate::query_stub::{FailureKind, ScriptedQueryService};
use symbion_query::{Row, Value};

pub mod classes {
    pub const COMPUTER_SYSTEM: &str = "Win32_ComputerSystem";
    pub const OPERATING_SYSTEM: &str = "Win32_OperatingSystem";
    pub const OPTIONAL_FEATURE: &str = "Win32_OptionalFeature";
    pub const NETWORK_ADAPTER: &str = "Win32_NetworkAdapter";
    pub const NETWORK_ADAPTER_CONFIGURATION: &str = "Win32_NetworkAdapterConfiguration";
    pub const PNP_ENTITY: &str = "Win32_PnPEntity";
    pub const TEAM: &str = "MSFT_NetLbfoTeam";
    pub const TEAM_MEMBER: &str = "MSFT_NetLbfoTeamMember";
    pub const LOGICAL_DISK: &str = "Win32_LogicalDisk";
    pub const PROCESSOR_PERF: &str = "Win32_PerfFormattedData_PerfOS_Processor";
    pub const HYPERVISOR_PERF: &str = "Win32_PerfFormattedData_HvStats_HyperVHypervisorLogicalProcessor";
    pub const MEMORY_PERF: &str = "Win32_PerfFormattedData_PerfOS_Memory";
    pub const ADAPTER_PERF: &str = "Win32_PerfFormattedData_Tcpip_NetworkAdapter";
    pub const INTERFACE_PERF: &str = "Win32_PerfFormattedData_Tcpip_NetworkInterface";
    pub const DISK_PERF: &str = "Win32_PerfFormattedData_PerfDisk_LogicalDisk";
}

pub fn computer_system(dns_host_name: &str, domain: &str) -> Row {
    Row::new()
        .with("DNSHostName", dns_host_name)
        .with("Domain", domain)
        .with("Manufacturer", "Dell Inc.")
        .with("Model", "PowerEdge R640")
}

pub fn operating_system(caption: &str, version: &str, total_kib: u64, free_kib: u64) -> Row {
    Row::new()
        .with("Caption", caption)
        .with("LastBootUpTime", "20240301080000.000000+000")
        .with("Version", version)
        .with("FreePhysicalMemory", free_kib)
        .with("TotalVisibleMemorySize", total_kib)
}

/// A connected network adapter plus the name its PnP entity reports.
#[derive(Debug, Clone)]
pub struct AdapterFixture {
    pub device_id: String,
    pub pnp_device_id: String,
    pub interface_index: u32,
    pub connection_id: String,
    pub description: String,
    pub mac: String,
    pub speed: u64,
    pub pnp_name: Option<String>,
}

pub fn adapter(device_id: &str, interface_index: u32, connection_id: &str, pnp_name: &str) -> AdapterFixture {
    AdapterFixture {
        device_id: device_id.to_string(),
        pnp_device_id: format!("PCI\\VEN_8086&DEV_{}", device_id),
        interface_index,
        connection_id: connection_id.to_string(),
        description: pnp_name.to_string(),
        mac: format!("00:15:5D:00:00:{:02X}", interface_index % 256),
        speed: 1_000_000_000,
        pnp_name: Some(pnp_name.to_string()),
    }
}

impl AdapterFixture {
    pub fn row(&self) -> Row {
        Row::new()
            .with("Name", self.description.as_str())
            .with("PNPDeviceID", self.pnp_device_id.as_str())
            .with("DeviceID", self.device_id.as_str())
            .with("NetConnectionID", self.connection_id.as_str())
            .with("Description", self.description.as_str())
            .with("MACAddress", self.mac.as_str())
            .with("Speed", self.speed)
            .with("InterfaceIndex", self.interface_index)
    }

    pub fn pnp_row(&self) -> Row {
        Row::new().with("Name", self.pnp_name.clone())
    }

    /// Statement fragment identifying this adapter's PnP lookup.
    pub fn pnp_filter(&self) -> String {
        format!("'{}'", self.pnp_device_id.replace('\\', "\\\\"))
    }
}

pub fn team(name: &str) -> Row {
    Row::new()
        .with("InstanceID", format!("{{{}}}", name))
        .with("Name", name)
}

pub fn team_member(name: &str, team: &str) -> Row {
    Row::new()
        .with("InstanceID", format!("{{{}-{}}}", team, name))
        .with("Name", name)
        .with("Team", team)
}

pub fn ip_config(interface_index: u32, addresses: &[&str], subnets: &[&str], dhcp: bool) -> Row {
    Row::new()
        .with("InterfaceIndex", interface_index)
        .with("IPAddress", addresses.to_vec())
        .with("IPSubnet", subnets.to_vec())
        .with("DHCPEnabled", dhcp)
}

pub fn logical_disk(device_id: &str, size: u64, free: u64) -> Row {
    Row::new()
        .with("Caption", device_id)
        .with("DeviceID", device_id)
        .with("Description", "Local Fixed Disk")
        .with("FreeSpace", free)
        .with("Name", device_id)
        .with("Size", size)
        .with("VolumeSerialNumber", "A1B2C3D4")
}

pub fn processor_perf(load: u64) -> Row {
    Row::new().with("PercentProcessorTime", load)
}

pub fn hypervisor_perf(load: u64) -> Row {
    Row::new().with("PercentTotalRunTime", load)
}

pub fn memory_perf(available_kib: u64) -> Row {
    Row::new().with("AvailableKBytes", available_kib)
}

/// Performance counters arrive as text on most hosts.
pub fn network_perf(name: &str, bytes_in: u64, bytes_out: u64) -> Row {
    Row::new()
        .with("Name", name)
        .with("BytesReceivedPersec", bytes_in.to_string())
        .with("BytesSentPersec", bytes_out.to_string())
        .with("PacketsReceivedPersec", (bytes_in / 1000).to_string())
        .with("PacketsSentPersec", (bytes_out / 1000).to_string())
}

pub fn disk_perf(name: &str, read: u64, write: u64) -> Row {
    Row::new()
        .with("Name", name)
        .with("DiskReadBytesPersec", read.to_string())
        .with("DiskWriteBytesPersec", write.to_string())
}

/// A whole host, scripted into a stub by [`HostFixture::install`].
#[derive(Debug, Clone)]
pub struct HostFixture {
    pub dns_host_name: String,
    pub domain: String,
    pub vm_host: bool,
    pub adapter_table: bool,
    pub teaming: bool,
    pub adapters: Vec<AdapterFixture>,
    pub teams: Vec<Row>,
    pub team_members: Vec<Row>,
    pub ip_configs: Vec<Row>,
    pub disks: Vec<Row>,
    pub cpu_load: u64,
    pub total_kib: u64,
    pub available_kib: u64,
    pub network_perf: Vec<Row>,
    pub disk_perf: Vec<Row>,
}

impl HostFixture {
    pub fn new(dns_host_name: &str) -> Self {
        Self {
            dns_host_name: dns_host_name.to_string(),
            domain: "corp.example".to_string(),
            vm_host: false,
            adapter_table: true,
            teaming: false,
            adapters: Vec::new(),
            teams: Vec::new(),
            team_members: Vec::new(),
            ip_configs: Vec::new(),
            disks: Vec::new(),
            cpu_load: 12,
            total_kib: 16 * 1024 * 1024,
            available_kib: 8 * 1024 * 1024,
            network_perf: Vec::new(),
            disk_perf: Vec::new(),
        }
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn vm_host(mut self, vm_host: bool) -> Self {
        self.vm_host = vm_host;
        self
    }

    pub fn adapter_table(mut self, available: bool) -> Self {
        self.adapter_table = available;
        self
    }

    pub fn teaming(mut self, available: bool) -> Self {
        self.teaming = available;
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterFixture) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_team(mut self, name: &str) -> Self {
        self.teams.push(team(name));
        self
    }

    pub fn with_team_member(mut self, name: &str, team_name: &str) -> Self {
        self.team_members.push(team_member(name, team_name));
        self
    }

    pub fn with_ip_config(mut self, row: Row) -> Self {
        self.ip_configs.push(row);
        self
    }

    pub fn with_disk(mut self, row: Row) -> Self {
        self.disks.push(row);
        self
    }

    pub fn with_network_perf(mut self, row: Row) -> Self {
        self.network_perf.push(row);
        self
    }

    pub fn with_disk_perf(mut self, row: Row) -> Self {
        self.disk_perf.push(row);
        self
    }

    pub fn cpu_load(mut self, load: u64) -> Self {
        self.cpu_load = load;
        self
    }

    pub fn memory(mut self, total_kib: u64, available_kib: u64) -> Self {
        self.total_kib = total_kib;
        self.available_kib = available_kib;
        self
    }

    /// Script every class the poller reads, replacing earlier scripts.
    pub fn install(&self, stub: &ScriptedQueryService) {
        use classes::*;

        stub.respond(COMPUTER_SYSTEM, vec![computer_system(&self.dns_host_name, &self.domain)]);
        stub.respond(
            OPERATING_SYSTEM,
            vec![operating_system(
                "Microsoft Windows Server 2019 Standard",
                "10.0.17763",
                self.total_kib,
                self.available_kib,
            )],
        );

        let features = if self.vm_host {
            vec![Row::new().with("Name", "Microsoft-Hyper-V")]
        } else {
            Vec::new()
        };
        stub.respond(OPTIONAL_FEATURE, features);

        stub.respond(NETWORK_ADAPTER, self.adapters.iter().map(AdapterFixture::row).collect());
        for adapter in &self.adapters {
            stub.respond_where(PNP_ENTITY, &adapter.pnp_filter(), vec![adapter.pnp_row()]);
        }
        stub.respond(NETWORK_ADAPTER_CONFIGURATION, self.ip_configs.clone());

        if self.teaming {
            stub.respond(TEAM, self.teams.clone());
            stub.respond(TEAM_MEMBER, self.team_members.clone());
        } else {
            stub.fail(TEAM, FailureKind::InvalidQuery);
            stub.fail(TEAM_MEMBER, FailureKind::InvalidQuery);
        }

        stub.respond(LOGICAL_DISK, self.disks.clone());

        stub.respond(PROCESSOR_PERF, vec![processor_perf(self.cpu_load)]);
        if self.vm_host {
            stub.respond(HYPERVISOR_PERF, vec![hypervisor_perf(self.cpu_load)]);
        } else {
            stub.fail(HYPERVISOR_PERF, FailureKind::InvalidQuery);
        }
        stub.respond(MEMORY_PERF, vec![memory_perf(self.available_kib)]);

        if self.adapter_table {
            stub.respond(ADAPTER_PERF, self.network_perf.clone());
        } else {
            stub.fail(ADAPTER_PERF, FailureKind::InvalidQuery);
        }
        stub.respond(INTERFACE_PERF, self.network_perf.clone());
        stub.respond(DISK_PERF, self.disk_perf.clone());
    }
}

/// Row with a field explicitly null, for decode-skip cases.
pub fn with_null(row: Row, field: &str) -> Row {
    let mut row = row;
    row.insert(field, Value::Null);
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbion_query::QueryService;

    #[test]
    fn test_pnp_filter_doubles_backslashes() {
        let a = adapter("7", 12, "Ethernet", "Intel(R) Ethernet");
        assert_eq!(a.pnp_filter(), "'PCI\\\\VEN_8086&DEV_7'");
    }

    #[tokio::test]
    async fn test_install_scripts_host() {
        let stub = ScriptedQueryService::new();
        HostFixture::new("web01")
            .with_adapter(adapter("7", 12, "Ethernet", "Intel NIC"))
            .with_disk(logical_disk("C:", 100, 40))
            .install(&stub);

        let adapters = stub
            .query("web01", "SELECT DeviceID FROM Win32_NetworkAdapter WHERE NetConnectionStatus = 2", None)
            .await
            .unwrap();
        assert_eq!(adapters.len(), 1);

        let pnp = stub
            .query("web01", "SELECT Name FROM Win32_PnPEntity WHERE DeviceId = 'PCI\\\\VEN_8086&DEV_7'", None)
            .await
            .unwrap();
        assert_eq!(pnp[0].text("Name").unwrap(), "Intel NIC");

        assert!(stub.query("web01", "SELECT Name FROM MSFT_NetLbfoTeam", None).await.is_err());
    }
}
