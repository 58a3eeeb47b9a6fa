//! Row shapes of every statement the poller issues
//!
//! One struct per statement, decoded once at the query boundary. Nothing past
//! this module looks at a raw `Row`.

use chrono::{DateTime, Utc};
use symbion_query::{DecodeError, FromRow, Row};

/// `Win32_ComputerSystem`
#[derive(Debug, Clone, PartialEq)]
pub struct ComputerSystemRow {
    pub dns_host_name: String,
    pub domain: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl FromRow for ComputerSystemRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            dns_host_name: row.text("DNSHostName")?,
            domain: row.opt_text("Domain"),
            manufacturer: row.opt_text("Manufacturer"),
            model: row.opt_text("Model"),
        })
    }
}

/// `Win32_OperatingSystem`; memory sizes are in KiB.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatingSystemRow {
    pub caption: String,
    pub last_boot: Option<DateTime<Utc>>,
    pub version: String,
    pub free_physical_kib: u64,
    pub total_visible_kib: u64,
}

impl FromRow for OperatingSystemRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            caption: row.text("Caption")?,
            last_boot: row.opt_timestamp("LastBootUpTime"),
            version: row.text("Version")?,
            free_physical_kib: row.u64("FreePhysicalMemory")?,
            total_visible_kib: row.u64("TotalVisibleMemorySize")?,
        })
    }
}

/// `Win32_NetworkAdapter`, connected adapters only.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkAdapterRow {
    pub device_id: String,
    pub pnp_device_id: Option<String>,
    pub net_connection_id: Option<String>,
    pub description: Option<String>,
    pub mac_address: Option<String>,
    pub speed: Option<u64>,
    pub interface_index: u32,
}

impl FromRow for NetworkAdapterRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let index = row.u64("InterfaceIndex")?;
        let interface_index = u32::try_from(index).map_err(|_| DecodeError::TypeMismatch {
            field: "InterfaceIndex",
            expected: "u32",
            found: "integer",
        })?;
        Ok(Self {
            device_id: row.text("DeviceID")?,
            pnp_device_id: row.opt_text("PNPDeviceID"),
            net_connection_id: row.opt_text("NetConnectionID"),
            description: row.opt_text("Description"),
            mac_address: row.opt_text("MACAddress"),
            speed: row.opt_u64("Speed"),
            interface_index,
        })
    }
}

/// `Win32_PnPEntity`, looked up per adapter for its canonical name.
#[derive(Debug, Clone, PartialEq)]
pub struct PnpEntityRow {
    pub name: Option<String>,
}

impl FromRow for PnpEntityRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self { name: row.opt_text("Name") })
    }
}

/// `MSFT_NetLbfoTeam`
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRow {
    pub name: String,
}

impl FromRow for TeamRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self { name: row.text("Name")? })
    }
}

/// `MSFT_NetLbfoTeamMember`
#[derive(Debug, Clone, PartialEq)]
pub struct TeamMemberRow {
    pub name: String,
    pub team: String,
}

impl FromRow for TeamMemberRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            name: row.text("Name")?,
            team: row.text("Team")?,
        })
    }
}

/// `Win32_NetworkAdapterConfiguration`; addresses and subnets are parallel arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfigRow {
    pub interface_index: u32,
    pub ip_addresses: Option<Vec<String>>,
    pub ip_subnets: Option<Vec<String>>,
    pub dhcp_enabled: Option<bool>,
}

impl FromRow for AdapterConfigRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let index = row.u64("InterfaceIndex")?;
        Ok(Self {
            interface_index: u32::try_from(index).map_err(|_| DecodeError::TypeMismatch {
                field: "InterfaceIndex",
                expected: "u32",
                found: "integer",
            })?,
            ip_addresses: row.opt_text_array("IPAddress"),
            ip_subnets: row.opt_text_array("IPSubnet"),
            dhcp_enabled: row.opt_bool("DHCPEnabled"),
        })
    }
}

/// `Win32_LogicalDisk`, fixed disks only.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalDiskRow {
    pub device_id: String,
    pub name: String,
    pub description: Option<String>,
    pub free_space: u64,
    pub size: u64,
    pub volume_serial_number: Option<String>,
}

impl FromRow for LogicalDiskRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            device_id: row.text("DeviceID")?,
            name: row.text("Name")?,
            description: row.opt_text("Description"),
            free_space: row.opt_u64("FreeSpace").unwrap_or_default(),
            size: row.opt_u64("Size").unwrap_or_default(),
            volume_serial_number: row.opt_text("VolumeSerialNumber"),
        })
    }
}

/// `_Total` row of the processor or hypervisor counters, whichever was asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuLoadRow {
    pub load: u64,
}

impl CpuLoadRow {
    pub const PROCESSOR_FIELD: &'static str = "PercentProcessorTime";
    pub const HYPERVISOR_FIELD: &'static str = "PercentTotalRunTime";
}

impl FromRow for CpuLoadRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        let load = match row.opt_u64(Self::HYPERVISOR_FIELD) {
            Some(load) => load,
            None => row.u64(Self::PROCESSOR_FIELD)?,
        };
        Ok(Self { load })
    }
}

/// `Win32_PerfFormattedData_PerfOS_Memory`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryPerfRow {
    pub available_kib: u64,
}

impl FromRow for MemoryPerfRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self { available_kib: row.u64("AvailableKBytes")? })
    }
}

/// Adapter or interface throughput counters.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPerfRow {
    pub name: String,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
}

impl FromRow for NetworkPerfRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            name: row.text("Name")?,
            bytes_in: row.u64("BytesReceivedPersec")?,
            bytes_out: row.u64("BytesSentPersec")?,
            packets_in: row.opt_u64("PacketsReceivedPersec").unwrap_or_default(),
            packets_out: row.opt_u64("PacketsSentPersec").unwrap_or_default(),
        })
    }
}

/// `Win32_PerfFormattedData_PerfDisk_LogicalDisk`
#[derive(Debug, Clone, PartialEq)]
pub struct DiskPerfRow {
    pub name: String,
    pub read_bps: u64,
    pub write_bps: u64,
}

impl FromRow for DiskPerfRow {
    fn from_row(row: &Row) -> Result<Self, DecodeError> {
        Ok(Self {
            name: row.text("Name")?,
            read_bps: row.u64("DiskReadBytesPersec")?,
            write_bps: row.u64("DiskWriteBytesPersec")?,
        })
    }
}

/// Any row; used by probes that only care whether rows came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyRow;

impl FromRow for AnyRow {
    fn from_row(_: &Row) -> Result<Self, DecodeError> {
        Ok(AnyRow)
    }
}
