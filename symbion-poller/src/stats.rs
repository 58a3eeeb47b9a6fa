//! Stats sub-queries: CPU, memory, network and volume throughput
//!
//! Write sets are disjoint by signature:
//! - `poll_cpu`: CPU load and CPU history
//! - `poll_memory`: memory used and memory history
//! - `poll_network`: interface live metrics and network streams
//! - `poll_volume_performance`: volume live metrics and volume streams
//!
//! Every sample of one sub-query carries the epoch taken just before its
//! statement was issued.

use crate::combine::AggregateCombiner;
use crate::history::{epoch_now, CpuSample, HistoryBuffer, HistoryStore, InterfaceSample, MemorySample, VolumeSample};
use crate::model::{primary_interface_ids, Interface, NodeInventory, Volume};
use crate::normalize::NameNormalizer;
use crate::reconcile::EntityCollection;
use crate::rows::{CpuLoadRow, DiskPerfRow, MemoryPerfRow, NetworkPerfRow};
use symbion_query::{QueryService, QueryServiceExt, TransportError};
use tracing::debug;

const PROCESSOR_QUERY: &str =
    "SELECT PercentProcessorTime FROM Win32_PerfFormattedData_PerfOS_Processor WHERE Name = '_Total'";

const HYPERVISOR_QUERY: &str = "SELECT PercentTotalRunTime FROM Win32_PerfFormattedData_HvStats_HyperVHypervisorLogicalProcessor WHERE Name = '_Total'";

const MEMORY_QUERY: &str = "SELECT AvailableKBytes FROM Win32_PerfFormattedData_PerfOS_Memory";

const ADAPTER_TABLE: &str = "Win32_PerfFormattedData_Tcpip_NetworkAdapter";
const INTERFACE_TABLE: &str = "Win32_PerfFormattedData_Tcpip_NetworkInterface";

const DISK_QUERY: &str =
    "SELECT Name, DiskReadBytesPersec, DiskWriteBytesPersec FROM Win32_PerfFormattedData_PerfDisk_LogicalDisk";

fn network_query(adapter_table: bool) -> String {
    let table = if adapter_table { ADAPTER_TABLE } else { INTERFACE_TABLE };
    format!(
        "SELECT Name, BytesReceivedPersec, BytesSentPersec, PacketsReceivedPersec, PacketsSentPersec FROM {}",
        table
    )
}

/// First entity whose normalized name equals the normalized counter name.
/// Two entities normalizing alike is a known ambiguity: the first one wins.
fn match_counter<'a, T>(
    normalizer: &NameNormalizer,
    entities: impl Iterator<Item = &'a mut T>,
    entity_name: impl Fn(&T) -> Option<&str>,
    counter_name: &str,
) -> Option<&'a mut T>
where
    T: 'a,
{
    entities
        .into_iter()
        .find(|e| entity_name(&**e).is_some_and(|n| normalizer.matches(n, counter_name)))
}

pub async fn poll_cpu<Q>(
    service: &Q,
    endpoint: &str,
    is_vm_host: bool,
    cpu_load: &mut Option<u64>,
    history: &mut HistoryBuffer<CpuSample>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let statement = if is_vm_host { HYPERVISOR_QUERY } else { PROCESSOR_QUERY };
    let epoch = epoch_now();
    let Some(row) = service.fetch_first::<CpuLoadRow>(endpoint, statement, None).await? else {
        return Ok(());
    };

    *cpu_load = Some(row.load);
    history.push(CpuSample { epoch, avg_load: row.load });
    Ok(())
}

/// Needs the total from the last inventory cycle; without it there is nothing
/// to subtract from and the sample is skipped.
pub async fn poll_memory<Q>(
    service: &Q,
    endpoint: &str,
    inventory: &mut NodeInventory,
    history: &mut HistoryBuffer<MemorySample>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let epoch = epoch_now();
    let Some(row) = service.fetch_first::<MemoryPerfRow>(endpoint, MEMORY_QUERY, None).await? else {
        return Ok(());
    };
    let Some(total) = inventory.total_memory else {
        debug!("[{}] total memory unknown, skipping memory sample", endpoint);
        return Ok(());
    };

    let used = total.saturating_sub(row.available_kib.saturating_mul(1024));
    inventory.memory_used = Some(used);
    history.push(MemorySample { epoch, avg_memory_used: used });
    Ok(())
}

pub async fn poll_network<Q>(
    service: &Q,
    endpoint: &str,
    adapter_table: bool,
    normalizer: &NameNormalizer,
    primary_names: &[String],
    interfaces: &mut EntityCollection<Interface>,
    history: &mut HistoryStore<InterfaceSample>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let primaries = primary_interface_ids(interfaces, primary_names);
    let epoch = epoch_now();
    let rows: Vec<NetworkPerfRow> = service.fetch_all(endpoint, &network_query(adapter_table), None).await?;

    let mut combined = AggregateCombiner::new(epoch);
    for row in &rows {
        let Some(iface) = match_counter(normalizer, interfaces.iter_mut(), |i| i.name.as_deref(), &row.name) else {
            continue;
        };
        iface.in_bps = Some(row.bytes_in);
        iface.out_bps = Some(row.bytes_out);
        iface.in_pps = Some(row.packets_in);
        iface.out_pps = Some(row.packets_out);

        let sample = InterfaceSample {
            epoch,
            in_avg_bps: row.bytes_in,
            out_avg_bps: row.bytes_out,
        };
        // Matched through its name, so the name is known.
        if let Some(name) = iface.name.as_deref() {
            history.append(name, sample);
        }
        combined.add(&sample, primaries.contains(&iface.id));
    }

    debug!(
        "[{}] network: {} counter row(s), {} primary contribution(s)",
        endpoint,
        rows.len(),
        combined.contributors()
    );
    combined.commit(history);
    Ok(())
}

/// Every volume counts towards the combined stream.
pub async fn poll_volume_performance<Q>(
    service: &Q,
    endpoint: &str,
    normalizer: &NameNormalizer,
    volumes: &mut EntityCollection<Volume>,
    history: &mut HistoryStore<VolumeSample>,
) -> Result<(), TransportError>
where
    Q: QueryService + ?Sized,
{
    let epoch = epoch_now();
    let rows: Vec<DiskPerfRow> = service.fetch_all(endpoint, DISK_QUERY, None).await?;

    let mut combined = AggregateCombiner::new(epoch);
    for row in &rows {
        let Some(volume) = match_counter(normalizer, volumes.iter_mut(), |v| Some(v.name.as_str()), &row.name) else {
            continue;
        };
        volume.read_bps = Some(row.read_bps);
        volume.write_bps = Some(row.write_bps);

        let sample = VolumeSample {
            epoch,
            read_avg_bps: row.read_bps,
            write_avg_bps: row.write_bps,
        };
        history.append(&volume.name, sample);
        combined.add(&sample, true);
    }

    combined.commit(history);
    Ok(())
}
