//! Thread network diagnostics and topology logging.

use std::net::Ipv6Addr;

use crate::dataset::OperationalDataset;
use crate::error::{Error, Result};
use crate::manager::ThreadStackManager;
use crate::stack::{
    ChildInfo, DeviceRole, Instance, IpCounters, MacCounters, MleCounters, NeighborInfo, RouterInfo, ThreadStack,
};

/// RSSI value the stack reports when it has no measurement.
pub const RSSI_INVALID: i8 = 127;

/// Error rates are reported by the stack scaled to this value.
const ERROR_RATE_100_PERCENT: u32 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingRole {
    Unspecified,
    Unassigned,
    SleepyEndDevice,
    EndDevice,
    Reed,
    Router,
    Leader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTableEntry {
    pub ext_address: u64,
    pub age: u32,
    pub rloc16: u16,
    pub link_frame_counter: u32,
    pub mle_frame_counter: u32,
    pub lqi: u8,
    pub average_rssi: Option<i8>,
    pub last_rssi: Option<i8>,
    /// Percent.
    pub frame_error_rate: u8,
    /// Percent.
    pub message_error_rate: u8,
    pub rx_on_when_idle: bool,
    pub full_thread_device: bool,
    pub full_network_data: bool,
    pub is_child: bool,
}

impl From<&NeighborInfo> for NeighborTableEntry {
    fn from(n: &NeighborInfo) -> Self {
        NeighborTableEntry {
            ext_address: u64::from_be_bytes(n.ext_address),
            age: n.age,
            rloc16: n.rloc16,
            link_frame_counter: n.link_frame_counter,
            mle_frame_counter: n.mle_frame_counter,
            lqi: n.link_quality_in,
            average_rssi: valid_rssi(n.average_rssi),
            last_rssi: valid_rssi(n.last_rssi),
            frame_error_rate: error_rate_percent(n.frame_error_rate),
            message_error_rate: error_rate_percent(n.message_error_rate),
            rx_on_when_idle: n.rx_on_when_idle,
            full_thread_device: n.full_thread_device,
            full_network_data: n.full_network_data,
            is_child: n.is_child,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableEntry {
    pub ext_address: u64,
    pub rloc16: u16,
    pub router_id: u8,
    pub next_hop: u8,
    pub path_cost: u8,
    pub lqi_in: u8,
    pub lqi_out: u8,
    pub age: u8,
    pub allocated: bool,
    pub link_established: bool,
}

impl From<&RouterInfo> for RouteTableEntry {
    fn from(r: &RouterInfo) -> Self {
        RouteTableEntry {
            ext_address: u64::from_be_bytes(r.ext_address),
            rloc16: r.rloc16,
            router_id: r.router_id,
            next_hop: r.next_hop,
            path_cost: r.path_cost,
            lqi_in: r.link_quality_in,
            lqi_out: r.link_quality_out,
            age: r.age,
            allocated: r.allocated,
            link_established: r.link_established,
        }
    }
}

/// Snapshot of the Thread network diagnostics attributes. A `None` field is
/// one the stack could not provide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkDiagnostics {
    pub channel: Option<u8>,
    pub routing_role: Option<RoutingRole>,
    pub network_name: Option<String>,
    pub pan_id: Option<u16>,
    pub extended_pan_id: Option<u64>,
    pub mesh_local_prefix: Option<[u8; 8]>,
    pub overrun_count: u64,
    pub neighbor_table: Option<Vec<NeighborTableEntry>>,
    pub route_table: Option<Vec<RouteTableEntry>>,
    pub partition_id: Option<u32>,
    pub weighting: Option<u8>,
    pub data_version: Option<u8>,
    pub stable_data_version: Option<u8>,
    pub leader_router_id: Option<u8>,
    pub mle_counters: Option<MleCounters>,
    pub mac_counters: Option<MacCounters>,
    pub ip_counters: Option<IpCounters>,
    pub active_timestamp: Option<u64>,
}

/// Identity and link quality of this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMinimal {
    pub rloc16: u16,
    pub router_id: u16,
    pub leader_router_id: u8,
    pub parent_average_rssi: i8,
    pub parent_last_rssi: i8,
    pub partition_id: u32,
    pub ext_address: [u8; 8],
    pub instant_rssi: i8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEntry {
    pub neighbor: NeighborInfo,
    pub child: Option<ChildInfo>,
}

/// Everything a router knows about its neighborhood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyFull {
    pub rloc16: u16,
    pub router_id: u16,
    pub leader_router_id: u8,
    pub leader_address: Ipv6Addr,
    pub leader_weight: u8,
    pub local_leader_weight: u8,
    pub network_data_length: usize,
    pub network_data_version: u8,
    pub stable_network_data_length: usize,
    pub stable_network_data_version: u8,
    pub ext_address: [u8; 8],
    pub partition_id: u32,
    pub instant_rssi: i8,
    pub entries: Vec<TopologyEntry>,
}

impl TopologyFull {
    pub fn child_count(&self) -> usize {
        self.entries.iter().filter(|e| e.neighbor.is_child).count()
    }
}

fn valid_rssi(rssi: i8) -> Option<i8> {
    if rssi == RSSI_INVALID { None } else { Some(rssi) }
}

fn error_rate_percent(rate: u16) -> u8 {
    (u32::from(rate) * 100 / ERROR_RATE_100_PERCENT) as u8
}

/// Router id is the top six bits of the RLOC16.
fn router_id_of(rloc16: u16) -> u16 {
    (rloc16 >> 10) & 0x3f
}

fn child_id_of(rloc16: u16) -> u16 {
    rloc16 & 0x1ff
}

fn format_ext_address(addr: &[u8; 8]) -> String {
    addr.chunks(2)
        .map(|pair| format!("{:02X}{:02X}", pair[0], pair[1]))
        .collect::<Vec<_>>()
        .join(":")
}

fn routing_role(stack: &dyn ThreadStack, inst: Instance, ftd: bool) -> Result<RoutingRole> {
    Ok(match stack.device_role(inst)? {
        DeviceRole::Disabled => RoutingRole::Unspecified,
        DeviceRole::Detached => RoutingRole::Unassigned,
        DeviceRole::Router => RoutingRole::Router,
        DeviceRole::Leader => RoutingRole::Leader,
        DeviceRole::Child => {
            if !stack.link_mode(inst)?.rx_on_when_idle {
                RoutingRole::SleepyEndDevice
            } else if ftd && stack.is_router_eligible(inst)? {
                RoutingRole::Reed
            } else {
                RoutingRole::EndDevice
            }
        }
    })
}

fn route_table(stack: &dyn ThreadStack, inst: Instance, ftd: bool) -> Result<Vec<RouteTableEntry>> {
    if !ftd {
        let parent = stack.parent_info(inst)?;
        return Ok(vec![RouteTableEntry::from(&parent)]);
    }
    let max_router_id = stack.max_router_id(inst)?;
    let routes: Vec<RouteTableEntry> = (0..=u16::from(max_router_id))
        .filter_map(|id| stack.router_info(inst, id).ok())
        .map(|info| RouteTableEntry::from(&info))
        .collect();
    if routes.is_empty() {
        return Err(Error::IncorrectState);
    }
    Ok(routes)
}

impl ThreadStackManager {
    /// Reads every diagnostics attribute, leaving unavailable ones unset.
    pub fn network_diagnostics(&self) -> Result<NetworkDiagnostics> {
        let ftd = self.config().ftd;
        let overrun_count = self.overrun_count();
        self.with_stack(|stack, inst| {
            let active_timestamp = stack
                .dataset_get_active_tlvs(inst)
                .and_then(|tlvs| OperationalDataset::from_bytes(&tlvs))
                .ok()
                .and_then(|ds| ds.active_timestamp());
            Ok(NetworkDiagnostics {
                channel: stack.channel(inst).ok(),
                routing_role: routing_role(stack, inst, ftd).ok(),
                network_name: stack.network_name(inst).ok(),
                pan_id: stack.pan_id(inst).ok(),
                extended_pan_id: stack.extended_pan_id(inst).ok().map(u64::from_be_bytes),
                mesh_local_prefix: stack.mesh_local_prefix(inst).ok(),
                overrun_count,
                neighbor_table: stack
                    .neighbors(inst)
                    .ok()
                    .map(|ns| ns.iter().map(NeighborTableEntry::from).collect()),
                route_table: route_table(stack, inst, ftd).ok(),
                partition_id: stack.partition_id(inst).ok(),
                weighting: stack.leader_weight(inst).ok(),
                data_version: stack.network_data_version(inst).ok(),
                stable_data_version: stack.stable_network_data_version(inst).ok(),
                leader_router_id: stack.leader_router_id(inst).ok(),
                mle_counters: stack.mle_counters(inst).ok(),
                mac_counters: stack.mac_counters(inst).ok(),
                ip_counters: stack.ip6_counters(inst).ok(),
                active_timestamp,
            })
        })
    }

    pub fn get_and_log_thread_stats_counters(&self) -> Result<()> {
        self.with_stack(|stack, inst| {
            log::info!("Thread role: {}", stack.device_role(inst)?.as_str());

            if stack.dataset_is_commissioned(inst)? {
                let tlvs = stack.dataset_get_active_tlvs(inst)?;
                let dataset = OperationalDataset::from_bytes(&tlvs)?;
                if let Some(channel) = dataset.channel() {
                    log::info!("Thread channel: {}", channel);
                }
            }

            let mac = stack.mac_counters(inst)?;
            log::info!(
                "Rx counters: total {} unicast {} broadcast {} data {} data polls {} beacons {} beacon reqs {} other {} filtered {} dest filtered {}",
                mac.rx_total,
                mac.rx_unicast,
                mac.rx_broadcast,
                mac.rx_data,
                mac.rx_data_poll,
                mac.rx_beacon,
                mac.rx_beacon_request,
                mac.rx_other,
                mac.rx_address_filtered,
                mac.rx_dest_addr_filtered
            );
            log::info!(
                "Tx counters: total {} unicast {} broadcast {} data {} data polls {} beacons {} beacon reqs {} other {} retry {} cca fail {}",
                mac.tx_total,
                mac.tx_unicast,
                mac.tx_broadcast,
                mac.tx_data,
                mac.tx_data_poll,
                mac.tx_beacon,
                mac.tx_beacon_request,
                mac.tx_other,
                mac.tx_retry,
                mac.tx_err_cca
            );
            log::info!(
                "Failure counters: decrypt {} no frame {} unknown neighbor {} invalid src {} fcs {} other {}",
                mac.rx_err_sec,
                mac.rx_err_no_frame,
                mac.rx_err_unknown_neighbor,
                mac.rx_err_invalid_src_addr,
                mac.rx_err_fcs,
                mac.rx_err_other
            );

            let ip = stack.ip6_counters(inst)?;
            log::info!(
                "IP counters: tx success {} rx success {} tx fail {} rx fail {}",
                ip.tx_success,
                ip.rx_success,
                ip.tx_failure,
                ip.rx_failure
            );
            Ok(())
        })
    }

    pub fn thread_topology_minimal(&self) -> Result<TopologyMinimal> {
        self.with_stack(|stack, inst| {
            let rloc16 = stack.rloc16(inst)?;
            Ok(TopologyMinimal {
                rloc16,
                router_id: router_id_of(rloc16),
                leader_router_id: stack.leader_router_id(inst)?,
                parent_average_rssi: stack.parent_average_rssi(inst)?,
                parent_last_rssi: stack.parent_last_rssi(inst)?,
                partition_id: stack.partition_id(inst)?,
                ext_address: stack.extended_address(inst)?,
                instant_rssi: stack.instant_rssi(inst)?,
            })
        })
    }

    pub fn get_and_log_thread_topology_minimal(&self) -> Result<()> {
        match self.thread_topology_minimal() {
            Ok(t) => {
                log::info!(
                    "Thread topology: rloc16 {:04X} router id {} leader router id {} parent avg rssi {} parent last rssi {} partition id {}",
                    t.rloc16,
                    t.router_id,
                    t.leader_router_id,
                    t.parent_average_rssi,
                    t.parent_last_rssi,
                    t.partition_id
                );
                log::info!(
                    "extended address {} instant rssi {}",
                    format_ext_address(&t.ext_address),
                    t.instant_rssi
                );
                Ok(())
            }
            Err(e) => {
                log::error!("failed to read minimal Thread topology: {}", e);
                Err(e)
            }
        }
    }

    pub fn thread_topology_full(&self) -> Result<TopologyFull> {
        if !self.config().ftd {
            return Err(Error::UnsupportedFeature);
        }
        self.with_stack(|stack, inst| {
            let rloc16 = stack.rloc16(inst)?;
            let neighbors = stack.neighbors(inst)?;
            let mut entries = Vec::with_capacity(neighbors.len());
            for neighbor in neighbors {
                let child = if neighbor.is_child {
                    Some(stack.child_info_by_id(inst, child_id_of(neighbor.rloc16))?)
                } else {
                    None
                };
                entries.push(TopologyEntry { neighbor, child });
            }
            Ok(TopologyFull {
                rloc16,
                router_id: router_id_of(rloc16),
                leader_router_id: stack.leader_router_id(inst)?,
                leader_address: stack.leader_rloc(inst)?,
                leader_weight: stack.leader_weight(inst)?,
                local_leader_weight: stack.local_leader_weight(inst)?,
                network_data_length: stack.network_data(inst, false)?.len(),
                network_data_version: stack.network_data_version(inst)?,
                stable_network_data_length: stack.network_data(inst, true)?.len(),
                stable_network_data_version: stack.stable_network_data_version(inst)?,
                ext_address: stack.extended_address(inst)?,
                partition_id: stack.partition_id(inst)?,
                instant_rssi: stack.instant_rssi(inst)?,
                entries,
            })
        })
    }

    pub fn get_and_log_thread_topology_full(&self) -> Result<()> {
        let t = match self.thread_topology_full() {
            Ok(t) => t,
            Err(e) => {
                log::error!("failed to read full Thread topology: {}", e);
                return Err(e);
            }
        };
        log::info!(
            "Thread topology: rloc16 {:04X} router id {} leader router id {} leader address {} leader weight {} local leader weight {}",
            t.rloc16,
            t.router_id,
            t.leader_router_id,
            t.leader_address,
            t.leader_weight,
            t.local_leader_weight
        );
        log::info!(
            "network data len {} version {} stable version {}",
            t.network_data_length,
            t.network_data_version,
            t.stable_network_data_version
        );
        log::info!(
            "extended address {} partition id {:x} instant rssi {} neighbors {} children {}",
            format_ext_address(&t.ext_address),
            t.partition_id,
            t.instant_rssi,
            t.entries.len(),
            t.child_count()
        );
        for (i, entry) in t.entries.iter().enumerate() {
            let n = &entry.neighbor;
            let child = entry
                .child
                .as_ref()
                .map(|c| format!(" timeout {} network data version {}", c.timeout, c.network_data_version))
                .unwrap_or_default();
            log::info!(
                "topo entry[{}]: {} rloc {:04X} age {} lqi {} avg rssi {} last rssi {} rx on idle {} ftd {} full netdata {} child {}{}",
                i,
                format_ext_address(&n.ext_address),
                n.rloc16,
                n.age,
                n.link_quality_in,
                n.average_rssi,
                n.last_rssi,
                n.rx_on_when_idle,
                n.full_thread_device,
                n.full_network_data,
                n.is_child,
                child
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sample_dataset;
    use crate::fallback::SimulatedStack;
    use crate::manager::AdapterConfig;
    use crate::platform::EventLoop;
    use std::sync::Arc;

    fn manager_with(stack: Arc<SimulatedStack>, ftd: bool) -> Arc<ThreadStackManager> {
        let config = AdapterConfig {
            ftd,
            ..Default::default()
        };
        let manager = ThreadStackManager::new(stack, EventLoop::new(), config);
        manager.do_init(None).unwrap();
        manager
    }

    #[test]
    fn neighbor_entries_scale_rates_and_drop_invalid_rssi() {
        let entry = NeighborTableEntry::from(&NeighborInfo {
            ext_address: [0, 0, 0, 0, 0, 0, 1, 2],
            average_rssi: RSSI_INVALID,
            last_rssi: -70,
            frame_error_rate: 0xffff,
            message_error_rate: 0x7fff,
            ..Default::default()
        });
        assert_eq!(entry.ext_address, 0x0102);
        assert_eq!(entry.average_rssi, None);
        assert_eq!(entry.last_rssi, Some(-70));
        assert_eq!(entry.frame_error_rate, 100);
        assert_eq!(entry.message_error_rate, 49);
    }

    #[test]
    fn routing_role_follows_link_mode() {
        let stack = Arc::new(SimulatedStack::new());
        let manager = manager_with(stack.clone(), true);
        assert_eq!(
            manager.network_diagnostics().unwrap().routing_role,
            Some(RoutingRole::Unspecified)
        );
        stack.with_state(|s| s.role = DeviceRole::Child);
        assert_eq!(manager.network_diagnostics().unwrap().routing_role, Some(RoutingRole::Reed));
        stack.with_state(|s| s.router_eligible = false);
        assert_eq!(manager.network_diagnostics().unwrap().routing_role, Some(RoutingRole::EndDevice));
        stack.with_state(|s| s.link_mode.rx_on_when_idle = false);
        assert_eq!(
            manager.network_diagnostics().unwrap().routing_role,
            Some(RoutingRole::SleepyEndDevice)
        );
    }

    #[test]
    fn diagnostics_leave_unsupported_fields_unset() {
        let stack = Arc::new(SimulatedStack::minimal());
        stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        let manager = manager_with(stack, false);
        let diag = manager.network_diagnostics().unwrap();
        assert_eq!(diag.channel, Some(15));
        assert_eq!(diag.pan_id, Some(0x1234));
        assert_eq!(diag.extended_pan_id, Some(0xdead00beef00cafe));
        assert_eq!(diag.active_timestamp, Some(1));
        // No parent yet on a minimal device.
        assert_eq!(diag.route_table, None);
        assert_eq!(diag.overrun_count, 0);
    }

    #[test]
    fn route_table_lists_known_routers() {
        let stack = Arc::new(SimulatedStack::new());
        stack.with_state(|s| {
            s.routers = vec![
                RouterInfo {
                    router_id: 3,
                    rloc16: 0x0c00,
                    ..Default::default()
                },
                RouterInfo {
                    router_id: 9,
                    rloc16: 0x2400,
                    ..Default::default()
                },
            ]
        });
        let manager = manager_with(stack, true);
        let routes = manager.network_diagnostics().unwrap().route_table.unwrap();
        assert_eq!(routes.iter().map(|r| r.router_id).collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn minimal_topology_derives_router_id() {
        let stack = Arc::new(SimulatedStack::new());
        stack.with_state(|s| s.rloc16 = 0x1401);
        let manager = manager_with(stack, true);
        let topology = manager.thread_topology_minimal().unwrap();
        assert_eq!(topology.router_id, 5);
        assert_eq!(topology.parent_average_rssi, -60);
        manager.get_and_log_thread_topology_minimal().unwrap();
    }

    #[test]
    fn full_topology_needs_ftd() {
        let manager = manager_with(Arc::new(SimulatedStack::minimal()), false);
        assert!(matches!(manager.thread_topology_full(), Err(Error::UnsupportedFeature)));
    }

    #[test]
    fn full_topology_reads_child_details() {
        let stack = Arc::new(SimulatedStack::new());
        stack.with_state(|s| {
            s.active_dataset = Some(sample_dataset());
            s.role = DeviceRole::Router;
            s.rloc16 = 0x0400;
            s.neighbors = vec![
                NeighborInfo {
                    rloc16: 0x0401,
                    is_child: true,
                    ..Default::default()
                },
                NeighborInfo {
                    rloc16: 0x0800,
                    ..Default::default()
                },
            ];
            s.children = vec![ChildInfo {
                child_id: 1,
                rloc16: 0x0401,
                timeout: 240,
                ..Default::default()
            }];
        });
        let manager = manager_with(stack, true);
        let topology = manager.thread_topology_full().unwrap();
        assert_eq!(topology.entries.len(), 2);
        assert_eq!(topology.child_count(), 1);
        assert_eq!(topology.entries[0].child.as_ref().map(|c| c.timeout), Some(240));
        assert!(topology.entries[1].child.is_none());
        manager.get_and_log_thread_topology_full().unwrap();
        manager.get_and_log_thread_stats_counters().unwrap();
    }

    #[test]
    fn ext_address_formatting() {
        assert_eq!(
            format_ext_address(&[0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0]),
            "1234:5678:9ABC:DEF0"
        );
    }
}
