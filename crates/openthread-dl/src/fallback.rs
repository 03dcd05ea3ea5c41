//! In-memory Thread stack used when no OpenThread library is available.
//!
//! [`SimulatedStack`] keeps the observable state of a stack (role, active
//! dataset, link mode, SRP registrations, pending queries) behind a mutex
//! and records every entry point it is asked to run, named after the native
//! symbol it stands in for. Asynchronous completions never happen on their
//! own: the owner drives them through the `complete_*` and `notify_*`
//! methods, which invoke the registered handlers with no lock held.

use std::collections::{BTreeMap, VecDeque};
use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::dataset::OperationalDataset;
use crate::error::{Error, OtError, Result};
use crate::stack::{
    ActiveScanResult, AddressHandler, BrowseHandler, ChildInfo, DeviceRole, DnsAddressResponse, DnsBrowseResponse,
    DnsQueryConfig, DnsServiceInfo, DnsServiceResponse, ExternalRoute, Instance, IpCounters, JoinerDiscerner,
    JoinerHandler, JoinerState, LinkMode, MacCounters, MleCounters, NeighborInfo, NetifAddress, ResolveHandler,
    RouterInfo, ScanHandler, SrpHostInfo, SrpItemState, SrpNotification, SrpServiceDescription, StateFlags,
    ThreadStack, TxtEntry,
};

const SIMULATED_INSTANCE: usize = 0x5eed;

/// A service as the simulated SRP client holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedSrpService {
    pub instance_name: String,
    pub name: String,
    pub port: u16,
    pub subtypes: Vec<String>,
    pub txt: Vec<TxtEntry>,
    pub state: SrpItemState,
}

/// Observable state of the simulated stack. Tests may edit it freely
/// through [`SimulatedStack::with_state`].
#[derive(Debug, Clone)]
pub struct SimulatedState {
    pub ftd: bool,
    pub csl_capable: bool,
    pub instance: Option<Instance>,
    pub role: DeviceRole,
    pub ip6_enabled: bool,
    pub slaac_enabled: bool,
    pub active_dataset: Option<OperationalDataset>,
    pub link_mode: LinkMode,
    pub router_eligible: bool,
    pub addresses: Vec<NetifAddress>,
    pub routes: Vec<ExternalRoute>,
    pub neighbors: Vec<NeighborInfo>,
    pub routers: Vec<RouterInfo>,
    pub parent: Option<RouterInfo>,
    pub children: Vec<ChildInfo>,
    pub ip6_counters: IpCounters,
    pub mac_counters: MacCounters,
    pub mle_counters: MleCounters,
    pub rloc16: u16,
    pub partition_id: u32,
    pub leader_router_id: u8,
    pub leader_weight: u8,
    pub local_leader_weight: u8,
    pub max_router_id: u8,
    pub parent_rssi: (i8, i8),
    pub network_data: Vec<u8>,
    pub network_data_version: u8,
    pub stable_network_data_version: u8,
    pub ext_address: [u8; 8],
    pub eui64: [u8; 8],
    pub instant_rssi: i8,
    pub poll_period: u32,
    pub csl_period: u16,
    pub joiner_state: JoinerState,
    pub joiner_discerner: Option<JoinerDiscerner>,
    pub joiner_pskd: Option<String>,
    pub srp_host: SrpHostInfo,
    pub srp_host_addresses: Vec<Ipv6Addr>,
    pub srp_services: BTreeMap<usize, SimulatedSrpService>,
    pub srp_lease_interval: u32,
    pub srp_key_lease_interval: u32,
    pub dns_config: DnsQueryConfig,
}

impl Default for SimulatedState {
    fn default() -> Self {
        SimulatedState {
            ftd: true,
            csl_capable: true,
            instance: None,
            role: DeviceRole::Disabled,
            ip6_enabled: false,
            slaac_enabled: false,
            active_dataset: None,
            link_mode: LinkMode {
                rx_on_when_idle: true,
                device_type: true,
                network_data: true,
            },
            router_eligible: true,
            addresses: Vec::new(),
            routes: Vec::new(),
            neighbors: Vec::new(),
            routers: Vec::new(),
            parent: None,
            children: Vec::new(),
            ip6_counters: IpCounters::default(),
            mac_counters: MacCounters::default(),
            mle_counters: MleCounters::default(),
            rloc16: 0xfffe,
            partition_id: 0,
            leader_router_id: 0,
            leader_weight: 64,
            local_leader_weight: 64,
            max_router_id: 62,
            parent_rssi: (-60, -62),
            network_data: Vec::new(),
            network_data_version: 0,
            stable_network_data_version: 0,
            ext_address: [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0],
            eui64: [0x18, 0xb4, 0x30, 0x00, 0x00, 0x00, 0x00, 0x01],
            instant_rssi: -70,
            poll_period: 0,
            csl_period: 0,
            joiner_state: JoinerState::Idle,
            joiner_discerner: None,
            joiner_pskd: None,
            srp_host: SrpHostInfo {
                name: None,
                auto_address: false,
                state: SrpItemState::Removed,
            },
            srp_host_addresses: Vec::new(),
            srp_services: BTreeMap::new(),
            srp_lease_interval: 0,
            srp_key_lease_interval: 0,
            dns_config: DnsQueryConfig {
                server: SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 53, 0, 0),
                response_timeout_ms: 6000,
                max_tx_attempts: 3,
                recursion_flag: 1,
                nat64_mode: 0,
                service_mode: 0,
                transport_proto: 0,
            },
        }
    }
}

#[derive(Default)]
struct Handlers {
    state_changed: Option<Arc<dyn Fn(StateFlags) + Send + Sync>>,
    scan: Option<ScanHandler>,
    joiner: Option<JoinerHandler>,
    srp: Option<Arc<dyn Fn(SrpNotification) + Send + Sync>>,
    srp_auto_start: Option<Arc<dyn Fn(Option<SocketAddrV6>) + Send + Sync>>,
    browse: VecDeque<(String, BrowseHandler)>,
    resolve: VecDeque<(String, String, ResolveHandler)>,
    address: VecDeque<(String, AddressHandler)>,
}

/// A pure-Rust [`ThreadStack`].
pub struct SimulatedStack {
    lock_owner: Mutex<Option<ThreadId>>,
    lock_released: Condvar,
    calls: Mutex<Vec<&'static str>>,
    state: Mutex<SimulatedState>,
    handlers: Mutex<Handlers>,
}

impl Default for SimulatedStack {
    fn default() -> Self {
        SimulatedStack::with(SimulatedState::default())
    }
}

impl SimulatedStack {
    pub fn new() -> Self {
        SimulatedStack::default()
    }

    pub fn with(state: SimulatedState) -> Self {
        SimulatedStack {
            lock_owner: Mutex::new(None),
            lock_released: Condvar::new(),
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(state),
            handlers: Mutex::new(Handlers::default()),
        }
    }

    /// Stack of a minimal end device build: FTD-only and CSL entry points
    /// are missing.
    pub fn minimal() -> Self {
        let mut state = SimulatedState {
            ftd: false,
            csl_capable: false,
            ..Default::default()
        };
        state.link_mode.device_type = false;
        state.router_eligible = false;
        SimulatedStack::with(state)
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, name: &'static str) -> MutexGuard<'_, SimulatedState> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(name);
        self.state()
    }

    fn ftd_only(&self, name: &'static str) -> Result<MutexGuard<'_, SimulatedState>> {
        let state = self.record(name);
        if state.ftd {
            Ok(state)
        } else {
            Err(Error::Unsupported(name))
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimulatedState) -> R) -> R {
        f(&mut self.state())
    }

    /// Every entry point invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn is_locked(&self) -> bool {
        self.lock_owner.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn role(&self) -> DeviceRole {
        self.state().role
    }

    pub fn fire_state_changed(&self, flags: StateFlags) {
        let handler = self.handlers().state_changed.clone();
        if let Some(handler) = handler {
            handler(flags);
        }
    }

    /// Switches role and reports it like the stack does.
    pub fn set_role(&self, role: DeviceRole) {
        self.state().role = role;
        self.fire_state_changed(StateFlags::THREAD_ROLE);
    }

    pub fn is_scanning(&self) -> bool {
        self.handlers().scan.is_some()
    }

    pub fn report_scan_result(&self, result: ActiveScanResult) -> bool {
        let handler = self.handlers().scan.take();
        match handler {
            Some(mut handler) => {
                handler(Some(result));
                self.handlers().scan = Some(handler);
                true
            }
            None => false,
        }
    }

    /// Signals the end of discovery.
    pub fn finish_scan(&self) -> bool {
        let handler = self.handlers().scan.take();
        match handler {
            Some(mut handler) => {
                handler(None);
                true
            }
            None => false,
        }
    }

    pub fn complete_joiner(&self, result: std::result::Result<(), OtError>) -> bool {
        let handler = self.handlers().joiner.take();
        self.state().joiner_state = if result.is_ok() {
            JoinerState::Joined
        } else {
            JoinerState::Idle
        };
        match handler {
            Some(handler) => {
                handler(result);
                true
            }
            None => false,
        }
    }

    pub fn notify_srp(&self, notification: SrpNotification) {
        let handler = self.handlers().srp.clone();
        if let Some(handler) = handler {
            handler(notification);
        }
    }

    /// Confirms a pending host removal along with every service removal.
    pub fn notify_srp_host_removed(&self) {
        let notification = {
            let mut state = self.state();
            state.srp_host.state = SrpItemState::Removed;
            state.srp_host.name = None;
            let removed: Vec<usize> = state.srp_services.keys().copied().collect();
            state.srp_services.clear();
            SrpNotification {
                error: None,
                host: Some(state.srp_host.clone()),
                removed_slots: removed,
            }
        };
        self.notify_srp(notification);
    }

    /// Confirms every pending service removal.
    pub fn notify_srp_services_removed(&self) {
        let notification = {
            let mut state = self.state();
            let removed: Vec<usize> = state
                .srp_services
                .iter()
                .filter(|(_, s)| s.state == SrpItemState::ToRemove)
                .map(|(slot, _)| *slot)
                .collect();
            for slot in &removed {
                state.srp_services.remove(slot);
            }
            SrpNotification {
                error: None,
                host: Some(state.srp_host.clone()),
                removed_slots: removed,
            }
        };
        self.notify_srp(notification);
    }

    pub fn notify_srp_server(&self, server: Option<SocketAddrV6>) {
        let handler = self.handlers().srp_auto_start.clone();
        if let Some(handler) = handler {
            handler(server);
        }
    }

    /// Completes the oldest pending browse.
    pub fn complete_browse(&self, result: std::result::Result<SimulatedBrowseResponse, OtError>) -> bool {
        let pending = self.handlers().browse.pop_front();
        match pending {
            Some((_, handler)) => {
                match &result {
                    Ok(response) => handler(Ok(response as &dyn DnsBrowseResponse)),
                    Err(e) => handler(Err(*e)),
                }
                true
            }
            None => false,
        }
    }

    pub fn complete_resolve(&self, result: std::result::Result<SimulatedServiceResponse, OtError>) -> bool {
        let pending = self.handlers().resolve.pop_front();
        match pending {
            Some((_, _, handler)) => {
                match &result {
                    Ok(response) => handler(Ok(response as &dyn DnsServiceResponse)),
                    Err(e) => handler(Err(*e)),
                }
                true
            }
            None => false,
        }
    }

    pub fn complete_address(&self, result: std::result::Result<Vec<(Ipv6Addr, u32)>, OtError>) -> bool {
        let pending = self.handlers().address.pop_front();
        match pending {
            Some((_, handler)) => {
                match result {
                    Ok(addresses) => handler(Ok(&SimulatedAddressResponse { addresses } as &dyn DnsAddressResponse)),
                    Err(e) => handler(Err(e)),
                }
                true
            }
            None => false,
        }
    }

    /// Names of the browse queries still waiting for a response.
    pub fn pending_browses(&self) -> Vec<String> {
        self.handlers().browse.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn pending_resolves(&self) -> Vec<(String, String)> {
        self.handlers()
            .resolve
            .iter()
            .map(|(label, name, _)| (label.clone(), name.clone()))
            .collect()
    }
}

fn stack_error(e: OtError) -> Error {
    Error::Stack(e)
}

impl ThreadStack for SimulatedStack {
    fn acquire_instance(&self, _com_port: &str, _debug: u16) -> Result<Instance> {
        let mut state = self.record("otGetInstance");
        let inst = Instance::from_raw(SIMULATED_INSTANCE);
        state.instance = Some(inst);
        Ok(inst)
    }

    fn init_single(&self) -> Result<Instance> {
        let mut state = self.record("otInstanceInitSingle");
        let inst = Instance::from_raw(SIMULATED_INSTANCE);
        state.instance = Some(inst);
        Ok(inst)
    }

    fn destroy_instance(&self) -> Result<()> {
        self.record("otDestroyInstance").instance = None;
        Ok(())
    }

    fn lock(&self) {
        let me = thread::current().id();
        let mut owner = self.lock_owner.lock().unwrap_or_else(|e| e.into_inner());
        assert!(*owner != Some(me), "simulated stack lock is not re-entrant");
        while owner.is_some() {
            owner = self.lock_released.wait(owner).unwrap_or_else(|e| e.into_inner());
        }
        *owner = Some(me);
    }

    fn unlock(&self) {
        *self.lock_owner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.lock_released.notify_one();
    }

    fn set_state_changed_callback(&self, _inst: Instance, handler: crate::stack::StateChangedHandler) -> Result<()> {
        drop(self.record("otSetStateChangedCallback"));
        self.handlers().state_changed = Some(Arc::from(handler));
        Ok(())
    }

    fn erase_persistent_info(&self, _inst: Instance) -> Result<()> {
        let mut state = self.record("otInstanceErasePersistentInfo");
        if state.role != DeviceRole::Disabled {
            return Err(stack_error(OtError::InvalidState));
        }
        state.active_dataset = None;
        Ok(())
    }

    fn ip6_set_slaac_enabled(&self, _inst: Instance, enabled: bool) -> Result<()> {
        self.record("otIp6SetSlaacEnabled").slaac_enabled = enabled;
        Ok(())
    }

    fn ip6_set_enabled(&self, _inst: Instance, enabled: bool) -> Result<()> {
        self.record("otIp6SetEnabled").ip6_enabled = enabled;
        Ok(())
    }

    fn ip6_is_enabled(&self, _inst: Instance) -> Result<bool> {
        Ok(self.record("otIp6IsEnabled").ip6_enabled)
    }

    fn ip6_unicast_addresses(&self, _inst: Instance) -> Result<Vec<NetifAddress>> {
        Ok(self.record("otIp6GetUnicastAddresses").addresses.clone())
    }

    fn dataset_is_commissioned(&self, _inst: Instance) -> Result<bool> {
        let state = self.record("otDatasetIsCommissioned");
        Ok(state.active_dataset.as_ref().is_some_and(|d| d.is_commissioned()))
    }

    fn dataset_set_active_tlvs(&self, _inst: Instance, tlvs: &[u8]) -> Result<()> {
        let mut state = self.record("otDatasetSetActiveTlvs");
        let dataset = OperationalDataset::from_bytes(tlvs).map_err(|_| stack_error(OtError::InvalidArgs))?;
        state.active_dataset = Some(dataset);
        Ok(())
    }

    fn dataset_get_active_tlvs(&self, _inst: Instance) -> Result<Vec<u8>> {
        let state = self.record("otDatasetGetActiveTlvs");
        state
            .active_dataset
            .as_ref()
            .map(|d| d.as_bytes().to_vec())
            .ok_or(stack_error(OtError::NotFound))
    }

    fn device_role(&self, _inst: Instance) -> Result<DeviceRole> {
        Ok(self.record("otThreadGetDeviceRole").role)
    }

    fn thread_set_enabled(&self, _inst: Instance, enabled: bool) -> Result<()> {
        let mut state = self.record("otThreadSetEnabled");
        if !enabled {
            state.role = DeviceRole::Disabled;
            return Ok(());
        }
        let commissioned = state.active_dataset.as_ref().is_some_and(|d| d.is_commissioned());
        if !state.ip6_enabled || !commissioned {
            return Err(stack_error(OtError::InvalidState));
        }
        if state.role == DeviceRole::Disabled {
            state.role = DeviceRole::Detached;
        }
        Ok(())
    }

    fn become_child(&self, _inst: Instance) -> Result<()> {
        let state = self.record("otThreadBecomeChild");
        if state.role == DeviceRole::Disabled {
            return Err(stack_error(OtError::InvalidState));
        }
        Ok(())
    }

    fn discover(
        &self,
        _inst: Instance,
        _scan_channels: u32,
        _pan_id: u16,
        _joiner: bool,
        _enable_eui64_filtering: bool,
        handler: ScanHandler,
    ) -> Result<()> {
        let state = self.record("otThreadDiscover");
        if !state.ip6_enabled {
            return Err(stack_error(OtError::InvalidState));
        }
        drop(state);
        let mut handlers = self.handlers();
        if handlers.scan.is_some() {
            return Err(stack_error(OtError::Busy));
        }
        handlers.scan = Some(handler);
        Ok(())
    }

    fn link_mode(&self, _inst: Instance) -> Result<LinkMode> {
        Ok(self.record("otThreadGetLinkMode").link_mode)
    }

    fn set_link_mode(&self, _inst: Instance, mode: LinkMode) -> Result<()> {
        self.record("otThreadSetLinkMode").link_mode = mode;
        Ok(())
    }

    fn is_router_eligible(&self, _inst: Instance) -> Result<bool> {
        Ok(self.ftd_only("otThreadIsRouterEligible")?.router_eligible)
    }

    fn set_router_eligible(&self, _inst: Instance, eligible: bool) -> Result<()> {
        self.ftd_only("otThreadSetRouterEligible")?.router_eligible = eligible;
        Ok(())
    }

    fn network_key(&self, _inst: Instance) -> Result<[u8; 16]> {
        let state = self.record("otThreadGetNetworkKey");
        Ok(state.active_dataset.as_ref().and_then(|d| d.network_key()).unwrap_or_default())
    }

    fn network_name(&self, _inst: Instance) -> Result<String> {
        let state = self.record("otThreadGetNetworkName");
        Ok(state.active_dataset.as_ref().and_then(|d| d.network_name()).unwrap_or_default())
    }

    fn extended_pan_id(&self, _inst: Instance) -> Result<[u8; 8]> {
        let state = self.record("otThreadGetExtendedPanId");
        Ok(state.active_dataset.as_ref().and_then(|d| d.extended_pan_id()).unwrap_or_default())
    }

    fn mesh_local_prefix(&self, _inst: Instance) -> Result<[u8; 8]> {
        let state = self.record("otThreadGetMeshLocalPrefix");
        Ok(state.active_dataset.as_ref().and_then(|d| d.mesh_local_prefix()).unwrap_or_default())
    }

    fn neighbors(&self, _inst: Instance) -> Result<Vec<NeighborInfo>> {
        Ok(self.record("otThreadGetNextNeighborInfo").neighbors.clone())
    }

    fn ip6_counters(&self, _inst: Instance) -> Result<IpCounters> {
        Ok(self.record("otThreadGetIp6Counters").ip6_counters)
    }

    fn mle_counters(&self, _inst: Instance) -> Result<MleCounters> {
        Ok(self.record("otThreadGetMleCounters").mle_counters)
    }

    fn rloc16(&self, _inst: Instance) -> Result<u16> {
        Ok(self.record("otThreadGetRloc16").rloc16)
    }

    fn leader_router_id(&self, _inst: Instance) -> Result<u8> {
        Ok(self.record("otThreadGetLeaderRouterId").leader_router_id)
    }

    fn parent_average_rssi(&self, _inst: Instance) -> Result<i8> {
        Ok(self.record("otThreadGetParentAverageRssi").parent_rssi.0)
    }

    fn parent_last_rssi(&self, _inst: Instance) -> Result<i8> {
        Ok(self.record("otThreadGetParentLastRssi").parent_rssi.1)
    }

    fn partition_id(&self, _inst: Instance) -> Result<u32> {
        Ok(self.record("otThreadGetPartitionId").partition_id)
    }

    fn leader_rloc(&self, _inst: Instance) -> Result<Ipv6Addr> {
        let state = self.record("otThreadGetLeaderRloc");
        if !state.role.is_attached() {
            return Err(stack_error(OtError::Detached));
        }
        let prefix = state.active_dataset.as_ref().and_then(|d| d.mesh_local_prefix()).unwrap_or_default();
        let mut octets = [0u8; 16];
        octets[..8].copy_from_slice(&prefix);
        octets[11] = 0xff;
        octets[12] = 0xfe;
        octets[14] = state.leader_router_id << 2;
        Ok(Ipv6Addr::from(octets))
    }

    fn leader_weight(&self, _inst: Instance) -> Result<u8> {
        Ok(self.record("otThreadGetLeaderWeight").leader_weight)
    }

    fn local_leader_weight(&self, _inst: Instance) -> Result<u8> {
        Ok(self.ftd_only("otThreadGetLocalLeaderWeight")?.local_leader_weight)
    }

    fn child_info_by_id(&self, _inst: Instance, child_id: u16) -> Result<ChildInfo> {
        let state = self.ftd_only("otThreadGetChildInfoById")?;
        state
            .children
            .iter()
            .find(|c| c.child_id == child_id)
            .cloned()
            .ok_or(stack_error(OtError::NotFound))
    }

    fn max_router_id(&self, _inst: Instance) -> Result<u8> {
        Ok(self.ftd_only("otThreadGetMaxRouterId")?.max_router_id)
    }

    fn router_info(&self, _inst: Instance, router_id: u16) -> Result<RouterInfo> {
        let state = self.ftd_only("otThreadGetRouterInfo")?;
        state
            .routers
            .iter()
            .find(|r| u16::from(r.router_id) == router_id)
            .cloned()
            .ok_or(stack_error(OtError::NotFound))
    }

    fn parent_info(&self, _inst: Instance) -> Result<RouterInfo> {
        let state = self.record("otThreadGetParentInfo");
        state.parent.clone().ok_or(stack_error(OtError::InvalidState))
    }

    fn network_data(&self, _inst: Instance, _stable: bool) -> Result<Vec<u8>> {
        Ok(self.record("otNetDataGet").network_data.clone())
    }

    fn network_data_version(&self, _inst: Instance) -> Result<u8> {
        Ok(self.record("otNetDataGetVersion").network_data_version)
    }

    fn stable_network_data_version(&self, _inst: Instance) -> Result<u8> {
        Ok(self.record("otNetDataGetStableVersion").stable_network_data_version)
    }

    fn external_routes(&self, _inst: Instance) -> Result<Vec<ExternalRoute>> {
        Ok(self.record("otNetDataGetNextRoute").routes.clone())
    }

    fn mac_counters(&self, _inst: Instance) -> Result<MacCounters> {
        Ok(self.record("otLinkGetCounters").mac_counters)
    }

    fn extended_address(&self, _inst: Instance) -> Result<[u8; 8]> {
        Ok(self.record("otLinkGetExtendedAddress").ext_address)
    }

    fn channel(&self, _inst: Instance) -> Result<u8> {
        let state = self.record("otLinkGetChannel");
        Ok(state.active_dataset.as_ref().and_then(|d| d.channel()).unwrap_or(11) as u8)
    }

    fn pan_id(&self, _inst: Instance) -> Result<u16> {
        let state = self.record("otLinkGetPanId");
        Ok(state.active_dataset.as_ref().and_then(|d| d.pan_id()).unwrap_or(0xffff))
    }

    fn poll_period(&self, _inst: Instance) -> Result<u32> {
        Ok(self.record("otLinkGetPollPeriod").poll_period)
    }

    fn set_poll_period(&self, _inst: Instance, period_ms: u32) -> Result<()> {
        self.record("otLinkSetPollPeriod").poll_period = period_ms;
        Ok(())
    }

    fn csl_period(&self, _inst: Instance) -> Result<u16> {
        let state = self.record("otLinkCslGetPeriod");
        if !state.csl_capable {
            return Err(Error::Unsupported("otLinkCslGetPeriod"));
        }
        Ok(state.csl_period)
    }

    fn set_csl_period(&self, _inst: Instance, period: u16) -> Result<()> {
        let mut state = self.record("otLinkCslSetPeriod");
        if !state.csl_capable {
            return Err(Error::Unsupported("otLinkCslSetPeriod"));
        }
        state.csl_period = period;
        Ok(())
    }

    fn eui64(&self, _inst: Instance) -> Result<[u8; 8]> {
        Ok(self.record("otPlatRadioGetIeeeEui64").eui64)
    }

    fn instant_rssi(&self, _inst: Instance) -> Result<i8> {
        Ok(self.record("otPlatRadioGetRssi").instant_rssi)
    }

    fn joiner_state(&self, _inst: Instance) -> Result<JoinerState> {
        Ok(self.ftd_only("otJoinerGetState")?.joiner_state)
    }

    fn set_joiner_discerner(&self, _inst: Instance, discerner: JoinerDiscerner) -> Result<()> {
        self.ftd_only("otJoinerSetDiscerner")?.joiner_discerner = Some(discerner);
        Ok(())
    }

    fn joiner_start(&self, _inst: Instance, pskd: &str, handler: JoinerHandler) -> Result<()> {
        let mut state = self.ftd_only("otJoinerStart")?;
        if state.joiner_state != JoinerState::Idle {
            return Err(stack_error(OtError::Busy));
        }
        state.joiner_state = JoinerState::Discover;
        state.joiner_pskd = Some(pskd.to_string());
        drop(state);
        self.handlers().joiner = Some(handler);
        Ok(())
    }

    fn srp_set_callback(&self, _inst: Instance, handler: crate::stack::SrpHandler) -> Result<()> {
        drop(self.record("otSrpClientSetCallback"));
        self.handlers().srp = Some(Arc::from(handler));
        Ok(())
    }

    fn srp_enable_auto_start(&self, _inst: Instance, handler: crate::stack::SrpAutoStartHandler) -> Result<()> {
        drop(self.record("otSrpClientEnableAutoStartMode"));
        self.handlers().srp_auto_start = Some(Arc::from(handler));
        Ok(())
    }

    fn srp_host_info(&self, _inst: Instance) -> Result<SrpHostInfo> {
        Ok(self.record("otSrpClientGetHostInfo").srp_host.clone())
    }

    fn srp_clear_service(&self, _inst: Instance, slot: usize) -> Result<()> {
        let mut state = self.record("otSrpClientClearService");
        state
            .srp_services
            .remove(&slot)
            .map(|_| ())
            .ok_or(stack_error(OtError::NotFound))
    }

    fn srp_set_lease_interval(&self, _inst: Instance, interval: u32) -> Result<()> {
        self.record("otSrpClientSetLeaseInterval").srp_lease_interval = interval;
        Ok(())
    }

    fn srp_set_key_lease_interval(&self, _inst: Instance, interval: u32) -> Result<()> {
        self.record("otSrpClientSetKeyLeaseInterval").srp_key_lease_interval = interval;
        Ok(())
    }

    fn srp_add_service(&self, _inst: Instance, slot: usize, service: &SrpServiceDescription<'_>) -> Result<()> {
        let mut state = self.record("otSrpClientAddService");
        if state.srp_services.contains_key(&slot) {
            return Err(stack_error(OtError::Already));
        }
        state.srp_services.insert(
            slot,
            SimulatedSrpService {
                instance_name: service.instance_name.to_string(),
                name: service.name.to_string(),
                port: service.port,
                subtypes: service.subtypes.iter().map(|s| s.to_string()).collect(),
                txt: service.txt.iter().map(|(k, v)| TxtEntry::new(*k, *v)).collect(),
                state: SrpItemState::ToAdd,
            },
        );
        Ok(())
    }

    fn srp_remove_service(&self, _inst: Instance, slot: usize) -> Result<()> {
        let mut state = self.record("otSrpClientRemoveService");
        let service = state.srp_services.get_mut(&slot).ok_or(stack_error(OtError::NotFound))?;
        if service.state == SrpItemState::ToRemove {
            return Err(stack_error(OtError::Already));
        }
        service.state = SrpItemState::ToRemove;
        Ok(())
    }

    fn srp_set_host_name(&self, _inst: Instance, name: &str) -> Result<()> {
        let mut state = self.record("otSrpClientSetHostName");
        state.srp_host.name = Some(name.to_string());
        state.srp_host.state = SrpItemState::ToAdd;
        Ok(())
    }

    fn srp_enable_auto_host_address(&self, _inst: Instance) -> Result<()> {
        self.record("otSrpClientEnableAutoHostAddress").srp_host.auto_address = true;
        Ok(())
    }

    fn srp_set_host_addresses(&self, _inst: Instance, addresses: &[Ipv6Addr]) -> Result<()> {
        let mut state = self.record("otSrpClientSetHostAddresses");
        state.srp_host.auto_address = false;
        state.srp_host_addresses = addresses.to_vec();
        Ok(())
    }

    fn srp_remove_host_and_services(&self, _inst: Instance, _remove_key_lease: bool, _send_unreg: bool) -> Result<()> {
        let mut state = self.record("otSrpClientRemoveHostAndServices");
        state.srp_host.state = SrpItemState::ToRemove;
        for service in state.srp_services.values_mut() {
            service.state = SrpItemState::ToRemove;
        }
        Ok(())
    }

    fn dns_default_config(&self, _inst: Instance) -> Result<DnsQueryConfig> {
        Ok(self.record("otDnsClientGetDefaultConfig").dns_config)
    }

    fn set_dns_default_config(&self, _inst: Instance, config: &DnsQueryConfig) -> Result<()> {
        self.record("otDnsClientSetDefaultConfig").dns_config = *config;
        Ok(())
    }

    fn txt_entries(&self, txt_data: &[u8]) -> Result<Vec<TxtEntry>> {
        drop(self.record("otDnsGetNextTxtEntry"));
        Ok(parse_txt(txt_data))
    }

    fn dns_browse(&self, _inst: Instance, service_name: &str, handler: BrowseHandler) -> Result<()> {
        drop(self.record("otDnsClientBrowse"));
        self.handlers().browse.push_back((service_name.to_string(), handler));
        Ok(())
    }

    fn dns_resolve_service(
        &self,
        _inst: Instance,
        instance_label: &str,
        service_name: &str,
        handler: ResolveHandler,
    ) -> Result<()> {
        drop(self.record("otDnsClientResolveService"));
        self.handlers()
            .resolve
            .push_back((instance_label.to_string(), service_name.to_string(), handler));
        Ok(())
    }

    fn dns_resolve_address(&self, _inst: Instance, host_name: &str, handler: AddressHandler) -> Result<()> {
        drop(self.record("otDnsClientResolveAddress"));
        self.handlers().address.push_back((host_name.to_string(), handler));
        Ok(())
    }
}

/// Browse response handed to handlers by [`SimulatedStack::complete_browse`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedBrowseResponse {
    pub service_name: String,
    pub instances: Vec<(String, DnsServiceInfo)>,
}

impl DnsBrowseResponse for SimulatedBrowseResponse {
    fn service_name(&self) -> Result<String> {
        Ok(self.service_name.clone())
    }

    fn service_instance(&self, index: u16) -> Result<Option<String>> {
        Ok(self.instances.get(index as usize).map(|(label, _)| label.clone()))
    }

    fn service_info(&self, instance_label: &str) -> Result<DnsServiceInfo> {
        self.instances
            .iter()
            .find(|(label, _)| label == instance_label)
            .map(|(_, info)| info.clone())
            .ok_or(stack_error(OtError::NotFound))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedServiceResponse {
    pub instance_label: String,
    pub service_name: String,
    pub info: DnsServiceInfo,
}

impl DnsServiceResponse for SimulatedServiceResponse {
    fn service_name(&self) -> Result<(String, String)> {
        Ok((self.instance_label.clone(), self.service_name.clone()))
    }

    fn service_info(&self) -> Result<DnsServiceInfo> {
        Ok(self.info.clone())
    }
}

struct SimulatedAddressResponse {
    addresses: Vec<(Ipv6Addr, u32)>,
}

impl DnsAddressResponse for SimulatedAddressResponse {
    fn address(&self, index: u16) -> Result<Option<(Ipv6Addr, u32)>> {
        Ok(self.addresses.get(index as usize).copied())
    }
}

/// Longest TXT key the stack's iterator accepts.
const TXT_KEY_MAX_LENGTH: usize = 64;

/// Splits length-prefixed `key=value` strings. Boolean attributes (no `=`)
/// and oversized keys are skipped, as the native iterator reports them
/// without a value.
pub fn parse_txt(data: &[u8]) -> Vec<TxtEntry> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let entry_len = data[i] as usize;
        i += 1;
        if i + entry_len > data.len() {
            break;
        }
        let entry = &data[i..i + entry_len];
        i += entry_len;

        if let Some(eq_pos) = entry.iter().position(|&b| b == b'=') {
            if eq_pos == 0 || eq_pos > TXT_KEY_MAX_LENGTH {
                continue;
            }
            let key = String::from_utf8_lossy(&entry[..eq_pos]).into_owned();
            entries.push(TxtEntry::new(key, &entry[eq_pos + 1..]));
        }
    }
    entries
}

/// Encodes entries the way DNS TXT records carry them.
pub fn encode_txt(entries: &[TxtEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        let len = (entry.key.len() + 1 + entry.value.len()).min(u8::MAX as usize);
        out.push(len as u8);
        let mut raw = Vec::with_capacity(len);
        raw.extend_from_slice(entry.key.as_bytes());
        raw.push(b'=');
        raw.extend_from_slice(&entry.value);
        out.extend_from_slice(&raw[..len]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_parsing_skips_boolean_attributes() {
        let mut data = encode_txt(&[TxtEntry::new("SII", "5000"), TxtEntry::new("E", "")]);
        data.extend_from_slice(&[4, b'f', b'l', b'a', b'g']);
        data.extend_from_slice(&[9, b'=', b'v']);
        let entries = parse_txt(&data);
        assert_eq!(entries, vec![TxtEntry::new("SII", "5000"), TxtEntry::new("E", "")]);
    }

    #[test]
    fn thread_needs_ipv6_and_dataset() {
        let stack = SimulatedStack::new();
        let inst = stack.init_single().unwrap();
        assert!(stack.thread_set_enabled(inst, true).is_err());

        stack.ip6_set_enabled(inst, true).unwrap();
        stack
            .dataset_set_active_tlvs(inst, crate::dataset::sample_dataset().as_bytes())
            .unwrap();
        stack.thread_set_enabled(inst, true).unwrap();
        assert_eq!(stack.role(), DeviceRole::Detached);
        assert_eq!(stack.network_name(inst).unwrap(), "OpenThread-1234");
        assert_eq!(stack.pan_id(inst).unwrap(), 0x1234);
    }

    #[test]
    fn minimal_build_lacks_ftd_entries() {
        let stack = SimulatedStack::minimal();
        let inst = stack.init_single().unwrap();
        assert!(matches!(
            stack.is_router_eligible(inst),
            Err(Error::Unsupported("otThreadIsRouterEligible"))
        ));
        assert!(stack.csl_period(inst).is_err());
    }

    #[test]
    fn lock_is_exclusive_across_threads() {
        let stack = Arc::new(SimulatedStack::new());
        stack.lock();
        let other = stack.clone();
        let handle = thread::spawn(move || {
            other.lock();
            other.unlock();
        });
        assert!(stack.is_locked());
        stack.unlock();
        handle.join().unwrap();
        assert!(!stack.is_locked());
    }

    #[test]
    #[should_panic(expected = "not re-entrant")]
    fn relocking_on_same_thread_panics() {
        let stack = SimulatedStack::new();
        stack.lock();
        stack.lock();
    }

    #[test]
    fn scan_handler_sees_results_then_end() {
        let stack = SimulatedStack::new();
        let inst = stack.init_single().unwrap();
        stack.ip6_set_enabled(inst, true).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        stack
            .discover(inst, 0, 0xffff, false, false, Box::new(move |r: Option<ActiveScanResult>| sink.lock().unwrap().push(r.is_some())))
            .unwrap();
        assert!(stack.discover(inst, 0, 0xffff, false, false, Box::new(|_| {})).is_err());
        assert!(stack.report_scan_result(ActiveScanResult::default()));
        assert!(stack.finish_scan());
        assert!(!stack.is_scanning());
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
