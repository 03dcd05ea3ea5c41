//! The operations the adapter needs from an OpenThread stack.
//!
//! [`ThreadStack`] is implemented by the dynamically loaded library
//! ([`crate::native::NativeThreadStack`]) and by the in-memory
//! [`crate::fallback::SimulatedStack`]. Every method defaults to
//! [`Error::Unsupported`], so an implementation only overrides what it can
//! actually provide and a missing native symbol degrades into an error
//! instead of a crash.
//!
//! # Callback contract
//!
//! Handlers registered through this trait run on the stack's own context,
//! possibly a foreign thread, and possibly while the stack holds its lock.
//! A handler must not call back into the stack or the adapter. It captures
//! what it needs, hands the continuation to the platform event loop and
//! returns.

use std::net::{Ipv6Addr, SocketAddrV6};

use crate::error::{Error, OtError, Result};

/// Opaque handle to a native `otInstance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instance(usize);

impl Instance {
    /// Wraps a raw instance address obtained outside this crate.
    pub fn from_raw(raw: usize) -> Self {
        Instance(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }

    pub(crate) fn as_ptr(self) -> *mut libc::c_void {
        self.0 as *mut libc::c_void
    }
}

/// Thread device role (`otDeviceRole`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

impl DeviceRole {
    pub fn from_raw(raw: i32) -> DeviceRole {
        match raw {
            1 => DeviceRole::Detached,
            2 => DeviceRole::Child,
            3 => DeviceRole::Router,
            4 => DeviceRole::Leader,
            _ => DeviceRole::Disabled,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Disabled and detached devices are not part of a partition.
    pub fn is_attached(self) -> bool {
        !matches!(self, DeviceRole::Disabled | DeviceRole::Detached)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceRole::Disabled => "disabled",
            DeviceRole::Detached => "detached",
            DeviceRole::Child => "child",
            DeviceRole::Router => "router",
            DeviceRole::Leader => "leader",
        }
    }
}

/// `otChangedFlags` bitmap delivered with state change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags(pub u32);

impl StateFlags {
    pub const IP6_ADDRESS_ADDED: StateFlags = StateFlags(1 << 0);
    pub const IP6_ADDRESS_REMOVED: StateFlags = StateFlags(1 << 1);
    pub const THREAD_ROLE: StateFlags = StateFlags(1 << 2);
    pub const THREAD_NETDATA: StateFlags = StateFlags(1 << 9);
    pub const THREAD_CHILD_ADDED: StateFlags = StateFlags(1 << 10);
    pub const THREAD_CHILD_REMOVED: StateFlags = StateFlags(1 << 11);

    pub fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: StateFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: StateFlags) -> StateFlags {
        StateFlags(self.0 | other.0)
    }
}

/// MLE link mode (`otLinkModeConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkMode {
    pub rx_on_when_idle: bool,
    /// Full Thread Device.
    pub device_type: bool,
    /// Full network data.
    pub network_data: bool,
}

impl LinkMode {
    pub(crate) fn from_bits(bits: u8) -> Self {
        LinkMode {
            rx_on_when_idle: bits & crate::ffi::LINK_MODE_RX_ON_WHEN_IDLE != 0,
            device_type: bits & crate::ffi::LINK_MODE_DEVICE_TYPE != 0,
            network_data: bits & crate::ffi::LINK_MODE_NETWORK_DATA != 0,
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.rx_on_when_idle {
            bits |= crate::ffi::LINK_MODE_RX_ON_WHEN_IDLE;
        }
        if self.device_type {
            bits |= crate::ffi::LINK_MODE_DEVICE_TYPE;
        }
        if self.network_data {
            bits |= crate::ffi::LINK_MODE_NETWORK_DATA;
        }
        bits
    }
}

/// One beacon collected during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveScanResult {
    pub ext_address: [u8; 8],
    pub network_name: String,
    pub extended_pan_id: [u8; 8],
    pub steering_data: Vec<u8>,
    pub pan_id: u16,
    pub joiner_udp_port: u16,
    pub channel: u8,
    pub rssi: i8,
    pub lqi: u8,
    pub version: u8,
    pub is_native: bool,
    pub is_joinable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressOrigin {
    Thread,
    Slaac,
    Dhcpv6,
    Manual,
}

impl AddressOrigin {
    pub fn from_raw(raw: u8) -> AddressOrigin {
        match raw {
            1 => AddressOrigin::Slaac,
            2 => AddressOrigin::Dhcpv6,
            3 => AddressOrigin::Manual,
            _ => AddressOrigin::Thread,
        }
    }
}

/// Unicast address assigned to the Thread interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetifAddress {
    pub address: Ipv6Addr,
    pub prefix_length: u8,
    pub origin: AddressOrigin,
    pub preferred: bool,
    pub valid: bool,
}

/// External route entry from the leader's network data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRoute {
    pub prefix: Ipv6Addr,
    pub prefix_length: u8,
    pub rloc16: u16,
    pub next_hop_is_this_device: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NeighborInfo {
    pub ext_address: [u8; 8],
    pub age: u32,
    pub connection_time: u32,
    pub rloc16: u16,
    pub link_frame_counter: u32,
    pub mle_frame_counter: u32,
    pub link_quality_in: u8,
    pub average_rssi: i8,
    pub last_rssi: i8,
    pub frame_error_rate: u16,
    pub message_error_rate: u16,
    pub rx_on_when_idle: bool,
    pub full_thread_device: bool,
    pub full_network_data: bool,
    pub is_child: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterInfo {
    pub ext_address: [u8; 8],
    pub rloc16: u16,
    pub router_id: u8,
    pub next_hop: u8,
    pub path_cost: u8,
    pub link_quality_in: u8,
    pub link_quality_out: u8,
    pub age: u8,
    pub allocated: bool,
    pub link_established: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChildInfo {
    pub ext_address: [u8; 8],
    pub timeout: u32,
    pub age: u32,
    pub rloc16: u16,
    pub child_id: u16,
    pub network_data_version: u8,
    pub link_quality_in: u8,
    pub average_rssi: i8,
    pub last_rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpCounters {
    pub tx_success: u32,
    pub rx_success: u32,
    pub tx_failure: u32,
    pub rx_failure: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MleCounters {
    pub disabled_role: u16,
    pub detached_role: u16,
    pub child_role: u16,
    pub router_role: u16,
    pub leader_role: u16,
    pub attach_attempts: u16,
    pub partition_id_changes: u16,
    pub better_partition_attach_attempts: u16,
    pub parent_changes: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacCounters {
    pub tx_total: u32,
    pub tx_unicast: u32,
    pub tx_broadcast: u32,
    pub tx_ack_requested: u32,
    pub tx_acked: u32,
    pub tx_no_ack_requested: u32,
    pub tx_data: u32,
    pub tx_data_poll: u32,
    pub tx_beacon: u32,
    pub tx_beacon_request: u32,
    pub tx_other: u32,
    pub tx_retry: u32,
    pub tx_direct_max_retry_expiry: u32,
    pub tx_indirect_max_retry_expiry: u32,
    pub tx_err_cca: u32,
    pub tx_err_abort: u32,
    pub tx_err_busy_channel: u32,
    pub rx_total: u32,
    pub rx_unicast: u32,
    pub rx_broadcast: u32,
    pub rx_data: u32,
    pub rx_data_poll: u32,
    pub rx_beacon: u32,
    pub rx_beacon_request: u32,
    pub rx_other: u32,
    pub rx_address_filtered: u32,
    pub rx_dest_addr_filtered: u32,
    pub rx_duplicated: u32,
    pub rx_err_no_frame: u32,
    pub rx_err_unknown_neighbor: u32,
    pub rx_err_invalid_src_addr: u32,
    pub rx_err_sec: u32,
    pub rx_err_fcs: u32,
    pub rx_err_other: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinerState {
    Idle,
    Discover,
    Connect,
    Connected,
    Entrust,
    Joined,
}

impl JoinerState {
    pub fn from_raw(raw: i32) -> JoinerState {
        match raw {
            1 => JoinerState::Discover,
            2 => JoinerState::Connect,
            3 => JoinerState::Connected,
            4 => JoinerState::Entrust,
            5 => JoinerState::Joined,
            _ => JoinerState::Idle,
        }
    }
}

/// Joiner discerner (`otJoinerDiscerner`), `length` is in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinerDiscerner {
    pub value: u64,
    pub length: u8,
}

/// A DNS TXT key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl TxtEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        TxtEntry {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// SRP client item state (`otSrpClientItemState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrpItemState {
    ToAdd,
    Adding,
    ToRefresh,
    Refreshing,
    ToRemove,
    Removing,
    Removed,
    Registered,
}

impl SrpItemState {
    pub fn from_raw(raw: i32) -> SrpItemState {
        match raw {
            1 => SrpItemState::Adding,
            2 => SrpItemState::ToRefresh,
            3 => SrpItemState::Refreshing,
            4 => SrpItemState::ToRemove,
            5 => SrpItemState::Removing,
            6 => SrpItemState::Removed,
            7 => SrpItemState::Registered,
            _ => SrpItemState::ToAdd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpHostInfo {
    pub name: Option<String>,
    pub auto_address: bool,
    pub state: SrpItemState,
}

/// Borrowed view of a service registration handed to the SRP client.
///
/// `slot` identifies the adapter's service slot so that removal
/// notifications can be mapped back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpServiceDescription<'a> {
    pub instance_name: &'a str,
    pub name: &'a str,
    pub subtypes: Vec<&'a str>,
    pub txt: Vec<(&'a str, &'a [u8])>,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// What the SRP client reported after an update round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpNotification {
    pub error: Option<OtError>,
    pub host: Option<SrpHostInfo>,
    /// Adapter slots whose services the server confirmed as removed.
    pub removed_slots: Vec<usize>,
}

/// DNS client query configuration (`otDnsQueryConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsQueryConfig {
    pub server: SocketAddrV6,
    pub response_timeout_ms: u32,
    pub max_tx_attempts: u8,
    pub recursion_flag: i32,
    pub nat64_mode: i32,
    pub service_mode: i32,
    pub transport_proto: i32,
}

/// Service information extracted from a browse or resolve response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DnsServiceInfo {
    pub ttl: u32,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
    pub host_name: String,
    pub host_address: Option<Ipv6Addr>,
    pub host_address_ttl: u32,
    pub txt_data: Vec<u8>,
    pub txt_data_truncated: bool,
    pub txt_data_ttl: u32,
}

/// A browse response, valid only for the duration of the handler call.
pub trait DnsBrowseResponse {
    /// Full service name the query was issued for, e.g. `_matter._tcp.default.service.arpa.`.
    fn service_name(&self) -> Result<String>;

    /// Instance label at `index`; `Ok(None)` once the list is exhausted.
    fn service_instance(&self, index: u16) -> Result<Option<String>>;

    fn service_info(&self, instance_label: &str) -> Result<DnsServiceInfo>;
}

/// A resolve response, valid only for the duration of the handler call.
pub trait DnsServiceResponse {
    /// Returns `(instance_label, service_name)`.
    fn service_name(&self) -> Result<(String, String)>;

    fn service_info(&self) -> Result<DnsServiceInfo>;
}

/// An address resolution response, valid only for the duration of the handler call.
pub trait DnsAddressResponse {
    /// Address at `index` with its TTL; `Ok(None)` once the list is exhausted.
    fn address(&self, index: u16) -> Result<Option<(Ipv6Addr, u32)>>;
}

pub type StateChangedHandler = Box<dyn Fn(StateFlags) + Send + Sync>;
/// Called once per discovered network, then once with `None` when the scan completes.
pub type ScanHandler = Box<dyn FnMut(Option<ActiveScanResult>) + Send>;
pub type JoinerHandler = Box<dyn FnOnce(std::result::Result<(), OtError>) + Send>;
pub type SrpHandler = Box<dyn Fn(SrpNotification) + Send + Sync>;
pub type SrpAutoStartHandler = Box<dyn Fn(Option<SocketAddrV6>) + Send + Sync>;
pub type BrowseHandler = Box<dyn FnOnce(std::result::Result<&dyn DnsBrowseResponse, OtError>) + Send>;
pub type ResolveHandler = Box<dyn FnOnce(std::result::Result<&dyn DnsServiceResponse, OtError>) + Send>;
pub type AddressHandler = Box<dyn FnOnce(std::result::Result<&dyn DnsAddressResponse, OtError>) + Send>;

macro_rules! unsupported {
    ($name:literal) => {
        Err(Error::Unsupported($name))
    };
}

/// Operations of an OpenThread stack, grouped the way the C API groups them.
///
/// Apart from [`ThreadStack::lock`] and [`ThreadStack::unlock`], callers are
/// expected to hold the stack lock around every call.
#[allow(unused_variables)]
pub trait ThreadStack: Send + Sync {
    // Instance

    /// Creates the instance together with the stack's worker thread.
    fn acquire_instance(&self, com_port: &str, debug: u16) -> Result<Instance> {
        unsupported!("otGetInstance")
    }

    fn init_single(&self) -> Result<Instance> {
        unsupported!("otInstanceInitSingle")
    }

    fn destroy_instance(&self) -> Result<()> {
        unsupported!("otDestroyInstance")
    }

    /// Takes the stack lock. Never fails; a stack without a lock primitive
    /// turns this into a no-op.
    fn lock(&self);

    fn unlock(&self);

    fn set_state_changed_callback(&self, inst: Instance, handler: StateChangedHandler) -> Result<()> {
        unsupported!("otSetStateChangedCallback")
    }

    fn erase_persistent_info(&self, inst: Instance) -> Result<()> {
        unsupported!("otInstanceErasePersistentInfo")
    }

    /// Human readable text for a native error code.
    fn error_to_string(&self, error: OtError) -> String {
        error.description().to_string()
    }

    // IPv6

    fn ip6_set_slaac_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        unsupported!("otIp6SetSlaacEnabled")
    }

    fn ip6_set_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        unsupported!("otIp6SetEnabled")
    }

    fn ip6_is_enabled(&self, inst: Instance) -> Result<bool> {
        unsupported!("otIp6IsEnabled")
    }

    fn ip6_unicast_addresses(&self, inst: Instance) -> Result<Vec<NetifAddress>> {
        unsupported!("otIp6GetUnicastAddresses")
    }

    // Dataset

    fn dataset_is_commissioned(&self, inst: Instance) -> Result<bool> {
        unsupported!("otDatasetIsCommissioned")
    }

    fn dataset_set_active_tlvs(&self, inst: Instance, tlvs: &[u8]) -> Result<()> {
        unsupported!("otDatasetSetActiveTlvs")
    }

    fn dataset_get_active_tlvs(&self, inst: Instance) -> Result<Vec<u8>> {
        unsupported!("otDatasetGetActiveTlvs")
    }

    // Thread

    fn device_role(&self, inst: Instance) -> Result<DeviceRole> {
        unsupported!("otThreadGetDeviceRole")
    }

    fn thread_set_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        unsupported!("otThreadSetEnabled")
    }

    fn become_child(&self, inst: Instance) -> Result<()> {
        unsupported!("otThreadBecomeChild")
    }

    fn discover(
        &self,
        inst: Instance,
        scan_channels: u32,
        pan_id: u16,
        joiner: bool,
        enable_eui64_filtering: bool,
        handler: ScanHandler,
    ) -> Result<()> {
        unsupported!("otThreadDiscover")
    }

    fn link_mode(&self, inst: Instance) -> Result<LinkMode> {
        unsupported!("otThreadGetLinkMode")
    }

    fn set_link_mode(&self, inst: Instance, mode: LinkMode) -> Result<()> {
        unsupported!("otThreadSetLinkMode")
    }

    fn is_router_eligible(&self, inst: Instance) -> Result<bool> {
        unsupported!("otThreadIsRouterEligible")
    }

    fn set_router_eligible(&self, inst: Instance, eligible: bool) -> Result<()> {
        unsupported!("otThreadSetRouterEligible")
    }

    fn network_key(&self, inst: Instance) -> Result<[u8; 16]> {
        unsupported!("otThreadGetNetworkKey")
    }

    fn network_name(&self, inst: Instance) -> Result<String> {
        unsupported!("otThreadGetNetworkName")
    }

    fn extended_pan_id(&self, inst: Instance) -> Result<[u8; 8]> {
        unsupported!("otThreadGetExtendedPanId")
    }

    fn mesh_local_prefix(&self, inst: Instance) -> Result<[u8; 8]> {
        unsupported!("otThreadGetMeshLocalPrefix")
    }

    fn neighbors(&self, inst: Instance) -> Result<Vec<NeighborInfo>> {
        unsupported!("otThreadGetNextNeighborInfo")
    }

    fn ip6_counters(&self, inst: Instance) -> Result<IpCounters> {
        unsupported!("otThreadGetIp6Counters")
    }

    fn mle_counters(&self, inst: Instance) -> Result<MleCounters> {
        unsupported!("otThreadGetMleCounters")
    }

    fn rloc16(&self, inst: Instance) -> Result<u16> {
        unsupported!("otThreadGetRloc16")
    }

    fn leader_router_id(&self, inst: Instance) -> Result<u8> {
        unsupported!("otThreadGetLeaderRouterId")
    }

    fn parent_average_rssi(&self, inst: Instance) -> Result<i8> {
        unsupported!("otThreadGetParentAverageRssi")
    }

    fn parent_last_rssi(&self, inst: Instance) -> Result<i8> {
        unsupported!("otThreadGetParentLastRssi")
    }

    fn partition_id(&self, inst: Instance) -> Result<u32> {
        unsupported!("otThreadGetPartitionId")
    }

    fn leader_rloc(&self, inst: Instance) -> Result<Ipv6Addr> {
        unsupported!("otThreadGetLeaderRloc")
    }

    fn leader_weight(&self, inst: Instance) -> Result<u8> {
        unsupported!("otThreadGetLeaderWeight")
    }

    fn local_leader_weight(&self, inst: Instance) -> Result<u8> {
        unsupported!("otThreadGetLocalLeaderWeight")
    }

    fn child_info_by_id(&self, inst: Instance, child_id: u16) -> Result<ChildInfo> {
        unsupported!("otThreadGetChildInfoById")
    }

    fn max_router_id(&self, inst: Instance) -> Result<u8> {
        unsupported!("otThreadGetMaxRouterId")
    }

    fn router_info(&self, inst: Instance, router_id: u16) -> Result<RouterInfo> {
        unsupported!("otThreadGetRouterInfo")
    }

    fn parent_info(&self, inst: Instance) -> Result<RouterInfo> {
        unsupported!("otThreadGetParentInfo")
    }

    // Network data

    fn network_data(&self, inst: Instance, stable: bool) -> Result<Vec<u8>> {
        unsupported!("otNetDataGet")
    }

    fn network_data_version(&self, inst: Instance) -> Result<u8> {
        unsupported!("otNetDataGetVersion")
    }

    fn stable_network_data_version(&self, inst: Instance) -> Result<u8> {
        unsupported!("otNetDataGetStableVersion")
    }

    fn external_routes(&self, inst: Instance) -> Result<Vec<ExternalRoute>> {
        unsupported!("otNetDataGetNextRoute")
    }

    // Link and radio

    fn mac_counters(&self, inst: Instance) -> Result<MacCounters> {
        unsupported!("otLinkGetCounters")
    }

    fn extended_address(&self, inst: Instance) -> Result<[u8; 8]> {
        unsupported!("otLinkGetExtendedAddress")
    }

    fn channel(&self, inst: Instance) -> Result<u8> {
        unsupported!("otLinkGetChannel")
    }

    fn pan_id(&self, inst: Instance) -> Result<u16> {
        unsupported!("otLinkGetPanId")
    }

    fn poll_period(&self, inst: Instance) -> Result<u32> {
        unsupported!("otLinkGetPollPeriod")
    }

    fn set_poll_period(&self, inst: Instance, period_ms: u32) -> Result<()> {
        unsupported!("otLinkSetPollPeriod")
    }

    /// CSL period in units of ten symbols.
    fn csl_period(&self, inst: Instance) -> Result<u16> {
        unsupported!("otLinkCslGetPeriod")
    }

    fn set_csl_period(&self, inst: Instance, period: u16) -> Result<()> {
        unsupported!("otLinkCslSetPeriod")
    }

    fn eui64(&self, inst: Instance) -> Result<[u8; 8]> {
        unsupported!("otPlatRadioGetIeeeEui64")
    }

    fn instant_rssi(&self, inst: Instance) -> Result<i8> {
        unsupported!("otPlatRadioGetRssi")
    }

    // Joiner

    fn joiner_state(&self, inst: Instance) -> Result<JoinerState> {
        unsupported!("otJoinerGetState")
    }

    fn set_joiner_discerner(&self, inst: Instance, discerner: JoinerDiscerner) -> Result<()> {
        unsupported!("otJoinerSetDiscerner")
    }

    fn joiner_start(&self, inst: Instance, pskd: &str, handler: JoinerHandler) -> Result<()> {
        unsupported!("otJoinerStart")
    }

    // SRP client

    fn srp_set_callback(&self, inst: Instance, handler: SrpHandler) -> Result<()> {
        unsupported!("otSrpClientSetCallback")
    }

    fn srp_enable_auto_start(&self, inst: Instance, handler: SrpAutoStartHandler) -> Result<()> {
        unsupported!("otSrpClientEnableAutoStartMode")
    }

    fn srp_host_info(&self, inst: Instance) -> Result<SrpHostInfo> {
        unsupported!("otSrpClientGetHostInfo")
    }

    /// Drops the service in `slot` without notifying the server.
    fn srp_clear_service(&self, inst: Instance, slot: usize) -> Result<()> {
        unsupported!("otSrpClientClearService")
    }

    fn srp_set_lease_interval(&self, inst: Instance, interval: u32) -> Result<()> {
        unsupported!("otSrpClientSetLeaseInterval")
    }

    fn srp_set_key_lease_interval(&self, inst: Instance, interval: u32) -> Result<()> {
        unsupported!("otSrpClientSetKeyLeaseInterval")
    }

    fn srp_add_service(&self, inst: Instance, slot: usize, service: &SrpServiceDescription<'_>) -> Result<()> {
        unsupported!("otSrpClientAddService")
    }

    fn srp_remove_service(&self, inst: Instance, slot: usize) -> Result<()> {
        unsupported!("otSrpClientRemoveService")
    }

    fn srp_set_host_name(&self, inst: Instance, name: &str) -> Result<()> {
        unsupported!("otSrpClientSetHostName")
    }

    fn srp_enable_auto_host_address(&self, inst: Instance) -> Result<()> {
        unsupported!("otSrpClientEnableAutoHostAddress")
    }

    fn srp_set_host_addresses(&self, inst: Instance, addresses: &[Ipv6Addr]) -> Result<()> {
        unsupported!("otSrpClientSetHostAddresses")
    }

    fn srp_remove_host_and_services(&self, inst: Instance, remove_key_lease: bool, send_unreg: bool) -> Result<()> {
        unsupported!("otSrpClientRemoveHostAndServices")
    }

    // DNS client

    fn dns_default_config(&self, inst: Instance) -> Result<DnsQueryConfig> {
        unsupported!("otDnsClientGetDefaultConfig")
    }

    fn set_dns_default_config(&self, inst: Instance, config: &DnsQueryConfig) -> Result<()> {
        unsupported!("otDnsClientSetDefaultConfig")
    }

    /// Splits encoded TXT data into entries, skipping malformed ones.
    fn txt_entries(&self, txt_data: &[u8]) -> Result<Vec<TxtEntry>> {
        unsupported!("otDnsGetNextTxtEntry")
    }

    fn dns_browse(&self, inst: Instance, service_name: &str, handler: BrowseHandler) -> Result<()> {
        unsupported!("otDnsClientBrowse")
    }

    fn dns_resolve_service(
        &self,
        inst: Instance,
        instance_label: &str,
        service_name: &str,
        handler: ResolveHandler,
    ) -> Result<()> {
        unsupported!("otDnsClientResolveService")
    }

    fn dns_resolve_address(&self, inst: Instance, host_name: &str, handler: AddressHandler) -> Result<()> {
        unsupported!("otDnsClientResolveAddress")
    }
}

/// Holds the stack lock for its lifetime.
pub struct StackGuard<'a> {
    stack: &'a dyn ThreadStack,
}

impl<'a> StackGuard<'a> {
    pub fn new(stack: &'a dyn ThreadStack) -> Self {
        stack.lock();
        StackGuard { stack }
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attached_roles() {
        assert!(!DeviceRole::Disabled.is_attached());
        assert!(!DeviceRole::Detached.is_attached());
        assert!(DeviceRole::Child.is_attached());
        assert!(DeviceRole::Leader.is_attached());
        assert!(DeviceRole::Child > DeviceRole::Detached);
        assert_eq!(DeviceRole::from_raw(3), DeviceRole::Router);
        assert_eq!(DeviceRole::from_raw(99), DeviceRole::Disabled);
    }

    #[test]
    fn link_mode_bits() {
        let mode = LinkMode {
            rx_on_when_idle: true,
            device_type: false,
            network_data: true,
        };
        assert_eq!(mode.to_bits(), 0b101);
        assert_eq!(LinkMode::from_bits(0b101), mode);
    }

    #[test]
    fn state_flags() {
        let flags = StateFlags::THREAD_ROLE.union(StateFlags::IP6_ADDRESS_ADDED);
        assert!(flags.contains(StateFlags::THREAD_ROLE));
        assert!(!flags.contains(StateFlags::THREAD_NETDATA));
        assert!(flags.intersects(StateFlags::IP6_ADDRESS_ADDED.union(StateFlags::IP6_ADDRESS_REMOVED)));
    }

    struct Bare;

    impl ThreadStack for Bare {
        fn lock(&self) {}
        fn unlock(&self) {}
    }

    #[test]
    fn defaults_report_missing_symbol() {
        let err = Bare.device_role(Instance::from_raw(1)).unwrap_err();
        assert!(matches!(err, Error::Unsupported("otThreadGetDeviceRole")));
    }
}
