//! Native OpenThread backend using libloading to resolve the stack at runtime.
//!
//! [`OpenThreadLibrary`] is the binding table: it owns the library handle and
//! one typed slot per catalog entry. A slot stays `None` when the library
//! does not export the symbol, and every accessor turns that into
//! [`Error::Unsupported`] so no call is ever made through a missing pointer.
//!
//! [`NativeThreadStack`] implements [`ThreadStack`] on top of the table with
//! `extern "C"` trampolines that forward native callbacks into Rust closures.

use std::ffi::{CStr, CString};
use std::mem;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use libc::{c_char, c_int, c_void};
use libloading::Library;
use once_cell::sync::OnceCell;

use crate::error::{check, Error, OtError, Result};
use crate::ffi::*;
use crate::stack::{
    ActiveScanResult, AddressHandler, AddressOrigin, BrowseHandler, ChildInfo, DeviceRole, DnsAddressResponse,
    DnsBrowseResponse, DnsQueryConfig, DnsServiceInfo, DnsServiceResponse, ExternalRoute, Instance, IpCounters,
    JoinerDiscerner, JoinerHandler, JoinerState, LinkMode, MacCounters, MleCounters, NeighborInfo, NetifAddress,
    ResolveHandler, RouterInfo, ScanHandler, SrpAutoStartHandler, SrpHandler, SrpHostInfo, SrpItemState,
    SrpNotification, SrpServiceDescription, StateChangedHandler, StateFlags, ThreadStack, TxtEntry,
};

/// Process-wide table for callers that do not construct their own.
static SHARED: OnceCell<Arc<OpenThreadLibrary>> = OnceCell::new();

const DNS_MAX_NAME_SIZE: usize = 255;
const DNS_MAX_LABEL_SIZE: usize = 64;
const DNS_TXT_BUFFER_SIZE: usize = 512;
const NETWORK_DATA_MAX_SIZE: usize = 255;

macro_rules! binding_table {
    ($($field:ident: $ty:ty = $name:literal,)*) => {
        /// Resolved entry points. A `None` slot means the library lacks the symbol.
        #[derive(Clone, Copy, Default)]
        pub struct Symbols {
            $(pub $field: Option<$ty>,)*
        }

        /// Names of every entry point the table resolves, in lookup order.
        pub const CATALOG: &[&str] = &[$($name,)*];

        impl Symbols {
            fn resolve(lib: &Library) -> Symbols {
                Symbols {
                    $($field: resolve_symbol::<$ty>(lib, $name),)*
                }
            }

            pub fn resolved_count(&self) -> usize {
                let mut count = 0;
                $(
                    if self.$field.is_some() {
                        count += 1;
                    }
                )*
                count
            }

            pub fn is_resolved(&self, name: &str) -> bool {
                match name {
                    $($name => self.$field.is_some(),)*
                    _ => false,
                }
            }
        }

        impl OpenThreadLibrary {
            $(
                pub fn $field(&self) -> Result<$ty> {
                    self.entry(|s| s.$field, $name)
                }
            )*
        }
    };
}

binding_table! {
    ot_get_instance: FnOtGetInstance = "otGetInstance",
    ot_destroy_instance: FnOtDestroyInstance = "otDestroyInstance",
    ot_lock: FnOtLock = "otLock",
    ot_unlock: FnOtUnlock = "otUnlock",
    ot_instance_init_single: FnOtInstanceInitSingle = "otInstanceInitSingle",
    ot_set_state_changed_callback: FnOtSetStateChangedCallback = "otSetStateChangedCallback",
    ot_instance_erase_persistent_info: FnOtInstanceErasePersistentInfo = "otInstanceErasePersistentInfo",
    ot_ip6_set_slaac_enabled: FnOtIp6SetSlaacEnabled = "otIp6SetSlaacEnabled",
    ot_ip6_set_enabled: FnOtIp6SetEnabled = "otIp6SetEnabled",
    ot_ip6_is_enabled: FnOtIp6IsEnabled = "otIp6IsEnabled",
    ot_ip6_get_unicast_addresses: FnOtIp6GetUnicastAddresses = "otIp6GetUnicastAddresses",
    ot_dataset_is_commissioned: FnOtDatasetIsCommissioned = "otDatasetIsCommissioned",
    ot_dataset_set_active_tlvs: FnOtDatasetSetActiveTlvs = "otDatasetSetActiveTlvs",
    ot_dataset_get_active_tlvs: FnOtDatasetGetActiveTlvs = "otDatasetGetActiveTlvs",
    ot_dataset_get_active: FnOtDatasetGetActive = "otDatasetGetActive",
    ot_thread_get_device_role: FnOtThreadGetDeviceRole = "otThreadGetDeviceRole",
    ot_thread_set_enabled: FnOtThreadSetEnabled = "otThreadSetEnabled",
    ot_thread_error_to_string: FnOtThreadErrorToString = "otThreadErrorToString",
    ot_thread_become_child: FnOtThreadBecomeChild = "otThreadBecomeChild",
    ot_thread_discover: FnOtThreadDiscover = "otThreadDiscover",
    ot_thread_get_link_mode: FnOtThreadGetLinkMode = "otThreadGetLinkMode",
    ot_thread_set_link_mode: FnOtThreadSetLinkMode = "otThreadSetLinkMode",
    ot_thread_is_router_eligible: FnOtThreadIsRouterEligible = "otThreadIsRouterEligible",
    ot_thread_set_router_eligible: FnOtThreadSetRouterEligible = "otThreadSetRouterEligible",
    ot_thread_get_network_key: FnOtThreadGetNetworkKey = "otThreadGetNetworkKey",
    ot_thread_get_network_name: FnOtThreadGetNetworkName = "otThreadGetNetworkName",
    ot_thread_get_extended_pan_id: FnOtThreadGetExtendedPanId = "otThreadGetExtendedPanId",
    ot_thread_get_mesh_local_prefix: FnOtThreadGetMeshLocalPrefix = "otThreadGetMeshLocalPrefix",
    ot_thread_get_next_neighbor_info: FnOtThreadGetNextNeighborInfo = "otThreadGetNextNeighborInfo",
    ot_thread_get_ip6_counters: FnOtThreadGetIp6Counters = "otThreadGetIp6Counters",
    ot_thread_get_rloc16: FnOtThreadGetRloc16 = "otThreadGetRloc16",
    ot_thread_get_leader_router_id: FnOtThreadGetLeaderRouterId = "otThreadGetLeaderRouterId",
    ot_thread_get_parent_average_rssi: FnOtThreadGetParentAverageRssi = "otThreadGetParentAverageRssi",
    ot_thread_get_parent_last_rssi: FnOtThreadGetParentLastRssi = "otThreadGetParentLastRssi",
    ot_thread_get_partition_id: FnOtThreadGetPartitionId = "otThreadGetPartitionId",
    ot_thread_get_leader_rloc: FnOtThreadGetLeaderRloc = "otThreadGetLeaderRloc",
    ot_thread_get_leader_weight: FnOtThreadGetLeaderWeight = "otThreadGetLeaderWeight",
    ot_thread_get_local_leader_weight: FnOtThreadGetLocalLeaderWeight = "otThreadGetLocalLeaderWeight",
    ot_thread_get_child_info_by_id: FnOtThreadGetChildInfoById = "otThreadGetChildInfoById",
    ot_thread_get_max_router_id: FnOtThreadGetMaxRouterId = "otThreadGetMaxRouterId",
    ot_thread_get_router_info: FnOtThreadGetRouterInfo = "otThreadGetRouterInfo",
    ot_thread_get_parent_info: FnOtThreadGetParentInfo = "otThreadGetParentInfo",
    ot_thread_get_mle_counters: FnOtThreadGetMleCounters = "otThreadGetMleCounters",
    ot_net_data_get_next_route: FnOtNetDataGetNextRoute = "otNetDataGetNextRoute",
    ot_net_data_get: FnOtNetDataGet = "otNetDataGet",
    ot_net_data_get_version: FnOtNetDataGetVersion = "otNetDataGetVersion",
    ot_net_data_get_stable_version: FnOtNetDataGetStableVersion = "otNetDataGetStableVersion",
    ot_link_get_counters: FnOtLinkGetCounters = "otLinkGetCounters",
    ot_link_get_extended_address: FnOtLinkGetExtendedAddress = "otLinkGetExtendedAddress",
    ot_link_get_channel: FnOtLinkGetChannel = "otLinkGetChannel",
    ot_link_get_pan_id: FnOtLinkGetPanId = "otLinkGetPanId",
    ot_link_get_poll_period: FnOtLinkGetPollPeriod = "otLinkGetPollPeriod",
    ot_link_set_poll_period: FnOtLinkSetPollPeriod = "otLinkSetPollPeriod",
    ot_link_csl_get_period: FnOtLinkCslGetPeriod = "otLinkCslGetPeriod",
    ot_link_csl_set_period: FnOtLinkCslSetPeriod = "otLinkCslSetPeriod",
    ot_plat_radio_get_ieee_eui64: FnOtPlatRadioGetIeeeEui64 = "otPlatRadioGetIeeeEui64",
    ot_plat_radio_get_rssi: FnOtPlatRadioGetRssi = "otPlatRadioGetRssi",
    ot_joiner_get_state: FnOtJoinerGetState = "otJoinerGetState",
    ot_joiner_set_discerner: FnOtJoinerSetDiscerner = "otJoinerSetDiscerner",
    ot_joiner_start: FnOtJoinerStart = "otJoinerStart",
    ot_srp_client_set_callback: FnOtSrpClientSetCallback = "otSrpClientSetCallback",
    ot_srp_client_enable_auto_start_mode: FnOtSrpClientEnableAutoStartMode = "otSrpClientEnableAutoStartMode",
    ot_srp_client_get_host_info: FnOtSrpClientGetHostInfo = "otSrpClientGetHostInfo",
    ot_srp_client_clear_service: FnOtSrpClientClearService = "otSrpClientClearService",
    ot_srp_client_set_lease_interval: FnOtSrpClientSetLeaseInterval = "otSrpClientSetLeaseInterval",
    ot_srp_client_set_key_lease_interval: FnOtSrpClientSetKeyLeaseInterval = "otSrpClientSetKeyLeaseInterval",
    ot_srp_client_add_service: FnOtSrpClientAddService = "otSrpClientAddService",
    ot_srp_client_remove_service: FnOtSrpClientRemoveService = "otSrpClientRemoveService",
    ot_srp_client_set_host_name: FnOtSrpClientSetHostName = "otSrpClientSetHostName",
    ot_srp_client_enable_auto_host_address: FnOtSrpClientEnableAutoHostAddress = "otSrpClientEnableAutoHostAddress",
    ot_srp_client_set_host_addresses: FnOtSrpClientSetHostAddresses = "otSrpClientSetHostAddresses",
    ot_srp_client_remove_host_and_services: FnOtSrpClientRemoveHostAndServices = "otSrpClientRemoveHostAndServices",
    ot_dns_client_get_default_config: FnOtDnsClientGetDefaultConfig = "otDnsClientGetDefaultConfig",
    ot_dns_client_set_default_config: FnOtDnsClientSetDefaultConfig = "otDnsClientSetDefaultConfig",
    ot_dns_init_txt_entry_iterator: FnOtDnsInitTxtEntryIterator = "otDnsInitTxtEntryIterator",
    ot_dns_get_next_txt_entry: FnOtDnsGetNextTxtEntry = "otDnsGetNextTxtEntry",
    ot_dns_browse_response_get_service_name: FnOtDnsBrowseResponseGetServiceName = "otDnsBrowseResponseGetServiceName",
    ot_dns_browse_response_get_service_instance: FnOtDnsBrowseResponseGetServiceInstance = "otDnsBrowseResponseGetServiceInstance",
    ot_dns_browse_response_get_service_info: FnOtDnsBrowseResponseGetServiceInfo = "otDnsBrowseResponseGetServiceInfo",
    ot_dns_client_browse: FnOtDnsClientBrowse = "otDnsClientBrowse",
    ot_dns_service_response_get_service_name: FnOtDnsServiceResponseGetServiceName = "otDnsServiceResponseGetServiceName",
    ot_dns_service_response_get_service_info: FnOtDnsServiceResponseGetServiceInfo = "otDnsServiceResponseGetServiceInfo",
    ot_dns_client_resolve_service: FnOtDnsClientResolveService = "otDnsClientResolveService",
    ot_dns_client_resolve_address: FnOtDnsClientResolveAddress = "otDnsClientResolveAddress",
    ot_dns_address_response_get_address: FnOtDnsAddressResponseGetAddress = "otDnsAddressResponseGetAddress",
    ot_message_read: FnOtMessageRead = "otMessageRead",
    ot_message_get_length: FnOtMessageGetLength = "otMessageGetLength",
}

fn resolve_symbol<T: Copy>(lib: &Library, name: &str) -> Option<T> {
    // SAFETY: every catalog entry is declared with the signature of the
    // public OpenThread header it names.
    match unsafe { lib.get::<T>(name.as_bytes()) } {
        Ok(symbol) => {
            log::debug!("resolved {}", name);
            Some(*symbol)
        }
        Err(e) => {
            log::warn!("{} not found: {}", name, e);
            None
        }
    }
}

#[cfg(unix)]
fn load_library(path: &Path, flags: c_int) -> std::result::Result<Library, libloading::Error> {
    // SAFETY: loading an external library runs its initializers.
    unsafe { libloading::os::unix::Library::open(Some(path), flags) }.map(Library::from)
}

#[cfg(not(unix))]
fn load_library(path: &Path, _flags: c_int) -> std::result::Result<Library, libloading::Error> {
    // SAFETY: loading an external library runs its initializers.
    unsafe { Library::new(path) }
}

struct Loaded {
    lib: Library,
    path: PathBuf,
    symbols: Symbols,
}

/// Dynamically loaded OpenThread library and its resolved entry points.
///
/// Function pointers handed out by the accessors are only valid while the
/// library stays open; callers close it once the stack instance is gone.
#[derive(Default)]
pub struct OpenThreadLibrary {
    inner: RwLock<Option<Loaded>>,
}

impl OpenThreadLibrary {
    pub fn new() -> Self {
        OpenThreadLibrary::default()
    }

    /// Returns the process-wide table, creating it closed on first use.
    pub fn shared() -> Arc<OpenThreadLibrary> {
        SHARED.get_or_init(|| Arc::new(OpenThreadLibrary::new())).clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Loaded>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn entry<T>(&self, pick: impl FnOnce(&Symbols) -> Option<T>, name: &'static str) -> Result<T> {
        let inner = self.read();
        let loaded = inner.as_ref().ok_or(Error::NotOpen)?;
        pick(&loaded.symbols).ok_or(Error::Unsupported(name))
    }

    /// Loads the library at `path` and resolves the catalog.
    ///
    /// A handle that is already open is closed first. Missing symbols do not
    /// fail the open; they are logged and leave their slot empty.
    pub fn open(&self, path: impl AsRef<Path>, flags: c_int) -> Result<()> {
        let path = path.as_ref();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = inner.take() {
            log::info!("closing {} before reopening", previous.path.display());
        }

        let lib = load_library(path, flags).map_err(|e| {
            log::error!("failed to load {}: {}", path.display(), e);
            Error::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let symbols = Symbols::resolve(&lib);
        log::info!(
            "opened {}: {}/{} entry points resolved",
            path.display(),
            symbols.resolved_count(),
            CATALOG.len()
        );
        *inner = Some(Loaded {
            lib,
            path: path.to_path_buf(),
            symbols,
        });
        Ok(())
    }

    pub fn close(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.take() {
            Some(loaded) => log::info!("closed {}", loaded.path.display()),
            None => log::debug!("OpenThread library already closed"),
        }
    }

    /// Re-resolves every slot against the open library.
    pub fn lookup(&self) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let loaded = inner.as_mut().ok_or(Error::NotOpen)?;
        loaded.symbols = Symbols::resolve(&loaded.lib);
        Ok(loaded.symbols.resolved_count())
    }

    /// Snapshot of the slots; all empty while closed.
    pub fn symbols(&self) -> Symbols {
        self.read().as_ref().map(|l| l.symbols).unwrap_or_default()
    }

    /// Raw address of any exported symbol, catalog or not.
    pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
        let inner = self.read();
        let loaded = inner.as_ref()?;
        // SAFETY: the address is only read, never called through here.
        unsafe { loaded.lib.get::<*mut c_void>(name.as_bytes()) }.ok().map(|s| *s)
    }

    pub fn catalog(&self) -> &'static [&'static str] {
        CATALOG
    }

    pub fn resolved_count(&self) -> usize {
        self.symbols().resolved_count()
    }

    pub fn is_open(&self) -> bool {
        self.read().is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.read().as_ref().map(|l| l.path.clone())
    }
}

/// SRP service handed to the native client. The client keeps pointers into
/// it until the service is cleared or confirmed removed.
struct NativeSrpService {
    service: otSrpClientService,
    _instance_name: CString,
    _name: CString,
    _subtypes: Vec<CString>,
    _subtype_ptrs: Vec<*const c_char>,
    _txt_keys: Vec<CString>,
    _txt_values: Vec<Vec<u8>>,
    _txt: Vec<otDnsTxtEntry>,
}

// SAFETY: the raw pointers only reference heap data owned by the same value.
unsafe impl Send for NativeSrpService {}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::InvalidArgument("string contains NUL"))
}

impl NativeSrpService {
    fn new(desc: &SrpServiceDescription<'_>) -> Result<Box<Self>> {
        let subtypes = desc.subtypes.iter().map(|s| c_string(s)).collect::<Result<Vec<_>>>()?;
        let mut subtype_ptrs: Vec<*const c_char> = subtypes.iter().map(|s| s.as_ptr()).collect();
        subtype_ptrs.push(ptr::null());

        let txt_keys = desc.txt.iter().map(|(k, _)| c_string(k)).collect::<Result<Vec<_>>>()?;
        let txt_values: Vec<Vec<u8>> = desc.txt.iter().map(|(_, v)| v.to_vec()).collect();
        let txt: Vec<otDnsTxtEntry> = txt_keys
            .iter()
            .zip(&txt_values)
            .map(|(k, v)| otDnsTxtEntry {
                mKey: k.as_ptr(),
                mValue: v.as_ptr(),
                mValueLength: v.len() as u16,
            })
            .collect();

        let mut svc = Box::new(NativeSrpService {
            // SAFETY: all-zero is a valid otSrpClientService.
            service: unsafe { mem::zeroed() },
            _instance_name: c_string(desc.instance_name)?,
            _name: c_string(desc.name)?,
            _subtypes: subtypes,
            _subtype_ptrs: subtype_ptrs,
            _txt_keys: txt_keys,
            _txt_values: txt_values,
            _txt: txt,
        });
        svc.service.mName = svc._name.as_ptr();
        svc.service.mInstanceName = svc._instance_name.as_ptr();
        svc.service.mSubTypeLabels = svc._subtype_ptrs.as_ptr();
        svc.service.mTxtEntries = if svc._txt.is_empty() {
            ptr::null()
        } else {
            svc._txt.as_ptr()
        };
        svc.service.mNumTxtEntries = svc._txt.len() as u8;
        svc.service.mPort = desc.port;
        svc.service.mPriority = desc.priority;
        svc.service.mWeight = desc.weight;
        Ok(svc)
    }
}

/// State reachable from the long-lived native callbacks. Its address is the
/// callback context, so it lives behind an `Arc` owned by the stack.
#[derive(Default)]
struct NativeShared {
    state_changed: Mutex<Option<StateChangedHandler>>,
    srp: Mutex<Option<SrpHandler>>,
    srp_auto_start: Mutex<Option<SrpAutoStartHandler>>,
    services: Mutex<Vec<Option<Box<NativeSrpService>>>>,
    host_name: Mutex<Option<CString>>,
    host_addresses: Mutex<Vec<otIp6Address>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// [`ThreadStack`] backed by an [`OpenThreadLibrary`].
pub struct NativeThreadStack {
    library: Arc<OpenThreadLibrary>,
    shared: Arc<NativeShared>,
}

impl NativeThreadStack {
    pub fn new(library: Arc<OpenThreadLibrary>) -> Self {
        NativeThreadStack {
            library,
            shared: Arc::new(NativeShared::default()),
        }
    }

    pub fn library(&self) -> &Arc<OpenThreadLibrary> {
        &self.library
    }

    fn context(&self) -> *mut c_void {
        Arc::as_ptr(&self.shared) as *mut c_void
    }
}

fn ip6_from(addr: &otIp6Address) -> Ipv6Addr {
    Ipv6Addr::from(addr.m8)
}

fn ip6_to(addr: &Ipv6Addr) -> otIp6Address {
    otIp6Address { m8: addr.octets() }
}

fn not_null<T>(p: *const T) -> Result<*const T> {
    if p.is_null() {
        Err(Error::Stack(OtError::Failed))
    } else {
        Ok(p)
    }
}

fn scan_result_from(raw: &otActiveScanResult) -> ActiveScanResult {
    let steering_len = (raw.mSteeringData.mLength as usize).min(raw.mSteeringData.m8.len());
    ActiveScanResult {
        ext_address: raw.mExtAddress.m8,
        network_name: c_buf_to_string(&raw.mNetworkName.m8),
        extended_pan_id: raw.mExtendedPanId.m8,
        steering_data: raw.mSteeringData.m8[..steering_len].to_vec(),
        pan_id: raw.mPanId,
        joiner_udp_port: raw.mJoinerUdpPort,
        channel: raw.mChannel,
        rssi: raw.mRssi,
        lqi: raw.mLqi,
        version: raw.mBits & 0x0f,
        is_native: raw.mBits & (1 << 4) != 0,
        is_joinable: raw.mBits & (1 << 6) != 0,
    }
}

fn host_info_from(raw: &otSrpClientHostInfo) -> SrpHostInfo {
    let name = if raw.mName.is_null() {
        None
    } else {
        // SAFETY: the client keeps the host name NUL-terminated.
        Some(unsafe { CStr::from_ptr(raw.mName) }.to_string_lossy().into_owned())
    };
    SrpHostInfo {
        name,
        auto_address: raw.mAutoAddress,
        state: SrpItemState::from_raw(raw.mState),
    }
}

fn dns_config_from(raw: &otDnsQueryConfig) -> DnsQueryConfig {
    DnsQueryConfig {
        server: SocketAddrV6::new(ip6_from(&raw.mServerSockAddr.mAddress), raw.mServerSockAddr.mPort, 0, 0),
        response_timeout_ms: raw.mResponseTimeout,
        max_tx_attempts: raw.mMaxTxAttempts,
        recursion_flag: raw.mRecursionFlag,
        nat64_mode: raw.mNat64Mode,
        service_mode: raw.mServiceMode,
        transport_proto: raw.mTransportProto,
    }
}

fn dns_config_to(config: &DnsQueryConfig) -> otDnsQueryConfig {
    otDnsQueryConfig {
        mServerSockAddr: otSockAddr {
            mAddress: ip6_to(config.server.ip()),
            mPort: config.server.port(),
        },
        mResponseTimeout: config.response_timeout_ms,
        mMaxTxAttempts: config.max_tx_attempts,
        mRecursionFlag: config.recursion_flag,
        mNat64Mode: config.nat64_mode,
        mServiceMode: config.service_mode,
        mTransportProto: config.transport_proto,
    }
}

/// Runs a service info getter against stack-sized scratch buffers.
fn read_service_info(get: impl FnOnce(*mut otDnsServiceInfo) -> otError) -> Result<DnsServiceInfo> {
    let mut host = [0 as c_char; DNS_MAX_NAME_SIZE];
    let mut txt = [0u8; DNS_TXT_BUFFER_SIZE];
    // SAFETY: all-zero is a valid otDnsServiceInfo.
    let mut info: otDnsServiceInfo = unsafe { mem::zeroed() };
    info.mHostNameBuffer = host.as_mut_ptr();
    info.mHostNameBufferSize = host.len() as u16;
    info.mTxtData = txt.as_mut_ptr();
    info.mTxtDataSize = txt.len() as u16;
    check(get(&mut info))?;

    let address = ip6_from(&info.mHostAddress);
    let txt_len = (info.mTxtDataSize as usize).min(txt.len());
    Ok(DnsServiceInfo {
        ttl: info.mTtl,
        port: info.mPort,
        priority: info.mPriority,
        weight: info.mWeight,
        host_name: c_buf_to_string(&host),
        host_address: (!address.is_unspecified()).then_some(address),
        host_address_ttl: info.mHostAddressTtl,
        txt_data: txt[..txt_len].to_vec(),
        txt_data_truncated: info.mTxtDataTruncated,
        txt_data_ttl: info.mTxtDataTtl,
    })
}

struct NativeBrowseResponse {
    symbols: Symbols,
    raw: *const otDnsBrowseResponse,
}

impl DnsBrowseResponse for NativeBrowseResponse {
    fn service_name(&self) -> Result<String> {
        let f = self
            .symbols
            .ot_dns_browse_response_get_service_name
            .ok_or(Error::Unsupported("otDnsBrowseResponseGetServiceName"))?;
        let mut name = [0 as c_char; DNS_MAX_NAME_SIZE];
        // SAFETY: the response is valid while the browse callback runs.
        check(unsafe { f(self.raw, name.as_mut_ptr(), name.len() as u16) })?;
        Ok(c_buf_to_string(&name))
    }

    fn service_instance(&self, index: u16) -> Result<Option<String>> {
        let f = self
            .symbols
            .ot_dns_browse_response_get_service_instance
            .ok_or(Error::Unsupported("otDnsBrowseResponseGetServiceInstance"))?;
        let mut label = [0 as c_char; DNS_MAX_LABEL_SIZE];
        // SAFETY: as above.
        match check(unsafe { f(self.raw, index, label.as_mut_ptr(), label.len() as u8) }) {
            Ok(()) => Ok(Some(c_buf_to_string(&label))),
            Err(Error::Stack(OtError::NotFound)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn service_info(&self, instance_label: &str) -> Result<DnsServiceInfo> {
        let f = self
            .symbols
            .ot_dns_browse_response_get_service_info
            .ok_or(Error::Unsupported("otDnsBrowseResponseGetServiceInfo"))?;
        let label = c_string(instance_label)?;
        // SAFETY: as above.
        read_service_info(|info| unsafe { f(self.raw, label.as_ptr(), info) })
    }
}

struct NativeServiceResponse {
    symbols: Symbols,
    raw: *const otDnsServiceResponse,
}

impl DnsServiceResponse for NativeServiceResponse {
    fn service_name(&self) -> Result<(String, String)> {
        let f = self
            .symbols
            .ot_dns_service_response_get_service_name
            .ok_or(Error::Unsupported("otDnsServiceResponseGetServiceName"))?;
        let mut label = [0 as c_char; DNS_MAX_LABEL_SIZE];
        let mut name = [0 as c_char; DNS_MAX_NAME_SIZE];
        // SAFETY: the response is valid while the resolve callback runs.
        check(unsafe {
            f(
                self.raw,
                label.as_mut_ptr(),
                label.len() as u8,
                name.as_mut_ptr(),
                name.len() as u16,
            )
        })?;
        Ok((c_buf_to_string(&label), c_buf_to_string(&name)))
    }

    fn service_info(&self) -> Result<DnsServiceInfo> {
        let f = self
            .symbols
            .ot_dns_service_response_get_service_info
            .ok_or(Error::Unsupported("otDnsServiceResponseGetServiceInfo"))?;
        // SAFETY: as above.
        read_service_info(|info| unsafe { f(self.raw, info) })
    }
}

struct NativeAddressResponse {
    symbols: Symbols,
    raw: *const otDnsAddressResponse,
}

impl DnsAddressResponse for NativeAddressResponse {
    fn address(&self, index: u16) -> Result<Option<(Ipv6Addr, u32)>> {
        let f = self
            .symbols
            .ot_dns_address_response_get_address
            .ok_or(Error::Unsupported("otDnsAddressResponseGetAddress"))?;
        let mut address = otIp6Address { m8: [0; 16] };
        let mut ttl = 0u32;
        // SAFETY: the response is valid while the address callback runs.
        match check(unsafe { f(self.raw, index, &mut address, &mut ttl) }) {
            Ok(()) => Ok(Some((ip6_from(&address), ttl))),
            Err(Error::Stack(OtError::NotFound)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn callback_error(code: otError) -> std::result::Result<(), OtError> {
    match OtError::from_raw(code) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

unsafe extern "C" fn state_changed_trampoline(flags: otChangedFlags, context: *mut c_void) {
    // SAFETY: context is the NativeShared registered with the callback.
    let shared = unsafe { &*(context as *const NativeShared) };
    if let Some(handler) = locked(&shared.state_changed).as_ref() {
        handler(StateFlags(flags));
    }
}

unsafe extern "C" fn scan_trampoline(result: *mut otActiveScanResult, context: *mut c_void) {
    let handler = context as *mut ScanHandler;
    if result.is_null() {
        // SAFETY: the final invocation reclaims the box leaked by discover().
        let mut handler = unsafe { Box::from_raw(handler) };
        handler(None);
    } else {
        // SAFETY: the box stays alive until the null result.
        let handler = unsafe { &mut *handler };
        handler(Some(scan_result_from(unsafe { &*result })));
    }
}

unsafe extern "C" fn joiner_trampoline(error: otError, context: *mut c_void) {
    // SAFETY: the joiner completes exactly once.
    let handler = unsafe { Box::from_raw(context as *mut JoinerHandler) };
    handler(callback_error(error));
}

unsafe extern "C" fn srp_trampoline(
    error: otError,
    host_info: *const otSrpClientHostInfo,
    _services: *const otSrpClientService,
    removed_services: *const otSrpClientService,
    context: *mut c_void,
) {
    // SAFETY: context is the NativeShared registered with the callback.
    let shared = unsafe { &*(context as *const NativeShared) };

    let mut removed_slots = Vec::new();
    {
        let mut services = locked(&shared.services);
        let mut cur = removed_services;
        while !cur.is_null() {
            // SAFETY: removed services stay valid for the callback; read the
            // link before the entry may be dropped below.
            let next = unsafe { (*cur).mNext } as *const otSrpClientService;
            let slot = services
                .iter()
                .position(|s| s.as_ref().is_some_and(|s| ptr::eq(&s.service, cur)));
            if let Some(slot) = slot {
                services[slot] = None;
                removed_slots.push(slot);
            }
            cur = next;
        }
    }

    let host = if host_info.is_null() {
        None
    } else {
        // SAFETY: host info is valid for the callback.
        Some(host_info_from(unsafe { &*host_info }))
    };
    let notification = SrpNotification {
        error: OtError::from_raw(error),
        host,
        removed_slots,
    };
    if let Some(handler) = locked(&shared.srp).as_ref() {
        handler(notification);
    }
}

unsafe extern "C" fn srp_auto_start_trampoline(server: *const otSockAddr, context: *mut c_void) {
    // SAFETY: context is the NativeShared registered with the callback.
    let shared = unsafe { &*(context as *const NativeShared) };
    let server = if server.is_null() {
        None
    } else {
        // SAFETY: the address is valid for the callback.
        let raw = unsafe { &*server };
        Some(SocketAddrV6::new(ip6_from(&raw.mAddress), raw.mPort, 0, 0))
    };
    if let Some(handler) = locked(&shared.srp_auto_start).as_ref() {
        handler(server);
    }
}

type BrowseContext = (Symbols, BrowseHandler);
type ResolveContext = (Symbols, ResolveHandler);
type AddressContext = (Symbols, AddressHandler);

unsafe extern "C" fn browse_trampoline(error: otError, response: *const otDnsBrowseResponse, context: *mut c_void) {
    // SAFETY: each query calls back exactly once.
    let (symbols, handler) = *unsafe { Box::from_raw(context as *mut BrowseContext) };
    match callback_error(error) {
        Ok(()) => handler(Ok(&NativeBrowseResponse { symbols, raw: response })),
        Err(e) => handler(Err(e)),
    }
}

unsafe extern "C" fn resolve_trampoline(error: otError, response: *const otDnsServiceResponse, context: *mut c_void) {
    // SAFETY: each query calls back exactly once.
    let (symbols, handler) = *unsafe { Box::from_raw(context as *mut ResolveContext) };
    match callback_error(error) {
        Ok(()) => handler(Ok(&NativeServiceResponse { symbols, raw: response })),
        Err(e) => handler(Err(e)),
    }
}

unsafe extern "C" fn address_trampoline(error: otError, response: *const otDnsAddressResponse, context: *mut c_void) {
    // SAFETY: each query calls back exactly once.
    let (symbols, handler) = *unsafe { Box::from_raw(context as *mut AddressContext) };
    match callback_error(error) {
        Ok(()) => handler(Ok(&NativeAddressResponse { symbols, raw: response })),
        Err(e) => handler(Err(e)),
    }
}

/// Submits a query whose context box is reclaimed here if the stack refuses it.
fn submit<C>(context: Box<C>, call: impl FnOnce(*mut c_void) -> otError) -> Result<()> {
    let raw = Box::into_raw(context);
    let result = check(call(raw as *mut c_void));
    if result.is_err() {
        // SAFETY: the stack rejected the request and never saw the context.
        drop(unsafe { Box::from_raw(raw) });
    }
    result
}

impl ThreadStack for NativeThreadStack {
    fn acquire_instance(&self, com_port: &str, debug: u16) -> Result<Instance> {
        let f = self.library.ot_get_instance()?;
        let port = c_string(com_port)?;
        let mut instance: *mut otInstance = ptr::null_mut();
        // SAFETY: pthread_t is plain data.
        let mut thread: libc::pthread_t = unsafe { mem::zeroed() };
        // SAFETY: out-pointers are valid for the call.
        unsafe { f(&mut instance, &mut thread, port.as_ptr(), debug) };
        if instance.is_null() {
            return Err(Error::Stack(OtError::Failed));
        }
        log::info!("OpenThread instance acquired on {}", com_port);
        Ok(Instance::from_raw(instance as usize))
    }

    fn init_single(&self) -> Result<Instance> {
        let f = self.library.ot_instance_init_single()?;
        // SAFETY: no arguments.
        let instance = unsafe { f() };
        not_null(instance).map(|p| Instance::from_raw(p as usize))
    }

    fn destroy_instance(&self) -> Result<()> {
        let f = self.library.ot_destroy_instance()?;
        // SAFETY: no arguments.
        unsafe { f() };
        locked(&self.shared.services).clear();
        Ok(())
    }

    fn lock(&self) {
        match self.library.ot_lock() {
            // SAFETY: no arguments.
            Ok(f) => unsafe { f() },
            Err(e) => log::warn!("stack lock unavailable: {}", e),
        }
    }

    fn unlock(&self) {
        match self.library.ot_unlock() {
            // SAFETY: no arguments.
            Ok(f) => unsafe { f() },
            Err(e) => log::warn!("stack unlock unavailable: {}", e),
        }
    }

    fn set_state_changed_callback(&self, inst: Instance, handler: StateChangedHandler) -> Result<()> {
        let f = self.library.ot_set_state_changed_callback()?;
        *locked(&self.shared.state_changed) = Some(handler);
        // SAFETY: the context outlives the registration.
        check(unsafe { f(inst.as_ptr(), Some(state_changed_trampoline), self.context()) })
    }

    fn erase_persistent_info(&self, inst: Instance) -> Result<()> {
        let f = self.library.ot_instance_erase_persistent_info()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr()) })
    }

    fn error_to_string(&self, error: OtError) -> String {
        match self.library.ot_thread_error_to_string() {
            Ok(f) => {
                // SAFETY: returns a static string.
                let text = unsafe { f(error.as_raw()) };
                if text.is_null() {
                    error.description().to_string()
                } else {
                    // SAFETY: non-null static C string.
                    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
                }
            }
            Err(_) => error.description().to_string(),
        }
    }

    fn ip6_set_slaac_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        let f = self.library.ot_ip6_set_slaac_enabled()?;
        // SAFETY: valid instance.
        unsafe { f(inst.as_ptr(), enabled) };
        Ok(())
    }

    fn ip6_set_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        let f = self.library.ot_ip6_set_enabled()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), enabled) })
    }

    fn ip6_is_enabled(&self, inst: Instance) -> Result<bool> {
        let f = self.library.ot_ip6_is_enabled()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn ip6_unicast_addresses(&self, inst: Instance) -> Result<Vec<NetifAddress>> {
        let f = self.library.ot_ip6_get_unicast_addresses()?;
        let mut out = Vec::new();
        // SAFETY: the list is owned by the stack and stable under its lock.
        let mut cur = unsafe { f(inst.as_ptr()) };
        while !cur.is_null() {
            let addr = unsafe { &*cur };
            out.push(NetifAddress {
                address: ip6_from(&addr.mAddress),
                prefix_length: addr.mPrefixLength,
                origin: AddressOrigin::from_raw(addr.mAddressOrigin),
                preferred: addr.mBits & NETIF_ADDRESS_PREFERRED != 0,
                valid: addr.mBits & NETIF_ADDRESS_VALID != 0,
            });
            cur = addr.mNext;
        }
        Ok(out)
    }

    fn dataset_is_commissioned(&self, inst: Instance) -> Result<bool> {
        let f = self.library.ot_dataset_is_commissioned()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn dataset_set_active_tlvs(&self, inst: Instance, tlvs: &[u8]) -> Result<()> {
        let f = self.library.ot_dataset_set_active_tlvs()?;
        if tlvs.len() > OT_OPERATIONAL_DATASET_MAX_LENGTH {
            return Err(Error::BufferTooSmall);
        }
        let mut raw = otOperationalDatasetTlvs {
            mTlvs: [0; OT_OPERATIONAL_DATASET_MAX_LENGTH],
            mLength: tlvs.len() as u8,
        };
        raw.mTlvs[..tlvs.len()].copy_from_slice(tlvs);
        // SAFETY: valid instance and dataset.
        check(unsafe { f(inst.as_ptr(), &raw) })
    }

    fn dataset_get_active_tlvs(&self, inst: Instance) -> Result<Vec<u8>> {
        let f = self.library.ot_dataset_get_active_tlvs()?;
        let mut raw = otOperationalDatasetTlvs {
            mTlvs: [0; OT_OPERATIONAL_DATASET_MAX_LENGTH],
            mLength: 0,
        };
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), &mut raw) })?;
        let len = (raw.mLength as usize).min(raw.mTlvs.len());
        Ok(raw.mTlvs[..len].to_vec())
    }

    fn device_role(&self, inst: Instance) -> Result<DeviceRole> {
        let f = self.library.ot_thread_get_device_role()?;
        // SAFETY: valid instance.
        Ok(DeviceRole::from_raw(unsafe { f(inst.as_ptr()) }))
    }

    fn thread_set_enabled(&self, inst: Instance, enabled: bool) -> Result<()> {
        let f = self.library.ot_thread_set_enabled()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), enabled) })
    }

    fn become_child(&self, inst: Instance) -> Result<()> {
        let f = self.library.ot_thread_become_child()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr()) })
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
        let f = self.library.ot_thread_discover()?;
        submit(Box::new(handler), |ctx| {
            // SAFETY: ctx is reclaimed by the final scan callback.
            unsafe {
                f(
                    inst.as_ptr(),
                    scan_channels,
                    pan_id,
                    joiner,
                    enable_eui64_filtering,
                    Some(scan_trampoline),
                    ctx,
                )
            }
        })
    }

    fn link_mode(&self, inst: Instance) -> Result<LinkMode> {
        let f = self.library.ot_thread_get_link_mode()?;
        // SAFETY: valid instance.
        Ok(LinkMode::from_bits(unsafe { f(inst.as_ptr()) }.bits))
    }

    fn set_link_mode(&self, inst: Instance, mode: LinkMode) -> Result<()> {
        let f = self.library.ot_thread_set_link_mode()?;
        let config = otLinkModeConfig { bits: mode.to_bits() };
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), config) })
    }

    fn is_router_eligible(&self, inst: Instance) -> Result<bool> {
        let f = self.library.ot_thread_is_router_eligible()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn set_router_eligible(&self, inst: Instance, eligible: bool) -> Result<()> {
        let f = self.library.ot_thread_set_router_eligible()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), eligible) })
    }

    fn network_key(&self, inst: Instance) -> Result<[u8; 16]> {
        let f = self.library.ot_thread_get_network_key()?;
        let mut key = otNetworkKey { m8: [0; OT_NETWORK_KEY_SIZE] };
        // SAFETY: valid instance and out-pointer.
        unsafe { f(inst.as_ptr(), &mut key) };
        Ok(key.m8)
    }

    fn network_name(&self, inst: Instance) -> Result<String> {
        let f = self.library.ot_thread_get_network_name()?;
        // SAFETY: returns a NUL-terminated string owned by the stack.
        let name = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    fn extended_pan_id(&self, inst: Instance) -> Result<[u8; 8]> {
        let f = self.library.ot_thread_get_extended_pan_id()?;
        // SAFETY: valid instance; result owned by the stack.
        let xpan = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(unsafe { (*xpan).m8 })
    }

    fn mesh_local_prefix(&self, inst: Instance) -> Result<[u8; 8]> {
        let f = self.library.ot_thread_get_mesh_local_prefix()?;
        // SAFETY: valid instance; result owned by the stack.
        let prefix = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(unsafe { (*prefix).m8 })
    }

    fn neighbors(&self, inst: Instance) -> Result<Vec<NeighborInfo>> {
        let f = self.library.ot_thread_get_next_neighbor_info()?;
        let mut iterator: otNeighborInfoIterator = OT_NEIGHBOR_INFO_ITERATOR_INIT;
        let mut out = Vec::new();
        loop {
            // SAFETY: all-zero is a valid otNeighborInfo.
            let mut raw: otNeighborInfo = unsafe { mem::zeroed() };
            // SAFETY: valid instance and out-pointers.
            if unsafe { f(inst.as_ptr(), &mut iterator, &mut raw) } != OT_ERROR_NONE {
                break;
            }
            out.push(NeighborInfo {
                ext_address: raw.mExtAddress.m8,
                age: raw.mAge,
                connection_time: raw.mConnectionTime,
                rloc16: raw.mRloc16,
                link_frame_counter: raw.mLinkFrameCounter,
                mle_frame_counter: raw.mMleFrameCounter,
                link_quality_in: raw.mLinkQualityIn,
                average_rssi: raw.mAverageRssi,
                last_rssi: raw.mLastRssi,
                frame_error_rate: raw.mFrameErrorRate,
                message_error_rate: raw.mMessageErrorRate,
                rx_on_when_idle: raw.mBits & NEIGHBOR_RX_ON_WHEN_IDLE != 0,
                full_thread_device: raw.mBits & NEIGHBOR_FULL_THREAD_DEVICE != 0,
                full_network_data: raw.mBits & NEIGHBOR_FULL_NETWORK_DATA != 0,
                is_child: raw.mBits & NEIGHBOR_IS_CHILD != 0,
            });
        }
        Ok(out)
    }

    fn ip6_counters(&self, inst: Instance) -> Result<IpCounters> {
        let f = self.library.ot_thread_get_ip6_counters()?;
        // SAFETY: valid instance; counters owned by the stack.
        let raw = unsafe { &*not_null(f(inst.as_ptr()))? };
        Ok(IpCounters {
            tx_success: raw.mTxSuccess,
            rx_success: raw.mRxSuccess,
            tx_failure: raw.mTxFailure,
            rx_failure: raw.mRxFailure,
        })
    }

    fn mle_counters(&self, inst: Instance) -> Result<MleCounters> {
        let f = self.library.ot_thread_get_mle_counters()?;
        // SAFETY: valid instance; counters owned by the stack.
        let raw = unsafe { &*not_null(f(inst.as_ptr()))? };
        Ok(MleCounters {
            disabled_role: raw.mDisabledRole,
            detached_role: raw.mDetachedRole,
            child_role: raw.mChildRole,
            router_role: raw.mRouterRole,
            leader_role: raw.mLeaderRole,
            attach_attempts: raw.mAttachAttempts,
            partition_id_changes: raw.mPartitionIdChanges,
            better_partition_attach_attempts: raw.mBetterPartitionAttachAttempts,
            parent_changes: raw.mParentChanges,
        })
    }

    fn rloc16(&self, inst: Instance) -> Result<u16> {
        let f = self.library.ot_thread_get_rloc16()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn leader_router_id(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_thread_get_leader_router_id()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn parent_average_rssi(&self, inst: Instance) -> Result<i8> {
        let f = self.library.ot_thread_get_parent_average_rssi()?;
        let mut rssi = 0i8;
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), &mut rssi) })?;
        Ok(rssi)
    }

    fn parent_last_rssi(&self, inst: Instance) -> Result<i8> {
        let f = self.library.ot_thread_get_parent_last_rssi()?;
        let mut rssi = 0i8;
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), &mut rssi) })?;
        Ok(rssi)
    }

    fn partition_id(&self, inst: Instance) -> Result<u32> {
        let f = self.library.ot_thread_get_partition_id()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn leader_rloc(&self, inst: Instance) -> Result<Ipv6Addr> {
        let f = self.library.ot_thread_get_leader_rloc()?;
        let mut addr = otIp6Address { m8: [0; 16] };
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), &mut addr) })?;
        Ok(ip6_from(&addr))
    }

    fn leader_weight(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_thread_get_leader_weight()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn local_leader_weight(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_thread_get_local_leader_weight()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn child_info_by_id(&self, inst: Instance, child_id: u16) -> Result<ChildInfo> {
        let f = self.library.ot_thread_get_child_info_by_id()?;
        // SAFETY: all-zero is a valid otChildInfo.
        let mut raw: otChildInfo = unsafe { mem::zeroed() };
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), child_id, &mut raw) })?;
        Ok(ChildInfo {
            ext_address: raw.mExtAddress.m8,
            timeout: raw.mTimeout,
            age: raw.mAge,
            rloc16: raw.mRloc16,
            child_id: raw.mChildId,
            network_data_version: raw.mNetworkDataVersion,
            link_quality_in: raw.mLinkQualityIn,
            average_rssi: raw.mAverageRssi,
            last_rssi: raw.mLastRssi,
        })
    }

    fn max_router_id(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_thread_get_max_router_id()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn router_info(&self, inst: Instance, router_id: u16) -> Result<RouterInfo> {
        let f = self.library.ot_thread_get_router_info()?;
        // SAFETY: all-zero is a valid otRouterInfo.
        let mut raw: otRouterInfo = unsafe { mem::zeroed() };
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), router_id, &mut raw) })?;
        Ok(router_info_from(&raw))
    }

    fn parent_info(&self, inst: Instance) -> Result<RouterInfo> {
        let f = self.library.ot_thread_get_parent_info()?;
        // SAFETY: all-zero is a valid otRouterInfo.
        let mut raw: otRouterInfo = unsafe { mem::zeroed() };
        // SAFETY: valid instance and out-pointer.
        check(unsafe { f(inst.as_ptr(), &mut raw) })?;
        Ok(router_info_from(&raw))
    }

    fn network_data(&self, inst: Instance, stable: bool) -> Result<Vec<u8>> {
        let f = self.library.ot_net_data_get()?;
        let mut buf = [0u8; NETWORK_DATA_MAX_SIZE];
        let mut len = buf.len() as u8;
        // SAFETY: valid instance; len bounds the buffer.
        check(unsafe { f(inst.as_ptr(), stable, buf.as_mut_ptr(), &mut len) })?;
        Ok(buf[..len as usize].to_vec())
    }

    fn network_data_version(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_net_data_get_version()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn stable_network_data_version(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_net_data_get_stable_version()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn external_routes(&self, inst: Instance) -> Result<Vec<ExternalRoute>> {
        let f = self.library.ot_net_data_get_next_route()?;
        let mut iterator: otNetworkDataIterator = OT_NETWORK_DATA_ITERATOR_INIT;
        let mut out = Vec::new();
        loop {
            // SAFETY: all-zero is a valid otExternalRouteConfig.
            let mut raw: otExternalRouteConfig = unsafe { mem::zeroed() };
            // SAFETY: valid instance and out-pointers.
            if unsafe { f(inst.as_ptr(), &mut iterator, &mut raw) } != OT_ERROR_NONE {
                break;
            }
            out.push(ExternalRoute {
                prefix: ip6_from(&raw.mPrefix.mPrefix),
                prefix_length: raw.mPrefix.mLength,
                rloc16: raw.mRloc16,
                next_hop_is_this_device: raw.mBits & EXTERNAL_ROUTE_NEXT_HOP_IS_THIS_DEVICE != 0,
            });
        }
        Ok(out)
    }

    fn mac_counters(&self, inst: Instance) -> Result<MacCounters> {
        let f = self.library.ot_link_get_counters()?;
        // SAFETY: valid instance; counters owned by the stack.
        let c = unsafe { &*not_null(f(inst.as_ptr()))? };
        Ok(MacCounters {
            tx_total: c.mTxTotal,
            tx_unicast: c.mTxUnicast,
            tx_broadcast: c.mTxBroadcast,
            tx_ack_requested: c.mTxAckRequested,
            tx_acked: c.mTxAcked,
            tx_no_ack_requested: c.mTxNoAckRequested,
            tx_data: c.mTxData,
            tx_data_poll: c.mTxDataPoll,
            tx_beacon: c.mTxBeacon,
            tx_beacon_request: c.mTxBeaconRequest,
            tx_other: c.mTxOther,
            tx_retry: c.mTxRetry,
            tx_direct_max_retry_expiry: c.mTxDirectMaxRetryExpiry,
            tx_indirect_max_retry_expiry: c.mTxIndirectMaxRetryExpiry,
            tx_err_cca: c.mTxErrCca,
            tx_err_abort: c.mTxErrAbort,
            tx_err_busy_channel: c.mTxErrBusyChannel,
            rx_total: c.mRxTotal,
            rx_unicast: c.mRxUnicast,
            rx_broadcast: c.mRxBroadcast,
            rx_data: c.mRxData,
            rx_data_poll: c.mRxDataPoll,
            rx_beacon: c.mRxBeacon,
            rx_beacon_request: c.mRxBeaconRequest,
            rx_other: c.mRxOther,
            rx_address_filtered: c.mRxAddressFiltered,
            rx_dest_addr_filtered: c.mRxDestAddrFiltered,
            rx_duplicated: c.mRxDuplicated,
            rx_err_no_frame: c.mRxErrNoFrame,
            rx_err_unknown_neighbor: c.mRxErrUnknownNeighbor,
            rx_err_invalid_src_addr: c.mRxErrInvalidSrcAddr,
            rx_err_sec: c.mRxErrSec,
            rx_err_fcs: c.mRxErrFcs,
            rx_err_other: c.mRxErrOther,
        })
    }

    fn extended_address(&self, inst: Instance) -> Result<[u8; 8]> {
        let f = self.library.ot_link_get_extended_address()?;
        // SAFETY: valid instance; result owned by the stack.
        let addr = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(unsafe { (*addr).m8 })
    }

    fn channel(&self, inst: Instance) -> Result<u8> {
        let f = self.library.ot_link_get_channel()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn pan_id(&self, inst: Instance) -> Result<u16> {
        let f = self.library.ot_link_get_pan_id()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn poll_period(&self, inst: Instance) -> Result<u32> {
        let f = self.library.ot_link_get_poll_period()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn set_poll_period(&self, inst: Instance, period_ms: u32) -> Result<()> {
        let f = self.library.ot_link_set_poll_period()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), period_ms) })
    }

    fn csl_period(&self, inst: Instance) -> Result<u16> {
        let f = self.library.ot_link_csl_get_period()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn set_csl_period(&self, inst: Instance, period: u16) -> Result<()> {
        let f = self.library.ot_link_csl_set_period()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), period) })
    }

    fn eui64(&self, inst: Instance) -> Result<[u8; 8]> {
        let f = self.library.ot_plat_radio_get_ieee_eui64()?;
        let mut eui = [0u8; 8];
        // SAFETY: valid instance; the buffer holds eight bytes.
        unsafe { f(inst.as_ptr(), eui.as_mut_ptr()) };
        Ok(eui)
    }

    fn instant_rssi(&self, inst: Instance) -> Result<i8> {
        let f = self.library.ot_plat_radio_get_rssi()?;
        // SAFETY: valid instance.
        Ok(unsafe { f(inst.as_ptr()) })
    }

    fn joiner_state(&self, inst: Instance) -> Result<JoinerState> {
        let f = self.library.ot_joiner_get_state()?;
        // SAFETY: valid instance.
        Ok(JoinerState::from_raw(unsafe { f(inst.as_ptr()) }))
    }

    fn set_joiner_discerner(&self, inst: Instance, discerner: JoinerDiscerner) -> Result<()> {
        let f = self.library.ot_joiner_set_discerner()?;
        let mut raw = otJoinerDiscerner {
            mValue: discerner.value,
            mLength: discerner.length,
        };
        // SAFETY: valid instance; the discerner is copied by the stack.
        check(unsafe { f(inst.as_ptr(), &mut raw) })
    }

    fn joiner_start(&self, inst: Instance, pskd: &str, handler: JoinerHandler) -> Result<()> {
        let f = self.library.ot_joiner_start()?;
        if pskd.len() > OT_JOINER_MAX_PSKD_LENGTH {
            return Err(Error::InvalidStringLength {
                max: OT_JOINER_MAX_PSKD_LENGTH,
            });
        }
        let pskd = c_string(pskd)?;
        submit(Box::new(handler), |ctx| {
            // SAFETY: ctx is reclaimed by the joiner callback.
            unsafe {
                f(
                    inst.as_ptr(),
                    pskd.as_ptr(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    ptr::null(),
                    Some(joiner_trampoline),
                    ctx,
                )
            }
        })
    }

    fn srp_set_callback(&self, inst: Instance, handler: SrpHandler) -> Result<()> {
        let f = self.library.ot_srp_client_set_callback()?;
        *locked(&self.shared.srp) = Some(handler);
        // SAFETY: the context outlives the registration.
        unsafe { f(inst.as_ptr(), Some(srp_trampoline), self.context()) };
        Ok(())
    }

    fn srp_enable_auto_start(&self, inst: Instance, handler: SrpAutoStartHandler) -> Result<()> {
        let f = self.library.ot_srp_client_enable_auto_start_mode()?;
        *locked(&self.shared.srp_auto_start) = Some(handler);
        // SAFETY: the context outlives the registration.
        unsafe { f(inst.as_ptr(), Some(srp_auto_start_trampoline), self.context()) };
        Ok(())
    }

    fn srp_host_info(&self, inst: Instance) -> Result<SrpHostInfo> {
        let f = self.library.ot_srp_client_get_host_info()?;
        // SAFETY: valid instance; host info owned by the client.
        let raw = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(host_info_from(unsafe { &*raw }))
    }

    fn srp_clear_service(&self, inst: Instance, slot: usize) -> Result<()> {
        let f = self.library.ot_srp_client_clear_service()?;
        let mut services = locked(&self.shared.services);
        let entry = services
            .get_mut(slot)
            .and_then(|s| s.as_mut())
            .ok_or(Error::Stack(OtError::NotFound))?;
        // SAFETY: the service was registered by this stack.
        check(unsafe { f(inst.as_ptr(), &mut entry.service) })?;
        services[slot] = None;
        Ok(())
    }

    fn srp_set_lease_interval(&self, inst: Instance, interval: u32) -> Result<()> {
        let f = self.library.ot_srp_client_set_lease_interval()?;
        // SAFETY: valid instance.
        unsafe { f(inst.as_ptr(), interval) };
        Ok(())
    }

    fn srp_set_key_lease_interval(&self, inst: Instance, interval: u32) -> Result<()> {
        let f = self.library.ot_srp_client_set_key_lease_interval()?;
        // SAFETY: valid instance.
        unsafe { f(inst.as_ptr(), interval) };
        Ok(())
    }

    fn srp_add_service(&self, inst: Instance, slot: usize, service: &SrpServiceDescription<'_>) -> Result<()> {
        let f = self.library.ot_srp_client_add_service()?;
        let mut services = locked(&self.shared.services);
        if services.len() <= slot {
            services.resize_with(slot + 1, || None);
        }
        if services[slot].is_some() {
            return Err(Error::Stack(OtError::Already));
        }
        let mut entry = NativeSrpService::new(service)?;
        // SAFETY: the boxed service stays put until removed or cleared.
        check(unsafe { f(inst.as_ptr(), &mut entry.service) })?;
        services[slot] = Some(entry);
        Ok(())
    }

    fn srp_remove_service(&self, inst: Instance, slot: usize) -> Result<()> {
        let f = self.library.ot_srp_client_remove_service()?;
        let mut services = locked(&self.shared.services);
        let entry = services
            .get_mut(slot)
            .and_then(|s| s.as_mut())
            .ok_or(Error::Stack(OtError::NotFound))?;
        // SAFETY: released when the removal is confirmed.
        check(unsafe { f(inst.as_ptr(), &mut entry.service) })
    }

    fn srp_set_host_name(&self, inst: Instance, name: &str) -> Result<()> {
        let f = self.library.ot_srp_client_set_host_name()?;
        let name = c_string(name)?;
        let mut host_name = locked(&self.shared.host_name);
        // SAFETY: the client keeps the pointer; the string is retained below.
        check(unsafe { f(inst.as_ptr(), name.as_ptr()) })?;
        *host_name = Some(name);
        Ok(())
    }

    fn srp_enable_auto_host_address(&self, inst: Instance) -> Result<()> {
        let f = self.library.ot_srp_client_enable_auto_host_address()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr()) })
    }

    fn srp_set_host_addresses(&self, inst: Instance, addresses: &[Ipv6Addr]) -> Result<()> {
        let f = self.library.ot_srp_client_set_host_addresses()?;
        let raw: Vec<otIp6Address> = addresses.iter().map(ip6_to).collect();
        let mut stored = locked(&self.shared.host_addresses);
        // SAFETY: the client keeps the pointer; the array is retained below.
        check(unsafe { f(inst.as_ptr(), raw.as_ptr(), raw.len() as u8) })?;
        *stored = raw;
        Ok(())
    }

    fn srp_remove_host_and_services(&self, inst: Instance, remove_key_lease: bool, send_unreg: bool) -> Result<()> {
        let f = self.library.ot_srp_client_remove_host_and_services()?;
        // SAFETY: valid instance.
        check(unsafe { f(inst.as_ptr(), remove_key_lease, send_unreg) })
    }

    fn dns_default_config(&self, inst: Instance) -> Result<DnsQueryConfig> {
        let f = self.library.ot_dns_client_get_default_config()?;
        // SAFETY: valid instance; config owned by the client.
        let raw = not_null(unsafe { f(inst.as_ptr()) })?;
        Ok(dns_config_from(unsafe { &*raw }))
    }

    fn set_dns_default_config(&self, inst: Instance, config: &DnsQueryConfig) -> Result<()> {
        let f = self.library.ot_dns_client_set_default_config()?;
        let raw = dns_config_to(config);
        // SAFETY: valid instance; the config is copied.
        unsafe { f(inst.as_ptr(), &raw) };
        Ok(())
    }

    fn txt_entries(&self, txt_data: &[u8]) -> Result<Vec<TxtEntry>> {
        let init = self.library.ot_dns_init_txt_entry_iterator()?;
        let next = self.library.ot_dns_get_next_txt_entry()?;
        // SAFETY: all-zero is a valid iterator before init.
        let mut iterator: otDnsTxtEntryIterator = unsafe { mem::zeroed() };
        // SAFETY: txt_data outlives the iteration.
        unsafe { init(&mut iterator, txt_data.as_ptr(), txt_data.len() as u16) };

        let mut out = Vec::new();
        loop {
            let mut entry = otDnsTxtEntry {
                mKey: ptr::null(),
                mValue: ptr::null(),
                mValueLength: 0,
            };
            // SAFETY: iterator initialized above.
            if unsafe { next(&mut iterator, &mut entry) } != OT_ERROR_NONE {
                break;
            }
            if entry.mKey.is_null() || entry.mValue.is_null() {
                continue;
            }
            // SAFETY: key and value point into the iterator and txt_data.
            let key = unsafe { CStr::from_ptr(entry.mKey) }.to_string_lossy().into_owned();
            let value = unsafe { std::slice::from_raw_parts(entry.mValue, entry.mValueLength as usize) };
            out.push(TxtEntry::new(key, value));
        }
        Ok(out)
    }

    fn dns_browse(&self, inst: Instance, service_name: &str, handler: BrowseHandler) -> Result<()> {
        let f = self.library.ot_dns_client_browse()?;
        let name = c_string(service_name)?;
        let context: Box<BrowseContext> = Box::new((self.library.symbols(), handler));
        submit(context, |ctx| {
            // SAFETY: ctx is reclaimed by the browse callback.
            unsafe { f(inst.as_ptr(), name.as_ptr(), Some(browse_trampoline), ctx, ptr::null()) }
        })
    }

    fn dns_resolve_service(
        &self,
        inst: Instance,
        instance_label: &str,
        service_name: &str,
        handler: ResolveHandler,
    ) -> Result<()> {
        let f = self.library.ot_dns_client_resolve_service()?;
        let label = c_string(instance_label)?;
        let name = c_string(service_name)?;
        let context: Box<ResolveContext> = Box::new((self.library.symbols(), handler));
        submit(context, |ctx| {
            // SAFETY: ctx is reclaimed by the resolve callback.
            unsafe {
                f(
                    inst.as_ptr(),
                    label.as_ptr(),
                    name.as_ptr(),
                    Some(resolve_trampoline),
                    ctx,
                    ptr::null(),
                )
            }
        })
    }

    fn dns_resolve_address(&self, inst: Instance, host_name: &str, handler: AddressHandler) -> Result<()> {
        let f = self.library.ot_dns_client_resolve_address()?;
        let name = c_string(host_name)?;
        let context: Box<AddressContext> = Box::new((self.library.symbols(), handler));
        submit(context, |ctx| {
            // SAFETY: ctx is reclaimed by the address callback.
            unsafe { f(inst.as_ptr(), name.as_ptr(), Some(address_trampoline), ctx, ptr::null()) }
        })
    }
}

fn router_info_from(raw: &otRouterInfo) -> RouterInfo {
    RouterInfo {
        ext_address: raw.mExtAddress.m8,
        rloc16: raw.mRloc16,
        router_id: raw.mRouterId,
        next_hop: raw.mNextHop,
        path_cost: raw.mPathCost,
        link_quality_in: raw.mLinkQualityIn,
        link_quality_out: raw.mLinkQualityOut,
        age: raw.mAge,
        allocated: raw.mBits & ROUTER_ALLOCATED != 0,
        link_established: raw.mBits & ROUTER_LINK_ESTABLISHED != 0,
    }
}
