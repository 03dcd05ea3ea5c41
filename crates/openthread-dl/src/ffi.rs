//! FFI declarations for the subset of the OpenThread C API that the
//! adapter resolves at runtime.
//!
//! Layouts follow the public `openthread/*.h` headers of the OpenThread
//! releases shipped as `libopenthread-<version>`.

#![allow(non_camel_case_types, non_snake_case)]
#![allow(dead_code)]

use libc::{c_char, c_int, c_void, pthread_t};

/// Opaque OpenThread instance.
pub type otInstance = c_void;
/// Opaque message buffer.
pub type otMessage = c_void;
/// Opaque DNS responses, valid only while their callback runs.
pub type otDnsBrowseResponse = c_void;
pub type otDnsServiceResponse = c_void;
pub type otDnsAddressResponse = c_void;
/// Full operational dataset; only passed through, never inspected.
pub type otOperationalDataset = c_void;
pub type otChildInfoOpaque = c_void;

pub type otError = c_int;
pub type otDeviceRole = c_int;
pub type otJoinerState = c_int;
pub type otSrpClientItemState = c_int;
pub type otChangedFlags = u32;
pub type otPanId = u16;
pub type otNetworkDataIterator = u32;
pub type otNeighborInfoIterator = i16;

// Error codes
pub const OT_ERROR_NONE: otError = 0;
pub const OT_ERROR_FAILED: otError = 1;
pub const OT_ERROR_NOT_FOUND: otError = 23;

// Device roles
pub const OT_DEVICE_ROLE_DISABLED: otDeviceRole = 0;
pub const OT_DEVICE_ROLE_DETACHED: otDeviceRole = 1;
pub const OT_DEVICE_ROLE_CHILD: otDeviceRole = 2;
pub const OT_DEVICE_ROLE_ROUTER: otDeviceRole = 3;
pub const OT_DEVICE_ROLE_LEADER: otDeviceRole = 4;

// State change flags
pub const OT_CHANGED_IP6_ADDRESS_ADDED: otChangedFlags = 1 << 0;
pub const OT_CHANGED_IP6_ADDRESS_REMOVED: otChangedFlags = 1 << 1;
pub const OT_CHANGED_THREAD_ROLE: otChangedFlags = 1 << 2;
pub const OT_CHANGED_THREAD_CHILD_ADDED: otChangedFlags = 1 << 10;
pub const OT_CHANGED_THREAD_CHILD_REMOVED: otChangedFlags = 1 << 11;
pub const OT_CHANGED_THREAD_NETDATA: otChangedFlags = 1 << 9;

// Joiner states
pub const OT_JOINER_STATE_IDLE: otJoinerState = 0;

// SRP client item states
pub const OT_SRP_CLIENT_ITEM_STATE_TO_ADD: otSrpClientItemState = 0;
pub const OT_SRP_CLIENT_ITEM_STATE_REMOVED: otSrpClientItemState = 6;

// Address origins
pub const OT_ADDRESS_ORIGIN_THREAD: u8 = 0;
pub const OT_ADDRESS_ORIGIN_SLAAC: u8 = 1;
pub const OT_ADDRESS_ORIGIN_DHCPV6: u8 = 2;
pub const OT_ADDRESS_ORIGIN_MANUAL: u8 = 3;

pub const OT_PANID_BROADCAST: otPanId = 0xffff;
pub const OT_NETWORK_DATA_ITERATOR_INIT: otNetworkDataIterator = 0;
pub const OT_NEIGHBOR_INFO_ITERATOR_INIT: otNeighborInfoIterator = 0;
pub const OT_RADIO_RSSI_INVALID: i8 = 127;
pub const OT_US_PER_TEN_SYMBOLS: u32 = 160;

pub const OT_OPERATIONAL_DATASET_MAX_LENGTH: usize = 254;
pub const OT_NETWORK_NAME_MAX_SIZE: usize = 16;
pub const OT_EXT_ADDRESS_SIZE: usize = 8;
pub const OT_NETWORK_KEY_SIZE: usize = 16;
pub const OT_DNS_TXT_KEY_ITER_MAX_LENGTH: usize = 64;
pub const OT_JOINER_MAX_PSKD_LENGTH: usize = 32;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otIp6Address {
    pub m8: [u8; 16],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otIp6Prefix {
    pub mPrefix: otIp6Address,
    pub mLength: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otExtAddress {
    pub m8: [u8; OT_EXT_ADDRESS_SIZE],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otExtendedPanId {
    pub m8: [u8; 8],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otMeshLocalPrefix {
    pub m8: [u8; 8],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otNetworkKey {
    pub m8: [u8; OT_NETWORK_KEY_SIZE],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otNetworkName {
    pub m8: [c_char; OT_NETWORK_NAME_MAX_SIZE + 1],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otSteeringData {
    pub mLength: u8,
    pub m8: [u8; 16],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otOperationalDatasetTlvs {
    pub mTlvs: [u8; OT_OPERATIONAL_DATASET_MAX_LENGTH],
    pub mLength: u8,
}

/// `mRxOnWhenIdle:1, mDeviceType:1, mNetworkData:1` packed into one byte.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct otLinkModeConfig {
    pub bits: u8,
}

pub const LINK_MODE_RX_ON_WHEN_IDLE: u8 = 1 << 0;
pub const LINK_MODE_DEVICE_TYPE: u8 = 1 << 1;
pub const LINK_MODE_NETWORK_DATA: u8 = 1 << 2;

#[repr(C, align(4))]
#[derive(Clone, Copy)]
pub struct otActiveScanResult {
    pub mExtAddress: otExtAddress,
    pub mNetworkName: otNetworkName,
    pub mExtendedPanId: otExtendedPanId,
    pub mSteeringData: otSteeringData,
    pub mPanId: u16,
    pub mJoinerUdpPort: u16,
    pub mChannel: u8,
    pub mRssi: i8,
    pub mLqi: u8,
    /// `mVersion:4, mIsNative:1, mDiscover:1, mIsJoinable:1`.
    pub mBits: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otMacCounters {
    pub mTxTotal: u32,
    pub mTxUnicast: u32,
    pub mTxBroadcast: u32,
    pub mTxAckRequested: u32,
    pub mTxAcked: u32,
    pub mTxNoAckRequested: u32,
    pub mTxData: u32,
    pub mTxDataPoll: u32,
    pub mTxBeacon: u32,
    pub mTxBeaconRequest: u32,
    pub mTxOther: u32,
    pub mTxRetry: u32,
    pub mTxDirectMaxRetryExpiry: u32,
    pub mTxIndirectMaxRetryExpiry: u32,
    pub mTxErrCca: u32,
    pub mTxErrAbort: u32,
    pub mTxErrBusyChannel: u32,
    pub mRxTotal: u32,
    pub mRxUnicast: u32,
    pub mRxBroadcast: u32,
    pub mRxData: u32,
    pub mRxDataPoll: u32,
    pub mRxBeacon: u32,
    pub mRxBeaconRequest: u32,
    pub mRxOther: u32,
    pub mRxAddressFiltered: u32,
    pub mRxDestAddrFiltered: u32,
    pub mRxDuplicated: u32,
    pub mRxErrNoFrame: u32,
    pub mRxErrUnknownNeighbor: u32,
    pub mRxErrInvalidSrcAddr: u32,
    pub mRxErrSec: u32,
    pub mRxErrFcs: u32,
    pub mRxErrOther: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otIpCounters {
    pub mTxSuccess: u32,
    pub mRxSuccess: u32,
    pub mTxFailure: u32,
    pub mRxFailure: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otMleCounters {
    pub mDisabledRole: u16,
    pub mDetachedRole: u16,
    pub mChildRole: u16,
    pub mRouterRole: u16,
    pub mLeaderRole: u16,
    pub mAttachAttempts: u16,
    pub mPartitionIdChanges: u16,
    pub mBetterPartitionAttachAttempts: u16,
    pub mParentChanges: u16,
}

#[repr(C)]
pub struct otNetifAddress {
    pub mAddress: otIp6Address,
    pub mPrefixLength: u8,
    pub mAddressOrigin: u8,
    /// `mPreferred:1, mValid:1, mScopeOverrideValid:1, mScopeOverride:4,
    /// mRloc:1, mMeshLocal:1, mSrpRegistered:1`.
    pub mBits: u16,
    pub mNext: *const otNetifAddress,
}

pub const NETIF_ADDRESS_PREFERRED: u16 = 1 << 0;
pub const NETIF_ADDRESS_VALID: u16 = 1 << 1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otExternalRouteConfig {
    pub mPrefix: otIp6Prefix,
    pub mRloc16: u16,
    /// `mPreference:2, mNat64:1, mStable:1, mNextHopIsThisDevice:1, mAdvPio:1`,
    /// packed into a `signed int` unit.
    pub mBits: u32,
}

pub const EXTERNAL_ROUTE_NEXT_HOP_IS_THIS_DEVICE: u32 = 1 << 4;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otNeighborInfo {
    pub mExtAddress: otExtAddress,
    pub mAge: u32,
    pub mConnectionTime: u32,
    pub mRloc16: u16,
    pub mLinkFrameCounter: u32,
    pub mMleFrameCounter: u32,
    pub mLinkQualityIn: u8,
    pub mAverageRssi: i8,
    pub mLastRssi: i8,
    pub mLinkMargin: u8,
    pub mFrameErrorRate: u16,
    pub mMessageErrorRate: u16,
    pub mVersion: u16,
    /// `mRxOnWhenIdle:1, mFullThreadDevice:1, mFullNetworkData:1, mIsChild:1`.
    pub mBits: u8,
}

pub const NEIGHBOR_RX_ON_WHEN_IDLE: u8 = 1 << 0;
pub const NEIGHBOR_FULL_THREAD_DEVICE: u8 = 1 << 1;
pub const NEIGHBOR_FULL_NETWORK_DATA: u8 = 1 << 2;
pub const NEIGHBOR_IS_CHILD: u8 = 1 << 3;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otRouterInfo {
    pub mExtAddress: otExtAddress,
    pub mRloc16: u16,
    pub mRouterId: u8,
    pub mNextHop: u8,
    pub mPathCost: u8,
    pub mLinkQualityIn: u8,
    pub mLinkQualityOut: u8,
    pub mAge: u8,
    /// `mAllocated:1, mLinkEstablished:1`.
    pub mBits: u8,
    pub mVersion: u8,
    pub mCslClockAccuracy: u8,
    pub mCslUncertainty: u8,
}

pub const ROUTER_ALLOCATED: u8 = 1 << 0;
pub const ROUTER_LINK_ESTABLISHED: u8 = 1 << 1;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otChildInfo {
    pub mExtAddress: otExtAddress,
    pub mTimeout: u32,
    pub mAge: u32,
    pub mConnectionTime: u64,
    pub mRloc16: u16,
    pub mChildId: u16,
    pub mNetworkDataVersion: u8,
    pub mLinkQualityIn: u8,
    pub mAverageRssi: i8,
    pub mLastRssi: i8,
    pub mFrameErrorRate: u16,
    pub mMessageErrorRate: u16,
    pub mQueuedMessageCnt: u16,
    pub mSupervisionInterval: u16,
    pub mVersion: u8,
    pub mBits: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otJoinerDiscerner {
    pub mValue: u64,
    pub mLength: u8,
}

#[repr(C)]
pub struct otDnsTxtEntry {
    pub mKey: *const c_char,
    pub mValue: *const u8,
    pub mValueLength: u16,
}

#[repr(C)]
pub struct otDnsTxtEntryIterator {
    pub mPtr: *const c_void,
    pub mData: [u16; 2],
    pub mChar: [c_char; OT_DNS_TXT_KEY_ITER_MAX_LENGTH + 1],
}

#[repr(C)]
pub struct otSrpClientService {
    pub mName: *const c_char,
    pub mInstanceName: *const c_char,
    pub mSubTypeLabels: *const *const c_char,
    pub mTxtEntries: *const otDnsTxtEntry,
    pub mPort: u16,
    pub mPriority: u16,
    pub mWeight: u16,
    pub mNumTxtEntries: u8,
    pub mState: otSrpClientItemState,
    pub mData: u32,
    pub mNext: *mut otSrpClientService,
    pub mLease: u32,
    pub mKeyLease: u32,
}

#[repr(C)]
pub struct otSrpClientHostInfo {
    pub mName: *const c_char,
    pub mAddresses: *const otIp6Address,
    pub mNumAddresses: u8,
    pub mAutoAddress: bool,
    pub mState: otSrpClientItemState,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otSockAddr {
    pub mAddress: otIp6Address,
    pub mPort: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct otDnsQueryConfig {
    pub mServerSockAddr: otSockAddr,
    pub mResponseTimeout: u32,
    pub mMaxTxAttempts: u8,
    pub mRecursionFlag: c_int,
    pub mNat64Mode: c_int,
    pub mServiceMode: c_int,
    pub mTransportProto: c_int,
}

#[repr(C)]
pub struct otDnsServiceInfo {
    pub mTtl: u32,
    pub mPort: u16,
    pub mPriority: u16,
    pub mWeight: u16,
    pub mHostNameBuffer: *mut c_char,
    pub mHostNameBufferSize: u16,
    pub mHostAddress: otIp6Address,
    pub mHostAddressTtl: u32,
    pub mTxtData: *mut u8,
    pub mTxtDataSize: u16,
    pub mTxtDataTruncated: bool,
    pub mTxtDataTtl: u32,
}

/// State change callback type
pub type otStateChangedCallback = Option<unsafe extern "C" fn(flags: otChangedFlags, context: *mut c_void)>;

/// Discovery result callback type, `result` is null once the scan completes
pub type otHandleActiveScanResult =
    Option<unsafe extern "C" fn(result: *mut otActiveScanResult, context: *mut c_void)>;

pub type otJoinerCallback = Option<unsafe extern "C" fn(error: otError, context: *mut c_void)>;

/// SRP client notification callback type
pub type otSrpClientCallback = Option<
    unsafe extern "C" fn(
        error: otError,
        host_info: *const otSrpClientHostInfo,
        services: *const otSrpClientService,
        removed_services: *const otSrpClientService,
        context: *mut c_void,
    ),
>;

pub type otSrpClientAutoStartCallback =
    Option<unsafe extern "C" fn(server_sock_addr: *const otSockAddr, context: *mut c_void)>;

pub type otDnsBrowseCallback =
    Option<unsafe extern "C" fn(error: otError, response: *const otDnsBrowseResponse, context: *mut c_void)>;

pub type otDnsServiceCallback =
    Option<unsafe extern "C" fn(error: otError, response: *const otDnsServiceResponse, context: *mut c_void)>;

pub type otDnsAddressCallback =
    Option<unsafe extern "C" fn(error: otError, response: *const otDnsAddressResponse, context: *mut c_void)>;

// Instance and locking
pub type FnOtGetInstance =
    unsafe extern "C" fn(instance: *mut *mut otInstance, thread_id: *mut pthread_t, com_port: *const c_char, debug: u16);
pub type FnOtDestroyInstance = unsafe extern "C" fn();
pub type FnOtLock = unsafe extern "C" fn();
pub type FnOtUnlock = unsafe extern "C" fn();
pub type FnOtInstanceInitSingle = unsafe extern "C" fn() -> *mut otInstance;
pub type FnOtSetStateChangedCallback =
    unsafe extern "C" fn(instance: *mut otInstance, callback: otStateChangedCallback, context: *mut c_void) -> otError;
pub type FnOtInstanceErasePersistentInfo = unsafe extern "C" fn(instance: *mut otInstance) -> otError;

// IPv6
pub type FnOtIp6SetSlaacEnabled = unsafe extern "C" fn(instance: *mut otInstance, enabled: bool);
pub type FnOtIp6SetEnabled = unsafe extern "C" fn(instance: *mut otInstance, enabled: bool) -> otError;
pub type FnOtIp6IsEnabled = unsafe extern "C" fn(instance: *mut otInstance) -> bool;
pub type FnOtIp6GetUnicastAddresses = unsafe extern "C" fn(instance: *mut otInstance) -> *const otNetifAddress;

// Dataset
pub type FnOtDatasetIsCommissioned = unsafe extern "C" fn(instance: *mut otInstance) -> bool;
pub type FnOtDatasetSetActiveTlvs =
    unsafe extern "C" fn(instance: *mut otInstance, dataset: *const otOperationalDatasetTlvs) -> otError;
pub type FnOtDatasetGetActiveTlvs =
    unsafe extern "C" fn(instance: *mut otInstance, dataset: *mut otOperationalDatasetTlvs) -> otError;
pub type FnOtDatasetGetActive =
    unsafe extern "C" fn(instance: *mut otInstance, dataset: *mut otOperationalDataset) -> otError;

// Thread
pub type FnOtThreadGetDeviceRole = unsafe extern "C" fn(instance: *mut otInstance) -> otDeviceRole;
pub type FnOtThreadSetEnabled = unsafe extern "C" fn(instance: *mut otInstance, enabled: bool) -> otError;
pub type FnOtThreadErrorToString = unsafe extern "C" fn(error: otError) -> *const c_char;
pub type FnOtThreadBecomeChild = unsafe extern "C" fn(instance: *mut otInstance) -> otError;
pub type FnOtThreadDiscover = unsafe extern "C" fn(
    instance: *mut otInstance,
    scan_channels: u32,
    pan_id: u16,
    joiner: bool,
    enable_eui64_filtering: bool,
    callback: otHandleActiveScanResult,
    context: *mut c_void,
) -> otError;
pub type FnOtThreadGetLinkMode = unsafe extern "C" fn(instance: *mut otInstance) -> otLinkModeConfig;
pub type FnOtThreadSetLinkMode = unsafe extern "C" fn(instance: *mut otInstance, config: otLinkModeConfig) -> otError;
pub type FnOtThreadIsRouterEligible = unsafe extern "C" fn(instance: *mut otInstance) -> bool;
pub type FnOtThreadSetRouterEligible = unsafe extern "C" fn(instance: *mut otInstance, eligible: bool) -> otError;
pub type FnOtThreadGetNetworkKey = unsafe extern "C" fn(instance: *mut otInstance, key: *mut otNetworkKey);
pub type FnOtThreadGetNetworkName = unsafe extern "C" fn(instance: *mut otInstance) -> *const c_char;
pub type FnOtThreadGetExtendedPanId = unsafe extern "C" fn(instance: *mut otInstance) -> *const otExtendedPanId;
pub type FnOtThreadGetMeshLocalPrefix = unsafe extern "C" fn(instance: *mut otInstance) -> *const otMeshLocalPrefix;
pub type FnOtThreadGetNextNeighborInfo = unsafe extern "C" fn(
    instance: *mut otInstance,
    iterator: *mut otNeighborInfoIterator,
    info: *mut otNeighborInfo,
) -> otError;
pub type FnOtThreadGetIp6Counters = unsafe extern "C" fn(instance: *mut otInstance) -> *const otIpCounters;
pub type FnOtThreadGetRloc16 = unsafe extern "C" fn(instance: *mut otInstance) -> u16;
pub type FnOtThreadGetLeaderRouterId = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtThreadGetParentAverageRssi = unsafe extern "C" fn(instance: *mut otInstance, rssi: *mut i8) -> otError;
pub type FnOtThreadGetParentLastRssi = unsafe extern "C" fn(instance: *mut otInstance, rssi: *mut i8) -> otError;
pub type FnOtThreadGetPartitionId = unsafe extern "C" fn(instance: *mut otInstance) -> u32;
pub type FnOtThreadGetLeaderRloc = unsafe extern "C" fn(instance: *mut otInstance, rloc: *mut otIp6Address) -> otError;
pub type FnOtThreadGetLeaderWeight = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtThreadGetLocalLeaderWeight = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtThreadGetChildInfoById =
    unsafe extern "C" fn(instance: *mut otInstance, child_id: u16, info: *mut otChildInfo) -> otError;
pub type FnOtThreadGetMaxRouterId = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtThreadGetRouterInfo =
    unsafe extern "C" fn(instance: *mut otInstance, router_id: u16, info: *mut otRouterInfo) -> otError;
pub type FnOtThreadGetParentInfo = unsafe extern "C" fn(instance: *mut otInstance, info: *mut otRouterInfo) -> otError;
pub type FnOtThreadGetMleCounters = unsafe extern "C" fn(instance: *mut otInstance) -> *const otMleCounters;

// Network data
pub type FnOtNetDataGetNextRoute = unsafe extern "C" fn(
    instance: *mut otInstance,
    iterator: *mut otNetworkDataIterator,
    config: *mut otExternalRouteConfig,
) -> otError;
pub type FnOtNetDataGet =
    unsafe extern "C" fn(instance: *mut otInstance, stable: bool, data: *mut u8, data_length: *mut u8) -> otError;
pub type FnOtNetDataGetVersion = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtNetDataGetStableVersion = unsafe extern "C" fn(instance: *mut otInstance) -> u8;

// Link and radio
pub type FnOtLinkGetCounters = unsafe extern "C" fn(instance: *mut otInstance) -> *const otMacCounters;
pub type FnOtLinkGetExtendedAddress = unsafe extern "C" fn(instance: *mut otInstance) -> *const otExtAddress;
pub type FnOtLinkGetChannel = unsafe extern "C" fn(instance: *mut otInstance) -> u8;
pub type FnOtLinkGetPanId = unsafe extern "C" fn(instance: *mut otInstance) -> otPanId;
pub type FnOtLinkGetPollPeriod = unsafe extern "C" fn(instance: *mut otInstance) -> u32;
pub type FnOtLinkSetPollPeriod = unsafe extern "C" fn(instance: *mut otInstance, period: u32) -> otError;
pub type FnOtLinkCslGetPeriod = unsafe extern "C" fn(instance: *mut otInstance) -> u16;
pub type FnOtLinkCslSetPeriod = unsafe extern "C" fn(instance: *mut otInstance, period: u16) -> otError;
pub type FnOtPlatRadioGetIeeeEui64 = unsafe extern "C" fn(instance: *mut otInstance, eui64: *mut u8);
pub type FnOtPlatRadioGetRssi = unsafe extern "C" fn(instance: *mut otInstance) -> i8;

// Joiner
pub type FnOtJoinerGetState = unsafe extern "C" fn(instance: *mut otInstance) -> otJoinerState;
pub type FnOtJoinerSetDiscerner =
    unsafe extern "C" fn(instance: *mut otInstance, discerner: *mut otJoinerDiscerner) -> otError;
pub type FnOtJoinerStart = unsafe extern "C" fn(
    instance: *mut otInstance,
    pskd: *const c_char,
    provisioning_url: *const c_char,
    vendor_name: *const c_char,
    vendor_model: *const c_char,
    vendor_sw_version: *const c_char,
    vendor_data: *const c_char,
    callback: otJoinerCallback,
    context: *mut c_void,
) -> otError;

// SRP client
pub type FnOtSrpClientSetCallback =
    unsafe extern "C" fn(instance: *mut otInstance, callback: otSrpClientCallback, context: *mut c_void);
pub type FnOtSrpClientEnableAutoStartMode =
    unsafe extern "C" fn(instance: *mut otInstance, callback: otSrpClientAutoStartCallback, context: *mut c_void);
pub type FnOtSrpClientGetHostInfo = unsafe extern "C" fn(instance: *mut otInstance) -> *const otSrpClientHostInfo;
pub type FnOtSrpClientClearService =
    unsafe extern "C" fn(instance: *mut otInstance, service: *mut otSrpClientService) -> otError;
pub type FnOtSrpClientSetLeaseInterval = unsafe extern "C" fn(instance: *mut otInstance, interval: u32);
pub type FnOtSrpClientSetKeyLeaseInterval = unsafe extern "C" fn(instance: *mut otInstance, interval: u32);
pub type FnOtSrpClientAddService =
    unsafe extern "C" fn(instance: *mut otInstance, service: *mut otSrpClientService) -> otError;
pub type FnOtSrpClientRemoveService =
    unsafe extern "C" fn(instance: *mut otInstance, service: *mut otSrpClientService) -> otError;
pub type FnOtSrpClientSetHostName = unsafe extern "C" fn(instance: *mut otInstance, name: *const c_char) -> otError;
pub type FnOtSrpClientEnableAutoHostAddress = unsafe extern "C" fn(instance: *mut otInstance) -> otError;
pub type FnOtSrpClientSetHostAddresses =
    unsafe extern "C" fn(instance: *mut otInstance, addresses: *const otIp6Address, count: u8) -> otError;
pub type FnOtSrpClientRemoveHostAndServices =
    unsafe extern "C" fn(instance: *mut otInstance, remove_key_lease: bool, send_unreg_to_server: bool) -> otError;

// DNS client
pub type FnOtDnsClientGetDefaultConfig = unsafe extern "C" fn(instance: *mut otInstance) -> *const otDnsQueryConfig;
pub type FnOtDnsClientSetDefaultConfig =
    unsafe extern "C" fn(instance: *mut otInstance, config: *const otDnsQueryConfig);
pub type FnOtDnsInitTxtEntryIterator =
    unsafe extern "C" fn(iterator: *mut otDnsTxtEntryIterator, txt_data: *const u8, txt_data_length: u16);
pub type FnOtDnsGetNextTxtEntry =
    unsafe extern "C" fn(iterator: *mut otDnsTxtEntryIterator, entry: *mut otDnsTxtEntry) -> otError;
pub type FnOtDnsBrowseResponseGetServiceName =
    unsafe extern "C" fn(response: *const otDnsBrowseResponse, name: *mut c_char, name_size: u16) -> otError;
pub type FnOtDnsBrowseResponseGetServiceInstance = unsafe extern "C" fn(
    response: *const otDnsBrowseResponse,
    index: u16,
    label: *mut c_char,
    label_size: u8,
) -> otError;
pub type FnOtDnsBrowseResponseGetServiceInfo = unsafe extern "C" fn(
    response: *const otDnsBrowseResponse,
    instance_label: *const c_char,
    info: *mut otDnsServiceInfo,
) -> otError;
pub type FnOtDnsClientBrowse = unsafe extern "C" fn(
    instance: *mut otInstance,
    service_name: *const c_char,
    callback: otDnsBrowseCallback,
    context: *mut c_void,
    config: *const otDnsQueryConfig,
) -> otError;
pub type FnOtDnsServiceResponseGetServiceName = unsafe extern "C" fn(
    response: *const otDnsServiceResponse,
    label: *mut c_char,
    label_size: u8,
    name: *mut c_char,
    name_size: u16,
) -> otError;
pub type FnOtDnsServiceResponseGetServiceInfo =
    unsafe extern "C" fn(response: *const otDnsServiceResponse, info: *mut otDnsServiceInfo) -> otError;
pub type FnOtDnsClientResolveService = unsafe extern "C" fn(
    instance: *mut otInstance,
    instance_label: *const c_char,
    service_name: *const c_char,
    callback: otDnsServiceCallback,
    context: *mut c_void,
    config: *const otDnsQueryConfig,
) -> otError;
pub type FnOtDnsClientResolveAddress = unsafe extern "C" fn(
    instance: *mut otInstance,
    host_name: *const c_char,
    callback: otDnsAddressCallback,
    context: *mut c_void,
    config: *const otDnsQueryConfig,
) -> otError;
pub type FnOtDnsAddressResponseGetAddress = unsafe extern "C" fn(
    response: *const otDnsAddressResponse,
    index: u16,
    address: *mut otIp6Address,
    ttl: *mut u32,
) -> otError;

// Messages
pub type FnOtMessageRead =
    unsafe extern "C" fn(message: *const otMessage, offset: u16, buf: *mut c_void, length: u16) -> u16;
pub type FnOtMessageGetLength = unsafe extern "C" fn(message: *const otMessage) -> u16;

/// Default `dlopen` flags: lazy binding, symbols made globally visible.
pub fn default_open_flags() -> c_int {
    libc::RTLD_LAZY | libc::RTLD_GLOBAL
}

/// Copies a NUL-terminated C buffer into an owned string.
pub(crate) fn c_buf_to_string(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn packed_layouts_match_headers() {
        assert_eq!(size_of::<otIp6Address>(), 16);
        assert_eq!(align_of::<otIp6Address>(), 1);
        assert_eq!(size_of::<otOperationalDatasetTlvs>(), 255);
        assert_eq!(size_of::<otLinkModeConfig>(), 1);
        assert_eq!(size_of::<otActiveScanResult>(), 60);
        assert_eq!(size_of::<otExternalRouteConfig>(), 24);
        assert_eq!(align_of::<otExternalRouteConfig>(), 4);
        assert_eq!(size_of::<otMacCounters>(), 34 * 4);
    }

    #[test]
    fn c_buf_stops_at_nul() {
        let raw: [c_char; 6] = [b'a' as c_char, b'b' as c_char, 0, b'x' as c_char, 0, 0];
        assert_eq!(c_buf_to_string(&raw), "ab");
    }
}
