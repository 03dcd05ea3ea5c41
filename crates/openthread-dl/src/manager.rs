//! Thread stack adapter.
//!
//! [`ThreadStackManager`] drives one OpenThread instance through a
//! [`ThreadStack`] and reports to the platform through a [`PlatformLayer`].
//!
//! Locking: every stack access happens inside a [`StackGuard`]. The adapter's
//! own state sits behind a mutex that is only ever taken after the stack lock
//! (or with no stack lock held at all), and user callbacks always run with
//! neither lock held. Handlers registered with the stack never do real work
//! inline; they capture what they need and schedule the rest on the platform
//! event loop.

use std::mem;
use std::net::{IpAddr, Ipv6Addr, SocketAddrV6};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::dataset::{MAX_DATASET_LENGTH, OperationalDataset};
use crate::dnssd::{self, DnssdService};
use crate::error::{Error, OtError, Result};
use crate::platform::{ConnectivityChange, DeviceEvent, EventLoop, PlatformLayer, TimerId};
use crate::srp::{DnsAsyncCallback, SrpClient, SrpService};
use crate::stack::{
    ActiveScanResult, AddressHandler, AddressOrigin, BrowseHandler, DeviceRole, DnsAddressResponse,
    DnsBrowseResponse, DnsServiceResponse, Instance, JoinerDiscerner, JoinerHandler, JoinerState, ResolveHandler,
    ScanHandler, SrpAutoStartHandler, SrpHandler, SrpNotification, StackGuard, StateChangedHandler, StateFlags,
    ThreadStack, TxtEntry,
};

type StdResult<T, E> = std::result::Result<T, E>;

/// Scan responses kept per discovery; later ones are dropped.
pub const MAX_SCAN_RESULTS: usize = 32;

pub const BROADCAST_PAN_ID: u16 = 0xffff;

/// Length in bits of the joiner discerner built from the discriminator.
pub const JOINER_DISCERNER_LENGTH: u8 = 12;

/// Microseconds per ten 802.15.4 symbols, the unit of the CSL period.
const US_PER_TEN_SYMBOLS: u64 = 160;

pub const SED_DELAY_IDLE_TIMER: TimerId = TimerId(1);

pub type ConnectCallback = Box<dyn FnOnce(Result<()>) + Send>;
pub type ScanCallback = Box<dyn FnOnce(Result<Vec<ActiveScanResult>>) + Send>;
pub type StatusChangeCallback = Arc<dyn Fn(NetworkStatusReport) + Send + Sync>;
pub type DnsBrowseCallback = Arc<dyn Fn(BrowseEvent) + Send + Sync>;
pub type DnsResolveCallback = Box<dyn FnOnce(Result<DnssdService>) + Send>;
pub type DnsAddressCallback = Box<dyn FnOnce(Result<Vec<(Ipv6Addr, u32)>>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadDeviceType {
    NotSupported,
    Router,
    FullEndDevice,
    MinimalEndDevice,
    SleepyEndDevice,
    SynchronizedSleepyEndDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Success,
    NetworkNotFound,
}

/// Reported to the status change callback whenever the stack state moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatusReport {
    pub status: NetworkStatus,
    pub extended_pan_id: [u8; 8],
    pub error: Option<OtError>,
}

/// One step of a DNS-SD browse. Every found instance is delivered on its own,
/// followed by exactly one `Finished`.
#[derive(Debug)]
pub enum BrowseEvent {
    Found(DnssdService),
    Finished(Result<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SedIntervalsConfig {
    pub active_interval: Duration,
    pub idle_interval: Duration,
}

impl Default for SedIntervalsConfig {
    fn default() -> Self {
        SedIntervalsConfig {
            active_interval: Duration::from_millis(200),
            idle_interval: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SedIntervalMode {
    Idle,
    Active,
}

/// Build-time capabilities of the device and its commissioning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub ftd: bool,
    pub sleepy: bool,
    pub synchronized_sleepy: bool,
    pub sed_intervals: SedIntervalsConfig,
    /// How long active mode is held after the last consumer asked for a
    /// delayed return to idle.
    pub sed_active_threshold: Duration,
    pub joiner_discriminator: u16,
    pub joiner_pincode: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            ftd: true,
            sleepy: false,
            synchronized_sleepy: false,
            sed_intervals: SedIntervalsConfig::default(),
            sed_active_threshold: Duration::from_millis(1000),
            joiner_discriminator: 3840,
            joiner_pincode: 20202021,
        }
    }
}

struct SedState {
    config: SedIntervalsConfig,
    mode: SedIntervalMode,
    active_consumers: u32,
    delay_idle_running: bool,
}

struct AdapterState {
    instance: Option<Instance>,
    is_attached: bool,
    connect_callback: Option<ConnectCallback>,
    scan_callback: Option<ScanCallback>,
    temporary_rx_on_when_idle: bool,
    status_callback: Option<StatusChangeCallback>,
    sed: SedState,
    srp: SrpClient,
    overrun_count: u64,
}

pub struct ThreadStackManager {
    stack: Arc<dyn ThreadStack>,
    platform: Arc<dyn PlatformLayer>,
    config: AdapterConfig,
    state: Mutex<AdapterState>,
    this: Weak<ThreadStackManager>,
}

fn defer(platform: &dyn PlatformLayer, what: &str, work: impl FnOnce() + Send + 'static) {
    if let Err(e) = platform.schedule_work(Box::new(work)) {
        log::error!("failed to schedule {}: {}", what, e);
    }
}

impl ThreadStackManager {
    pub fn new(stack: Arc<dyn ThreadStack>, platform: Arc<dyn PlatformLayer>, config: AdapterConfig) -> Arc<Self> {
        let sed = SedState {
            config: config.sed_intervals,
            mode: SedIntervalMode::Idle,
            active_consumers: 0,
            delay_idle_running: false,
        };
        Arc::new_cyclic(|this: &Weak<ThreadStackManager>| ThreadStackManager {
            stack,
            platform,
            config,
            state: Mutex::new(AdapterState {
                instance: None,
                is_attached: false,
                connect_callback: None,
                scan_callback: None,
                temporary_rx_on_when_idle: false,
                status_callback: None,
                sed,
                srp: SrpClient::default(),
                overrun_count: 0,
            }),
            this: this.clone(),
        })
    }

    /// Routes platform events back into the adapter.
    pub fn register(self: &Arc<Self>, event_loop: &EventLoop) {
        let this = Arc::downgrade(self);
        event_loop.add_event_handler(Arc::new(move |event: &DeviceEvent| {
            if let Some(this) = this.upgrade() {
                this.on_platform_event(event);
            }
        }));
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn stack(&self) -> &Arc<dyn ThreadStack> {
        &self.stack
    }

    fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn instance(&self) -> Option<Instance> {
        self.lock_state().instance
    }

    /// Runs `f` with the stack locked.
    pub(crate) fn with_stack<R>(&self, f: impl FnOnce(&dyn ThreadStack, Instance) -> Result<R>) -> Result<R> {
        let _guard = StackGuard::new(self.stack.as_ref());
        let inst = self.instance().ok_or(Error::Uninitialized)?;
        f(self.stack.as_ref(), inst)
    }

    /// Detaches the adapter from its instance. Must run before the instance
    /// is destroyed; every later operation fails with `Uninitialized`.
    pub fn deinit(&self) {
        let (connect, scan) = {
            let _guard = StackGuard::new(self.stack.as_ref());
            let mut state = self.lock_state();
            state.instance = None;
            state.is_attached = false;
            state.temporary_rx_on_when_idle = false;
            state.sed.active_consumers = 0;
            state.sed.delay_idle_running = false;
            state.srp.reset();
            (state.connect_callback.take(), state.scan_callback.take())
        };
        self.platform.cancel_timer(SED_DELAY_IDLE_TIMER);

        if let Some(callback) = connect {
            callback(Err(Error::Uninitialized));
        }
        if let Some(callback) = scan {
            callback(Err(Error::Uninitialized));
        }
        log::info!("Thread stack adapter detached from its instance");
    }

    /// Brings the adapter up on `instance`, or on a freshly initialised
    /// single instance when none is given.
    pub fn do_init(&self, instance: Option<Instance>) -> Result<()> {
        let inst = match instance {
            Some(inst) => inst,
            None => self.stack.init_single()?,
        };
        {
            let mut state = self.lock_state();
            state.instance = Some(inst);
            state.srp.reset();
        }

        if self.config.sleepy {
            let intervals = self.config.sed_intervals;
            self.set_sed_intervals_config(intervals)?;
        }

        let _guard = StackGuard::new(self.stack.as_ref());
        let stack = self.stack.as_ref();

        stack.set_state_changed_callback(inst, self.state_changed_handler())?;

        if let Err(e) = stack.ip6_set_slaac_enabled(inst, true) {
            log::warn!("failed to enable SLAAC: {}", e);
        }
        if let Err(e) = stack.srp_set_callback(inst, self.srp_handler()) {
            log::warn!("SRP client unavailable: {}", e);
        }
        if let Err(e) = stack.srp_enable_auto_start(inst, self.srp_auto_start_handler()) {
            log::warn!("SRP auto start unavailable: {}", e);
        }

        // Rejoin the stored network after a restart.
        if stack.device_role(inst)? == DeviceRole::Disabled && stack.dataset_is_commissioned(inst)? {
            stack.ip6_set_enabled(inst, true)?;
            stack.thread_set_enabled(inst, true)?;
        }

        log::info!("OpenThread started");
        Ok(())
    }

    fn state_changed_handler(&self) -> StateChangedHandler {
        let platform = self.platform.clone();
        let this = self.this.clone();
        Box::new(move |flags: StateFlags| {
            let event = DeviceEvent::ThreadStateChange {
                role_changed: flags.contains(StateFlags::THREAD_ROLE),
                address_changed: flags
                    .intersects(StateFlags::IP6_ADDRESS_ADDED.union(StateFlags::IP6_ADDRESS_REMOVED)),
                net_data_changed: flags.contains(StateFlags::THREAD_NETDATA),
                child_nodes_changed: flags
                    .intersects(StateFlags::THREAD_CHILD_ADDED.union(StateFlags::THREAD_CHILD_REMOVED)),
                flags: flags.0,
            };
            if let Err(e) = platform.post_event(event) {
                log::error!("failed to post Thread state change: {}", e);
            }
            let this = this.clone();
            defer(platform.as_ref(), "network status update", move || {
                if let Some(this) = this.upgrade() {
                    this.update_network_status();
                }
            });
        })
    }

    /// Reacts to the events posted by the state change handler.
    pub fn on_platform_event(&self, event: &DeviceEvent) {
        let DeviceEvent::ThreadStateChange { role_changed: true, .. } = event else {
            return;
        };

        let attached = self.is_thread_attached();
        {
            let mut state = self.lock_state();
            if attached == state.is_attached {
                return;
            }
            let change = if attached {
                ConnectivityChange::Established
            } else {
                ConnectivityChange::Lost
            };
            if let Err(e) = self.platform.post_event(DeviceEvent::ThreadConnectivityChange(change)) {
                log::error!("failed to post Thread connectivity change: {}", e);
                return;
            }
            state.is_attached = attached;
        }

        log::info!("Thread connectivity {}", if attached { "established" } else { "lost" });
        if attached {
            self.on_thread_attach_finished();
        }
    }

    fn on_thread_attach_finished(&self) {
        let callback = self.lock_state().connect_callback.take();
        if let Some(callback) = callback {
            defer(self.platform.as_ref(), "attach completion", move || callback(Ok(())));
        }
    }

    pub fn is_thread_enabled(&self) -> bool {
        self.with_stack(|stack, inst| stack.device_role(inst))
            .map(|role| role != DeviceRole::Disabled)
            .unwrap_or(false)
    }

    /// Enables the mesh protocol, bringing IPv6 up first if needed.
    ///
    /// Disabling only stops the protocol; the IPv6 interface stays up.
    pub fn set_thread_enabled(&self, enabled: bool) -> Result<()> {
        self.with_stack(|stack, inst| {
            let is_enabled = stack.device_role(inst)? != DeviceRole::Disabled;
            if enabled && !stack.ip6_is_enabled(inst)? {
                stack.ip6_set_enabled(inst, true)?;
            }
            if enabled != is_enabled {
                stack.thread_set_enabled(inst, enabled)?;
            }
            Ok(())
        })
    }

    /// Asks an attached device to reattach as a child.
    pub fn set_child(&self) -> Result<()> {
        self.with_stack(|stack, inst| {
            if stack.device_role(inst)? >= DeviceRole::Child {
                stack.become_child(inst)?;
            }
            Ok(())
        })
    }

    pub fn is_thread_provisioned(&self) -> bool {
        self.with_stack(|stack, inst| stack.dataset_is_commissioned(inst))
            .unwrap_or(false)
    }

    pub fn set_thread_provision(&self, tlvs: &[u8]) -> Result<()> {
        if tlvs.len() > MAX_DATASET_LENGTH {
            return Err(Error::InvalidArgument("dataset exceeds 254 bytes"));
        }
        self.with_stack(|stack, inst| stack.dataset_set_active_tlvs(inst, tlvs))?;
        self.platform
            .post_event(DeviceEvent::ServiceProvisioningChange { provisioned: true })
    }

    pub fn get_thread_provision(&self) -> Result<OperationalDataset> {
        if !self.is_thread_provisioned() {
            return Err(Error::IncorrectState);
        }
        let tlvs = self.with_stack(|stack, inst| stack.dataset_get_active_tlvs(inst))?;
        OperationalDataset::from_bytes(&tlvs)
    }

    pub fn is_thread_attached(&self) -> bool {
        self.with_stack(|stack, inst| stack.device_role(inst))
            .map(DeviceRole::is_attached)
            .unwrap_or(false)
    }

    /// Whether the active network is the one `dataset` describes.
    fn is_wanted_network(&self, dataset: &OperationalDataset) -> bool {
        let current = self.with_stack(|stack, inst| {
            Ok((
                stack.network_name(inst)?,
                stack.extended_pan_id(inst)?,
                stack.pan_id(inst)?,
                stack.network_key(inst)?,
            ))
        });
        match current {
            Ok((name, xpan, pan_id, key)) => {
                dataset.network_name().as_deref() == Some(name.as_str())
                    && dataset.extended_pan_id() == Some(xpan)
                    && dataset.pan_id() == Some(pan_id)
                    && dataset.network_key() == Some(key)
            }
            Err(e) => {
                log::warn!("failed to read active network identity: {}", e);
                false
            }
        }
    }

    /// Joins the network described by `dataset`. `callback` runs once the
    /// device is attached.
    ///
    /// A callback still pending from an earlier request is dropped without
    /// being invoked.
    pub fn attach_to_thread_network(
        &self,
        dataset: &OperationalDataset,
        callback: Option<ConnectCallback>,
    ) -> Result<()> {
        if self.lock_state().connect_callback.take().is_some() {
            log::warn!("superseding a pending attach request");
        }

        if self.is_thread_attached() && self.is_wanted_network(dataset) {
            self.lock_state().connect_callback = callback;
            self.on_thread_attach_finished();
            return Ok(());
        }

        self.set_thread_provision(dataset.as_bytes())?;

        if dataset.is_commissioned() {
            self.set_thread_enabled(true)?;
            self.set_child()?;
            self.lock_state().connect_callback = callback;
        }
        Ok(())
    }

    /// Starts an active discovery on every channel. Only one scan may be in
    /// flight.
    pub fn start_thread_scan(&self, callback: ScanCallback) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.scan_callback.is_some() {
                return Err(Error::IncorrectState);
            }
            state.scan_callback = Some(callback);
        }

        let result = self.with_stack(|stack, inst| {
            if !stack.ip6_is_enabled(inst)? {
                stack.ip6_set_enabled(inst, true)?;
            }
            if self.config.sleepy {
                let mut mode = stack.link_mode(inst)?;
                if !mode.rx_on_when_idle {
                    self.lock_state().temporary_rx_on_when_idle = true;
                    mode.rx_on_when_idle = true;
                    stack.set_link_mode(inst, mode)?;
                }
            }
            stack.discover(inst, 0, BROADCAST_PAN_ID, false, false, self.scan_handler())
        });

        if let Err(e) = &result {
            log::error!("failed to start Thread scan: {}", e);
            self.lock_state().scan_callback = None;
        }
        result
    }

    fn scan_handler(&self) -> ScanHandler {
        let platform = self.platform.clone();
        let this = self.this.clone();
        let mut results = Vec::new();
        Box::new(move |result: Option<ActiveScanResult>| match result {
            Some(result) => {
                log::info!(
                    "scan: {} pan 0x{:04x} channel {} rssi {} joinable {}",
                    result.network_name,
                    result.pan_id,
                    result.channel,
                    result.rssi,
                    result.is_joinable
                );
                if results.len() < MAX_SCAN_RESULTS {
                    results.push(result);
                } else {
                    log::warn!("scan result dropped, collector full");
                }
            }
            None => {
                let results = mem::take(&mut results);
                let this = this.clone();
                defer(platform.as_ref(), "scan completion", move || {
                    if let Some(this) = this.upgrade() {
                        this.on_scan_finished(results);
                    }
                });
            }
        })
    }

    fn on_scan_finished(&self, results: Vec<ActiveScanResult>) {
        let restored = self.with_stack(|stack, inst| {
            let temporary = mem::take(&mut self.lock_state().temporary_rx_on_when_idle);
            if temporary {
                let mut mode = stack.link_mode(inst)?;
                mode.rx_on_when_idle = false;
                stack.set_link_mode(inst, mode)?;
            }
            // Discovery needed IPv6; take it down again on a blank device.
            if stack.device_role(inst)? == DeviceRole::Disabled && !stack.dataset_is_commissioned(inst)? {
                stack.ip6_set_enabled(inst, false)?;
            }
            Ok(())
        });
        if let Err(e) = restored {
            log::warn!("failed to restore state after scan: {}", e);
        }

        let callback = self.lock_state().scan_callback.take();
        if let Some(callback) = callback {
            callback(Ok(results));
        }
    }

    pub fn thread_device_type(&self) -> Result<ThreadDeviceType> {
        self.with_stack(|stack, inst| {
            let mode = stack.link_mode(inst)?;
            if self.config.ftd && mode.device_type {
                if stack.is_router_eligible(inst)? {
                    return Ok(ThreadDeviceType::Router);
                }
                return Ok(ThreadDeviceType::FullEndDevice);
            }
            if mode.rx_on_when_idle {
                return Ok(ThreadDeviceType::MinimalEndDevice);
            }
            if self.config.synchronized_sleepy && stack.csl_period(inst)? != 0 {
                return Ok(ThreadDeviceType::SynchronizedSleepyEndDevice);
            }
            Ok(ThreadDeviceType::SleepyEndDevice)
        })
    }

    pub fn set_thread_device_type(&self, device_type: ThreadDeviceType) -> Result<()> {
        let supported = match device_type {
            ThreadDeviceType::Router | ThreadDeviceType::FullEndDevice => self.config.ftd,
            ThreadDeviceType::SynchronizedSleepyEndDevice => self.config.synchronized_sleepy,
            ThreadDeviceType::MinimalEndDevice | ThreadDeviceType::SleepyEndDevice => true,
            ThreadDeviceType::NotSupported => false,
        };
        if !supported {
            return Err(Error::InvalidArgument("device type not supported by this build"));
        }

        log::info!("setting Thread device type: {:?}", device_type);
        self.with_stack(|stack, inst| {
            let mut mode = stack.link_mode(inst)?;
            match device_type {
                ThreadDeviceType::Router | ThreadDeviceType::FullEndDevice => {
                    mode.device_type = true;
                    mode.rx_on_when_idle = true;
                    let eligible = device_type == ThreadDeviceType::Router;
                    if let Err(e) = stack.set_router_eligible(inst, eligible) {
                        log::warn!("failed to set router eligibility: {}", e);
                    }
                }
                ThreadDeviceType::MinimalEndDevice => {
                    mode.device_type = false;
                    mode.rx_on_when_idle = true;
                }
                _ => {
                    mode.device_type = false;
                    mode.rx_on_when_idle = false;
                }
            }
            stack.set_link_mode(inst, mode)
        })
    }

    /// Allows a router eligible device to take the router role. Has no
    /// effect on minimal builds.
    pub fn set_router_promotion(&self, promote: bool) -> Result<()> {
        if !self.config.ftd {
            return Ok(());
        }
        self.with_stack(|stack, inst| {
            if stack.device_role(inst)? != DeviceRole::Router {
                stack.set_router_eligible(inst, promote)?;
            }
            Ok(())
        })
    }

    pub fn poll_period(&self) -> Result<u32> {
        self.with_stack(|stack, inst| stack.poll_period(inst))
    }

    pub fn primary_802154_mac_address(&self) -> Result<[u8; 8]> {
        self.with_stack(|stack, inst| stack.extended_address(inst))
    }

    /// First valid address that was not assigned by Thread itself.
    pub fn external_ipv6_address(&self) -> Result<Ipv6Addr> {
        let addresses = self.with_stack(|stack, inst| stack.ip6_unicast_addresses(inst))?;
        addresses
            .iter()
            .find(|a| {
                a.valid && matches!(a.origin, AddressOrigin::Slaac | AddressOrigin::Dhcpv6 | AddressOrigin::Manual)
            })
            .map(|a| a.address)
            .ok_or(Error::ConfigNotFound)
    }

    pub fn have_mesh_connectivity(&self) -> bool {
        let connected = self.with_stack(|stack, inst| {
            Ok(match stack.device_role(inst)? {
                DeviceRole::Disabled | DeviceRole::Detached => false,
                DeviceRole::Child => true,
                // A router is connected once it has a router neighbor.
                DeviceRole::Router | DeviceRole::Leader => stack.neighbors(inst)?.iter().any(|n| !n.is_child),
            })
        });
        connected.unwrap_or(false)
    }

    pub fn have_route_to_address(&self, destination: IpAddr) -> bool {
        let IpAddr::V6(destination) = destination else {
            return false;
        };
        let found = self.with_stack(|stack, inst| {
            if !stack.device_role(inst)?.is_attached() {
                return Ok(false);
            }
            if is_link_local(destination) {
                return Ok(true);
            }
            let ula = is_unique_local(destination);
            let routes = stack.external_routes(inst)?;
            Ok(routes.iter().any(|route| {
                !route.next_hop_is_this_device
                    && !(ula && route.prefix_length == 0)
                    && prefix_matches(route.prefix, route.prefix_length, destination)
            }))
        });
        found.unwrap_or(false)
    }

    pub fn erase_persistent_info(&self) {
        let result = self.with_stack(|stack, inst| {
            if let Err(e) = stack.thread_set_enabled(inst, false) {
                log::warn!("failed to disable Thread: {}", e);
            }
            stack.erase_persistent_info(inst)
        });
        if let Err(e) = result {
            log::error!("failed to erase persistent info: {}", e);
        }
    }

    pub fn overrun_count(&self) -> u64 {
        self.lock_state().overrun_count
    }

    pub fn reset_thread_network_diagnostics_counts(&self) {
        self.lock_state().overrun_count = 0;
    }

    pub fn set_status_change_callback(&self, callback: Option<StatusChangeCallback>) {
        self.lock_state().status_callback = callback;
    }

    /// Reports the attach outcome to the status change callback, if any.
    pub fn update_network_status(&self) {
        if !self.is_thread_enabled() {
            return;
        }
        let Some(callback) = self.lock_state().status_callback.clone() else {
            return;
        };
        let Ok(dataset) = self.get_thread_provision() else {
            return;
        };
        let Some(extended_pan_id) = dataset.extended_pan_id() else {
            return;
        };

        let report = if self.is_thread_attached() {
            NetworkStatusReport {
                status: NetworkStatus::Success,
                extended_pan_id,
                error: None,
            }
        } else {
            NetworkStatusReport {
                status: NetworkStatus::NetworkNotFound,
                extended_pan_id,
                error: Some(OtError::Detached),
            }
        };
        callback(report);
    }

    /// Starts commissioning as a joiner using the configured discriminator
    /// and pincode.
    pub fn joiner_start(&self) -> Result<()> {
        let discerner = JoinerDiscerner {
            value: u64::from(self.config.joiner_discriminator),
            length: JOINER_DISCERNER_LENGTH,
        };
        let pskd = format!("{:09}", self.config.joiner_pincode);
        let handler = self.joiner_handler();

        self.with_stack(|stack, inst| {
            if stack.dataset_is_commissioned(inst)? || stack.device_role(inst)? != DeviceRole::Disabled {
                return Err(Error::Stack(OtError::InvalidState));
            }
            if stack.joiner_state(inst)? != JoinerState::Idle {
                return Err(Error::Stack(OtError::Busy));
            }
            if !stack.ip6_is_enabled(inst)? {
                stack.ip6_set_enabled(inst, true)?;
            }
            if let Err(e) = stack.set_joiner_discerner(inst, discerner) {
                log::warn!("failed to set joiner discerner: {}", e);
            }
            log::info!("joiner discerner: {}", discerner.value);
            stack.joiner_start(inst, &pskd, handler)
        })
    }

    fn joiner_handler(&self) -> JoinerHandler {
        let this = self.this.clone();
        let platform = self.platform.clone();
        Box::new(move |result: StdResult<(), OtError>| {
            defer(platform.as_ref(), "joiner completion", move || {
                if let Some(this) = this.upgrade() {
                    this.on_joiner_complete(result);
                }
            });
        })
    }

    fn on_joiner_complete(&self, result: StdResult<(), OtError>) {
        match result {
            Ok(()) => {
                log::info!("joiner finished");
                if let Err(e) = self.with_stack(|stack, inst| stack.thread_set_enabled(inst, true)) {
                    log::error!("failed to start Thread after joining: {}", e);
                }
            }
            Err(e) => log::error!("joiner failed: {}", self.stack.error_to_string(e)),
        }
    }

    pub fn sed_intervals_config(&self) -> Result<SedIntervalsConfig> {
        if !self.config.sleepy {
            return Err(Error::UnsupportedFeature);
        }
        Ok(self.lock_state().sed.config)
    }

    pub fn set_sed_intervals_config(&self, intervals: SedIntervalsConfig) -> Result<()> {
        if !self.config.sleepy {
            return Err(Error::UnsupportedFeature);
        }
        if intervals.idle_interval < intervals.active_interval || intervals.active_interval.is_zero() {
            return Err(Error::InvalidArgument("idle interval must be at least the active interval"));
        }
        if self.config.synchronized_sleepy {
            csl_period(intervals.idle_interval)?;
        }
        let mode = {
            let mut state = self.lock_state();
            state.sed.config = intervals;
            state.sed.mode
        };
        self.set_sed_interval_mode(mode)?;
        self.platform.post_event(DeviceEvent::SedIntervalChange)
    }

    fn set_sed_interval_mode(&self, mode: SedIntervalMode) -> Result<()> {
        let synchronized = self.config.synchronized_sleepy;
        self.with_stack(|stack, inst| {
            let interval = {
                let mut state = self.lock_state();
                state.sed.mode = mode;
                match mode {
                    SedIntervalMode::Idle => state.sed.config.idle_interval,
                    SedIntervalMode::Active => state.sed.config.active_interval,
                }
            };
            let interval_ms = interval.as_millis() as u64;

            let current_ms = current_interval_ms(stack, inst, synchronized)?;
            if current_ms == interval_ms {
                return Ok(());
            }
            if synchronized {
                stack.set_csl_period(inst, csl_period(interval)?)?;
            } else {
                let period = u32::try_from(interval_ms)
                    .map_err(|_| Error::InvalidArgument("interval exceeds the poll period range"))?;
                stack.set_poll_period(inst, period)?;
            }
            log::info!(
                "SED {:?} interval set to {}ms",
                mode,
                current_interval_ms(stack, inst, synchronized)?
            );
            Ok(())
        })
    }

    /// Votes for (or withdraws a vote for) the active polling interval.
    ///
    /// With `delay_idle`, withdrawing keeps the device active until the delay
    /// timer expires; re-arming the timer extends it.
    pub fn request_sed_active_mode(&self, on: bool, delay_idle: bool) -> Result<()> {
        if !self.config.sleepy {
            return Err(Error::UnsupportedFeature);
        }
        {
            let mut state = self.lock_state();
            if on {
                state.sed.active_consumers += 1;
            } else if state.sed.active_consumers > 0 {
                state.sed.active_consumers -= 1;
            }
        }

        let threshold = self.config.sed_active_threshold;
        if !on && delay_idle && !threshold.is_zero() {
            let this = self.this.clone();
            let armed = self.platform.start_timer(
                SED_DELAY_IDLE_TIMER,
                threshold,
                Box::new(move || {
                    if let Some(this) = this.upgrade() {
                        this.on_sed_delay_idle_expired();
                    }
                }),
            );
            match armed {
                Ok(()) => {
                    let mut state = self.lock_state();
                    if !state.sed.delay_idle_running {
                        state.sed.delay_idle_running = true;
                        state.sed.active_consumers += 1;
                    }
                }
                Err(e) => log::error!("failed to start SED delay idle timer: {}", e),
            }
        }

        self.sed_update_mode()
    }

    fn on_sed_delay_idle_expired(&self) {
        {
            let mut state = self.lock_state();
            state.sed.delay_idle_running = false;
            if state.sed.active_consumers > 0 {
                state.sed.active_consumers -= 1;
            }
        }
        if let Err(e) = self.sed_update_mode() {
            log::error!("failed to update SED mode: {}", e);
        }
    }

    fn sed_update_mode(&self) -> Result<()> {
        let (wanted, current) = {
            let state = self.lock_state();
            let wanted = if state.sed.active_consumers > 0 {
                SedIntervalMode::Active
            } else {
                SedIntervalMode::Idle
            };
            (wanted, state.sed.mode)
        };
        if wanted == current {
            return Ok(());
        }
        self.set_sed_interval_mode(wanted)
    }

    pub fn is_sed_active(&self) -> bool {
        self.lock_state().sed.mode == SedIntervalMode::Active
    }

    fn srp_handler(&self) -> SrpHandler {
        let this = self.this.clone();
        let platform = self.platform.clone();
        Box::new(move |notification: SrpNotification| {
            let this = this.clone();
            defer(platform.as_ref(), "SRP notification", move || {
                if let Some(this) = this.upgrade() {
                    this.on_srp_notification(notification);
                }
            });
        })
    }

    fn on_srp_notification(&self, notification: SrpNotification) {
        let pending = self.lock_state().srp.handle_notification(&notification);
        if let Some((callback, result)) = pending {
            callback(result);
        }
    }

    fn srp_auto_start_handler(&self) -> SrpAutoStartHandler {
        let this = self.this.clone();
        let platform = self.platform.clone();
        Box::new(move |server: Option<SocketAddrV6>| {
            let Some(server) = server else {
                log::info!("SRP client auto start: no server");
                return;
            };
            log::info!("SRP client auto started with server {}", server);
            let this = this.clone();
            defer(platform.as_ref(), "DNS server update", move || {
                if let Some(this) = this.upgrade() {
                    this.use_dns_server(*server.ip());
                }
            });
        })
    }

    /// Points the DNS client at `server`, keeping the configured port.
    fn use_dns_server(&self, server: Ipv6Addr) {
        let result = self.with_stack(|stack, inst| {
            let mut config = stack.dns_default_config(inst)?;
            config.server = SocketAddrV6::new(server, config.server.port(), 0, 0);
            stack.set_dns_default_config(inst, &config)
        });
        if let Err(e) = result {
            log::error!("failed to update DNS server: {}", e);
        }
    }

    pub fn set_srp_dns_callbacks(&self, init: Option<DnsAsyncCallback>, error: Option<DnsAsyncCallback>) {
        self.lock_state().srp.set_callbacks(init, error);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_srp_service(
        &self,
        instance_name: &str,
        name: &str,
        port: u16,
        subtypes: &[&str],
        txt: &[TxtEntry],
        lease_interval: u32,
        key_lease_interval: u32,
    ) -> Result<()> {
        self.with_stack(|stack, inst| {
            self.lock_state().srp.add_service(
                stack,
                inst,
                instance_name,
                name,
                port,
                subtypes,
                txt,
                lease_interval,
                key_lease_interval,
            )
        })
    }

    pub fn remove_srp_service(&self, instance_name: &str, name: &str) -> Result<()> {
        self.with_stack(|stack, inst| {
            self.lock_state()
                .srp
                .remove_service(stack, inst, instance_name, name)
        })
    }

    pub fn invalidate_all_srp_services(&self) -> Result<()> {
        self.with_stack(|_, _| {
            self.lock_state().srp.invalidate_all();
            Ok(())
        })
    }

    pub fn remove_invalid_srp_services(&self) -> Result<()> {
        self.with_stack(|stack, inst| self.lock_state().srp.remove_invalid(stack, inst))
    }

    pub fn setup_srp_host(&self, host_name: &str) -> Result<()> {
        self.with_stack(|stack, inst| self.lock_state().srp.setup_host(stack, inst, host_name))
    }

    pub fn clear_srp_host(&self, host_name: &str) -> Result<()> {
        self.with_stack(|stack, inst| self.lock_state().srp.clear_host(stack, inst, host_name))
    }

    /// Snapshot of the SRP service slots.
    pub fn srp_services(&self) -> Vec<SrpService> {
        self.lock_state().srp.services().to_vec()
    }

    pub fn srp_host_name(&self) -> String {
        self.lock_state().srp.host_name().to_string()
    }

    /// Browses `<service_name>.default.service.arpa`.
    pub fn dns_browse(&self, service_name: &str, callback: DnsBrowseCallback) -> Result<()> {
        if service_name.is_empty() {
            return Err(Error::InvalidArgument("service name is required"));
        }
        let full_name = dnssd::full_service_name(service_name);
        let handler = self.browse_handler(callback);
        self.with_stack(|stack, inst| stack.dns_browse(inst, &full_name, handler))
    }

    fn browse_handler(&self, callback: DnsBrowseCallback) -> BrowseHandler {
        let stack = self.stack.clone();
        let platform = self.platform.clone();
        Box::new(move |response: StdResult<&dyn DnsBrowseResponse, OtError>| {
            let finished = match response {
                Ok(response) => browse_results(stack.as_ref(), response, |service: DnssdService| {
                    let callback = callback.clone();
                    defer(platform.as_ref(), "browse result", move || {
                        callback(BrowseEvent::Found(service))
                    });
                }),
                Err(e) => Err(Error::Stack(e)),
            };
            defer(platform.as_ref(), "browse completion", move || {
                callback(BrowseEvent::Finished(finished))
            });
        })
    }

    /// Resolves `<instance_name>` of `<service_name>.default.service.arpa`.
    pub fn dns_resolve(&self, service_name: &str, instance_name: &str, callback: DnsResolveCallback) -> Result<()> {
        if service_name.is_empty() || instance_name.is_empty() {
            return Err(Error::InvalidArgument("service and instance names are required"));
        }
        let full_name = dnssd::full_service_name(service_name);
        let handler = self.resolve_handler(callback);
        self.with_stack(|stack, inst| stack.dns_resolve_service(inst, instance_name, &full_name, handler))
    }

    fn resolve_handler(&self, callback: DnsResolveCallback) -> ResolveHandler {
        let stack = self.stack.clone();
        let platform = self.platform.clone();
        Box::new(move |response: StdResult<&dyn DnsServiceResponse, OtError>| {
            let result = match response {
                Ok(response) => resolve_result(stack.as_ref(), response),
                Err(e) => Err(Error::Stack(e)),
            };
            defer(platform.as_ref(), "resolve completion", move || callback(result));
        })
    }

    /// Looks up the AAAA records of a fully qualified host name.
    pub fn dns_resolve_address(&self, host_name: &str, callback: DnsAddressCallback) -> Result<()> {
        if host_name.is_empty() {
            return Err(Error::InvalidArgument("host name is required"));
        }
        let handler = self.address_handler(callback);
        self.with_stack(|stack, inst| stack.dns_resolve_address(inst, host_name, handler))
    }

    fn address_handler(&self, callback: DnsAddressCallback) -> AddressHandler {
        let platform = self.platform.clone();
        Box::new(move |response: StdResult<&dyn DnsAddressResponse, OtError>| {
            let result = match response {
                Ok(response) => collect_addresses(response),
                Err(e) => Err(Error::Stack(e)),
            };
            defer(platform.as_ref(), "address resolution completion", move || callback(result));
        })
    }
}

/// CSL period, in units of ten symbols, for a SED interval.
fn csl_period(interval: Duration) -> Result<u16> {
    let ten_symbols = interval.as_millis() * 1000 / u128::from(US_PER_TEN_SYMBOLS);
    u16::try_from(ten_symbols).map_err(|_| Error::InvalidArgument("interval exceeds the CSL period range"))
}

fn current_interval_ms(stack: &dyn ThreadStack, inst: Instance, synchronized: bool) -> Result<u64> {
    if synchronized {
        Ok(u64::from(stack.csl_period(inst)?) * US_PER_TEN_SYMBOLS / 1000)
    } else {
        Ok(u64::from(stack.poll_period(inst)?))
    }
}

/// Translates every instance of a browse response, handing each to `found`.
fn browse_results(
    stack: &dyn ThreadStack,
    response: &dyn DnsBrowseResponse,
    mut found: impl FnMut(DnssdService),
) -> Result<()> {
    let service_type = response.service_name()?;
    let mut index = 0;
    while let Some(label) = response.service_instance(index)? {
        let info = response.service_info(&label)?;
        match dnssd::from_dns_response(stack, &label, &service_type, &info) {
            Ok(service) => found(service),
            Err(e) => log::warn!("skipping browse result {}: {}", label, e),
        }
        index += 1;
    }
    Ok(())
}

fn resolve_result(stack: &dyn ThreadStack, response: &dyn DnsServiceResponse) -> Result<DnssdService> {
    let (label, service_type) = response.service_name()?;
    let info = response.service_info()?;
    dnssd::from_dns_response(stack, &label, &service_type, &info)
}

fn collect_addresses(response: &dyn DnsAddressResponse) -> Result<Vec<(Ipv6Addr, u32)>> {
    let mut addresses = Vec::new();
    let mut index = 0;
    while let Some(address) = response.address(index)? {
        addresses.push(address);
        index += 1;
    }
    Ok(addresses)
}

fn is_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

fn is_unique_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

fn prefix_matches(prefix: Ipv6Addr, prefix_length: u8, addr: Ipv6Addr) -> bool {
    let len = u32::from(prefix_length.min(128));
    if len == 0 {
        return true;
    }
    let mask = u128::MAX << (128 - len);
    (u128::from(prefix) & mask) == (u128::from(addr) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sample_dataset;
    use crate::fallback::{SimulatedBrowseResponse, SimulatedServiceResponse, SimulatedStack};
    use crate::stack::{DnsServiceInfo, ExternalRoute, NeighborInfo, NetifAddress};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        stack: Arc<SimulatedStack>,
        event_loop: Arc<EventLoop>,
        manager: Arc<ThreadStackManager>,
        events: Arc<Mutex<Vec<DeviceEvent>>>,
    }

    fn fixture_with(stack: SimulatedStack, config: AdapterConfig) -> Fixture {
        let stack = Arc::new(stack);
        let event_loop = EventLoop::new();
        let manager = ThreadStackManager::new(stack.clone(), event_loop.clone(), config);
        manager.register(&event_loop);
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        event_loop.add_event_handler(Arc::new(move |event: &DeviceEvent| {
            seen.lock().unwrap().push(event.clone());
        }));
        manager.do_init(None).unwrap();
        event_loop.run_until_idle();
        Fixture {
            stack,
            event_loop,
            manager,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SimulatedStack::new(), AdapterConfig::default())
    }

    fn connectivity_events(f: &Fixture) -> Vec<ConnectivityChange> {
        f.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::ThreadConnectivityChange(change) => Some(*change),
                _ => None,
            })
            .collect()
    }

    fn counter() -> (Arc<AtomicUsize>, ConnectCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: ConnectCallback = Box::new(move |result: Result<()>| {
            assert!(result.is_ok());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn srp_ready(f: &Fixture) {
        f.manager.set_srp_dns_callbacks(Some(Arc::new(|_: Result<()>| {})), None);
        f.stack.notify_srp_host_removed();
        f.event_loop.run_until_idle();
    }

    #[test]
    fn init_registers_handlers() {
        let f = fixture();
        let calls = f.stack.calls();
        assert_eq!(calls[0], "otInstanceInitSingle");
        assert!(calls.contains(&"otSetStateChangedCallback"));
        assert!(calls.contains(&"otSrpClientSetCallback"));
        assert!(f.stack.with_state(|s| s.slaac_enabled));
        assert!(!f.stack.is_locked());
        assert!(!f.manager.is_thread_enabled());
    }

    #[test]
    fn init_restarts_a_commissioned_device() {
        let stack = SimulatedStack::new();
        stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        let f = fixture_with(stack, AdapterConfig::default());
        assert_eq!(f.stack.role(), DeviceRole::Detached);
        assert!(f.manager.is_thread_enabled());
    }

    #[test]
    fn operations_before_init_fail() {
        let manager = ThreadStackManager::new(
            Arc::new(SimulatedStack::new()),
            EventLoop::new(),
            AdapterConfig::default(),
        );
        assert!(matches!(manager.set_thread_enabled(true), Err(Error::Uninitialized)));
        assert!(matches!(manager.primary_802154_mac_address(), Err(Error::Uninitialized)));
        assert!(!manager.is_thread_attached());
    }

    #[test]
    fn attach_provisions_and_enables() {
        let f = fixture();
        let (count, callback) = counter();
        f.manager.attach_to_thread_network(&sample_dataset(), Some(callback)).unwrap();
        f.event_loop.run_until_idle();

        assert_eq!(f.stack.call_count("otDatasetSetActiveTlvs"), 1);
        assert_eq!(f.stack.role(), DeviceRole::Detached);
        assert!(f.stack.with_state(|s| s.ip6_enabled));
        assert!(f
            .events
            .lock()
            .unwrap()
            .contains(&DeviceEvent::ServiceProvisioningChange { provisioned: true }));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        f.stack.set_role(DeviceRole::Child);
        f.event_loop.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(connectivity_events(&f), vec![ConnectivityChange::Established]);
    }

    #[test]
    fn attach_to_current_network_short_circuits() {
        let f = fixture();
        f.stack.with_state(|s| {
            s.active_dataset = Some(sample_dataset());
            s.role = DeviceRole::Child;
        });
        f.stack.clear_calls();

        let (count, callback) = counter();
        f.manager.attach_to_thread_network(&sample_dataset(), Some(callback)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        f.event_loop.run_until_idle();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(f.stack.call_count("otDatasetSetActiveTlvs"), 0);
        assert_eq!(f.stack.call_count("otThreadSetEnabled"), 0);
    }

    #[test]
    fn attach_to_other_network_reprovisions() {
        let f = fixture();
        f.stack.with_state(|s| {
            s.active_dataset = Some(sample_dataset());
            s.role = DeviceRole::Child;
            s.ip6_enabled = true;
        });
        let mut other = sample_dataset();
        other.set_pan_id(0x4321).unwrap();
        f.manager.attach_to_thread_network(&other, None).unwrap();
        assert_eq!(f.stack.call_count("otDatasetSetActiveTlvs"), 1);
        assert_eq!(f.stack.call_count("otThreadBecomeChild"), 1);
    }

    #[test]
    fn disabling_keeps_ipv6_up() {
        let f = fixture();
        f.stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        f.manager.set_thread_enabled(true).unwrap();
        assert!(f.manager.is_thread_enabled());
        f.manager.set_thread_enabled(false).unwrap();
        assert!(!f.manager.is_thread_enabled());
        assert!(f.stack.with_state(|s| s.ip6_enabled));
    }

    #[test]
    fn get_provision_needs_a_dataset() {
        let f = fixture();
        assert!(matches!(f.manager.get_thread_provision(), Err(Error::IncorrectState)));
        f.manager.set_thread_provision(sample_dataset().as_bytes()).unwrap();
        assert_eq!(f.manager.get_thread_provision().unwrap(), sample_dataset());
        assert!(f.manager.set_thread_provision(&[0u8; 255]).is_err());
    }

    #[test]
    fn connectivity_is_posted_once_per_transition() {
        let f = fixture();
        f.stack.with_state(|s| s.role = DeviceRole::Detached);
        f.stack.set_role(DeviceRole::Child);
        f.event_loop.run_until_idle();
        f.stack.fire_state_changed(StateFlags::THREAD_ROLE);
        f.event_loop.run_until_idle();
        f.stack.fire_state_changed(StateFlags::IP6_ADDRESS_ADDED);
        f.event_loop.run_until_idle();
        assert_eq!(connectivity_events(&f), vec![ConnectivityChange::Established]);

        f.stack.set_role(DeviceRole::Detached);
        f.event_loop.run_until_idle();
        assert_eq!(
            connectivity_events(&f),
            vec![ConnectivityChange::Established, ConnectivityChange::Lost]
        );
    }

    #[test]
    fn state_change_event_carries_flags() {
        let f = fixture();
        f.stack
            .fire_state_changed(StateFlags::IP6_ADDRESS_REMOVED.union(StateFlags::THREAD_CHILD_ADDED));
        f.event_loop.run_until_idle();
        let events = f.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            DeviceEvent::ThreadStateChange {
                role_changed: false,
                address_changed: true,
                net_data_changed: false,
                child_nodes_changed: true,
                ..
            }
        )));
    }

    #[test]
    fn second_scan_is_rejected() {
        let f = fixture();
        let results = Arc::new(Mutex::new(None));
        let seen = results.clone();
        f.manager
            .start_thread_scan(Box::new(move |r: Result<Vec<ActiveScanResult>>| {
                *seen.lock().unwrap() = Some(r.unwrap());
            }))
            .unwrap();

        let stray = Arc::new(AtomicUsize::new(0));
        let stray_seen = stray.clone();
        let rejected = f.manager.start_thread_scan(Box::new(move |_: Result<Vec<ActiveScanResult>>| {
            stray_seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(matches!(rejected, Err(Error::IncorrectState)));

        f.stack.report_scan_result(ActiveScanResult {
            network_name: "net".into(),
            pan_id: 0x1234,
            ..Default::default()
        });
        f.stack.finish_scan();
        f.event_loop.run_until_idle();

        let results = results.lock().unwrap().take().unwrap();
        assert_eq!(stray.load(Ordering::SeqCst), 0);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].network_name, "net");
        // Discovery on a blank device leaves IPv6 down afterwards.
        assert!(!f.stack.with_state(|s| s.ip6_enabled));
    }

    #[test]
    fn scan_collector_is_bounded() {
        let f = fixture();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        f.manager
            .start_thread_scan(Box::new(move |r: Result<Vec<ActiveScanResult>>| {
                seen.store(r.unwrap().len(), Ordering::SeqCst);
            }))
            .unwrap();
        for _ in 0..MAX_SCAN_RESULTS + 5 {
            f.stack.report_scan_result(ActiveScanResult::default());
        }
        f.stack.finish_scan();
        f.event_loop.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), MAX_SCAN_RESULTS);

        // The slot is free again.
        f.manager
            .start_thread_scan(Box::new(|_: Result<Vec<ActiveScanResult>>| {}))
            .unwrap();
    }

    #[test]
    fn sleepy_scan_restores_rx_off() {
        let config = AdapterConfig {
            sleepy: true,
            ..Default::default()
        };
        let f = fixture_with(SimulatedStack::minimal(), config);
        f.manager.set_thread_device_type(ThreadDeviceType::SleepyEndDevice).unwrap();
        f.manager
            .start_thread_scan(Box::new(|_: Result<Vec<ActiveScanResult>>| {}))
            .unwrap();
        assert!(f.stack.with_state(|s| s.link_mode.rx_on_when_idle));
        f.stack.finish_scan();
        f.event_loop.run_until_idle();
        assert!(!f.stack.with_state(|s| s.link_mode.rx_on_when_idle));
    }

    #[test]
    fn device_types_map_to_link_modes() {
        let f = fixture();
        assert_eq!(f.manager.thread_device_type().unwrap(), ThreadDeviceType::Router);
        f.manager.set_thread_device_type(ThreadDeviceType::FullEndDevice).unwrap();
        assert_eq!(f.manager.thread_device_type().unwrap(), ThreadDeviceType::FullEndDevice);
        f.manager.set_thread_device_type(ThreadDeviceType::MinimalEndDevice).unwrap();
        assert_eq!(f.manager.thread_device_type().unwrap(), ThreadDeviceType::MinimalEndDevice);
        f.manager.set_thread_device_type(ThreadDeviceType::SleepyEndDevice).unwrap();
        assert_eq!(f.manager.thread_device_type().unwrap(), ThreadDeviceType::SleepyEndDevice);
        assert!(matches!(
            f.manager.set_thread_device_type(ThreadDeviceType::SynchronizedSleepyEndDevice),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn mesh_connectivity_needs_a_router_neighbor() {
        let f = fixture();
        assert!(!f.manager.have_mesh_connectivity());
        f.stack.with_state(|s| s.role = DeviceRole::Child);
        assert!(f.manager.have_mesh_connectivity());
        f.stack.with_state(|s| {
            s.role = DeviceRole::Router;
            s.neighbors = vec![NeighborInfo {
                is_child: true,
                ..Default::default()
            }];
        });
        assert!(!f.manager.have_mesh_connectivity());
        f.stack.with_state(|s| s.neighbors.push(NeighborInfo::default()));
        assert!(f.manager.have_mesh_connectivity());
    }

    #[test]
    fn routes_skip_own_and_default_for_ula() {
        let f = fixture();
        let ula: Ipv6Addr = "fd00:1::5".parse().unwrap();
        let global: Ipv6Addr = "2001:db8::5".parse().unwrap();
        assert!(!f.manager.have_route_to_address(IpAddr::V6(global)));

        f.stack.with_state(|s| {
            s.role = DeviceRole::Child;
            s.routes = vec![
                ExternalRoute {
                    prefix: Ipv6Addr::UNSPECIFIED,
                    prefix_length: 0,
                    rloc16: 0x0400,
                    next_hop_is_this_device: false,
                },
                ExternalRoute {
                    prefix: "fd00:1::".parse().unwrap(),
                    prefix_length: 64,
                    rloc16: 0x0800,
                    next_hop_is_this_device: true,
                },
            ];
        });
        assert!(f.manager.have_route_to_address(IpAddr::V6(global)));
        assert!(!f.manager.have_route_to_address(IpAddr::V6(ula)));
        assert!(f.manager.have_route_to_address("fe80::1".parse().unwrap()));
        assert!(!f.manager.have_route_to_address("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn prefix_matching() {
        let prefix: Ipv6Addr = "fd00:1:2::".parse().unwrap();
        assert!(prefix_matches(prefix, 48, "fd00:1:2:3::1".parse().unwrap()));
        assert!(!prefix_matches(prefix, 48, "fd00:1:3::1".parse().unwrap()));
        assert!(prefix_matches(prefix, 0, "2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn external_address_ignores_thread_origin() {
        let f = fixture();
        assert!(matches!(f.manager.external_ipv6_address(), Err(Error::ConfigNotFound)));
        let slaac: Ipv6Addr = "2001:db8::1".parse().unwrap();
        f.stack.with_state(|s| {
            s.addresses = vec![
                NetifAddress {
                    address: "fd00::ff:fe00:400".parse().unwrap(),
                    prefix_length: 64,
                    origin: AddressOrigin::Thread,
                    preferred: true,
                    valid: true,
                },
                NetifAddress {
                    address: slaac,
                    prefix_length: 64,
                    origin: AddressOrigin::Slaac,
                    preferred: true,
                    valid: true,
                },
            ]
        });
        assert_eq!(f.manager.external_ipv6_address().unwrap(), slaac);
    }

    #[test]
    fn network_status_reports_detached() {
        let f = fixture();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let seen = reports.clone();
        f.manager.set_status_change_callback(Some(Arc::new(move |r: NetworkStatusReport| {
            seen.lock().unwrap().push(r);
        })));
        f.manager.attach_to_thread_network(&sample_dataset(), None).unwrap();
        f.stack.fire_state_changed(StateFlags::THREAD_ROLE);
        f.event_loop.run_until_idle();
        f.stack.set_role(DeviceRole::Child);
        f.event_loop.run_until_idle();

        let reports = reports.lock().unwrap();
        let xpan = sample_dataset().extended_pan_id().unwrap();
        assert_eq!(reports[0].status, NetworkStatus::NetworkNotFound);
        assert_eq!(reports[0].error, Some(OtError::Detached));
        assert_eq!(reports[0].extended_pan_id, xpan);
        assert_eq!(reports.last().unwrap().status, NetworkStatus::Success);
    }

    #[test]
    fn joiner_uses_discriminator_and_pincode() {
        let f = fixture();
        f.manager.joiner_start().unwrap();
        let (discerner, pskd) = f.stack.with_state(|s| (s.joiner_discerner, s.joiner_pskd.clone()));
        assert_eq!(
            discerner,
            Some(JoinerDiscerner {
                value: 3840,
                length: 12
            })
        );
        assert_eq!(pskd.as_deref(), Some("020202021"));
        assert!(matches!(f.manager.joiner_start(), Err(Error::Stack(OtError::Busy))));

        // Joining provisions the device; completion starts Thread.
        f.stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        f.stack.complete_joiner(Ok(()));
        f.event_loop.run_until_idle();
        assert_eq!(f.stack.role(), DeviceRole::Detached);
    }

    #[test]
    fn joiner_refuses_commissioned_device() {
        let f = fixture();
        f.stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        assert!(matches!(f.manager.joiner_start(), Err(Error::Stack(OtError::InvalidState))));
    }

    #[test]
    fn sed_intervals_validate_and_apply() {
        let config = AdapterConfig {
            sleepy: true,
            ..Default::default()
        };
        let f = fixture_with(SimulatedStack::minimal(), config);
        assert_eq!(f.stack.with_state(|s| s.poll_period), 300);
        assert!(matches!(
            f.manager.set_sed_intervals_config(SedIntervalsConfig {
                active_interval: Duration::from_millis(500),
                idle_interval: Duration::from_millis(100),
            }),
            Err(Error::InvalidArgument(_))
        ));
        f.manager
            .set_sed_intervals_config(SedIntervalsConfig {
                active_interval: Duration::from_millis(100),
                idle_interval: Duration::from_millis(1000),
            })
            .unwrap();
        f.event_loop.run_until_idle();
        assert_eq!(f.stack.with_state(|s| s.poll_period), 1000);
        assert!(f.events.lock().unwrap().contains(&DeviceEvent::SedIntervalChange));
    }

    #[test]
    fn csl_period_range_is_checked() {
        assert_eq!(csl_period(Duration::from_millis(300)).unwrap(), 1875);
        assert_eq!(csl_period(Duration::from_millis(10485)).unwrap(), 65531);
        assert!(matches!(csl_period(Duration::from_millis(10486)), Err(Error::InvalidArgument(_))));

        let config = AdapterConfig {
            sleepy: true,
            synchronized_sleepy: true,
            ..Default::default()
        };
        let f = fixture_with(SimulatedStack::new(), config);
        assert_eq!(f.stack.with_state(|s| s.csl_period), 1875);

        f.manager
            .set_sed_intervals_config(SedIntervalsConfig {
                active_interval: Duration::from_millis(200),
                idle_interval: Duration::from_millis(10485),
            })
            .unwrap();
        assert_eq!(f.stack.with_state(|s| s.csl_period), 65531);

        assert!(matches!(
            f.manager.set_sed_intervals_config(SedIntervalsConfig {
                active_interval: Duration::from_millis(200),
                idle_interval: Duration::from_millis(20000),
            }),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(f.stack.with_state(|s| s.csl_period), 65531);
        assert_eq!(
            f.manager.sed_intervals_config().unwrap().idle_interval,
            Duration::from_millis(10485)
        );
    }

    #[test]
    fn sed_active_mode_is_held_by_delay_timer() {
        let config = AdapterConfig {
            sleepy: true,
            ..Default::default()
        };
        let f = fixture_with(SimulatedStack::minimal(), config);
        f.manager.request_sed_active_mode(true, false).unwrap();
        assert!(f.manager.is_sed_active());
        assert_eq!(f.stack.with_state(|s| s.poll_period), 200);

        f.manager.request_sed_active_mode(false, true).unwrap();
        assert!(f.manager.is_sed_active());
        assert!(f.event_loop.is_timer_armed(SED_DELAY_IDLE_TIMER));

        // Re-arming does not stack another vote.
        f.manager.request_sed_active_mode(true, false).unwrap();
        f.manager.request_sed_active_mode(false, true).unwrap();

        assert!(f.event_loop.fire_timer(SED_DELAY_IDLE_TIMER));
        assert!(!f.manager.is_sed_active());
        assert_eq!(f.stack.with_state(|s| s.poll_period), 300);
    }

    #[test]
    fn sed_needs_sleepy_build() {
        let f = fixture();
        assert!(matches!(f.manager.sed_intervals_config(), Err(Error::UnsupportedFeature)));
        assert!(matches!(f.manager.request_sed_active_mode(true, false), Err(Error::UnsupportedFeature)));
    }

    #[test]
    fn srp_add_is_idempotent() {
        let f = fixture();
        srp_ready(&f);
        f.stack.clear_calls();
        f.manager.add_srp_service("inst1", "_test._tcp", 1234, &[], &[], 0, 0).unwrap();
        assert_eq!(f.stack.call_count("otSrpClientAddService"), 1);
        f.stack.clear_calls();
        f.manager.add_srp_service("inst1", "_test._tcp", 1234, &[], &[], 0, 0).unwrap();
        assert!(f.stack.calls().is_empty());
    }

    #[test]
    fn srp_host_removal_initializes_client() {
        let f = fixture();
        let inits = Arc::new(AtomicUsize::new(0));
        let seen = inits.clone();
        f.manager.set_srp_dns_callbacks(
            Some(Arc::new(move |r: Result<()>| {
                assert!(r.is_ok());
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );
        assert!(matches!(f.manager.setup_srp_host("host"), Err(Error::Uninitialized)));

        f.manager.clear_srp_host("host").unwrap();
        assert_eq!(f.stack.call_count("otSrpClientRemoveHostAndServices"), 1);
        f.stack.notify_srp_host_removed();
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        f.event_loop.run_until_idle();
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.srp_host_name(), "");

        f.manager.setup_srp_host("host").unwrap();
        assert_eq!(f.manager.srp_host_name(), "host");
        assert!(f.stack.with_state(|s| s.srp_host.auto_address));
    }

    #[test]
    fn srp_errors_reach_error_callback() {
        let f = fixture();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        f.manager.set_srp_dns_callbacks(
            None,
            Some(Arc::new(move |r: Result<()>| {
                seen.lock().unwrap().push(r.err().and_then(|e| e.ot_error()));
            })),
        );
        f.stack.notify_srp(SrpNotification {
            error: Some(OtError::Duplicated),
            host: None,
            removed_slots: Vec::new(),
        });
        f.event_loop.run_until_idle();
        assert_eq!(*errors.lock().unwrap(), vec![Some(OtError::Duplicated)]);
    }

    #[test]
    fn srp_server_becomes_dns_server() {
        let f = fixture();
        let server: Ipv6Addr = "fd00::1234".parse().unwrap();
        f.stack.notify_srp_server(Some(SocketAddrV6::new(server, 53535, 0, 0)));
        f.event_loop.run_until_idle();
        let config = f.stack.with_state(|s| s.dns_config);
        assert_eq!(*config.server.ip(), server);
        assert_eq!(config.server.port(), 53);
    }

    fn service_info(host: &str, port: u16) -> DnsServiceInfo {
        DnsServiceInfo {
            port,
            host_name: host.to_string(),
            host_address: Some("fd00::1".parse().unwrap()),
            txt_data: vec![3, b'a', b'=', b'1'],
            ..Default::default()
        }
    }

    #[test]
    fn browse_delivers_each_result_then_finishes() {
        let f = fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        f.manager
            .dns_browse(
                "_matter._tcp",
                Arc::new(move |event: BrowseEvent| seen.lock().unwrap().push(event)),
            )
            .unwrap();
        assert_eq!(f.stack.pending_browses(), vec!["_matter._tcp.default.service.arpa".to_string()]);

        f.stack.complete_browse(Ok(SimulatedBrowseResponse {
            service_name: "_matter._tcp.default.service.arpa".into(),
            instances: vec![
                ("one".into(), service_info("host1.default.service.arpa", 5540)),
                ("two".into(), service_info("host2.default.service.arpa", 5541)),
            ],
        }));
        assert!(events.lock().unwrap().is_empty());
        f.event_loop.run_until_idle();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        match &events[0] {
            BrowseEvent::Found(service) => {
                assert_eq!(service.name, "one");
                assert_eq!(service.host_name, "host1");
                assert_eq!(service.service_type, "_matter");
                assert_eq!(service.port, 5540);
                assert_eq!(service.txt.get("a"), Some(&b"1"[..]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(events[2], BrowseEvent::Finished(Ok(()))));
    }

    #[test]
    fn browse_failure_finishes_with_error() {
        let f = fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        f.manager
            .dns_browse("_matter._tcp", Arc::new(move |event: BrowseEvent| seen.lock().unwrap().push(event)))
            .unwrap();
        f.stack.complete_browse(Err(OtError::ResponseTimeout));
        f.event_loop.run_until_idle();
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            BrowseEvent::Finished(Err(Error::Stack(OtError::ResponseTimeout)))
        ));
        assert!(f.manager.dns_browse("", Arc::new(|_: BrowseEvent| {})).is_err());
    }

    #[test]
    fn resolve_delivers_one_result() {
        let f = fixture();
        let result = Arc::new(Mutex::new(None));
        let seen = result.clone();
        f.manager
            .dns_resolve(
                "_matter._tcp",
                "one",
                Box::new(move |r: Result<DnssdService>| *seen.lock().unwrap() = Some(r)),
            )
            .unwrap();
        assert_eq!(
            f.stack.pending_resolves(),
            vec![("one".to_string(), "_matter._tcp.default.service.arpa".to_string())]
        );
        f.stack.complete_resolve(Ok(SimulatedServiceResponse {
            instance_label: "one".into(),
            service_name: "_matter._tcp.default.service.arpa".into(),
            info: service_info("host1.default.service.arpa", 5540),
        }));
        f.event_loop.run_until_idle();
        let service = result.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(service.name, "one");
        assert_eq!(service.address, Some("fd00::1".parse().unwrap()));
    }

    #[test]
    fn address_resolution_collects_every_record() {
        let f = fixture();
        let result = Arc::new(Mutex::new(None));
        let seen = result.clone();
        f.manager
            .dns_resolve_address(
                "host1.default.service.arpa",
                Box::new(move |r: Result<Vec<(Ipv6Addr, u32)>>| *seen.lock().unwrap() = Some(r)),
            )
            .unwrap();
        let a: Ipv6Addr = "fd00::1".parse().unwrap();
        let b: Ipv6Addr = "fd00::2".parse().unwrap();
        f.stack.complete_address(Ok(vec![(a, 120), (b, 60)]));
        f.event_loop.run_until_idle();
        let addresses = result.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(addresses, vec![(a, 120), (b, 60)]);
    }

    #[test]
    fn erase_disables_thread_first() {
        let f = fixture();
        f.stack.with_state(|s| s.active_dataset = Some(sample_dataset()));
        f.manager.set_thread_enabled(true).unwrap();
        f.manager.erase_persistent_info();
        assert_eq!(f.stack.role(), DeviceRole::Disabled);
        assert!(!f.manager.is_thread_provisioned());
    }
}
