use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use openthread_dl::manager::{ConnectCallback, SED_DELAY_IDLE_TIMER, ScanCallback, SedIntervalsConfig};
use openthread_dl::platform::ConnectivityChange;
use openthread_dl::stack::{ActiveScanResult, DeviceRole, Instance, TxtEntry};
use openthread_dl::{
    AdapterConfig, Backend, DeviceEvent, Error, EventLoop, OpenThreadLibrary, OperationalDataset, SimulatedStack,
    StackConfig, ThreadStackHost, ThreadStackManager, create_stack, get_backend,
};

struct Node {
    stack: Arc<SimulatedStack>,
    event_loop: Arc<EventLoop>,
    host: ThreadStackHost,
    manager: Arc<ThreadStackManager>,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

fn node_with(config: StackConfig, stack: SimulatedStack) -> Node {
    let stack = Arc::new(stack);
    let event_loop = EventLoop::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = events.clone();
    event_loop.add_event_handler(Arc::new(move |event: &DeviceEvent| {
        seen.lock().unwrap().push(event.clone());
    }));

    let mut host = ThreadStackHost::new(config, Arc::new(OpenThreadLibrary::new()), event_loop.clone());
    let manager = host.init_with_stack(stack.clone()).unwrap();
    event_loop.run_until_idle();
    Node {
        stack,
        event_loop,
        host,
        manager,
        events,
    }
}

fn node() -> Node {
    node_with(StackConfig::default(), SimulatedStack::new())
}

fn dataset() -> OperationalDataset {
    let mut ds = OperationalDataset::default();
    ds.set_active_timestamp(1).unwrap();
    ds.set_channel(11).unwrap();
    ds.set_pan_id(0xface).unwrap();
    ds.set_extended_pan_id([0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22]).unwrap();
    ds.set_network_name("Home").unwrap();
    ds.set_network_key([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
        .unwrap();
    ds.set_mesh_local_prefix([0xfd, 0x11, 0x22, 0x33, 0x00, 0x00, 0x00, 0x00]).unwrap();
    ds
}

fn connectivity(node: &Node) -> Vec<ConnectivityChange> {
    node.events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::ThreadConnectivityChange(change) => Some(*change),
            _ => None,
        })
        .collect()
}

fn connect_counter() -> (Arc<AtomicUsize>, ConnectCallback) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let callback: ConnectCallback = Box::new(move |result: openthread_dl::Result<()>| {
        assert!(result.is_ok());
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (count, callback)
}

fn srp_ready(node: &Node) {
    node.manager.set_srp_dns_callbacks(Some(Arc::new(|_: openthread_dl::Result<()>| {})), None);
    node.stack.notify_srp_host_removed();
    node.event_loop.run_until_idle();
    node.stack.clear_calls();
}

#[test]
fn host_brings_up_a_commissioned_device() {
    let stack = SimulatedStack::new();
    stack.with_state(|s| s.active_dataset = Some(dataset()));
    let node = node_with(StackConfig::default(), stack);

    assert_eq!(node.stack.calls()[0], "otGetInstance");
    assert!(node.manager.is_thread_provisioned());
    assert!(node.manager.is_thread_enabled());
    assert_eq!(node.host.settings_file(), Some("0_18b4300000000001.data"));
    assert_eq!(node.manager.get_thread_provision().unwrap(), dataset());
}

#[test]
fn attach_then_lose_the_network() {
    let node = node();
    let (count, callback) = connect_counter();
    node.manager.attach_to_thread_network(&dataset(), Some(callback)).unwrap();
    node.event_loop.run_until_idle();
    assert!(node.manager.is_thread_provisioned());
    assert_eq!(count.load(Ordering::SeqCst), 0);

    node.stack.set_role(DeviceRole::Child);
    node.event_loop.run_until_idle();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(node.manager.is_thread_attached());
    assert_eq!(connectivity(&node), vec![ConnectivityChange::Established]);

    // A second role report without an attached-state change is quiet.
    node.stack.set_role(DeviceRole::Router);
    node.event_loop.run_until_idle();
    assert_eq!(connectivity(&node), vec![ConnectivityChange::Established]);

    node.stack.set_role(DeviceRole::Detached);
    node.event_loop.run_until_idle();
    assert_eq!(
        connectivity(&node),
        vec![ConnectivityChange::Established, ConnectivityChange::Lost]
    );
}

#[test]
fn attach_to_current_network_completes_without_touching_the_stack() {
    let stack = SimulatedStack::new();
    stack.with_state(|s| {
        s.active_dataset = Some(dataset());
        s.role = DeviceRole::Child;
    });
    let node = node_with(StackConfig::default(), stack);
    node.stack.clear_calls();

    let (count, callback) = connect_counter();
    node.manager.attach_to_thread_network(&dataset(), Some(callback)).unwrap();
    node.event_loop.run_until_idle();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(node.stack.call_count("otDatasetSetActiveTlvs"), 0);
    assert_eq!(node.stack.call_count("otThreadSetEnabled"), 0);
}

#[test]
fn overlapping_scans_are_rejected() {
    let node = node();
    let found = Arc::new(Mutex::new(Vec::new()));
    let seen = found.clone();
    let first: ScanCallback = Box::new(move |result: openthread_dl::Result<Vec<ActiveScanResult>>| {
        *seen.lock().unwrap() = result.unwrap();
    });
    node.manager.start_thread_scan(first).unwrap();

    let second: ScanCallback = Box::new(|_: openthread_dl::Result<Vec<ActiveScanResult>>| {});
    assert!(matches!(node.manager.start_thread_scan(second), Err(Error::IncorrectState)));

    node.stack.report_scan_result(ActiveScanResult {
        network_name: "Home".into(),
        pan_id: 0xface,
        channel: 11,
        ..Default::default()
    });
    node.stack.finish_scan();
    node.event_loop.run_until_idle();

    let found = found.lock().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].pan_id, 0xface);
}

#[test]
fn srp_services_follow_their_identity() {
    let node = node();
    srp_ready(&node);
    let txt = [TxtEntry::new("id", "1")];

    node.manager
        .add_srp_service("lamp", "_matter._tcp", 5540, &["_S3840"], &txt, 7200, 86400)
        .unwrap();
    assert_eq!(node.stack.call_count("otSrpClientAddService"), 1);

    // Identical registration is a no-op.
    node.stack.clear_calls();
    node.manager
        .add_srp_service("lamp", "_matter._tcp", 5540, &["_S3840"], &txt, 7200, 86400)
        .unwrap();
    assert!(node.stack.calls().is_empty());

    // Same identity with a new port replaces the registration.
    node.manager
        .add_srp_service("lamp", "_matter._tcp", 5541, &["_S3840"], &txt, 7200, 86400)
        .unwrap();
    assert_eq!(node.stack.call_count("otSrpClientClearService"), 1);
    assert_eq!(node.stack.call_count("otSrpClientAddService"), 1);

    let used: Vec<u16> = node
        .manager
        .srp_services()
        .iter()
        .filter(|s| s.is_used())
        .map(|s| s.port())
        .collect();
    assert_eq!(used, vec![5541]);
}

#[test]
fn stale_srp_services_are_removed() {
    let node = node();
    srp_ready(&node);
    for (instance, port) in [("lamp", 5540), ("switch", 5541), ("plug", 5542)] {
        node.manager
            .add_srp_service(instance, "_matter._tcp", port, &[], &[], 7200, 86400)
            .unwrap();
    }
    assert!(matches!(
        node.manager.add_srp_service("fan", "_matter._tcp", 5543, &[], &[], 7200, 86400),
        Err(Error::BufferTooSmall)
    ));

    node.manager.invalidate_all_srp_services().unwrap();
    node.manager
        .add_srp_service("switch", "_matter._tcp", 5541, &[], &[], 7200, 86400)
        .unwrap();
    node.stack.clear_calls();

    node.manager.remove_invalid_srp_services().unwrap();
    assert_eq!(node.stack.call_count("otSrpClientRemoveService"), 2);

    node.stack.notify_srp_services_removed();
    node.event_loop.run_until_idle();
    let remaining: Vec<String> = node
        .manager
        .srp_services()
        .iter()
        .filter(|s| s.is_used())
        .map(|s| s.instance_name().to_string())
        .collect();
    assert_eq!(remaining, vec!["switch".to_string()]);
}

#[test]
fn srp_requires_host_removal_confirmation() {
    let node = node();
    assert!(matches!(
        node.manager.add_srp_service("lamp", "_matter._tcp", 5540, &[], &[], 7200, 86400),
        Err(Error::Uninitialized)
    ));
}

#[test]
fn config_flows_into_the_adapter() {
    let config = StackConfig::from_json(r#"{"ftd": false, "sleepy": true, "active_interval_ms": 100, "idle_interval_ms": 1000}"#)
        .unwrap();
    let node = node_with(config, SimulatedStack::minimal());
    let adapter = node.manager.config();
    assert!(!adapter.ftd);
    assert!(adapter.sleepy);
    assert_eq!(node.manager.sed_intervals_config().unwrap().idle_interval.as_millis(), 1000);
    assert!(matches!(node.manager.thread_topology_full(), Err(Error::UnsupportedFeature)));
}

#[test]
fn teardown_destroys_the_instance() {
    let mut node = node();
    node.host.deinit_thread_stack().unwrap();
    assert_eq!(node.stack.call_count("otDestroyInstance"), 1);
    assert!(node.host.manager().is_none());
}

#[test]
fn teardown_detaches_the_adapter() {
    let config = StackConfig::from_json(r#"{"sleepy": true, "active_interval_ms": 100, "idle_interval_ms": 300}"#)
        .unwrap();
    let mut node = node_with(config, SimulatedStack::new());
    node.manager.request_sed_active_mode(true, false).unwrap();
    node.manager.request_sed_active_mode(false, true).unwrap();
    assert!(node.event_loop.is_timer_armed(SED_DELAY_IDLE_TIMER));

    node.host.deinit_thread_stack().unwrap();
    assert!(node.manager.instance().is_none());
    assert!(!node.manager.is_thread_attached());
    assert!(!node.event_loop.is_timer_armed(SED_DELAY_IDLE_TIMER));

    node.stack.clear_calls();
    assert!(matches!(node.manager.set_thread_enabled(true), Err(Error::Uninitialized)));
    assert!(matches!(node.manager.primary_802154_mac_address(), Err(Error::Uninitialized)));
    assert!(node.stack.calls().is_empty());
}

#[test]
fn csl_period_stays_in_range() {
    let config = StackConfig::from_json(
        r#"{"sleepy": true, "synchronized_sleepy": true, "active_interval_ms": 100, "idle_interval_ms": 300}"#,
    )
    .unwrap();
    let node = node_with(config, SimulatedStack::new());
    assert_eq!(node.stack.with_state(|s| s.csl_period), 1875);

    node.manager
        .set_sed_intervals_config(SedIntervalsConfig {
            active_interval: Duration::from_millis(100),
            idle_interval: Duration::from_millis(10485),
        })
        .unwrap();
    assert_eq!(node.stack.with_state(|s| s.csl_period), 65531);

    assert!(matches!(
        node.manager.set_sed_intervals_config(SedIntervalsConfig {
            active_interval: Duration::from_millis(100),
            idle_interval: Duration::from_millis(10486),
        }),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(node.stack.with_state(|s| s.csl_period), 65531);
    assert_eq!(
        node.manager.sed_intervals_config().unwrap().idle_interval,
        Duration::from_millis(10485)
    );
}

#[cfg(target_os = "linux")]
#[test]
fn foreign_library_selects_the_simulated_backend() {
    let library = OpenThreadLibrary::new();
    library
        .open("libc.so.6", libc::RTLD_LAZY | libc::RTLD_GLOBAL)
        .unwrap();
    assert!(library.is_open());
    assert_eq!(library.resolved_count(), 0);
    assert!(library.symbol("malloc").is_some());
    assert!(matches!(library.ot_get_instance(), Err(Error::Unsupported("otGetInstance"))));
    assert_eq!(get_backend(&library), Backend::Simulated);

    library.close();
    assert!(matches!(library.ot_lock(), Err(Error::NotOpen)));
}

#[cfg(target_os = "linux")]
#[test]
fn missing_entry_points_surface_as_unsupported() {
    let library = Arc::new(OpenThreadLibrary::new());
    library
        .open("libc.so.6", libc::RTLD_LAZY | libc::RTLD_GLOBAL)
        .unwrap();
    let event_loop = EventLoop::new();

    let mut host = ThreadStackHost::new(StackConfig::default(), library.clone(), event_loop.clone());
    let stack = create_stack(library.clone(), Backend::Native);
    assert!(matches!(host.init_with_stack(stack), Err(Error::Unsupported("otGetInstance"))));
    assert!(host.manager().is_none());

    let stack = create_stack(library.clone(), Backend::Native);
    let manager = ThreadStackManager::new(stack, event_loop, AdapterConfig::default());
    assert!(matches!(manager.do_init(Some(Instance::from_raw(1))), Err(Error::Unsupported(_))));
    assert!(matches!(manager.primary_802154_mac_address(), Err(Error::Unsupported(_))));
    assert!(matches!(manager.set_thread_enabled(true), Err(Error::Unsupported(_))));

    library.close();
}
