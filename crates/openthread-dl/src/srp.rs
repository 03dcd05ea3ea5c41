//! SRP client shadow state: host name and the fixed service slot table.
//!
//! Every slot owns a private arena into which the registration's strings
//! and TXT values are copied, so the native client can keep pointing at
//! them for as long as the registration lives.

use std::sync::Arc;

use crate::alloc::{FixedBufferAllocator, Span};
use crate::error::{Error, OtError, Result};
use crate::stack::{Instance, SrpItemState, SrpNotification, SrpServiceDescription, ThreadStack, TxtEntry};

pub const MAX_SERVICES: usize = 3;
pub const SUBTYPE_MAX: usize = 6;
pub const MAX_TXT_ENTRIES: usize = 4;
pub const SERVICE_BUFFER_SIZE: usize = 256;
pub const HOST_NAME_MAX_LENGTH: usize = 16;
pub const DEFAULT_DOMAIN: &str = "default.service.arpa";

/// Completion callback for SRP/DNS initialization and errors.
pub type DnsAsyncCallback = Arc<dyn Fn(Result<()>) + Send + Sync>;

/// One service slot.
#[derive(Debug, Clone)]
pub struct SrpService {
    arena: FixedBufferAllocator,
    instance_name: Option<Span>,
    name: Option<Span>,
    port: u16,
    subtypes: Vec<Span>,
    txt: Vec<(Span, Span)>,
    is_invalid: bool,
}

impl Default for SrpService {
    fn default() -> Self {
        SrpService {
            arena: FixedBufferAllocator::new(SERVICE_BUFFER_SIZE),
            instance_name: None,
            name: None,
            port: 0,
            subtypes: Vec::new(),
            txt: Vec::new(),
            is_invalid: false,
        }
    }
}

impl SrpService {
    pub fn is_used(&self) -> bool {
        self.name.is_some() && self.instance_name.is_some()
    }

    pub fn is_invalid(&self) -> bool {
        self.is_invalid
    }

    pub fn instance_name(&self) -> &str {
        self.instance_name.map(|s| self.arena.str(s)).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.name.map(|s| self.arena.str(s)).unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the slot to the free pool.
    pub fn clear(&mut self) {
        self.arena.reset();
        self.instance_name = None;
        self.name = None;
        self.port = 0;
        self.subtypes.clear();
        self.txt.clear();
        self.is_invalid = false;
    }

    pub fn matches_identity(&self, instance_name: &str, name: &str) -> bool {
        self.is_used() && self.instance_name() == instance_name && self.name() == name
    }

    pub fn matches(&self, instance_name: &str, name: &str, port: u16, subtypes: &[&str], txt: &[TxtEntry]) -> bool {
        if !self.matches_identity(instance_name, name) || self.port != port {
            return false;
        }
        if self.subtypes.len() != subtypes.len() || self.txt.len() != txt.len() {
            return false;
        }
        let subtypes_match = self
            .subtypes
            .iter()
            .zip(subtypes)
            .all(|(mine, theirs)| self.arena.str(*mine) == *theirs);
        let txt_match = self
            .txt
            .iter()
            .zip(txt)
            .all(|((k, v), entry)| self.arena.str(*k) == entry.key && self.arena.bytes(*v) == entry.value.as_slice());
        subtypes_match && txt_match
    }

    fn fill(&mut self, instance_name: &str, name: &str, port: u16, subtypes: &[&str], txt: &[TxtEntry]) -> Result<()> {
        self.arena.reset();
        self.instance_name = self.arena.clone_str(instance_name);
        self.name = self.arena.clone_str(name);
        self.port = port;

        if subtypes.len() > SUBTYPE_MAX {
            return Err(Error::BufferTooSmall);
        }
        self.subtypes = subtypes.iter().filter_map(|s| self.arena.clone_str(s)).collect();

        if txt.len() > MAX_TXT_ENTRIES {
            return Err(Error::BufferTooSmall);
        }
        let mut entries = Vec::with_capacity(txt.len());
        for entry in txt {
            let key = self.arena.clone_str(&entry.key);
            let value = self.arena.clone_bytes(&entry.value);
            if let (Some(key), Some(value)) = (key, value) {
                entries.push((key, value));
            }
        }
        self.txt = entries;

        if self.arena.any_allocation_failed() {
            return Err(Error::BufferTooSmall);
        }
        Ok(())
    }

    pub fn description(&self) -> SrpServiceDescription<'_> {
        SrpServiceDescription {
            instance_name: self.instance_name(),
            name: self.name(),
            subtypes: self.subtypes.iter().map(|s| self.arena.str(*s)).collect(),
            txt: self
                .txt
                .iter()
                .map(|(k, v)| (self.arena.str(*k), self.arena.bytes(*v)))
                .collect(),
            port: self.port,
            priority: 0,
            weight: 0,
        }
    }
}

pub struct SrpClient {
    services: Vec<SrpService>,
    host_name: String,
    is_initialized: bool,
    init_callback: Option<DnsAsyncCallback>,
    error_callback: Option<DnsAsyncCallback>,
}

impl Default for SrpClient {
    fn default() -> Self {
        SrpClient {
            services: (0..MAX_SERVICES).map(|_| SrpService::default()).collect(),
            host_name: String::new(),
            is_initialized: false,
            init_callback: None,
            error_callback: None,
        }
    }
}

impl SrpClient {
    /// Forgets the host and every slot but keeps the registered callbacks.
    pub fn reset(&mut self) {
        for service in &mut self.services {
            service.clear();
        }
        self.host_name.clear();
        self.is_initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn services(&self) -> &[SrpService] {
        &self.services
    }

    pub fn set_callbacks(&mut self, init: Option<DnsAsyncCallback>, error: Option<DnsAsyncCallback>) {
        self.init_callback = init;
        self.error_callback = error;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_service(
        &mut self,
        stack: &dyn ThreadStack,
        inst: Instance,
        instance_name: &str,
        name: &str,
        port: u16,
        subtypes: &[&str],
        txt: &[TxtEntry],
        lease_interval: u32,
        key_lease_interval: u32,
    ) -> Result<()> {
        if !self.is_initialized {
            return Err(Error::Uninitialized);
        }
        if instance_name.is_empty() || name.is_empty() {
            return Err(Error::InvalidArgument("service instance and name are required"));
        }

        let mut free_slot = None;
        for (slot, service) in self.services.iter_mut().enumerate() {
            if service.matches(instance_name, name, port, subtypes, txt) {
                service.is_invalid = false;
                return Ok(());
            }

            if service.matches_identity(instance_name, name) {
                stack.srp_clear_service(inst, slot)?;
                // No removal notification follows a clear.
                service.clear();
            }

            if free_slot.is_none() && !service.is_used() {
                free_slot = Some(slot);
            }
        }

        let slot = free_slot.ok_or(Error::BufferTooSmall)?;

        if let Err(e) = stack.srp_set_lease_interval(inst, lease_interval) {
            log::warn!("failed to set SRP lease interval: {}", e);
        }
        if let Err(e) = stack.srp_set_key_lease_interval(inst, key_lease_interval) {
            log::warn!("failed to set SRP key lease interval: {}", e);
        }

        let service = &mut self.services[slot];
        let result = service.fill(instance_name, name, port, subtypes, txt).and_then(|()| {
            log::info!("advertising srp service: {}.{}", instance_name, name);
            stack.srp_add_service(inst, slot, &service.description())
        });
        if result.is_err() {
            service.clear();
        }
        result
    }

    pub fn remove_service(&mut self, stack: &dyn ThreadStack, inst: Instance, instance_name: &str, name: &str) -> Result<()> {
        if !self.is_initialized {
            return Err(Error::Uninitialized);
        }
        if instance_name.is_empty() || name.is_empty() {
            return Err(Error::InvalidArgument("service instance and name are required"));
        }
        let slot = self
            .services
            .iter()
            .position(|s| s.matches_identity(instance_name, name))
            .ok_or(Error::Stack(OtError::NotFound))?;

        log::info!("removing srp service: {}.{}", instance_name, name);
        stack.srp_remove_service(inst, slot)
    }

    pub fn invalidate_all(&mut self) {
        for service in self.services.iter_mut().filter(|s| s.is_used()) {
            service.is_invalid = true;
        }
    }

    /// Issues a removal for every used slot marked invalid, stopping at the
    /// first failure.
    pub fn remove_invalid(&mut self, stack: &dyn ThreadStack, inst: Instance) -> Result<()> {
        if !self.is_initialized {
            return Err(Error::Uninitialized);
        }
        for (slot, service) in self.services.iter().enumerate() {
            if service.is_used() && service.is_invalid {
                log::info!("removing srp service: {}.{}", service.instance_name(), service.name());
                stack.srp_remove_service(inst, slot)?;
            }
        }
        Ok(())
    }

    pub fn setup_host(&mut self, stack: &dyn ThreadStack, inst: Instance, host_name: &str) -> Result<()> {
        if !self.is_initialized {
            return Err(Error::Uninitialized);
        }
        check_host_name(host_name)?;

        if self.host_name != host_name {
            self.host_name = host_name.to_string();
            stack.srp_set_host_name(inst, host_name)?;
            stack.srp_enable_auto_host_address(inst)?;
        }
        Ok(())
    }

    /// Registers the host name and immediately removes it together with
    /// all services, asking the server to drop stale records.
    pub fn clear_host(&mut self, stack: &dyn ThreadStack, inst: Instance, host_name: &str) -> Result<()> {
        check_host_name(host_name)?;
        if self.init_callback.is_none() {
            return Err(Error::IncorrectState);
        }

        if self.host_name != host_name {
            self.host_name = host_name.to_string();
            stack.srp_set_host_name(inst, host_name)?;
        }
        stack.srp_remove_host_and_services(inst, false, true)
    }

    /// Applies a client notification. Returns the callback to invoke, once
    /// every lock has been released, together with its argument.
    pub fn handle_notification(&mut self, notification: &SrpNotification) -> Option<(DnsAsyncCallback, Result<()>)> {
        match notification.error {
            None => {
                log::debug!("SRP update succeeded");
                let mut pending = None;
                let host_removed = notification
                    .host
                    .as_ref()
                    .is_some_and(|host| host.state == SrpItemState::Removed);
                if host_removed {
                    self.host_name.clear();
                    self.is_initialized = true;
                    pending = self.init_callback.clone().map(|cb| (cb, Ok(())));
                }
                for &slot in &notification.removed_slots {
                    if let Some(service) = self.services.get_mut(slot) {
                        service.clear();
                    }
                }
                pending
            }
            Some(error) => {
                log::error!("SRP update error: {}", update_error_text(error));
                self.error_callback.clone().map(|cb| (cb, Err(Error::Stack(error))))
            }
        }
    }
}

fn check_host_name(host_name: &str) -> Result<()> {
    if host_name.is_empty() {
        return Err(Error::InvalidArgument("host name is required"));
    }
    if host_name.len() > HOST_NAME_MAX_LENGTH {
        return Err(Error::InvalidStringLength {
            max: HOST_NAME_MAX_LENGTH,
        });
    }
    Ok(())
}

fn update_error_text(error: OtError) -> &'static str {
    match error {
        OtError::Parse => "parsing operation failed",
        OtError::NotFound => "domain name or RRset does not exist",
        OtError::NotImplemented => "server does not support query type",
        OtError::Security => "operation refused for security reasons",
        OtError::Duplicated => "domain name or RRset is duplicated",
        OtError::ResponseTimeout => "timed out waiting on server response",
        OtError::InvalidArgs => "invalid service structure detected",
        OtError::NoBufs => "insufficient buffer to handle message",
        OtError::Failed => "internal server error",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::SimulatedStack;
    use crate::stack::SrpHostInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host_removed() -> SrpNotification {
        SrpNotification {
            error: None,
            host: Some(SrpHostInfo {
                name: None,
                auto_address: false,
                state: SrpItemState::Removed,
            }),
            removed_slots: Vec::new(),
        }
    }

    fn ready_client() -> SrpClient {
        let mut client = SrpClient::default();
        client.set_callbacks(Some(Arc::new(|_| {})), None);
        assert!(client.handle_notification(&host_removed()).is_some());
        client
    }

    #[test]
    fn operations_need_initialization() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = SrpClient::default();
        assert!(matches!(
            client.add_service(&stack, inst, "inst1", "_test._tcp", 1, &[], &[], 0, 0),
            Err(Error::Uninitialized)
        ));
        assert!(matches!(client.setup_host(&stack, inst, "host"), Err(Error::Uninitialized)));
        assert!(matches!(client.clear_host(&stack, inst, "host"), Err(Error::IncorrectState)));
    }

    #[test]
    fn host_removal_runs_init_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut client = SrpClient::default();
        let counter = hits.clone();
        client.set_callbacks(
            Some(Arc::new(move |r: Result<()>| {
                assert!(r.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            None,
        );
        let (cb, result) = client.handle_notification(&host_removed()).unwrap();
        cb(result);
        assert!(client.is_initialized());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn matching_compares_every_field() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = ready_client();
        let txt = [TxtEntry::new("SII", "5000")];
        client
            .add_service(&stack, inst, "inst1", "_test._tcp", 1234, &["_S3"], &txt, 0, 0)
            .unwrap();

        let slot = &client.services()[0];
        assert!(slot.matches("inst1", "_test._tcp", 1234, &["_S3"], &txt));
        assert!(!slot.matches("inst1", "_test._tcp", 1235, &["_S3"], &txt));
        assert!(!slot.matches("inst1", "_test._tcp", 1234, &[], &txt));
        assert!(!slot.matches("inst1", "_test._tcp", 1234, &["_S3"], &[TxtEntry::new("SII", "4000")]));
        assert!(slot.matches_identity("inst1", "_test._tcp"));
    }

    #[test]
    fn full_table_reports_buffer_too_small() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = ready_client();
        for i in 0..MAX_SERVICES {
            client
                .add_service(&stack, inst, &format!("inst{i}"), "_test._tcp", 1, &[], &[], 0, 0)
                .unwrap();
        }
        let err = client
            .add_service(&stack, inst, "extra", "_test._tcp", 1, &[], &[], 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
    }

    #[test]
    fn oversized_payload_frees_the_slot() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = ready_client();
        let txt = [TxtEntry::new("big", vec![0u8; SERVICE_BUFFER_SIZE])];
        let err = client
            .add_service(&stack, inst, "inst1", "_test._tcp", 1, &[], &txt, 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
        assert!(!client.services()[0].is_used());
        assert_eq!(stack.call_count("otSrpClientAddService"), 0);

        let subtypes = ["_a", "_b", "_c", "_d", "_e", "_f", "_g"];
        let err = client
            .add_service(&stack, inst, "inst1", "_test._tcp", 1, &subtypes, &[], 0, 0)
            .unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall));
        assert!(!client.services()[0].is_used());
    }

    #[test]
    fn removal_notification_frees_slots() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = ready_client();
        client
            .add_service(&stack, inst, "inst1", "_test._tcp", 1, &[], &[], 0, 0)
            .unwrap();
        client.remove_service(&stack, inst, "inst1", "_test._tcp").unwrap();
        assert!(client.services()[0].is_used());

        client.handle_notification(&SrpNotification {
            error: None,
            host: None,
            removed_slots: vec![0],
        });
        assert!(!client.services()[0].is_used());

        let err = client.remove_service(&stack, inst, "inst1", "_test._tcp").unwrap_err();
        assert_eq!(err.ot_error(), Some(OtError::NotFound));
    }

    #[test]
    fn host_name_is_length_checked_and_set_once() {
        let stack = SimulatedStack::new();
        let inst = Instance::from_raw(1);
        let mut client = ready_client();
        let err = client.setup_host(&stack, inst, "a-very-long-host-name").unwrap_err();
        assert!(matches!(err, Error::InvalidStringLength { max: 16 }));

        client.setup_host(&stack, inst, "DEADBEEF").unwrap();
        client.setup_host(&stack, inst, "DEADBEEF").unwrap();
        assert_eq!(stack.call_count("otSrpClientSetHostName"), 1);
        assert_eq!(stack.call_count("otSrpClientEnableAutoHostAddress"), 1);
        assert_eq!(client.host_name(), "DEADBEEF");
    }

    #[test]
    fn errors_reach_error_callback() {
        let mut client = SrpClient::default();
        client.set_callbacks(None, Some(Arc::new(|_| {})));
        let (_, result) = client
            .handle_notification(&SrpNotification {
                error: Some(OtError::ResponseTimeout),
                host: None,
                removed_slots: Vec::new(),
            })
            .unwrap();
        assert_eq!(result.unwrap_err().ot_error(), Some(OtError::ResponseTimeout));
        assert!(!client.is_initialized());
    }
}
