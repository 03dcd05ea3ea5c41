//! DNS-SD records produced by browse and resolve queries.

use std::net::Ipv6Addr;

use crate::alloc::{FixedBufferAllocator, Span};
use crate::error::{Error, Result};
use crate::srp::DEFAULT_DOMAIN;
use crate::stack::{DnsServiceInfo, ThreadStack};

pub const HOST_NAME_MAX_LENGTH: usize = 16;
pub const TYPE_MAX_LENGTH: usize = 16;
pub const INSTANCE_NAME_MAX_LENGTH: usize = 33;
pub const MAX_TXT_ENTRIES: usize = 4;
pub const TXT_BUFFER_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnssdProtocol {
    Udp,
    Tcp,
    Unknown,
}

impl DnssdProtocol {
    fn from_label(label: &str) -> Self {
        match label {
            "_udp" => DnssdProtocol::Udp,
            "_tcp" => DnssdProtocol::Tcp,
            _ => DnssdProtocol::Unknown,
        }
    }
}

/// TXT entries copied out of a response into a private arena.
#[derive(Debug, Clone)]
pub struct ServiceTxtEntries {
    arena: FixedBufferAllocator,
    entries: Vec<(Span, Span)>,
}

impl Default for ServiceTxtEntries {
    fn default() -> Self {
        ServiceTxtEntries {
            arena: FixedBufferAllocator::new(TXT_BUFFER_SIZE),
            entries: Vec::new(),
        }
    }
}

impl ServiceTxtEntries {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries
            .iter()
            .map(|(k, v)| (self.arena.str(*k), self.arena.bytes(*v)))
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// A discovered service instance.
#[derive(Debug, Clone)]
pub struct DnssdService {
    /// Instance label.
    pub name: String,
    /// First label of the target host name.
    pub host_name: String,
    /// Service type without the protocol, e.g. `_matter`.
    pub service_type: String,
    pub protocol: DnssdProtocol,
    pub port: u16,
    pub address: Option<Ipv6Addr>,
    pub txt: ServiceTxtEntries,
}

/// Appends the SRP domain to a `<type>.<proto>` service name.
pub fn full_service_name(service_name: &str) -> String {
    format!("{}.{}", service_name, DEFAULT_DOMAIN)
}

/// Translates native service info into a [`DnssdService`].
///
/// `service_type` is the full `<type>.<proto>.<domain>` name the response
/// was produced for.
pub fn from_dns_response(
    stack: &dyn ThreadStack,
    instance_name: &str,
    service_type: &str,
    info: &DnsServiceInfo,
) -> Result<DnssdService> {
    if instance_name.len() > INSTANCE_NAME_MAX_LENGTH {
        return Err(Error::InvalidArgument("instance name too long"));
    }

    let (host_label, _) = info
        .host_name
        .split_once('.')
        .ok_or(Error::InvalidArgument("host name has no domain"))?;
    if host_label.len() > HOST_NAME_MAX_LENGTH {
        return Err(Error::InvalidArgument("host name too long"));
    }

    let (type_label, rest) = service_type
        .split_once('.')
        .ok_or(Error::InvalidArgument("service type has no protocol"))?;
    if type_label.len() > TYPE_MAX_LENGTH {
        return Err(Error::InvalidArgument("service type too long"));
    }
    let (protocol_label, _) = rest
        .split_once('.')
        .ok_or(Error::InvalidArgument("service type has no domain"))?;

    let mut txt = ServiceTxtEntries::default();
    let entries = stack.txt_entries(&info.txt_data)?;
    for entry in entries.iter().filter(|e| !e.key.is_empty()).take(MAX_TXT_ENTRIES) {
        let key = txt.arena.clone_str(&entry.key);
        let value = txt.arena.clone_bytes(&entry.value);
        if let (Some(key), Some(value)) = (key, value) {
            txt.entries.push((key, value));
        }
    }
    if txt.arena.any_allocation_failed() {
        return Err(Error::BufferTooSmall);
    }

    Ok(DnssdService {
        name: instance_name.to_string(),
        host_name: host_label.to_string(),
        service_type: type_label.to_string(),
        protocol: DnssdProtocol::from_label(protocol_label),
        port: info.port,
        address: info.host_address,
        txt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{encode_txt, SimulatedStack};
    use crate::stack::TxtEntry;

    fn info(host: &str, txt: &[TxtEntry]) -> DnsServiceInfo {
        DnsServiceInfo {
            port: 5540,
            host_name: host.to_string(),
            host_address: Some("fd00::1".parse().unwrap()),
            txt_data: encode_txt(txt),
            ..Default::default()
        }
    }

    #[test]
    fn splits_type_and_protocol() {
        let stack = SimulatedStack::new();
        let txt = [TxtEntry::new("SII", "5000"), TxtEntry::new("T", "1")];
        let svc = from_dns_response(
            &stack,
            "ABCD-1234",
            "_matter._tcp.default.service.arpa.",
            &info("0A1B2C3D.default.service.arpa.", &txt),
        )
        .unwrap();
        assert_eq!(svc.name, "ABCD-1234");
        assert_eq!(svc.host_name, "0A1B2C3D");
        assert_eq!(svc.service_type, "_matter");
        assert_eq!(svc.protocol, DnssdProtocol::Tcp);
        assert_eq!(svc.port, 5540);
        assert_eq!(svc.txt.len(), 2);
        assert_eq!(svc.txt.get("SII"), Some(&b"5000"[..]));
    }

    #[test]
    fn unknown_protocol_is_kept() {
        let stack = SimulatedStack::new();
        let svc = from_dns_response(&stack, "x", "_svc._sctp.local.", &info("h.local.", &[])).unwrap();
        assert_eq!(svc.protocol, DnssdProtocol::Unknown);
        assert_eq!(svc.service_type, "_svc");
        let svc = from_dns_response(&stack, "x", "_svc._tcpx.local.", &info("h.local.", &[])).unwrap();
        assert_eq!(svc.protocol, DnssdProtocol::Unknown);
    }

    #[test]
    fn rejects_malformed_names() {
        let stack = SimulatedStack::new();
        assert!(from_dns_response(&stack, "x", "_matter._tcp.arpa.", &info("nodomain", &[])).is_err());
        assert!(from_dns_response(&stack, "x", "_matter", &info("h.arpa.", &[])).is_err());
        assert!(from_dns_response(&stack, "x", "_matter._tcp", &info("h.arpa.", &[])).is_err());
        assert!(
            from_dns_response(&stack, "x", "_matter._tcp.arpa.", &info("a-host-label-that-is-long.arpa.", &[])).is_err()
        );
    }

    #[test]
    fn txt_is_capped_at_four_entries() {
        let stack = SimulatedStack::new();
        let txt: Vec<_> = (0..6).map(|i| TxtEntry::new(format!("k{i}"), "v")).collect();
        let svc = from_dns_response(&stack, "x", "_matter._udp.arpa.", &info("h.arpa.", &txt)).unwrap();
        assert_eq!(svc.protocol, DnssdProtocol::Udp);
        assert_eq!(svc.txt.len(), MAX_TXT_ENTRIES);
    }

    #[test]
    fn appends_default_domain() {
        assert_eq!(full_service_name("_matter._tcp"), "_matter._tcp.default.service.arpa");
    }
}
