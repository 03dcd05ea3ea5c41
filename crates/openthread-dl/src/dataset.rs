//! Thread operational dataset in its MeshCoP TLV encoding.
//!
//! The adapter only needs a handful of fields: identifying the network an
//! attach request targets and the extended PAN id reported with network
//! status. Unknown TLVs are preserved untouched.

use crate::error::{Error, Result};

pub const MAX_DATASET_LENGTH: usize = 254;
pub const NETWORK_NAME_MAX_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvType {
    Channel = 0,
    PanId = 1,
    ExtendedPanId = 2,
    NetworkName = 3,
    Pskc = 4,
    NetworkKey = 5,
    MeshLocalPrefix = 7,
    SecurityPolicy = 12,
    ActiveTimestamp = 14,
    ChannelMask = 53,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationalDataset {
    tlvs: Vec<u8>,
}

impl OperationalDataset {
    /// Validates TLV framing and the length of every known field.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_DATASET_LENGTH {
            return Err(Error::Dataset("dataset exceeds 254 bytes"));
        }
        let mut offset = 0;
        while offset < data.len() {
            if offset + 2 > data.len() {
                return Err(Error::Dataset("truncated TLV header"));
            }
            let ty = data[offset];
            let len = data[offset + 1] as usize;
            if offset + 2 + len > data.len() {
                return Err(Error::Dataset("truncated TLV value"));
            }
            check_length(ty, len)?;
            offset += 2 + len;
        }
        Ok(OperationalDataset { tlvs: data.to_vec() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.tlvs
    }

    pub fn is_empty(&self) -> bool {
        self.tlvs.is_empty()
    }

    fn find(&self, ty: TlvType) -> Option<&[u8]> {
        let mut offset = 0;
        while offset + 2 <= self.tlvs.len() {
            let len = self.tlvs[offset + 1] as usize;
            let value = self.tlvs.get(offset + 2..offset + 2 + len)?;
            if self.tlvs[offset] == ty as u8 {
                return Some(value);
            }
            offset += 2 + len;
        }
        None
    }

    fn set(&mut self, ty: TlvType, value: &[u8]) -> Result<()> {
        check_length(ty as u8, value.len())?;
        let mut out = Vec::with_capacity(self.tlvs.len() + value.len() + 2);
        let mut offset = 0;
        while offset + 2 <= self.tlvs.len() {
            let len = self.tlvs[offset + 1] as usize;
            let end = (offset + 2 + len).min(self.tlvs.len());
            if self.tlvs[offset] != ty as u8 {
                out.extend_from_slice(&self.tlvs[offset..end]);
            }
            offset = end;
        }
        out.push(ty as u8);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        if out.len() > MAX_DATASET_LENGTH {
            return Err(Error::Dataset("dataset exceeds 254 bytes"));
        }
        self.tlvs = out;
        Ok(())
    }

    pub fn channel(&self) -> Option<u16> {
        self.find(TlvType::Channel).map(|v| u16::from_be_bytes([v[1], v[2]]))
    }

    pub fn pan_id(&self) -> Option<u16> {
        self.find(TlvType::PanId).map(|v| u16::from_be_bytes([v[0], v[1]]))
    }

    pub fn extended_pan_id(&self) -> Option<[u8; 8]> {
        self.find(TlvType::ExtendedPanId).and_then(|v| v.try_into().ok())
    }

    pub fn network_name(&self) -> Option<String> {
        self.find(TlvType::NetworkName)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn network_key(&self) -> Option<[u8; 16]> {
        self.find(TlvType::NetworkKey).and_then(|v| v.try_into().ok())
    }

    pub fn pskc(&self) -> Option<[u8; 16]> {
        self.find(TlvType::Pskc).and_then(|v| v.try_into().ok())
    }

    pub fn mesh_local_prefix(&self) -> Option<[u8; 8]> {
        self.find(TlvType::MeshLocalPrefix).and_then(|v| v.try_into().ok())
    }

    pub fn active_timestamp(&self) -> Option<u64> {
        self.find(TlvType::ActiveTimestamp)
            .and_then(|v| v.try_into().ok())
            .map(u64::from_be_bytes)
    }

    /// Page 0 channel.
    pub fn set_channel(&mut self, channel: u16) -> Result<()> {
        let c = channel.to_be_bytes();
        self.set(TlvType::Channel, &[0, c[0], c[1]])
    }

    pub fn set_pan_id(&mut self, pan_id: u16) -> Result<()> {
        self.set(TlvType::PanId, &pan_id.to_be_bytes())
    }

    pub fn set_extended_pan_id(&mut self, xpan: [u8; 8]) -> Result<()> {
        self.set(TlvType::ExtendedPanId, &xpan)
    }

    pub fn set_network_name(&mut self, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > NETWORK_NAME_MAX_LENGTH {
            return Err(Error::InvalidStringLength {
                max: NETWORK_NAME_MAX_LENGTH,
            });
        }
        self.set(TlvType::NetworkName, name.as_bytes())
    }

    pub fn set_network_key(&mut self, key: [u8; 16]) -> Result<()> {
        self.set(TlvType::NetworkKey, &key)
    }

    pub fn set_pskc(&mut self, pskc: [u8; 16]) -> Result<()> {
        self.set(TlvType::Pskc, &pskc)
    }

    pub fn set_mesh_local_prefix(&mut self, prefix: [u8; 8]) -> Result<()> {
        self.set(TlvType::MeshLocalPrefix, &prefix)
    }

    pub fn set_active_timestamp(&mut self, seconds: u64) -> Result<()> {
        self.set(TlvType::ActiveTimestamp, &seconds.to_be_bytes())
    }

    /// A dataset that is enough to form or join a network.
    pub fn is_commissioned(&self) -> bool {
        self.network_key().is_some()
            && self.network_name().is_some()
            && self.extended_pan_id().is_some()
            && self.pan_id().is_some()
            && self.channel().is_some()
    }
}

fn check_length(ty: u8, len: usize) -> Result<()> {
    let ok = match ty {
        t if t == TlvType::Channel as u8 => len == 3,
        t if t == TlvType::PanId as u8 => len == 2,
        t if t == TlvType::ExtendedPanId as u8 => len == 8,
        t if t == TlvType::NetworkName as u8 => (1..=NETWORK_NAME_MAX_LENGTH).contains(&len),
        t if t == TlvType::Pskc as u8 => len == 16,
        t if t == TlvType::NetworkKey as u8 => len == 16,
        t if t == TlvType::MeshLocalPrefix as u8 => len == 8,
        t if t == TlvType::ActiveTimestamp as u8 => len == 8,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Dataset("invalid TLV length"))
    }
}

#[cfg(test)]
pub(crate) fn sample_dataset() -> OperationalDataset {
    let mut ds = OperationalDataset::default();
    ds.set_active_timestamp(1).unwrap();
    ds.set_channel(15).unwrap();
    ds.set_pan_id(0x1234).unwrap();
    ds.set_extended_pan_id([0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe]).unwrap();
    ds.set_network_name("OpenThread-1234").unwrap();
    ds.set_network_key([0x11; 16]).unwrap();
    ds.set_mesh_local_prefix([0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0x00]).unwrap();
    ds
}
