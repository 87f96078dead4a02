use std::net::{Ipv4Addr, Ipv6Addr};

use smol_str::SmolStr;
use triomphe::Arc;

use super::{
  CompressionMap, DNSClass, Name, NotFqdn, ProtoError, RecordData, RecordType, SRV, U16_SIZE,
  U32_SIZE,
  record_data::{decode_txt, encode_txt, txt_encoded_len},
};

const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;
const RECORD_HEADER_ENCODED_WITHOUT_NAME_SIZE: usize = 10; // ty(2) + class(2) + ttl(4) + rdlen(2)

/// The header all mDNS resource records share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordHeader {
  name: Name,
  ty: RecordType,
  class: DNSClass,
  ttl: u32,
}

impl RecordHeader {
  /// Returns the owner name of the record.
  #[inline]
  pub const fn name(&self) -> &Name {
    &self.name
  }

  /// Returns the type of the record.
  #[inline]
  pub const fn ty(&self) -> RecordType {
    self.ty
  }

  /// Returns the class of the record.
  #[inline]
  pub const fn class(&self) -> DNSClass {
    self.class
  }

  /// Returns the time-to-live of the record.
  #[inline]
  pub const fn ttl(&self) -> u32 {
    self.ttl
  }
}

/// The mDNS resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
  header: RecordHeader,
  data: RecordData,
}

impl Record {
  /// Creates a new IN-class resource record from its rdata.
  pub fn from_rdata(name: Name, ttl: u32, data: RecordData) -> Self {
    Self {
      header: RecordHeader {
        name,
        ty: data.ty(),
        class: DNSClass::IN,
        ttl,
      },
      data,
    }
  }

  /// Creates an `A` record. `fqdn` must be fully qualified.
  pub fn a(fqdn: &str, ttl: u32, addr: Ipv4Addr) -> Result<Self, NotFqdn> {
    Name::from_fqdn(fqdn).map(|name| Self::from_rdata(name, ttl, RecordData::A(addr)))
  }

  /// Creates an `AAAA` record. `fqdn` must be fully qualified.
  pub fn aaaa(fqdn: &str, ttl: u32, addr: Ipv6Addr) -> Result<Self, NotFqdn> {
    Name::from_fqdn(fqdn).map(|name| Self::from_rdata(name, ttl, RecordData::AAAA(addr)))
  }

  /// Creates a `PTR` record pointing at `target`. Both names must be
  /// fully qualified.
  pub fn ptr(fqdn: &str, ttl: u32, target: &str) -> Result<Self, NotFqdn> {
    let name = Name::from_fqdn(fqdn)?;
    let target = Name::from_fqdn(target)?;
    Ok(Self::from_rdata(name, ttl, RecordData::PTR(target)))
  }

  /// Creates an `SRV` record for a service instance. Both names must be
  /// fully qualified.
  pub fn srv(
    fqdn: &str,
    ttl: u32,
    priority: u16,
    weight: u16,
    port: u16,
    target: &str,
  ) -> Result<Self, NotFqdn> {
    let name = Name::from_fqdn(fqdn)?;
    let target = Name::from_fqdn(target)?;
    Ok(Self::from_rdata(
      name,
      ttl,
      RecordData::SRV(SRV::new(priority, weight, port, target)),
    ))
  }

  /// Creates a `TXT` record. An empty set of strings is valid and still
  /// produces a well-formed (single empty string) rdata on the wire.
  pub fn txt<I>(fqdn: &str, ttl: u32, strings: I) -> Result<Self, NotFqdn>
  where
    I: IntoIterator<Item = SmolStr>,
  {
    Name::from_fqdn(fqdn)
      .map(|name| Self::from_rdata(name, ttl, RecordData::TXT(Arc::from_iter(strings))))
  }

  /// Returns the shared record header.
  #[inline]
  pub const fn header(&self) -> &RecordHeader {
    &self.header
  }

  /// Returns the owner name of the record.
  #[inline]
  pub const fn name(&self) -> &Name {
    &self.header.name
  }

  /// Returns the type of the record.
  #[inline]
  pub const fn ty(&self) -> RecordType {
    self.header.ty
  }

  /// Returns the class of the record.
  #[inline]
  pub const fn class(&self) -> DNSClass {
    self.header.class
  }

  /// Returns the time-to-live of the record, in seconds.
  #[inline]
  pub const fn ttl(&self) -> u32 {
    self.header.ttl
  }

  /// Returns a reference to the record's data.
  #[inline]
  pub const fn data(&self) -> &RecordData {
    &self.data
  }

  /// Consumes the record and returns the [`RecordHeader`] and [`RecordData`].
  #[inline]
  pub fn into_components(self) -> (RecordHeader, RecordData) {
    (self.header, self.data)
  }

  /// Record identity as used for deduplication: same type, class and
  /// rdata. `ANY` on either side matches unconditionally.
  pub(crate) fn matches_identity(&self, other: &Self) -> bool {
    if matches!(self.header.ty, RecordType::ANY) || matches!(other.header.ty, RecordType::ANY) {
      return true;
    }

    self.header.ty == other.header.ty
      && self.header.class == other.header.class
      && self.data == other.data
  }

  pub(super) fn decode(src: &[u8], off: usize) -> Result<(Self, usize), ProtoError> {
    let (name, mut off) = Name::decode(src, off)?;
    let len = src.len();
    if len < off + RECORD_HEADER_ENCODED_WITHOUT_NAME_SIZE {
      return Err(ProtoError::BufferTooSmall);
    }

    let ty = RecordType::from(u16::from_be_bytes([src[off], src[off + 1]]));
    off += U16_SIZE;
    let class = DNSClass::from(u16::from_be_bytes([src[off], src[off + 1]]));
    off += U16_SIZE;
    let ttl = u32::from_be_bytes(src[off..off + U32_SIZE].try_into().unwrap());
    off += U32_SIZE;
    let rdlen = u16::from_be_bytes([src[off], src[off + 1]]) as usize;
    off += U16_SIZE;
    if off + rdlen > len {
      return Err(ProtoError::Overflow);
    }
    let rdata_end = off + rdlen;

    let data = match ty {
      RecordType::A => {
        if rdlen != IPV4_LEN {
          return Err(ProtoError::InvalidRdata);
        }
        let octets: [u8; IPV4_LEN] = src[off..off + IPV4_LEN].try_into().unwrap();
        RecordData::A(Ipv4Addr::from(octets))
      }
      RecordType::AAAA => {
        if rdlen != IPV6_LEN {
          return Err(ProtoError::InvalidRdata);
        }
        let octets: [u8; IPV6_LEN] = src[off..off + IPV6_LEN].try_into().unwrap();
        RecordData::AAAA(Ipv6Addr::from(octets))
      }
      RecordType::PTR => {
        // pointers may reach outside the rdata, so decode against the
        // whole message
        let (target, _) = Name::decode(src, off)?;
        RecordData::PTR(target)
      }
      RecordType::SRV => {
        if rdlen < 3 * U16_SIZE {
          return Err(ProtoError::NotEnoughData);
        }
        let priority = u16::from_be_bytes([src[off], src[off + 1]]);
        let weight = u16::from_be_bytes([src[off + 2], src[off + 3]]);
        let port = u16::from_be_bytes([src[off + 4], src[off + 5]]);
        let (target, _) = Name::decode(src, off + 3 * U16_SIZE)?;
        RecordData::SRV(SRV::new(priority, weight, port, target))
      }
      RecordType::TXT => {
        let (txt, _) = decode_txt(src, off, rdata_end)?;
        RecordData::TXT(txt)
      }
      _ => RecordData::Unknown {
        ty: ty.into(),
        rdata: Arc::from_iter(src[off..rdata_end].iter().copied()),
      },
    };

    Ok((
      Self {
        header: RecordHeader {
          name,
          ty,
          class,
          ttl,
        },
        data,
      },
      rdata_end,
    ))
  }

  pub(super) fn encode(
    &self,
    buf: &mut [u8],
    off: usize,
    cmap: &mut Option<CompressionMap>,
    compress: bool,
  ) -> Result<usize, ProtoError> {
    let mut off = self.header.name.encode(buf, off, cmap, compress)?;
    if buf.len() < off + RECORD_HEADER_ENCODED_WITHOUT_NAME_SIZE {
      return Err(ProtoError::BufferTooSmall);
    }

    buf[off..off + U16_SIZE].copy_from_slice(&u16::from(self.header.ty).to_be_bytes());
    off += U16_SIZE;
    buf[off..off + U16_SIZE].copy_from_slice(&u16::from(self.header.class).to_be_bytes());
    off += U16_SIZE;
    buf[off..off + U32_SIZE].copy_from_slice(&self.header.ttl.to_be_bytes());
    off += U32_SIZE;
    buf[off..off + U16_SIZE].copy_from_slice(&0u16.to_be_bytes()); // patched below
    off += U16_SIZE;

    let heoff = off;

    let off1 = match &self.data {
      RecordData::A(addr) => {
        if buf.len() < off + IPV4_LEN {
          return Err(ProtoError::BufferTooSmall);
        }
        buf[off..off + IPV4_LEN].copy_from_slice(&addr.octets());
        off + IPV4_LEN
      }
      RecordData::AAAA(addr) => {
        if buf.len() < off + IPV6_LEN {
          return Err(ProtoError::BufferTooSmall);
        }
        buf[off..off + IPV6_LEN].copy_from_slice(&addr.octets());
        off + IPV6_LEN
      }
      RecordData::PTR(target) => target.encode(buf, off, cmap, compress)?,
      RecordData::SRV(srv) => {
        if buf.len() < off + 3 * U16_SIZE {
          return Err(ProtoError::BufferTooSmall);
        }
        buf[off..off + U16_SIZE].copy_from_slice(&srv.priority().to_be_bytes());
        off += U16_SIZE;
        buf[off..off + U16_SIZE].copy_from_slice(&srv.weight().to_be_bytes());
        off += U16_SIZE;
        buf[off..off + U16_SIZE].copy_from_slice(&srv.port().to_be_bytes());
        off += U16_SIZE;

        // RFC 2782: name compression is not to be used for the target
        srv.target().encode(buf, off, cmap, false)?
      }
      RecordData::TXT(txt) => encode_txt(txt, buf, off)?,
      RecordData::Unknown { rdata, .. } => {
        if buf.len() < off + rdata.len() {
          return Err(ProtoError::BufferTooSmall);
        }
        buf[off..off + rdata.len()].copy_from_slice(rdata);
        off + rdata.len()
      }
    };

    let rdlen = off1 - heoff;
    if rdlen > u16::MAX as usize {
      return Err(ProtoError::InvalidRdata);
    }
    buf[heoff - U16_SIZE..heoff].copy_from_slice(&(rdlen as u16).to_be_bytes());

    Ok(off1)
  }

  /// Uncompressed upper bound of [`encode`](Record::encode).
  pub(super) fn encoded_len(&self) -> usize {
    let off = self.header.name.encoded_len() + RECORD_HEADER_ENCODED_WITHOUT_NAME_SIZE;
    off
      + match &self.data {
        RecordData::A(_) => IPV4_LEN,
        RecordData::AAAA(_) => IPV6_LEN,
        RecordData::PTR(target) => target.encoded_len(),
        RecordData::SRV(srv) => 3 * U16_SIZE + srv.target().encoded_len(),
        RecordData::TXT(txt) => txt_encoded_len(txt),
        RecordData::Unknown { rdata, .. } => rdata.len(),
      }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn roundtrip(record: &Record) -> Record {
    let mut buf = vec![0u8; record.encoded_len()];
    let end = record.encode(&mut buf, 0, &mut None, false).unwrap();
    let (back, off) = Record::decode(&buf[..end], 0).unwrap();
    assert_eq!(off, end);
    back
  }

  #[test]
  fn srv_roundtrip() {
    let record = Record::srv("stora._ssh._tcp.local.", 60, 0, 0, 22, "stora.local.").unwrap();
    assert_eq!(roundtrip(&record), record);
  }

  #[test]
  fn empty_txt_still_emits_one_string() {
    let record = Record::txt("stora._ssh._tcp.local.", 60, []).unwrap();
    let mut buf = vec![0u8; record.encoded_len()];
    let end = record.encode(&mut buf, 0, &mut None, false).unwrap();
    // rdlen 1, a single zero-length character-string
    assert_eq!(&buf[end - 3..end], &[0, 1, 0]);
    assert_eq!(roundtrip(&record), record);
  }

  #[test]
  fn unknown_rdata_is_carried_verbatim() {
    let name = Name::from("stora.local.");
    let data = RecordData::Unknown {
      ty: 47, // NSEC
      rdata: Arc::from_iter([0xde, 0xad, 0xbe, 0xef]),
    };
    let record = Record::from_rdata(name, 120, data);
    assert_eq!(record.ty(), RecordType::UNKNOWN(47));
    assert_eq!(roundtrip(&record), record);
  }

  #[test]
  fn identity_ignores_ttl_and_wildcards_any() {
    let one = Record::a("stora.local.", 60, "192.168.1.200".parse().unwrap()).unwrap();
    let two = Record::a("stora.local.", 3600, "192.168.1.200".parse().unwrap()).unwrap();
    let other = Record::a("stora.local.", 60, "192.168.1.201".parse().unwrap()).unwrap();
    assert!(one.matches_identity(&two));
    assert!(!one.matches_identity(&other));

    let any = Record {
      header: RecordHeader {
        name: Name::from("stora.local."),
        ty: RecordType::ANY,
        class: DNSClass::IN,
        ttl: 0,
      },
      data: RecordData::Unknown {
        ty: RecordType::ANY.into(),
        rdata: Arc::from_iter([0u8; 0]),
      },
    };
    assert!(any.matches_identity(&one));
    assert!(one.matches_identity(&any));
  }

  #[test]
  fn rejects_unqualified_names() {
    assert!(Record::a("stora.local", 60, "192.168.1.200".parse().unwrap()).is_err());
    assert!(Record::ptr("_ssh._tcp.local.", 60, "stora._ssh._tcp.local").is_err());
  }
}
