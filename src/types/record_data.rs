use std::net::{Ipv4Addr, Ipv6Addr};

use smol_str::SmolStr;
use triomphe::Arc;

use super::{Name, ProtoError, RecordType};

/// [RFC 2782, DNS SRV RR, February 2000](https://tools.ietf.org/html/rfc2782)
///
/// ```text
/// The format of the SRV RR
///
///  _Service._Proto.Name TTL Class SRV Priority Weight Port Target
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
#[allow(clippy::upper_case_acronyms)]
pub struct SRV {
  priority: u16,
  weight: u16,
  port: u16,
  target: Name,
}

impl SRV {
  /// Creates a new SRV record data.
  ///
  /// # Arguments
  ///
  /// * `priority` - lower values have a higher priority and clients will attempt to use these
  ///   first.
  /// * `weight` - for servers with the same priority, higher weights will be chosen more often.
  /// * `port` - the socket port number on which the service is listening.
  /// * `target` - the target domain name the service lives on; there must be address records
  ///   for this name and, unlike CNAME, it is never compressed on the wire.
  #[inline]
  pub const fn new(priority: u16, weight: u16, port: u16, target: Name) -> Self {
    Self {
      priority,
      weight,
      port,
      target,
    }
  }

  /// The priority of this target host. A client attempts the
  /// lowest-numbered priority it can reach.
  #[inline]
  pub const fn priority(&self) -> u16 {
    self.priority
  }

  /// The relative weight for entries with the same priority.
  #[inline]
  pub const fn weight(&self) -> u16 {
    self.weight
  }

  /// The port on this target host of this service.
  #[inline]
  pub const fn port(&self) -> u16 {
    self.port
  }

  /// The domain name of the target host.
  #[inline]
  pub const fn target(&self) -> &Name {
    &self.target
  }

  /// Consumes the SRV record data and returns the target.
  #[inline]
  pub fn into_target(self) -> Name {
    self.target
  }
}

/// The data of an mDNS resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RecordData {
  /// ```text
  /// -- RFC 1035 -- Domain Implementation and Specification    November 1987
  ///
  /// 3.4.1. A RDATA format
  ///
  /// ADDRESS         A 32 bit Internet address.
  /// ```
  A(Ipv4Addr),
  /// ```text
  /// -- RFC 1886 -- IPv6 DNS Extensions              December 1995
  ///
  /// 2.2 AAAA data format
  ///
  ///    A 128 bit IPv6 address is encoded in the data portion of an AAAA
  ///    resource record in network byte order (high-order byte first).
  /// ```
  AAAA(Ipv6Addr),
  /// ```text
  /// 3.3.12. PTR RDATA format
  ///
  /// PTRDNAME        A <domain-name> which points to some location in the
  ///                 domain name space.
  /// ```
  PTR(Name),
  /// See [`SRV`].
  SRV(SRV),
  /// ```text
  /// 3.3.14. TXT RDATA format
  ///
  /// TXT-DATA        One or more <character-string>s.
  /// ```
  ///
  /// An empty slice still encodes as a single zero-length string so
  /// DNS-SD browsers do not filter the instance.
  TXT(Arc<[SmolStr]>),
  /// Rdata of a type the zone does not interpret, carried verbatim.
  Unknown {
    /// The numeric record type
    ty: u16,
    /// The raw rdata octets as received
    rdata: Arc<[u8]>,
  },
}

impl From<Ipv4Addr> for RecordData {
  #[inline]
  fn from(value: Ipv4Addr) -> Self {
    Self::A(value)
  }
}

impl From<Ipv6Addr> for RecordData {
  #[inline]
  fn from(value: Ipv6Addr) -> Self {
    Self::AAAA(value)
  }
}

impl From<SRV> for RecordData {
  #[inline]
  fn from(value: SRV) -> Self {
    Self::SRV(value)
  }
}

impl RecordData {
  /// Returns the type of the record data.
  #[inline]
  pub const fn ty(&self) -> RecordType {
    match self {
      Self::A(_) => RecordType::A,
      Self::AAAA(_) => RecordType::AAAA,
      Self::PTR(_) => RecordType::PTR,
      Self::SRV(_) => RecordType::SRV,
      Self::TXT(_) => RecordType::TXT,
      Self::Unknown { ty, .. } => RecordType::UNKNOWN(*ty),
    }
  }
}

/// Decodes the `<character-string>` sequence of a TXT rdata between
/// `off` and `end`.
pub(super) fn decode_txt(
  src: &[u8],
  mut off: usize,
  end: usize,
) -> Result<(Arc<[SmolStr]>, usize), ProtoError> {
  let mut strings = Vec::new();
  while off < end {
    let len = src[off] as usize;
    off += 1;
    if off + len > end {
      return Err(ProtoError::NotEnoughData);
    }
    let s = core::str::from_utf8(&src[off..off + len]).map_err(ProtoError::Utf8)?;
    strings.push(SmolStr::new(s));
    off += len;
  }
  Ok((Arc::from_iter(strings), off))
}

/// Encodes a TXT rdata; an empty set of strings becomes one zero-length
/// `<character-string>`.
pub(super) fn encode_txt(txt: &[SmolStr], buf: &mut [u8], mut off: usize) -> Result<usize, ProtoError> {
  if txt.is_empty() {
    if off >= buf.len() {
      return Err(ProtoError::BufferTooSmall);
    }
    buf[off] = 0;
    return Ok(off + 1);
  }

  for s in txt {
    let len = s.len();
    if len > 255 {
      return Err(ProtoError::TxtDataTooLong);
    }
    if off + 1 + len > buf.len() {
      return Err(ProtoError::BufferTooSmall);
    }
    buf[off] = len as u8;
    off += 1;
    buf[off..off + len].copy_from_slice(s.as_bytes());
    off += len;
  }
  Ok(off)
}

/// Sum of the encoded `<character-string>` lengths.
pub(super) fn txt_encoded_len(txt: &[SmolStr]) -> usize {
  if txt.is_empty() {
    return 1;
  }
  txt.iter().map(|s| s.len() + 1).sum()
}
