use super::{CompressionMap, DNSClass, Name, ProtoError, RecordType, U16_SIZE};

/// A DNS question: an owner name, a query type and a query class.
///
/// Questions double as subscription filters: a filter built by
/// [`type_filter`](Question::type_filter) carries the empty name and
/// matches entries of any owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
  name: Name,
  ty: RecordType,
  class: DNSClass,
  want_unicast_response: bool,
}

impl Question {
  /// Creates a new IN-class question.
  #[inline]
  pub const fn new(name: Name, ty: RecordType) -> Self {
    Self {
      name,
      ty,
      class: DNSClass::IN,
      want_unicast_response: false,
    }
  }

  /// Creates an `ANY` question for an owner name.
  #[inline]
  pub const fn any(name: Name) -> Self {
    Self::new(name, RecordType::ANY)
  }

  /// Creates a subscription filter matching every owner name whose
  /// record type is `ty` (or anything, for `ANY`).
  #[inline]
  pub fn type_filter(ty: RecordType) -> Self {
    Self::new(Name::default(), ty)
  }

  /// Returns the owner name the question asks about.
  #[inline]
  pub const fn name(&self) -> &Name {
    &self.name
  }

  /// Returns the query type.
  #[inline]
  pub const fn ty(&self) -> RecordType {
    self.ty
  }

  /// Returns the query class.
  #[inline]
  pub const fn class(&self) -> DNSClass {
    self.class
  }

  /// Whether the querier asked for a unicast response (RFC 6762 §5.4,
  /// top bit of qclass). Decoded for completeness; responses always go
  /// to the multicast group.
  #[inline]
  pub const fn want_unicast_response(&self) -> bool {
    self.want_unicast_response
  }

  /// Whether the question's type accepts a record of type `ty`.
  #[inline]
  pub fn matches_type(&self, ty: RecordType) -> bool {
    matches!(self.ty, RecordType::ANY) || self.ty == ty
  }

  /// Decodes a question, tolerating the truncated trailing questions
  /// some stacks emit.
  pub(super) fn decode(src: &[u8], off: usize) -> Result<(Self, usize), ProtoError> {
    let (name, mut off) = Name::decode(src, off)?;
    let len = src.len();
    if off == len {
      return Ok((
        Self {
          name,
          ty: RecordType::UNKNOWN(0),
          class: DNSClass::UNKNOWN(0),
          want_unicast_response: false,
        },
        off,
      ));
    }

    if len < off + U16_SIZE {
      return Err(ProtoError::NotEnoughData);
    }
    let ty = RecordType::from(u16::from_be_bytes([src[off], src[off + 1]]));
    off += U16_SIZE;
    if len == off {
      return Ok((
        Self {
          name,
          ty,
          class: DNSClass::UNKNOWN(0),
          want_unicast_response: false,
        },
        off,
      ));
    }

    if len < off + U16_SIZE {
      return Err(ProtoError::NotEnoughData);
    }
    let bclass = u16::from_be_bytes([src[off], src[off + 1]]);
    off += U16_SIZE;
    Ok((
      Self {
        name,
        ty,
        // the top bit is the unicast-response flag, not part of the class
        class: DNSClass::from(bclass & 0x7FFF),
        want_unicast_response: bclass & (1 << 15) != 0,
      },
      off,
    ))
  }

  pub(super) fn encode(
    &self,
    buf: &mut [u8],
    off: usize,
    cmap: &mut Option<CompressionMap>,
  ) -> Result<usize, ProtoError> {
    let mut off = self.name.encode(buf, off, cmap, true)?;
    if buf.len() < off + 2 * U16_SIZE {
      return Err(ProtoError::BufferTooSmall);
    }
    buf[off..off + U16_SIZE].copy_from_slice(&u16::from(self.ty).to_be_bytes());
    off += U16_SIZE;
    buf[off..off + U16_SIZE].copy_from_slice(&u16::from(self.class).to_be_bytes());
    Ok(off + U16_SIZE)
  }

  #[inline]
  pub(super) fn encoded_len(&self) -> usize {
    self.name.encoded_len() + 2 * U16_SIZE
  }
}
