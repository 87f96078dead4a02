use smol_str::SmolStr;

use super::{
  CompressionMap, ProtoError, SlicableSmolStr, escape_byte, is_ddd, ddd_to_byte,
  MAX_COMPRESSION_OFFSET, MAX_COMPRESSION_POINTERS, MAX_DOMAIN_NAME_WIRE_OCTETS, MAX_LABEL_OCTETS,
};

/// The error returned when a domain name misses its trailing dot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not a fully qualified domain name")]
pub struct NotFqdn(pub SmolStr);

/// An owner name in canonical form: case-folded ASCII ending with a dot.
///
/// Comparison and hashing happen on the canonical form, so
/// `Name::from("Stora.Local")` and `Name::from("stora.local.")` denote the
/// same owner. The empty name is used as the wildcard filter of a
/// subscription and never appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(SmolStr);

impl core::fmt::Display for Name {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.0.as_str())
  }
}

impl From<&str> for Name {
  fn from(s: &str) -> Self {
    Self(canonical(s))
  }
}

impl From<SmolStr> for Name {
  fn from(s: SmolStr) -> Self {
    Self(canonical(s.as_str()))
  }
}

impl AsRef<str> for Name {
  #[inline]
  fn as_ref(&self) -> &str {
    self.0.as_str()
  }
}

impl Name {
  /// Parses a fully qualified domain name, rejecting names without the
  /// trailing dot instead of appending it.
  pub fn from_fqdn(s: &str) -> Result<Self, NotFqdn> {
    if !crate::is_fqdn(s) {
      return Err(NotFqdn(s.into()));
    }
    Ok(Self(canonical(s)))
  }

  /// The `local.` pseudo-TLD every owner name of the zone sits under.
  #[inline]
  pub fn local() -> Self {
    Self(SmolStr::new_static("local."))
  }

  /// Joins a service and a domain into a fully qualified name.
  pub fn append_fqdn(this: &str, other: &str) -> Self {
    Self(canonical(&smol_str::format_smolstr!(
      "{}.{}.",
      this.trim_matches('.'),
      other.trim_matches('.')
    )))
  }

  /// Returns the canonical textual form.
  #[inline]
  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  /// Returns `true` for the empty (wildcard) name.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub(crate) fn decode(msg: &[u8], mut off: usize) -> Result<(Self, usize), ProtoError> {
    // Start with a smaller capacity and let it grow as needed
    let mut s = InlineDomain::with_capacity(23); // Most domain names are shorter than 32 bytes
    let mut off1 = 0;
    let lenmsg = msg.len();
    let mut budget = MAX_DOMAIN_NAME_WIRE_OCTETS as isize;
    let mut ptr = 0; // number of pointers followed

    loop {
      if off >= lenmsg {
        return Err(ProtoError::BufferTooSmall);
      }

      let c = msg[off];
      off += 1;

      match c & 0xC0 {
        0x00 => {
          if c == 0x00 {
            // end of name
            break;
          }

          // literal string
          let label_len = c as usize;
          if off + label_len > lenmsg {
            return Err(ProtoError::BufferTooSmall);
          }

          budget -= (label_len as isize) + 1; // +1 for the label separator
          if budget <= 0 {
            return Err(ProtoError::NameTooLong);
          }

          for &b in msg[off..off + label_len].iter() {
            if is_domain_name_label_special(b) {
              s.extend_from_slice(&[b'\\', b]);
            } else if !(b' '..=b'~').contains(&b) {
              s.extend_from_slice(&escape_byte(b));
            } else {
              // owner names are keyed case-folded
              s.push(b.to_ascii_lowercase());
            }
          }
          s.push(b'.');
          off += label_len;
        }
        0xC0 => {
          // pointer to somewhere else in msg.
          // remember location after first ptr,
          // since that's how many bytes we consumed.
          // also, don't follow too many pointers --
          // maybe there's a loop.
          if off >= lenmsg {
            return Err(ProtoError::NotEnoughData);
          }

          let c1 = msg[off];
          off += 1;

          if ptr == 0 {
            off1 = off;
          }

          ptr += 1;
          if ptr > MAX_COMPRESSION_POINTERS {
            return Err(ProtoError::TooManyPointers);
          }

          off = ((c as usize ^ 0xC0) << 8) | c1 as usize;
        }
        _ => return Err(ProtoError::InvalidRdata),
      }
    }

    if ptr == 0 {
      off1 = off;
    }

    if s.is_empty() {
      Ok((Self(SmolStr::new_static(".")), off1))
    } else {
      // We only added ASCII bytes and properly escaped non-ASCII
      let s = core::str::from_utf8(s.as_slice()).map_err(ProtoError::Utf8)?;
      Ok((Self(SmolStr::new(s)), off1))
    }
  }

  /// Writes the name in wire format at `off`, emitting a compression
  /// pointer for any suffix already present in `cmap` (when `compress`)
  /// and registering new suffixes for later names.
  pub(crate) fn encode(
    &self,
    buf: &mut [u8],
    mut off: usize,
    cmap: &mut Option<CompressionMap>,
    compress: bool,
  ) -> Result<usize, ProtoError> {
    let txt = self.0.as_str();
    if txt.is_empty() || txt == "." {
      if off >= buf.len() {
        return Err(ProtoError::BufferTooSmall);
      }
      buf[off] = 0;
      return Ok(off + 1);
    }

    let s = txt.as_bytes();
    let mut label = [0u8; MAX_LABEL_OCTETS];
    let mut label_len = 0usize;
    let mut begin = 0usize; // textual offset where the current label starts
    let mut budget = MAX_DOMAIN_NAME_WIRE_OCTETS as isize - 1; // terminator
    let mut i = 0usize;

    while i < s.len() {
      match s[i] {
        b'\\' => {
          if is_ddd(&s[i + 1..]) {
            if label_len == MAX_LABEL_OCTETS {
              return Err(ProtoError::LabelTooLong);
            }
            label[label_len] = ddd_to_byte(&s[i + 1..]);
            label_len += 1;
            i += 4;
          } else {
            if i + 1 >= s.len() {
              return Err(ProtoError::InvalidRdata);
            }
            if label_len == MAX_LABEL_OCTETS {
              return Err(ProtoError::LabelTooLong);
            }
            label[label_len] = s[i + 1];
            label_len += 1;
            i += 2;
          }
        }
        b'.' => {
          // empty interior labels are not representable on the wire
          if label_len == 0 {
            return Err(ProtoError::InvalidRdata);
          }

          // a suffix seen earlier in the message collapses to a pointer
          if let Some(cmap) = cmap.as_mut() {
            let suffix = &txt[begin..];
            match cmap.find(suffix) {
              Some(pos) if compress => {
                if off + 2 > buf.len() {
                  return Err(ProtoError::BufferTooSmall);
                }
                buf[off] = 0xC0 | (pos >> 8) as u8;
                buf[off + 1] = pos as u8;
                return Ok(off + 2);
              }
              Some(_) => {}
              None => {
                if off < MAX_COMPRESSION_OFFSET {
                  cmap.insert(SlicableSmolStr::new(self.0.clone(), begin, txt.len()), off as u16);
                }
              }
            }
          }

          budget -= label_len as isize + 1;
          if budget < 0 {
            return Err(ProtoError::NameTooLong);
          }
          if off + 1 + label_len > buf.len() {
            return Err(ProtoError::BufferTooSmall);
          }
          buf[off] = label_len as u8;
          off += 1;
          buf[off..off + label_len].copy_from_slice(&label[..label_len]);
          off += label_len;
          label_len = 0;
          i += 1;
          begin = i;
        }
        b => {
          if label_len == MAX_LABEL_OCTETS {
            return Err(ProtoError::LabelTooLong);
          }
          label[label_len] = b;
          label_len += 1;
          i += 1;
        }
      }
    }

    // canonical names end with a dot, so the last label was flushed above
    if label_len != 0 {
      return Err(ProtoError::InvalidRdata);
    }
    if off >= buf.len() {
      return Err(ProtoError::BufferTooSmall);
    }
    buf[off] = 0;
    Ok(off + 1)
  }

  /// Uncompressed upper bound of [`encode`](Name::encode): every textual
  /// byte plus the first length octet and the terminating root octet.
  #[inline]
  pub(crate) fn encoded_len(&self) -> usize {
    self.0.len() + 2
  }
}

fn canonical(s: &str) -> SmolStr {
  if s.is_empty() {
    return SmolStr::default();
  }

  let folded = s.bytes().all(|b| !b.is_ascii_uppercase());
  if folded && s.ends_with('.') {
    return SmolStr::new(s);
  }

  let mut buf = String::with_capacity(s.len() + 1);
  buf.extend(s.chars().map(|c| c.to_ascii_lowercase()));
  if !s.ends_with('.') {
    buf.push('.');
  }
  SmolStr::from(buf)
}

// Returns true if
// a domain name label byte should be prefixed
// with an escaping backslash.
#[inline]
const fn is_domain_name_label_special(b: u8) -> bool {
  matches!(
    b,
    b'.' | b' ' | b'\'' | b'@' | b';' | b'(' | b')' | b'"' | b'\\'
  )
}

smallvec_wrapper::smallvec_wrapper!(
  InlineDomain<T>([T; 23]);
);

#[cfg(test)]
mod tests {
  use super::*;

  const MAX_PRINTABLE_LABEL: &str =
    "abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz0123456789x";

  #[test]
  fn empty_domain() {
    let input = [0];
    let (name, _) = Name::decode(&input, 0).unwrap();
    assert_eq!(name.as_str(), ".");
  }

  #[test]
  fn long_label() {
    let s = [b"?".as_slice(), MAX_PRINTABLE_LABEL.as_bytes(), b"\x00"].concat();
    let exp = [MAX_PRINTABLE_LABEL, "."].concat();
    let (name, _) = Name::decode(&s, 0).unwrap();
    assert_eq!(name.as_str(), exp);
  }

  #[test]
  fn decode_folds_case() {
    let input = [5, b'S', b't', b'o', b'r', b'a', 5, b'L', b'o', b'c', b'a', b'l', 0];
    let (name, off) = Name::decode(&input, 0).unwrap();
    assert_eq!(name.as_str(), "stora.local.");
    assert_eq!(off, input.len());
  }

  #[test]
  fn compression_pointer() {
    let input = [
      3, b'f', b'o', b'o', 5, 3, b'c', b'o', b'm', 0, 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
      0xC0, 5,
    ];

    let exp = "foo.\\003com\\000.example.com.";
    let (name, _) = Name::decode(&input, 0).unwrap();
    assert_eq!(name.as_str(), exp);
  }

  #[test]
  fn truncated_name() {
    let input = [7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3];
    let err = Name::decode(&input, 0).unwrap_err();
    assert_eq!(err, ProtoError::BufferTooSmall);
  }

  #[test]
  fn compression_pointer_cycle_too_many() {
    let input = [0xC0, 0x00];
    let err = Name::decode(&input, 0).unwrap_err();
    assert_eq!(err, ProtoError::TooManyPointers);
  }

  #[test]
  fn compression_pointer_cycle_too_long() {
    let input = [
      3, b'f', b'o', b'o', 3, b'b', b'a', b'r', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0xC0,
      0x04,
    ];
    let err = Name::decode(&input, 0).unwrap_err();
    assert_eq!(err, ProtoError::NameTooLong);
  }

  #[test]
  fn reserved_compression_pointer_0b10() {
    let input = [7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x80];
    let err = Name::decode(&input, 0).unwrap_err();
    assert_eq!(err, ProtoError::InvalidRdata);
  }

  #[test]
  fn canonical_from_str() {
    assert_eq!(Name::from("Router.Local").as_str(), "router.local.");
    assert_eq!(Name::from("router.local."), Name::from("ROUTER.LOCAL."));
    assert!(Name::from("").is_empty());
  }

  #[test]
  fn from_fqdn_requires_trailing_dot() {
    assert!(Name::from_fqdn("stora.local.").is_ok());
    assert_eq!(
      Name::from_fqdn("stora.local").unwrap_err(),
      NotFqdn("stora.local".into())
    );
  }

  #[test]
  fn encode_decode_roundtrip() {
    let name = Name::from("stora._ssh._tcp.local.");
    let mut buf = [0u8; 64];
    let end = name.encode(&mut buf, 0, &mut None, false).unwrap();
    assert!(end <= name.encoded_len());
    let (back, off) = Name::decode(&buf[..end], 0).unwrap();
    assert_eq!(off, end);
    assert_eq!(back, name);
  }

  #[test]
  fn encode_compresses_shared_suffix() {
    let first = Name::from("stora.local.");
    let second = Name::from("router.local.");
    let mut buf = [0u8; 64];
    let mut cmap = Some(CompressionMap::new());

    let mid = first.encode(&mut buf, 0, &mut cmap, true).unwrap();
    let end = second.encode(&mut buf, mid, &mut cmap, true).unwrap();
    // "local." collapses into a pointer to offset 6
    assert_eq!(&buf[mid..end], &[6, b'r', b'o', b'u', b't', b'e', b'r', 0xC0, 6]);

    let (back, _) = Name::decode(&buf[..end], mid).unwrap();
    assert_eq!(back, second);
  }

  #[test]
  fn encode_escaped_label_bytes() {
    let name = Name::from("a\\.b.local.");
    let mut buf = [0u8; 32];
    let end = name.encode(&mut buf, 0, &mut None, false).unwrap();
    assert_eq!(&buf[..5], &[3, b'a', b'.', b'b', 5]);
    let (back, _) = Name::decode(&buf[..end], 0).unwrap();
    assert_eq!(back, name);
  }

  #[test]
  fn encode_rejects_oversized_label() {
    let long = "x".repeat(64);
    let name = Name::from(format!("{long}.local.").as_str());
    let mut buf = [0u8; 256];
    assert_eq!(
      name.encode(&mut buf, 0, &mut None, false).unwrap_err(),
      ProtoError::LabelTooLong
    );
  }
}
