#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

#[cfg(test)]
mod tests;

use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4_MDNS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const IPV6_MDNS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);
const MDNS_PORT: u16 = 5353;
// mDNS messages are carried in single UDP datagrams; see RFC 6762.
const MAX_PAYLOAD_SIZE: usize = 1500;

/// mDNS multicast responders
mod server;
pub use server::*;

mod types;
pub use types::*;

mod zone;
pub use zone::*;

mod utils;

pub use agnostic_net as net;
pub use iprobe as netprobe;
pub use smol_str::SmolStr;

/// Types for `tokio` runtime
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod tokio {
  use std::sync::OnceLock;

  pub use agnostic_net::{runtime::tokio::TokioRuntime as Runtime, tokio::Net};

  /// A zone that can be used with `tokio` runtime
  pub type Zone = super::Zone<Runtime>;

  /// A server that can be used with `tokio` runtime
  pub type Server = super::Server<Net>;

  /// Returns the default zone of this process, starting its mainloop
  /// and the multicast responders on the first call.
  ///
  /// The first call must be made from within the runtime. Failing to
  /// bind port 5353 or join the multicast groups is a configuration
  /// error and fatal here; construct the generic `Zone` and `Server`
  /// directly for a fallible setup.
  pub fn local() -> &'static Zone {
    static LOCAL: OnceLock<(Zone, Server)> = OnceLock::new();
    let (zone, _server) = LOCAL.get_or_init(|| {
      let zone = Zone::new();
      let server = Server::new(zone.clone(), super::ServerOptions::new())
        .expect("mdns: failed to start the multicast listeners");
      (zone, server)
    });
    zone
  }
}

/// Types for `smol` runtime
#[cfg(feature = "smol")]
#[cfg_attr(docsrs, doc(cfg(feature = "smol")))]
pub mod smol {
  use std::sync::OnceLock;

  pub use agnostic_net::{runtime::smol::SmolRuntime as Runtime, smol::Net};

  /// A zone that can be used with `smol` runtime
  pub type Zone = super::Zone<Runtime>;

  /// A server that can be used with `smol` runtime
  pub type Server = super::Server<Net>;

  /// Returns the default zone of this process, starting its mainloop
  /// and the multicast responders on the first call.
  ///
  /// The first call must be made from within the runtime. Failing to
  /// bind port 5353 or join the multicast groups is a configuration
  /// error and fatal here; construct the generic `Zone` and `Server`
  /// directly for a fallible setup.
  pub fn local() -> &'static Zone {
    static LOCAL: OnceLock<(Zone, Server)> = OnceLock::new();
    let (zone, _server) = LOCAL.get_or_init(|| {
      let zone = Zone::new();
      let server = Server::new(zone.clone(), super::ServerOptions::new())
        .expect("mdns: failed to start the multicast listeners");
      (zone, server)
    });
    zone
  }
}

/// Types for `async-std` runtime
#[cfg(feature = "async-std")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-std")))]
pub mod async_std {
  use std::sync::OnceLock;

  pub use agnostic_net::{async_std::Net, runtime::async_std::AsyncStdRuntime as Runtime};

  /// A zone that can be used with `async-std` runtime
  pub type Zone = super::Zone<Runtime>;

  /// A server that can be used with `async-std` runtime
  pub type Server = super::Server<Net>;

  /// Returns the default zone of this process, starting its mainloop
  /// and the multicast responders on the first call.
  ///
  /// The first call must be made from within the runtime. Failing to
  /// bind port 5353 or join the multicast groups is a configuration
  /// error and fatal here; construct the generic `Zone` and `Server`
  /// directly for a fallible setup.
  pub fn local() -> &'static Zone {
    static LOCAL: OnceLock<(Zone, Server)> = OnceLock::new();
    let (zone, _server) = LOCAL.get_or_init(|| {
      let zone = Zone::new();
      let server = Server::new(zone.clone(), super::ServerOptions::new())
        .expect("mdns: failed to start the multicast listeners");
      (zone, server)
    });
    zone
  }
}

/// Returns `true` if a domain name is fully qualified domain name
///
/// ## Examples
///
/// ```
/// use mdns_zone::is_fqdn;
///
/// assert!(is_fqdn("stora.local."));
/// assert!(!is_fqdn("stora.local"));
/// ```
#[inline]
pub fn is_fqdn(s: &str) -> bool {
  let len = s.len();
  if s.is_empty() || !s.ends_with('.') {
    return false;
  }

  let s = &s[..len - 1];

  if s.is_empty() || !s.ends_with('\\') {
    return true;
  }

  // Count backslashes at the end
  let last_non_backslash = s.rfind(|c| c != '\\').unwrap_or(0);

  (len - last_non_backslash) % 2 == 0
}
