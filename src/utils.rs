use std::{
  io,
  net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use crate::{IPV4_MDNS, IPV6_MDNS};

/// Which multicast endpoint a responder socket serves, carrying the
/// family's interface selection.
#[derive(Copy, Clone)]
enum Family {
  V4(Option<Ipv4Addr>),
  V6(Option<u32>),
}

pub(crate) fn multicast_udp4_socket(ifi: Option<Ipv4Addr>, port: u16) -> io::Result<UdpSocket> {
  multicast_socket(Family::V4(ifi), port)
}

pub(crate) fn multicast_udp6_socket(ifi: Option<u32>, port: u16) -> io::Result<UdpSocket> {
  multicast_socket(Family::V6(ifi), port)
}

/// Opens a nonblocking UDP socket bound to the family's wildcard address
/// on `port`, joined to the well-known mDNS group of that family.
///
/// Loopback is left enabled so responders and browsers in the same host
/// hear each other.
fn multicast_socket(family: Family, port: u16) -> io::Result<UdpSocket> {
  let sock = sys::reusable_dgram_socket(family, port)?;
  sock.set_nonblocking(true)?;

  match family {
    Family::V4(ifi) => {
      sock.join_multicast_v4(&IPV4_MDNS, &ifi.unwrap_or(Ipv4Addr::UNSPECIFIED))?;
      sock.set_multicast_loop_v4(true)?;
    }
    Family::V6(ifi) => {
      sock.join_multicast_v6(&IPV6_MDNS, ifi.unwrap_or(0))?;
      sock.set_multicast_loop_v6(true)?;
    }
  }

  Ok(sock)
}

#[cfg(unix)]
mod sys {
  use super::*;
  use rustix::net::{AddressFamily, SocketType, bind, ipproto, socket, sockopt};

  /// Port 5353 is shared with every other mDNS stack on the host, so the
  /// socket is made reusable (SO_REUSEADDR and SO_REUSEPORT) before it is
  /// bound to the wildcard address.
  pub(super) fn reusable_dgram_socket(family: Family, port: u16) -> io::Result<UdpSocket> {
    let af = match family {
      Family::V4(_) => AddressFamily::INET,
      Family::V6(_) => AddressFamily::INET6,
    };
    let sock = socket(af, SocketType::DGRAM, Some(ipproto::UDP))?;
    sockopt::set_socket_reuseaddr(&sock, true)?;
    sockopt::set_socket_reuseport(&sock, true)?;

    let addr: SocketAddr = match family {
      Family::V4(_) => (Ipv4Addr::UNSPECIFIED, port).into(),
      Family::V6(_) => {
        sockopt::set_ipv6_v6only(&sock, true)?;
        (Ipv6Addr::UNSPECIFIED, port).into()
      }
    };
    bind(&sock, &addr)?;

    match family {
      Family::V4(Some(ifi)) if !ifi.is_unspecified() => {
        sockopt::set_ip_multicast_if(&sock, &ifi)?;
      }
      Family::V6(Some(ifi)) if ifi != 0 => {
        sockopt::set_ipv6_multicast_if(&sock, ifi)?;
      }
      _ => {}
    }

    Ok(UdpSocket::from(sock))
  }
}

#[cfg(windows)]
mod sys {
  use super::*;
  use socket2::{Domain, Protocol, Socket, Type};

  /// Port 5353 is shared with every other mDNS stack on the host, so the
  /// socket is made reusable before it is bound to the wildcard address.
  /// SO_REUSEPORT does not exist on windows; SO_REUSEADDR covers both.
  pub(super) fn reusable_dgram_socket(family: Family, port: u16) -> io::Result<UdpSocket> {
    let domain = match family {
      Family::V4(_) => Domain::IPV4,
      Family::V6(_) => Domain::IPV6,
    };
    let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;

    let addr: SocketAddr = match family {
      Family::V4(_) => (Ipv4Addr::UNSPECIFIED, port).into(),
      Family::V6(_) => {
        sock.set_only_v6(true)?;
        (Ipv6Addr::UNSPECIFIED, port).into()
      }
    };
    sock.bind(&addr.into())?;

    match family {
      Family::V4(Some(ifi)) if !ifi.is_unspecified() => sock.set_multicast_if_v4(&ifi)?,
      Family::V6(Some(ifi)) if ifi != 0 => sock.set_multicast_if_v6(ifi)?,
      _ => {}
    }

    Ok(UdpSocket::from(sock))
  }
}
