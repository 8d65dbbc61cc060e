//! Balancing targets.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One dispatch target: an address and a port.
///
/// Equality is exact. An IPv4 address never equals its IPv4-mapped IPv6
/// form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Host {
    pub addr: IpAddr,
    pub port: u16,
}

impl Host {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl From<SocketAddr> for Host {
    fn from(sa: SocketAddr) -> Self {
        Self::new(sa.ip(), sa.port())
    }
}

/// Formats as `addr:port`, bracketing IPv6 addresses.
impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.socket_addr(), f)
    }
}

/// Set comparison of two host lists, ignoring order.
///
/// Lists of different length are never equal; otherwise every host of `a`
/// must appear in `b`. Snapshots are small, so the quadratic scan is fine.
pub fn same_hosts(a: &[Host], b: &[Host]) -> bool {
    a.len() == b.len() && a.iter().all(|h| b.contains(h))
}
