//! Host balancing.
//!
//! A [`Balancer`] hands out one [`Host`] per call. [`DnsBalancer`] keeps a
//! snapshot of the addresses a hostname resolves to and refreshes it in the
//! background, so `next()` never waits on DNS.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dnsbalancer::balancer::{Balancer, DnsBalancer, DnsBalancerConfig};
//! use dnsbalancer::dns::HickoryResolver;
//!
//! let config = DnsBalancerConfig::new("example.com", 443);
//! let balancer = DnsBalancer::new(config, Arc::new(HickoryResolver::new())).await?;
//! let host = balancer.next()?;
//! println!("dialing {host}");
//! ```

mod host;
mod refresh;

use crate::base::neterror::NetError;

pub use host::{same_hosts, Host};
pub use refresh::{BalancerState, DnsBalancer, DnsBalancerConfig};

/// Source of dispatch targets.
pub trait Balancer: Send + Sync {
    /// Picks the host for the next request.
    ///
    /// Fails with [`NetError::NoHosts`] when there is nothing to pick.
    fn next(&self) -> Result<Host, NetError>;
}

impl<B: Balancer + ?Sized> Balancer for std::sync::Arc<B> {
    fn next(&self) -> Result<Host, NetError> {
        (**self).next()
    }
}
