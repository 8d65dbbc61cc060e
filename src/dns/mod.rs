//! DNS Resolution Module
//!
//! Provides pluggable DNS resolution with support for:
//! - System resolver (getaddrinfo via thread pool)
//! - Async hickory-dns resolver
//! - Hostname-to-IP override mechanism
//! - Composable decorators: deadlines, request coalescing, result caching
//!
//! # Architecture
//!
//! The `Resolve` trait is the core abstraction. Every resolver, base or
//! decorator, takes a [`Scope`](crate::base::scope::Scope) and an
//! [`AddressFamily`] and returns a boxed future, so decorators can be
//! stacked freely over `Arc<dyn Resolve>`.
//!
//! The usual stack, outermost first, is
//! `CachingResolver -> SingleflightResolver -> TimeoutResolver -> base`:
//! cache hits never touch the network, concurrent misses share one lookup,
//! and that lookup is bounded by a deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::{sync::Arc, time::Duration};
//! use dnsbalancer::base::scope::Scope;
//! use dnsbalancer::dns::*;
//!
//! let base: Arc<dyn Resolve> = Arc::new(HickoryResolver::new());
//! let timeout = Arc::new(TimeoutResolver::new(base, Duration::from_secs(2)));
//! let coalesced = Arc::new(SingleflightResolver::new(timeout));
//! let resolver = CachingResolver::new(coalesced, Duration::from_secs(1), Duration::from_millis(250));
//!
//! let addrs = resolver
//!     .resolve(Scope::new(), AddressFamily::Ip, Name::new("example.com"))
//!     .await?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

mod caching;
mod gai;
mod hickory;
mod resolve;
mod singleflight;
mod timeout;

pub use caching::{CachingResolver, ASYNC_CLEANUP_INTERVAL};
pub use gai::{parse_ip_literal, GaiResolver};
pub use hickory::HickoryResolver;
pub use resolve::{
    resolve_fn, AddressFamily, Addrs, DnsResolverWithOverrides, LookupKey, Name, Resolve,
    ResolveFn, Resolving,
};
pub use singleflight::SingleflightResolver;
pub use timeout::TimeoutResolver;
