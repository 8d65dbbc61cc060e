//! Async DNS resolver using hickory-dns.
//!
//! This resolver provides fully async DNS resolution with support for:
//! - DNS-over-HTTPS (DoH)
//! - DNS-over-TLS (DoT)
//! - System DNS configuration auto-detection
//! - Per-family queries (A, AAAA, or both)
//!
//! # Performance
//!
//! Unlike `GaiResolver`, this resolver is fully async and doesn't require
//! spawning blocking tasks. It maintains connection pools to DNS servers
//! for better performance under load.

use super::{AddressFamily, Addrs, Name, Resolve, Resolving};
use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use hickory_resolver::{
    config::{LookupIpStrategy, ResolverConfig},
    name_server::TokioConnectionProvider,
    ResolveError, TokioResolver,
};
use std::{io, net::IpAddr, sync::LazyLock};

/// Async DNS resolver backed by hickory-dns.
///
/// This resolver is lazily initialized on first use and shared across
/// all instances via a static `LazyLock`. It automatically configures
/// itself based on the system's DNS settings.
///
/// # Example
///
/// ```rust,ignore
/// use dnsbalancer::base::scope::Scope;
/// use dnsbalancer::dns::{AddressFamily, HickoryResolver, Name, Resolve};
///
/// let resolver = HickoryResolver::new();
/// let addrs = resolver
///     .resolve(Scope::new(), AddressFamily::Ip4, Name::new("example.com"))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    resolver: &'static LazyLock<TokioResolver>,
}

impl HickoryResolver {
    /// Creates a new `HickoryResolver`.
    ///
    /// The underlying resolver is lazily initialized on first DNS query.
    /// It will attempt to read system DNS configuration; if that fails,
    /// it falls back to sensible defaults.
    pub fn new() -> Self {
        static RESOLVER: LazyLock<TokioResolver> = LazyLock::new(|| {
            let mut builder = match TokioResolver::builder_tokio() {
                Ok(builder) => {
                    tracing::debug!("Using system DNS configuration");
                    builder
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to read system DNS config, using defaults"
                    );
                    TokioResolver::builder_with_config(
                        ResolverConfig::default(),
                        TokioConnectionProvider::default(),
                    )
                }
            };

            // Family selection happens per query; "ip" lookups ask for both.
            builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

            builder.build()
        });

        Self {
            resolver: &RESOLVER,
        }
    }

    async fn lookup(&self, family: AddressFamily, domain: &str) -> Result<Addrs, ResolveError> {
        let addrs = match family {
            AddressFamily::Ip => self.resolver.lookup_ip(domain).await?.iter().collect(),
            AddressFamily::Ip4 => self
                .resolver
                .ipv4_lookup(domain)
                .await?
                .iter()
                .map(|a| IpAddr::V4(a.0))
                .collect(),
            AddressFamily::Ip6 => self
                .resolver
                .ipv6_lookup(domain)
                .await?
                .iter()
                .map(|aaaa| IpAddr::V6(aaaa.0))
                .collect(),
        };
        Ok(addrs)
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for HickoryResolver {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let domain = name.as_str();
            tracing::debug!(domain = %domain, family = %family, "resolving via hickory-dns");

            let lookup = async {
                resolver.lookup(family, domain).await.map_err(|e| {
                    tracing::debug!(domain = %domain, error = %e, "hickory-dns lookup failed");
                    NetError::dns_failed(
                        domain,
                        NetError::lookup(io::Error::new(io::ErrorKind::NotFound, e.to_string())),
                    )
                })
            };
            let addrs = scope.run(lookup).await?;

            tracing::debug!(domain = %domain, count = addrs.len(), "hickory-dns resolution complete");
            Ok(addrs)
        })
    }
}
