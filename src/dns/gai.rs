//! System DNS resolver using getaddrinfo.
//!
//! This resolver uses the operating system's native DNS resolution via
//! `getaddrinfo`, executed in a thread pool to avoid blocking the async runtime.
//!
//! # When to Use
//!
//! - When you need to respect system DNS configuration (/etc/resolv.conf, etc.)
//! - When DoH/DoT is not required
//! - As a fallback when hickory-dns is not available

use super::{AddressFamily, Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use std::net::{IpAddr, ToSocketAddrs};

/// System DNS resolver using `getaddrinfo` in a thread pool.
///
/// This resolver wraps the standard library's `ToSocketAddrs` trait and
/// executes resolution in `tokio::task::spawn_blocking` to avoid blocking
/// the async runtime.
///
/// # Cancellation
///
/// `getaddrinfo` itself cannot be interrupted. When the scope ends first the
/// lookup returns the scope's error right away and the blocking call finishes
/// in the background, its result discarded.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    /// Creates a new `GaiResolver`.
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            let domain = host.clone();

            let lookup = async move {
                tokio::task::spawn_blocking(move || {
                    tracing::debug!(host = %host, "resolving via getaddrinfo");
                    (host.as_str(), 0u16)
                        .to_socket_addrs()
                        .map(|iter| iter.map(|sa| sa.ip()).collect::<Vec<IpAddr>>())
                })
                .await
                .map_err(|e| {
                    // Handle task join error (cancellation, panic)
                    tracing::error!(error = %e, "DNS resolution task failed");
                    NetError::lookup(e)
                })
            };

            let addrs = scope
                .run(lookup)
                .await?
                .dns_context(&domain)
                .inspect_err(|e| tracing::debug!(domain = %domain, error = %e, "DNS resolution failed"))?;

            let addrs: Addrs = addrs.into_iter().filter(|a| family.matches(a)).collect();
            tracing::debug!(domain = %domain, family = %family, count = addrs.len(), "DNS resolution complete");
            Ok(addrs)
        })
    }
}

/// Parses a host that is already an IP literal, bypassing DNS.
///
/// Accepts bracketed IPv6 (`[::1]`) as found in URI authorities.
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::time::Duration;

    #[test]
    fn test_parse_ip_literal_ipv4() {
        assert_eq!(
            parse_ip_literal("127.0.0.1"),
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
        );
    }

    #[test]
    fn test_parse_ip_literal_ipv6() {
        assert_eq!(parse_ip_literal("::1"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(parse_ip_literal("[::1]"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_parse_ip_literal_hostname() {
        assert_eq!(parse_ip_literal("example.com"), None);
    }

    #[tokio::test]
    async fn test_gai_resolver_localhost() {
        let resolver = GaiResolver::new();
        let result = resolver
            .resolve(Scope::new(), AddressFamily::Ip, Name::new("localhost"))
            .await;

        // localhost should always resolve
        assert!(result.is_ok());
        assert!(!result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gai_resolver_filters_family() {
        let resolver = GaiResolver::new();
        let addrs = resolver
            .resolve(Scope::new(), AddressFamily::Ip4, Name::new("127.0.0.1"))
            .await
            .unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);

        let addrs = resolver
            .resolve(Scope::new(), AddressFamily::Ip6, Name::new("127.0.0.1"))
            .await
            .unwrap();
        assert!(addrs.is_empty());
    }

    #[tokio::test]
    async fn test_gai_resolver_cancelled_scope() {
        let resolver = GaiResolver::new();
        let scope = Scope::new();
        scope.cancel();

        let err = resolver
            .resolve(scope, AddressFamily::Ip, Name::new("localhost"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Cancelled));
    }

    #[tokio::test]
    async fn test_gai_resolver_respects_deadline() {
        let resolver = GaiResolver::new();
        let scope = Scope::new().with_timeout(Duration::ZERO);

        let err = resolver
            .resolve(scope, AddressFamily::Ip, Name::new("localhost"))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
