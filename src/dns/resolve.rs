//! Core DNS resolution types and traits.
//!
//! This module defines the `Resolve` trait and supporting types that form
//! the foundation of the resolver decorator chain.

use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow, collections::HashMap, fmt, future::Future, net::IpAddr, pin::Pin, str::FromStr,
    sync::Arc,
};

/// A domain name to resolve into IP addresses.
///
/// This is a lightweight wrapper around a hostname string that provides
/// a type-safe way to pass domain names to resolvers.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Arc<str>,
}

impl Name {
    /// Creates a new [`Name`] from any string-like type.
    #[inline]
    pub fn new(host: impl Into<Arc<str>>) -> Self {
        Self { host: host.into() }
    }

    /// View the hostname as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.host, f)
    }
}

/// Which address families a lookup should return.
///
/// Passed through unchanged to the base resolver. Once a request has been
/// rewritten to a bare address there is no dual-stack fallback downstream,
/// so a v4-only service should be resolved with [`AddressFamily::Ip4`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressFamily {
    /// IPv4 and IPv6 (`"ip"`).
    Ip,
    /// IPv4 only (`"ip4"`).
    Ip4,
    /// IPv6 only (`"ip6"`).
    Ip6,
}

impl AddressFamily {
    /// The canonical selector string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Ip => "ip",
            AddressFamily::Ip4 => "ip4",
            AddressFamily::Ip6 => "ip6",
        }
    }

    /// Whether `addr` belongs to this family.
    pub fn matches(&self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::Ip => true,
            AddressFamily::Ip4 => addr.is_ipv4(),
            AddressFamily::Ip6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressFamily {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(AddressFamily::Ip),
            "ip4" => Ok(AddressFamily::Ip4),
            "ip6" => Ok(AddressFamily::Ip6),
            other => Err(NetError::InvalidAddressFamily(other.to_string())),
        }
    }
}

impl TryFrom<String> for AddressFamily {
    type Error = NetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressFamily> for String {
    fn from(value: AddressFamily) -> Self {
        value.as_str().to_string()
    }
}

/// Unit of caching and deduplication: one hostname in one address family.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct LookupKey {
    pub family: AddressFamily,
    pub name: Name,
}

impl LookupKey {
    pub fn new(family: AddressFamily, name: Name) -> Self {
        Self { family, name }
    }
}

/// Addresses returned by a lookup. Each caller owns its own vector.
pub type Addrs = Vec<IpAddr>;

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Trait for DNS resolution.
///
/// This is the core abstraction every decorator wraps and every balancer
/// consumes. Implementations must be thread-safe.
///
/// # Contract
///
/// - The returned future must fail with a cancellation error
///   ([`NetError::Cancelled`] or [`NetError::DeadlineExceeded`]) as soon as
///   practical once `scope` has ended, and must never block indefinitely
///   on an ended scope.
/// - An empty `Addrs` is a valid successful answer; consumers decide how to
///   treat it.
/// - The returned future is `'static`: implementations clone whatever state
///   they need into it.
pub trait Resolve: Send + Sync {
    /// Resolves `name` to addresses of the requested `family`.
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        (**self).resolve(scope, family, name)
    }
}

/// Adapts a closure into a [`Resolve`] implementation.
///
/// # Example
///
/// ```rust,ignore
/// use dnsbalancer::dns::{resolve_fn, Resolve};
///
/// let resolver = resolve_fn(|_scope, _family, _name| {
///     Box::pin(async { Ok(vec!["10.0.0.1".parse().unwrap()]) })
/// });
/// ```
#[derive(Clone)]
pub struct ResolveFn<F> {
    f: F,
}

/// Creates a [`ResolveFn`] from a closure.
pub fn resolve_fn<F>(f: F) -> ResolveFn<F>
where
    F: Fn(Scope, AddressFamily, Name) -> Resolving + Send + Sync,
{
    ResolveFn { f }
}

impl<F> Resolve for ResolveFn<F>
where
    F: Fn(Scope, AddressFamily, Name) -> Resolving + Send + Sync,
{
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        (self.f)(scope, family, name)
    }
}

impl<F> fmt::Debug for ResolveFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveFn").finish_non_exhaustive()
    }
}

/// DNS resolver wrapper that supports hostname overrides.
///
/// This resolver first checks a map of hostname-to-address overrides before
/// falling back to the underlying resolver. Overridden addresses are filtered
/// by the requested address family. Useful for:
/// - Testing without real DNS
/// - Forcing specific IPs for certain domains
/// - Local development with custom hostnames
///
/// # Example
///
/// ```rust,ignore
/// use dnsbalancer::dns::{DnsResolverWithOverrides, GaiResolver};
/// use std::collections::HashMap;
///
/// let mut overrides = HashMap::new();
/// overrides.insert("api.local".into(), vec!["127.0.0.1".parse().unwrap()]);
///
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()), overrides);
/// ```
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: Arc<HashMap<Cow<'static, str>, Vec<IpAddr>>>,
}

impl DnsResolverWithOverrides {
    /// Creates a new resolver with the given overrides.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fallback resolver for non-overridden hostnames.
    /// * `overrides` - Map of hostnames to their resolved addresses.
    pub fn new(inner: Arc<dyn Resolve>, overrides: HashMap<Cow<'static, str>, Vec<IpAddr>>) -> Self {
        Self {
            inner,
            overrides: Arc::new(overrides),
        }
    }

    /// Returns the number of configured overrides.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        if let Some(addrs) = self.overrides.get(name.as_str()) {
            if let Some(err) = scope.err() {
                return Box::pin(std::future::ready(Err(err)));
            }
            let addrs: Addrs = addrs.iter().copied().filter(|a| family.matches(a)).collect();
            return Box::pin(std::future::ready(Ok(addrs)));
        }
        self.inner.resolve(scope, family, name)
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("override_count", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_name_from_str() {
        let name = Name::from("example.com");
        assert_eq!(name.as_str(), "example.com");
        assert_eq!(name.to_string(), "example.com");
    }

    #[test]
    fn test_name_equality() {
        let name1 = Name::new("example.com");
        let name2 = Name::from(String::from("example.com"));
        let name3 = Name::new("other.com");

        assert_eq!(name1, name2);
        assert_ne!(name1, name3);
    }

    #[test]
    fn test_address_family_parse() {
        assert_eq!("ip".parse::<AddressFamily>().unwrap(), AddressFamily::Ip);
        assert_eq!("ip4".parse::<AddressFamily>().unwrap(), AddressFamily::Ip4);
        assert_eq!("ip6".parse::<AddressFamily>().unwrap(), AddressFamily::Ip6);

        let err = "tcp".parse::<AddressFamily>().unwrap_err();
        assert!(matches!(err, NetError::InvalidAddressFamily(ref s) if s == "tcp"));
    }

    #[test]
    fn test_address_family_matches() {
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert!(AddressFamily::Ip.matches(&v4) && AddressFamily::Ip.matches(&v6));
        assert!(AddressFamily::Ip4.matches(&v4) && !AddressFamily::Ip4.matches(&v6));
        assert!(AddressFamily::Ip6.matches(&v6) && !AddressFamily::Ip6.matches(&v4));
    }

    #[test]
    fn test_lookup_key_distinguishes_family() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(LookupKey::new(AddressFamily::Ip4, Name::new("example.com")));
        set.insert(LookupKey::new(AddressFamily::Ip6, Name::new("example.com")));
        set.insert(LookupKey::new(AddressFamily::Ip4, Name::new("example.com")));

        assert_eq!(set.len(), 2);
    }

    struct MockResolver {
        response: Vec<IpAddr>,
    }

    impl Resolve for MockResolver {
        fn resolve(&self, _scope: Scope, _family: AddressFamily, _name: Name) -> Resolving {
            let addrs = self.response.clone();
            Box::pin(async move { Ok(addrs) })
        }
    }

    #[tokio::test]
    async fn test_override_resolver_hit_filters_family() {
        let mock = Arc::new(MockResolver {
            response: vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
        });

        let mut overrides = HashMap::new();
        overrides.insert(
            Cow::Borrowed("override.local"),
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)],
        );

        let resolver = DnsResolverWithOverrides::new(mock, overrides);
        let addrs = resolver
            .resolve(Scope::new(), AddressFamily::Ip4, Name::new("override.local"))
            .await
            .unwrap();

        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }

    #[tokio::test]
    async fn test_override_resolver_hit_honors_ended_scope() {
        let mock = Arc::new(MockResolver { response: vec![] });
        let mut overrides = HashMap::new();
        overrides.insert(Cow::Borrowed("override.local"), vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let resolver = DnsResolverWithOverrides::new(mock, overrides);

        let scope = Scope::new();
        scope.cancel();
        let err = resolver
            .resolve(scope, AddressFamily::Ip, Name::new("override.local"))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Cancelled), "{err}");
    }

    #[tokio::test]
    async fn test_override_resolver_miss() {
        let mock = Arc::new(MockResolver {
            response: vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
        });

        let resolver = DnsResolverWithOverrides::new(mock, HashMap::new());
        let addrs = resolver
            .resolve(Scope::new(), AddressFamily::Ip, Name::new("not-overridden.com"))
            .await
            .unwrap();

        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))]);
    }

    #[tokio::test]
    async fn test_resolve_fn_adapter() {
        let resolver = resolve_fn(|_scope, family, name| {
            Box::pin(async move {
                assert_eq!(family, AddressFamily::Ip6);
                assert_eq!(name.as_str(), "fn.example");
                Ok(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)])
            })
        });

        let addrs = resolver
            .resolve(Scope::new(), AddressFamily::Ip6, Name::new("fn.example"))
            .await
            .unwrap();
        assert_eq!(addrs.len(), 1);
    }
}
