//! Resolver chain configuration.
//!
//! [`ResolverConfig`] describes the usual decorator stack and builds it over
//! any base resolver. All durations (de)serialize as integer milliseconds.

use crate::dns::{AddressFamily, CachingResolver, Resolve, SingleflightResolver, TimeoutResolver};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Settings for `CachingResolver -> SingleflightResolver -> TimeoutResolver`.
///
/// The address family has no default; it is passed through unchanged to
/// every lookup made by the consumer of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Address family requested by the balancing layer.
    pub family: AddressFamily,
    /// How long successful lookups are cached. Zero disables.
    #[serde(default = "default_ttl", with = "serde_millis")]
    pub ttl: Duration,
    /// How long failed lookups are cached. Zero disables.
    #[serde(default = "default_neg_ttl", with = "serde_millis")]
    pub neg_ttl: Duration,
    /// Upper bound on each upstream lookup. Zero disables.
    #[serde(default = "default_timeout", with = "serde_millis")]
    pub timeout: Duration,
}

fn default_ttl() -> Duration {
    Duration::from_secs(1)
}

fn default_neg_ttl() -> Duration {
    Duration::from_millis(250)
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

impl ResolverConfig {
    /// Creates a config with default cache lifetimes and timeout.
    pub fn new(family: AddressFamily) -> Self {
        Self {
            family,
            ttl: default_ttl(),
            neg_ttl: default_neg_ttl(),
            timeout: default_timeout(),
        }
    }

    /// Set positive cache lifetime.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set negative cache lifetime.
    pub fn neg_ttl(mut self, neg_ttl: Duration) -> Self {
        self.neg_ttl = neg_ttl;
        self
    }

    /// Set upstream lookup timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the decorator chain over `base`.
    pub fn build(&self, base: Arc<dyn Resolve>) -> CachingResolver {
        let timeout: Arc<dyn Resolve> = Arc::new(TimeoutResolver::new(base, self.timeout));
        let singleflight: Arc<dyn Resolve> = Arc::new(SingleflightResolver::new(timeout));
        CachingResolver::new(singleflight, self.ttl, self.neg_ttl)
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
