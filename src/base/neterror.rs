use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable handle to an arbitrary error.
///
/// Resolver and transport failures are fanned out to several callers
/// (singleflight waiters, cache hits), so the underlying cause is kept
/// behind an `Arc` instead of a `Box`.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Resolution Errors
    #[error("resolving hostname {domain:?}: {source}")]
    NameNotResolvedFor {
        domain: String,
        #[source]
        source: Arc<NetError>,
    },
    #[error("no addresses returned")]
    NoAddresses,
    #[error("{0}")]
    Lookup(SharedError),

    // Scope Errors
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,

    // Balancer Errors
    #[error("no hosts available")]
    NoHosts,

    // Request Errors
    #[error("invalid address family {0:?}, expected \"ip\", \"ip4\" or \"ip6\"")]
    InvalidAddressFamily(String),
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("transport error: {0}")]
    Transport(SharedError),
}

impl NetError {
    /// Wraps an arbitrary upstream resolver failure.
    pub fn lookup<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        NetError::Lookup(Arc::new(err))
    }

    /// Wraps a failure reported by an inner transport.
    pub fn transport<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        NetError::Transport(Arc::new(err))
    }

    /// Resolution failure for `domain` caused by `source`.
    pub fn dns_failed(domain: impl Into<String>, source: NetError) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.into(),
            source: Arc::new(source),
        }
    }

    /// Attributes this error to `domain` unless it already is a resolution
    /// failure.
    pub fn for_domain(self, domain: &str) -> Self {
        match self {
            NetError::NameNotResolvedFor { .. } => self,
            other => NetError::dns_failed(domain, other),
        }
    }

    /// True if the error was caused by a cancelled or expired scope,
    /// including when wrapped in a resolution failure.
    pub fn is_cancellation(&self) -> bool {
        match self {
            NetError::Cancelled | NetError::DeadlineExceeded => true,
            NetError::NameNotResolvedFor { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// Chromium `net_error_list.h` code closest to this error.
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Cancelled => -3,
            NetError::DeadlineExceeded => -7,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::NoAddresses => -105,
            NetError::Lookup(_) => -137,
            NetError::NoHosts => -109,
            NetError::InvalidAddressFamily(_) => -108,
            NetError::InvalidUrl => -300,
            NetError::InvalidConfig(_) => -4,
            NetError::Transport(_) => -104,
        }
    }
}
