//! Deadline enforcement for a wrapped resolver.

use super::{AddressFamily, Name, Resolve, Resolving};
use crate::base::scope::Scope;
use std::{fmt, sync::Arc, time::Duration};

/// Bounds every lookup of the wrapped resolver by a timeout.
///
/// Each call runs under a child scope ending at `now + timeout` or at the
/// caller's own deadline, whichever is earlier. The child scope is cancelled
/// when the lookup returns or is dropped. A zero timeout disables the bound
/// and the caller's scope is passed through as-is.
///
/// Errors from the wrapped resolver are returned unchanged; nothing is retried.
#[derive(Clone)]
pub struct TimeoutResolver {
    inner: Arc<dyn Resolve>,
    timeout: Duration,
}

impl TimeoutResolver {
    pub fn new(inner: Arc<dyn Resolve>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Resolve for TimeoutResolver {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        if self.timeout.is_zero() {
            return self.inner.resolve(scope, family, name);
        }

        let scope = scope.with_timeout(self.timeout);
        let guard = scope.cancel_on_drop();
        let lookup = self.inner.resolve(scope.clone(), family, name);
        Box::pin(async move {
            let _guard = guard;
            scope.run(lookup).await
        })
    }
}

impl fmt::Debug for TimeoutResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;
    use crate::dns::resolve_fn;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::Instant;

    fn blocking_resolver() -> Arc<dyn Resolve> {
        Arc::new(resolve_fn(|scope, family, name| {
            Box::pin(async move {
                assert_eq!(family, AddressFamily::Ip);
                assert_eq!(name.as_str(), "host");
                Err(scope.done().await)
            })
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_lookup() {
        let resolver = TimeoutResolver::new(blocking_resolver(), Duration::from_millis(100));

        let start = Instant::now();
        let err = resolver
            .resolve(Scope::new(), AddressFamily::Ip, Name::new("host"))
            .await
            .unwrap_err();

        let elapsed = start.elapsed();
        assert!(err.is_cancellation(), "unexpected error {err}");
        assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(150), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_disabled_honors_caller_deadline() {
        let resolver = TimeoutResolver::new(blocking_resolver(), Duration::ZERO);

        let start = Instant::now();
        let scope = Scope::new().with_timeout(Duration::from_millis(200));
        let err = resolver
            .resolve(scope, AddressFamily::Ip, Name::new("host"))
            .await
            .unwrap_err();

        assert!(matches!(err, NetError::DeadlineExceeded));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_shorter_than_timeout() {
        let resolver = TimeoutResolver::new(blocking_resolver(), Duration::from_secs(2));

        let start = Instant::now();
        let scope = Scope::new().with_timeout(Duration::from_millis(50));
        let _ = resolver
            .resolve(scope, AddressFamily::Ip, Name::new("host"))
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_child_scope_released_on_return() {
        let seen = Arc::new(parking_lot::Mutex::new(None::<Scope>));
        let captured = Arc::clone(&seen);
        let inner: Arc<dyn Resolve> = Arc::new(resolve_fn(move |scope, _family, _name| {
            *captured.lock() = Some(scope);
            Box::pin(async { Ok(vec![IpAddr::V4(Ipv4Addr::new(100, 0, 0, 1))]) })
        }));

        let resolver = TimeoutResolver::new(inner, Duration::from_secs(1));
        let caller = Scope::new();
        let addrs = resolver
            .resolve(caller.clone(), AddressFamily::Ip, Name::new("host"))
            .await
            .unwrap();

        assert_eq!(addrs.len(), 1);
        let child = seen.lock().take().expect("inner resolver called");
        assert!(child.is_done(), "child scope should be cancelled after return");
        assert!(!caller.is_done(), "caller scope must stay live");
    }
}
