//! Deduplication of concurrent identical lookups.
//!
//! While a lookup for a `(family, hostname)` pair is in flight, further
//! lookups for the same pair wait for it instead of querying upstream again.
//! The upstream call runs in its own task under a scope of its own: it is
//! cancelled only when every waiter has gone away.

use super::{AddressFamily, Addrs, LookupKey, Name, Resolve, Resolving};
use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::oneshot;

type Outcome = Result<Addrs, NetError>;

/// One in-flight upstream lookup and the callers waiting on it.
struct Call {
    outcome: Shared<BoxFuture<'static, Outcome>>,
    waiters: AtomicUsize,
    scope: Scope,
}

impl Call {
    fn new() -> (Arc<Call>, oneshot::Sender<Outcome>) {
        let (tx, rx) = oneshot::channel();
        // A dropped sender means the upstream task died without answering.
        let outcome = rx.map(|res| res.unwrap_or(Err(NetError::Cancelled))).boxed().shared();
        let call = Arc::new(Call {
            outcome,
            waiters: AtomicUsize::new(1),
            scope: Scope::new(),
        });
        (call, tx)
    }

    /// Registers one more waiter unless every previous waiter already left.
    fn try_join(&self) -> bool {
        self.waiters
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then_some(n + 1))
            .is_ok()
    }
}

type Calls = Arc<DashMap<LookupKey, Arc<Call>>>;

/// Collapses concurrent lookups for the same key into one upstream call.
///
/// Every caller receives its own copy of the addresses, or a clone of the
/// same error. The in-flight entry is removed as soon as the upstream call
/// finishes, before any waiter is woken, so a later lookup always starts a
/// fresh call.
///
/// A caller whose scope ends stops waiting and gets its scope's error. The
/// upstream call keeps running for the others and is cancelled only once
/// the last waiter has left.
///
/// Upstream calls are spawned onto the current tokio runtime.
#[derive(Clone)]
pub struct SingleflightResolver {
    inner: Arc<dyn Resolve>,
    calls: Calls,
}

impl SingleflightResolver {
    pub fn new(inner: Arc<dyn Resolve>) -> Self {
        Self {
            inner,
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys with an upstream lookup currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl Resolve for SingleflightResolver {
    fn resolve(&self, scope: Scope, family: AddressFamily, name: Name) -> Resolving {
        let inner = Arc::clone(&self.inner);
        let calls = Arc::clone(&self.calls);
        Box::pin(async move {
            if let Some(err) = scope.err() {
                return Err(err);
            }

            let key = LookupKey::new(family, name);
            let (call, leader) = join(&calls, &key);
            let _waiter = Waiter {
                call: Arc::clone(&call),
                calls: Arc::clone(&calls),
                key: key.clone(),
            };
            if let Some(tx) = leader {
                spawn_upstream(inner, calls, key, Arc::clone(&call), tx);
            }

            tokio::select! {
                biased;
                res = call.outcome.clone() => res,
                err = scope.done() => Err(err),
            }
        })
    }
}

/// Joins the live call for `key`, or registers a new one. The sender is
/// returned only to the caller that registered the call.
fn join(calls: &Calls, key: &LookupKey) -> (Arc<Call>, Option<oneshot::Sender<Outcome>>) {
    match calls.entry(key.clone()) {
        Entry::Occupied(mut entry) => {
            if entry.get().try_join() {
                tracing::debug!(domain = %key.name, family = %key.family, "joining in-flight lookup");
                return (Arc::clone(entry.get()), None);
            }
            // Every waiter of the registered call left; it is being cancelled.
            let (call, tx) = Call::new();
            entry.insert(Arc::clone(&call));
            (call, Some(tx))
        }
        Entry::Vacant(entry) => {
            let (call, tx) = Call::new();
            entry.insert(Arc::clone(&call));
            (call, Some(tx))
        }
    }
}

fn spawn_upstream(
    inner: Arc<dyn Resolve>,
    calls: Calls,
    key: LookupKey,
    call: Arc<Call>,
    tx: oneshot::Sender<Outcome>,
) {
    let lookup = inner.resolve(call.scope.clone(), key.family, key.name.clone());
    tokio::spawn(async move {
        let forget = Forget { calls, key, call };
        let res = lookup.await;
        // Unregister before anyone can observe the outcome.
        drop(forget);
        let _ = tx.send(res);
    });
}

/// Removes the registry entry for a call when the upstream task ends,
/// including by panic.
struct Forget {
    calls: Calls,
    key: LookupKey,
    call: Arc<Call>,
}

impl Drop for Forget {
    fn drop(&mut self) {
        self.calls
            .remove_if(&self.key, |_, call| Arc::ptr_eq(call, &self.call));
    }
}

/// Held by each caller while it waits; the last one out cancels upstream.
struct Waiter {
    call: Arc<Call>,
    calls: Calls,
    key: LookupKey,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.call.waiters.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        self.calls
            .remove_if(&self.key, |_, call| Arc::ptr_eq(call, &self.call));
        if self.call.outcome.peek().is_none() {
            tracing::debug!(domain = %self.key.name, "all waiters gone, cancelling upstream lookup");
        }
        self.call.scope.cancel();
    }
}

impl fmt::Debug for SingleflightResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleflightResolver")
            .field("in_flight", &self.calls.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::resolve_fn;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::time::Instant;

    const ADDR1: IpAddr = IpAddr::V4(Ipv4Addr::new(100, 0, 0, 1));

    fn slow_resolver(count: Arc<AtomicUsize>, latency: Duration) -> Arc<dyn Resolve> {
        Arc::new(resolve_fn(move |scope, family, name| {
            assert_eq!(family, AddressFamily::Ip);
            assert_eq!(name.as_str(), "host");
            count.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(latency) => Ok(vec![ADDR1]),
                    err = scope.done() => Err(err),
                }
            })
        }))
    }

    async fn timed_lookup(
        resolver: &SingleflightResolver,
        scope: Scope,
        start: Instant,
    ) -> (Outcome, Duration) {
        let res = resolver.resolve(scope, AddressFamily::Ip, Name::new("host")).await;
        (res, start.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_call() {
        let count = Arc::new(AtomicUsize::new(0));
        let resolver =
            SingleflightResolver::new(slow_resolver(Arc::clone(&count), Duration::from_millis(200)));

        let lookup = || resolver.resolve(Scope::new(), AddressFamily::Ip, Name::new("host"));
        let (a, b, c) = tokio::join!(lookup(), lookup(), lookup());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(a, vec![ADDR1]);
        assert_eq!(b, vec![ADDR1]);
        assert_eq!(c, vec![ADDR1]);
        assert_ne!(a.as_ptr(), b.as_ptr(), "results must not alias");
        assert_ne!(b.as_ptr(), c.as_ptr(), "results must not alias");
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_follower_does_not_cancel_others() {
        let count = Arc::new(AtomicUsize::new(0));
        let resolver =
            SingleflightResolver::new(slow_resolver(Arc::clone(&count), Duration::from_millis(200)));
        let parent = Scope::new();
        let start = Instant::now();

        let short = timed_lookup(&resolver, parent.with_timeout(Duration::from_millis(100)), start);
        let long1 = timed_lookup(&resolver, parent.with_timeout(Duration::from_millis(500)), start);
        let long2 = timed_lookup(&resolver, parent.with_timeout(Duration::from_millis(500)), start);

        let ((r0, d0), (r1, d1), (r2, d2)) = tokio::join!(short, long1, long2);

        assert!(r0.unwrap_err().is_cancellation());
        assert!(d0 >= Duration::from_millis(100) && d0 < Duration::from_millis(150), "{d0:?}");

        for (res, elapsed) in [(r1, d1), (r2, d2)] {
            assert_eq!(res.unwrap(), vec![ADDR1]);
            assert!(
                elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250),
                "{elapsed:?}"
            );
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_cancelled_when_all_waiters_leave() {
        let upstream_cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&upstream_cancelled);
        let inner: Arc<dyn Resolve> = Arc::new(resolve_fn(move |scope, _family, _name| {
            let flag = Arc::clone(&flag);
            Box::pin(async move {
                let err = scope.done().await;
                flag.store(true, Ordering::SeqCst);
                Err(err)
            })
        }));
        let resolver = SingleflightResolver::new(inner);

        let lookup = || {
            let scope = Scope::new().with_timeout(Duration::from_millis(50));
            resolver.resolve(scope, AddressFamily::Ip, Name::new("host"))
        };
        let (a, b) = tokio::join!(lookup(), lookup());
        assert!(a.unwrap_err().is_cancellation());
        assert!(b.unwrap_err().is_cancellation());

        // Let the upstream task observe its cancelled scope.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(upstream_cancelled.load(Ordering::SeqCst));
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_call_is_not_reused() {
        let count = Arc::new(AtomicUsize::new(0));
        let resolver =
            SingleflightResolver::new(slow_resolver(Arc::clone(&count), Duration::from_millis(10)));

        for _ in 0..3 {
            resolver
                .resolve(Scope::new(), AddressFamily::Ip, Name::new("host"))
                .await
                .unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_fans_out_to_all_waiters() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&count);
        let inner: Arc<dyn Resolve> = Arc::new(resolve_fn(move |_scope, _family, _name| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(NetError::lookup(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "server failure",
                )))
            })
        }));
        let resolver = SingleflightResolver::new(inner);

        let lookup = || resolver.resolve(Scope::new(), AddressFamily::Ip, Name::new("host"));
        let (a, b) = tokio::join!(lookup(), lookup());

        assert_eq!(a.unwrap_err().to_string(), "server failure");
        assert_eq!(b.unwrap_err().to_string(), "server failure");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_families_are_not_coalesced() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&count);
        let inner: Arc<dyn Resolve> = Arc::new(resolve_fn(move |_scope, _family, _name| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(vec![ADDR1])
            })
        }));
        let resolver = SingleflightResolver::new(inner);

        let (a, b) = tokio::join!(
            resolver.resolve(Scope::new(), AddressFamily::Ip4, Name::new("host")),
            resolver.resolve(Scope::new(), AddressFamily::Ip6, Name::new("host")),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
