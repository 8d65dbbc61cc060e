//! Cancellable, deadline-aware execution scopes.
//!
//! A [`Scope`] is handed to every resolver call. It can be cancelled
//! explicitly, expires at its deadline, and is cancelled whenever its parent
//! is. Derived scopes never outlive the deadline of the scope they were
//! derived from.
//!
//! Deadlines are measured with [`tokio::time::Instant`], so code running on
//! a paused test clock observes virtual time.

use crate::base::neterror::NetError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Future returned by [`Scope::done`], resolving to the reason the scope ended.
pub type Done = Pin<Box<dyn Future<Output = NetError> + Send>>;

/// Cancellation and deadline scope for a unit of work.
///
/// Cloning a `Scope` is cheap; clones share cancellation state.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeState>,
}

struct ScopeState {
    cancelled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
    parent: Option<Scope>,
}

impl Scope {
    /// Creates a root scope with no deadline.
    pub fn new() -> Self {
        Self::with_parts(None, None)
    }

    fn with_parts(parent: Option<Scope>, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(ScopeState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline,
                parent,
            }),
        }
    }

    /// Derives a child scope inheriting this scope's deadline.
    pub fn child(&self) -> Scope {
        Self::with_parts(Some(self.clone()), self.deadline())
    }

    /// Derives a child scope that ends at `deadline` or at this scope's
    /// deadline, whichever comes first.
    pub fn with_deadline(&self, deadline: Instant) -> Scope {
        let deadline = match self.deadline() {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self::with_parts(Some(self.clone()), Some(deadline))
    }

    /// Derives a child scope that ends `timeout` from now at the latest.
    pub fn with_timeout(&self, timeout: Duration) -> Scope {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Effective deadline of this scope, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancels this scope and every scope derived from it.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns why the scope has ended, or `None` while it is still live.
    pub fn err(&self) -> Option<NetError> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Some(NetError::Cancelled);
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Some(NetError::DeadlineExceeded);
            }
        }
        self.inner.parent.as_ref().and_then(Scope::err)
    }

    /// True once the scope has been cancelled or has expired.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Waits until the scope ends and returns the reason.
    ///
    /// Returns immediately if the scope has already ended.
    pub fn done(&self) -> Done {
        let scope = self.clone();
        Box::pin(async move {
            let parent_done = async {
                match scope.inner.parent.as_ref() {
                    Some(parent) => parent.done().await,
                    None => std::future::pending::<NetError>().await,
                }
            };
            let expired = async {
                match scope.inner.deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(parent_done);
            tokio::pin!(expired);

            loop {
                let notified = scope.inner.notify.notified();
                tokio::pin!(notified);
                // Register before checking the flag so a concurrent cancel()
                // cannot slip between the check and the wait.
                notified.as_mut().enable();
                if let Some(err) = scope.err() {
                    return err;
                }
                tokio::select! {
                    _ = &mut notified => {}
                    err = &mut parent_done => return err,
                    _ = &mut expired => return NetError::DeadlineExceeded,
                }
            }
        })
    }

    /// Runs `fut` until it completes or the scope ends, whichever is first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, NetError>
    where
        F: Future<Output = Result<T, NetError>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            res = fut => res,
            err = self.done() => Err(err),
        }
    }

    /// Returns a guard that cancels this scope when dropped.
    pub fn cancel_on_drop(&self) -> ScopeGuard {
        ScopeGuard {
            scope: Some(self.clone()),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .field("deadline", &self.inner.deadline)
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}

/// Cancels the wrapped [`Scope`] on drop.
#[must_use = "the scope is cancelled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    scope: Option<Scope>,
}

impl ScopeGuard {
    /// Releases the scope without cancelling it.
    pub fn disarm(mut self) -> Scope {
        self.scope.take().unwrap_or_default()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.cancel();
        }
    }
}
