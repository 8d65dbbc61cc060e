//! Background-refreshed DNS balancer.
//!
//! [`DnsBalancer`] resolves a hostname once at construction and then again
//! on a fixed interval from a spawned task. The host list is published as an
//! immutable snapshot behind an [`ArcSwap`], so readers never take a lock and
//! never observe a half-updated list.
//!
//! A failed refresh keeps the previous snapshot (stale-but-available). A
//! successful refresh replaces it only if the set of hosts actually changed.

use super::{same_hosts, Balancer, Host};
use crate::base::fastrand::FastRand;
use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use crate::config::serde_millis;
use crate::dns::{AddressFamily, Name, Resolve};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

/// What to resolve and how often.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsBalancerConfig {
    /// Hostname to resolve.
    pub host: String,
    /// Port paired with every resolved address.
    pub port: u16,
    /// Time between refreshes.
    #[serde(default = "default_interval", with = "serde_millis")]
    pub interval: Duration,
    /// Bound on each lookup, the initial one included. Zero disables.
    #[serde(default = "default_lookup_timeout", with = "serde_millis")]
    pub lookup_timeout: Duration,
    #[serde(default = "default_family")]
    pub family: AddressFamily,
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_family() -> AddressFamily {
    AddressFamily::Ip
}

impl DnsBalancerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            interval: default_interval(),
            lookup_timeout: default_lookup_timeout(),
            family: default_family(),
        }
    }

    /// Takes host and port from `url`, using the scheme's default port when
    /// none is given.
    pub fn from_url(url: &Url) -> Result<Self, NetError> {
        let host = match url.host() {
            Some(url::Host::Domain(d)) => d.to_string(),
            Some(url::Host::Ipv4(ip)) => ip.to_string(),
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(NetError::InvalidUrl),
        };
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
        Ok(Self::new(host, port))
    }

    /// Set refresh interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set per-lookup timeout.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Set address family.
    pub fn family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }
}

/// Lifecycle of a [`DnsBalancer`].
///
/// Construction is the `async` [`DnsBalancer::new`] itself, so a balancer
/// value is always at least serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancerState {
    /// Refresh loop running.
    Serving,
    /// Refresh loop stopped; the last snapshot is still served.
    Stopped,
}

struct Shared {
    config: DnsBalancerConfig,
    resolver: Arc<dyn Resolve>,
    hosts: ArcSwap<Vec<Host>>,
    rnd: FastRand,
    /// Held for a whole refresh, so snapshots are published in the order
    /// their lookups started.
    refreshing: tokio::sync::Mutex<()>,
}

impl Shared {
    async fn lookup(&self, parent: &Scope) -> Result<Vec<Host>, NetError> {
        let scope = if self.config.lookup_timeout.is_zero() {
            parent.child()
        } else {
            parent.with_timeout(self.config.lookup_timeout)
        };
        let _guard = scope.cancel_on_drop();

        let name = Name::new(self.config.host.as_str());
        let lookup = self.resolver.resolve(scope.clone(), self.config.family, name);
        let addrs = scope
            .run(lookup)
            .await
            .map_err(|e| e.for_domain(&self.config.host))?;

        Ok(addrs
            .into_iter()
            .map(|addr| Host::new(addr, self.config.port))
            .collect())
    }

    async fn update(&self, stop: &Scope) {
        let _refreshing = self.refreshing.lock().await;
        if stop.is_done() {
            return;
        }
        let next = match self.lookup(stop).await {
            Ok(next) => next,
            Err(_) if stop.is_done() => return,
            Err(e) => {
                tracing::warn!(
                    domain = %self.config.host,
                    error = %e,
                    "dns balancer refresh failed, keeping previous hosts"
                );
                return;
            }
        };

        if same_hosts(&self.hosts.load(), &next) {
            tracing::trace!(domain = %self.config.host, count = next.len(), "dns balancer hosts unchanged");
            return;
        }
        if next.is_empty() {
            tracing::warn!(domain = %self.config.host, "dns balancer resolved no hosts");
        }
        tracing::info!(domain = %self.config.host, hosts = ?next, "dns balancer hosts changed");
        self.hosts.store(Arc::new(next));
    }
}

async fn refresh_loop(shared: Arc<Shared>, stop: Scope) {
    let interval = shared.config.interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.done() => break,
            _ = ticker.tick() => shared.update(&stop).await,
        }
    }
    tracing::debug!(domain = %shared.config.host, "dns balancer refresh loop stopped");
}

/// Balancer over the addresses a hostname resolves to, refreshed in the
/// background.
///
/// Dropping the balancer stops the refresh loop without waiting for it;
/// [`stop`](Self::stop) also joins the task.
pub struct DnsBalancer {
    shared: Arc<Shared>,
    stop: Scope,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DnsBalancer {
    /// Resolves the configured hostname and starts the refresh loop.
    ///
    /// Fails if the refresh interval is zero, or if the initial lookup
    /// fails or returns no addresses. Must be called within a Tokio runtime.
    pub async fn new(config: DnsBalancerConfig, resolver: Arc<dyn Resolve>) -> Result<Self, NetError> {
        if config.interval.is_zero() {
            return Err(NetError::InvalidConfig("refresh interval must be non-zero"));
        }
        let shared = Arc::new(Shared {
            config,
            resolver,
            hosts: ArcSwap::from_pointee(Vec::new()),
            rnd: FastRand::from_entropy(),
            refreshing: tokio::sync::Mutex::new(()),
        });

        let initial = shared.lookup(&Scope::new()).await.inspect_err(|e| {
            tracing::debug!(domain = %shared.config.host, error = %e, "dns balancer initial lookup failed");
        })?;
        if initial.is_empty() {
            return Err(NetError::NoHosts);
        }
        tracing::debug!(
            domain = %shared.config.host,
            count = initial.len(),
            interval = ?shared.config.interval,
            "dns balancer started"
        );
        shared.hosts.store(Arc::new(initial));

        let stop = Scope::new();
        let task = tokio::spawn(refresh_loop(Arc::clone(&shared), stop.clone()));

        Ok(Self {
            shared,
            stop,
            task: Mutex::new(Some(task)),
        })
    }

    /// Current snapshot.
    pub fn hosts(&self) -> Arc<Vec<Host>> {
        self.shared.hosts.load_full()
    }

    pub fn state(&self) -> BalancerState {
        if self.stop.is_done() {
            BalancerState::Stopped
        } else {
            BalancerState::Serving
        }
    }

    pub fn config(&self) -> &DnsBalancerConfig {
        &self.shared.config
    }

    /// Runs one refresh immediately, outside the timer.
    ///
    /// Waits for a refresh already in progress to finish first. Does nothing
    /// once stopped.
    pub async fn refresh_now(&self) {
        if !self.stop.is_done() {
            self.shared.update(&self.stop).await;
        }
    }

    /// Stops the refresh loop and waits for it to exit.
    ///
    /// An in-flight refresh is cancelled. `next()` keeps serving the last
    /// published snapshot.
    pub async fn stop(&self) {
        self.stop.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(domain = %self.shared.config.host, error = %e, "dns balancer refresh task failed");
            }
        }
    }
}

impl Balancer for DnsBalancer {
    fn next(&self) -> Result<Host, NetError> {
        let hosts = self.shared.hosts.load();
        match hosts.len() {
            0 => Err(NetError::NoHosts),
            1 => Ok(hosts[0]),
            n => Ok(hosts[self.shared.rnd.index(n)]),
        }
    }
}

impl Drop for DnsBalancer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl fmt::Debug for DnsBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsBalancer")
            .field("config", &self.shared.config)
            .field("hosts", &self.shared.hosts.load().len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
