//! Per-request resolve-and-pick balancing.

use super::{redirect, request_scope, target_authority, Sending, Transport};
use crate::base::fastrand::FastRand;
use crate::base::neterror::NetError;
use crate::dns::{parse_ip_literal, AddressFamily, Name, Resolve};
use http::Request;
use std::{fmt, sync::Arc};

/// Resolves each request's hostname and sends it to one of the returned
/// addresses, chosen uniformly at random.
///
/// The lookup runs under the request's own scope. Failing or empty lookups
/// fail the request with a resolution error naming the hostname, before the
/// inner transport is touched. Requests whose host is already an IP literal
/// are forwarded unchanged.
///
/// Put a [`CachingResolver`](crate::dns::CachingResolver) chain behind this
/// transport; it performs one lookup per request.
pub struct BalancedTransport<T> {
    inner: Arc<Balanced<T>>,
}

struct Balanced<T> {
    transport: T,
    resolver: Arc<dyn Resolve>,
    family: AddressFamily,
    rnd: FastRand,
}

impl<T> BalancedTransport<T> {
    pub fn new(transport: T, resolver: Arc<dyn Resolve>, family: AddressFamily) -> Self {
        Self {
            inner: Arc::new(Balanced {
                transport,
                resolver,
                family,
                rnd: FastRand::from_entropy(),
            }),
        }
    }

    pub fn family(&self) -> AddressFamily {
        self.inner.family
    }

    /// The wrapped transport.
    pub fn get_ref(&self) -> &T {
        &self.inner.transport
    }
}

/// Wraps `transport` so that every request is sent to a randomly picked
/// address of its hostname, as resolved by `resolver` for `family`.
pub fn wrap<T>(transport: T, resolver: Arc<dyn Resolve>, family: AddressFamily) -> BalancedTransport<T> {
    BalancedTransport::new(transport, resolver, family)
}

impl<B, T> Transport<B> for BalancedTransport<T>
where
    T: Transport<B> + 'static,
    B: Send + 'static,
{
    type Response = T::Response;

    fn send(&self, req: Request<B>) -> Sending<Self::Response> {
        let this = Arc::clone(&self.inner);
        Box::pin(async move {
            let host = req.uri().host().ok_or(NetError::InvalidUrl)?.to_string();
            if parse_ip_literal(&host).is_some() {
                return this.transport.send(req).await;
            }
            let port = req.uri().port_u16();

            let addrs = this
                .resolver
                .resolve(request_scope(&req), this.family, Name::new(host.as_str()))
                .await
                .map_err(|e| {
                    tracing::debug!(domain = %host, error = %e, "balanced request resolution failed");
                    e.for_domain(&host)
                })?;

            let addr = match addrs.len() {
                0 => return Err(NetError::dns_failed(host, NetError::NoAddresses)),
                1 => addrs[0],
                n => addrs[this.rnd.index(n)],
            };
            tracing::trace!(domain = %host, addr = %addr, candidates = addrs.len(), "picked address");

            let req = redirect(req, &target_authority(addr, port))?;
            this.transport.send(req).await
        })
    }
}

impl<T> Clone for BalancedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BalancedTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalancedTransport")
            .field("transport", &self.inner.transport)
            .field("family", &self.inner.family)
            .finish_non_exhaustive()
    }
}
