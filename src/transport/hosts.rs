//! Dispatch through a [`Balancer`].

use super::{redirect, Sending, Transport};
use crate::balancer::Balancer;
use http::Request;
use std::fmt;

/// Sends each request to the host picked by a [`Balancer`].
///
/// The request's authority becomes the picked `address:port`; the original
/// authority is kept as the `Host` header when none is set. Pair with a
/// [`DnsBalancer`](crate::balancer::DnsBalancer) when a service's address set
/// should be refreshed in the background rather than resolved per request.
pub struct HostBalancedTransport<T, L> {
    transport: T,
    balancer: L,
}

impl<T, L> HostBalancedTransport<T, L> {
    pub fn new(transport: T, balancer: L) -> Self {
        Self {
            transport,
            balancer,
        }
    }

    pub fn balancer(&self) -> &L {
        &self.balancer
    }
}

impl<B, T, L> Transport<B> for HostBalancedTransport<T, L>
where
    T: Transport<B>,
    L: Balancer,
{
    type Response = T::Response;

    fn send(&self, req: Request<B>) -> Sending<Self::Response> {
        let routed = self
            .balancer
            .next()
            .and_then(|host| redirect(req, &host.to_string()));
        match routed {
            Ok(req) => self.transport.send(req),
            Err(e) => Box::pin(futures::future::ready(Err(e))),
        }
    }
}

impl<T: fmt::Debug, L: fmt::Debug> fmt::Debug for HostBalancedTransport<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBalancedTransport")
            .field("transport", &self.transport)
            .field("balancer", &self.balancer)
            .finish()
    }
}
