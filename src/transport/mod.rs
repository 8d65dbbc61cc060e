//! Request dispatch.
//!
//! A [`Transport`] takes an `http::Request` and produces a response. The
//! balancing transports in this module pick a concrete address for each
//! request, rewrite the request's authority to that address, keep the
//! original virtual host in the `Host` header, and hand the request to an
//! inner transport.
//!
//! A request's [`Scope`] travels in its extensions; see [`request_scope`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dnsbalancer::config::ResolverConfig;
//! use dnsbalancer::dns::{AddressFamily, HickoryResolver};
//! use dnsbalancer::transport::{wrap, HyperTransport, Transport};
//!
//! let resolver = ResolverConfig::new(AddressFamily::Ip4).build(Arc::new(HickoryResolver::new()));
//! let client = wrap(HyperTransport::new(), Arc::new(resolver), AddressFamily::Ip4);
//!
//! let req = http::Request::get("http://example.com/").body(http_body_util::Empty::<bytes::Bytes>::new())?;
//! let response = client.send(req).await?;
//! ```

mod balanced;
mod hosts;

use crate::base::neterror::NetError;
use crate::base::scope::Scope;
use http::header::{HeaderValue, HOST};
use http::uri::{Authority, PathAndQuery, Uri};
use http::{Request, Response};
use http_body::Body;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::error::Error as StdError;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::{fmt, sync::Arc};
use tokio::net::TcpStream;

pub use balanced::{wrap, BalancedTransport};
pub use hosts::HostBalancedTransport;

/// Alias for the `Future` type returned by a transport.
pub type Sending<T> = Pin<Box<dyn Future<Output = Result<T, NetError>> + Send>>;

/// Issues a request and yields its response.
pub trait Transport<B>: Send + Sync {
    type Response: Send + 'static;

    fn send(&self, req: Request<B>) -> Sending<Self::Response>;
}

impl<B, T: Transport<B> + ?Sized> Transport<B> for Arc<T> {
    type Response = T::Response;

    fn send(&self, req: Request<B>) -> Sending<Self::Response> {
        (**self).send(req)
    }
}

/// Adapts a closure into a [`Transport`].
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Creates a [`TransportFn`] from a closure.
pub fn transport_fn<F>(f: F) -> TransportFn<F> {
    TransportFn { f }
}

impl<B, R, F> Transport<B> for TransportFn<F>
where
    F: Fn(Request<B>) -> Sending<R> + Send + Sync,
    R: Send + 'static,
{
    type Response = R;

    fn send(&self, req: Request<B>) -> Sending<R> {
        (self.f)(req)
    }
}

impl<F> fmt::Debug for TransportFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFn").finish_non_exhaustive()
    }
}

/// The scope attached to `req`, or a fresh root scope if none is.
pub fn request_scope<B>(req: &Request<B>) -> Scope {
    req.extensions().get::<Scope>().cloned().unwrap_or_default()
}

/// Plain HTTP/1.1 over a fresh TCP connection per request.
///
/// No pooling and no TLS: `http` URIs only. The request is raced against
/// its scope, and a `Host` header is added from the URI authority when
/// missing.
#[derive(Debug, Clone, Default)]
pub struct HyperTransport;

impl HyperTransport {
    pub fn new() -> Self {
        Self
    }
}

impl<B> Transport<B> for HyperTransport
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = Response<Incoming>;

    fn send(&self, req: Request<B>) -> Sending<Self::Response> {
        Box::pin(async move {
            let scope = request_scope(&req);
            scope.run(send_http1(req)).await
        })
    }
}

async fn send_http1<B>(req: Request<B>) -> Result<Response<Incoming>, NetError>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (mut parts, body) = req.into_parts();
    if parts.uri.scheme_str() != Some("http") {
        return Err(NetError::InvalidUrl);
    }
    let authority = parts.uri.authority().cloned().ok_or(NetError::InvalidUrl)?;
    let host = authority.host().trim_start_matches('[').trim_end_matches(']');
    let port = authority.port_u16().unwrap_or(80);

    if !parts.headers.contains_key(HOST) {
        let value = authority.as_str().rsplit('@').next().unwrap_or_default();
        let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidUrl)?;
        parts.headers.insert(HOST, value);
    }
    // HTTP/1.1 origin-form request target.
    let origin = parts
        .uri
        .path_and_query()
        .map_or("/", PathAndQuery::as_str)
        .to_string();
    parts.uri = Uri::try_from(origin).map_err(|_| NetError::InvalidUrl)?;

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(NetError::transport)?;
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(NetError::transport)?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "http1 connection closed with error");
        }
    });

    sender
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(NetError::transport)
}

/// Authority string for dispatching to `addr`, keeping the port only when
/// the original request had one.
pub(crate) fn target_authority(addr: IpAddr, port: Option<u16>) -> String {
    match (addr, port) {
        (addr, Some(port)) => SocketAddr::new(addr, port).to_string(),
        (IpAddr::V4(v4), None) => v4.to_string(),
        (IpAddr::V6(v6), None) => format!("[{v6}]"),
    }
}

/// Points `req` at `target`, an `addr[:port]` authority.
///
/// When the request has no `Host` header and `target` differs from the
/// original authority, the original `host[:port]` is set as `Host`.
/// Extensions, including the scope, carry over.
pub(crate) fn redirect<B>(req: Request<B>, target: &str) -> Result<Request<B>, NetError> {
    let (mut parts, body) = req.into_parts();

    let host = parts.uri.host().ok_or(NetError::InvalidUrl)?;
    let virtual_host = match parts.uri.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    if virtual_host != target && !parts.headers.contains_key(HOST) {
        let value = HeaderValue::from_str(&virtual_host).map_err(|_| NetError::InvalidUrl)?;
        parts.headers.insert(HOST, value);
    }

    let mut uri = std::mem::take(&mut parts.uri).into_parts();
    uri.authority = Some(Authority::try_from(target).map_err(|_| NetError::InvalidUrl)?);
    if uri.path_and_query.is_none() {
        uri.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = Uri::from_parts(uri).map_err(|_| NetError::InvalidUrl)?;

    Ok(Request::from_parts(parts, body))
}
