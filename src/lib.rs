//! # dnsbalancer
//!
//! Client-side DNS load balancing for outbound HTTP requests.
//!
//! Instead of letting the connection layer resolve a hostname to a single
//! address, `dnsbalancer` resolves the hostname itself, picks one of the
//! returned addresses uniformly at random, and sends the request straight to
//! that address while keeping the original virtual host.
//!
//! ## Features
//!
//! - **Resolver decorators**: caching with positive/negative TTLs and
//!   sampled eviction, concurrent-lookup deduplication, per-lookup deadlines
//! - **Request-time balancing**: resolve per request, dispatch to a random address
//! - **Background-refresh balancing**: a periodically refreshed host snapshot
//! - **Cancellation**: every lookup runs under a deadline-aware [`base::scope::Scope`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dnsbalancer::config::ResolverConfig;
//! use dnsbalancer::dns::{AddressFamily, GaiResolver};
//! use dnsbalancer::transport::{wrap, HyperTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = ResolverConfig::new(AddressFamily::Ip4).build(Arc::new(GaiResolver::new()));
//!     let client = wrap(HyperTransport::new(), Arc::new(resolver), AddressFamily::Ip4);
//!
//!     let req = http::Request::get("http://example.com/")
//!         .body(http_body_util::Empty::<bytes::Bytes>::new())
//!         .unwrap();
//!     let response = client.send(req).await.unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Errors, cancellation scopes, random index selection
//! - [`dns`] - The `Resolve` trait, base resolvers and decorators
//! - [`balancer`] - Host balancers, including the background-refresh balancer
//! - [`transport`] - Request dispatch and the balancing transports
//! - [`config`] - Resolver chain configuration
//!
//! ## Non-goals
//!
//! This is not a connection pool and not a health-checking load balancer:
//! no probing, no error-based ejection, no weighting. Selection is uniform
//! among whatever the resolver currently reports.

pub mod balancer;
pub mod base;
pub mod config;
pub mod dns;
pub mod transport;

pub use base::neterror::NetError;
pub use base::scope::Scope;
