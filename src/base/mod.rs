//! Base types and error handling.
//!
//! Provides foundational types shared by resolvers and balancers:
//! - [`NetError`](neterror::NetError): crate-wide error type
//! - [`Scope`](scope::Scope): cancellation and deadline scope passed to every lookup
//! - [`FastRand`](fastrand::FastRand): lock-free random index selection

pub mod context;
pub mod fastrand;
pub mod neterror;
pub mod scope;
