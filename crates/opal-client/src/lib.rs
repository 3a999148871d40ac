//! opal-client: Async client for the OpenProject v3 REST API.
//!
//! This crate provides:
//! - [`Settings`]: connection configuration (base URL, credential, timeout)
//! - [`OpenProjectClient`]: every domain operation (projects, work
//!   packages, relations, users, reference data) behind a single request
//!   dispatcher
//! - [`ApiError`]: the error taxonomy for transport, protocol, validation
//!   and state failures
//! - [`TtlCache`]: time-bounded memoization for slow-changing reference
//!   data
//!
//! Mutations of work packages follow the API's optimistic-locking
//! protocol: the current `lockVersion` is always fetched immediately
//! before a PATCH. The client never retries on its own; retry policy
//! belongs to the caller.

pub mod cache;
pub mod client;
pub mod error;
pub mod settings;

pub use cache::TtlCache;
pub use client::{ConnectionStatus, OpenProjectClient};
pub use error::{ApiError, Result};
pub use settings::Settings;
