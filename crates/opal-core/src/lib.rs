//! opal-core: Request validation and wire-format translation for the
//! OpenProject v3 API.
//!
//! This crate provides:
//! - Validated create/update request types that serialize to the exact
//!   HAL+JSON payloads the API expects
//! - `WorkPackageQuery`: the filter/sort query builder
//! - Helpers for reading HAL+JSON resource envelopes
//!
//! Everything here is pure data transformation; network I/O lives in
//! `opal-client`.

pub mod error;
pub mod filter;
pub mod hal;
pub mod request;

pub use error::{CoreError, Result};
pub use filter::{SortOrder, WorkPackageQuery};
pub use request::{
    ProjectCreateRequest, RelationCreateRequest, WorkPackageCreateRequest, WorkPackageUpdate,
};
