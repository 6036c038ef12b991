//! # authz-input
//!
//! Turns a raw Docker API request into the canonical input document that
//! authorization policies are written against.
//!
//! The [`RequestNormalizer`] parses the URI, query string and JSON body of an
//! [`AuthzRequest`] into an [`InputDocument`]. When the body is a
//! container-create payload, the [`MountResolver`] extracts every host bind
//! mount and resolves it to its real on-disk location.
//!
//! ## Key invariants
//!
//! - **Fresh per request**: an `InputDocument` is built for one decision and
//!   never cached.
//! - **Resolved mounts**: `BindMount::resolved_source` is absolute and free of
//!   symlinks and `..` segments, so a policy cannot be bypassed by aliasing a
//!   host path.
//! - **Exact-case headers**: headers are copied verbatim; `Content-Type` is
//!   looked up with exact case.

pub mod document;
pub mod error;
pub mod mounts;
pub mod normalize;
pub mod request;

pub use document::{BindMount, InputDocument};
pub use error::InputError;
pub use mounts::MountResolver;
pub use normalize::RequestNormalizer;
pub use request::AuthzRequest;
