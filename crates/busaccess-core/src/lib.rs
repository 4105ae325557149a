//! busaccess core: policy grammar, policy engine, and process credentials.
//!
//! This crate holds everything that decides ALLOW or DENY for a bus call:
//! the policy compiler, the immutable compiled `Policy`, and the parser for
//! process-status records. It intentionally carries no transport or runtime
//! dependencies so it can be embedded in any bus service.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Policy specs and status records are untrusted text; every failure surfaces
//! as `AccessError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cred;
pub mod error;
pub mod policy;

/// Shared result type.
pub use error::{AccessError, Result};

pub use cred::Credential;
pub use policy::{check, compile, compile_with, Access, ActionDescriptor, Policy};
