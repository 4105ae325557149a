//! Access policies.
//!
//! A policy is written as a short text spec, compiled once, and then checked
//! many times per call:
//!
//! ```text
//! 1;group(privileged)&get(Passphrase)=allow
//! ```
//!
//! - `grammar`: scanner + recursive-descent parser producing `ParsedEntry`s.
//! - `expr`: the compiled expression tree and its matching/equality rules.
//! - `engine`: the immutable `Policy` and the last-match-wins check.
//! - `accounts`: user/group name resolution for `user(name)` / `group(name)`.

pub mod accounts;
pub mod engine;
pub mod expr;
pub mod grammar;

use serde::Deserialize;

pub use accounts::{IdentityResolver, StaticAccounts, SystemAccounts};
pub use engine::{check, compile, compile_with, Entry, Policy};
pub use expr::{Expr, IdSpec};

/// The only grammar version understood by the compiler.
pub const POLICY_VERSION: &str = "1";

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Deny,
    Allow,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Access::Deny => "deny",
            Access::Allow => "allow",
        }
    }
}

/// A custom predicate the caller allows in policy specs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDescriptor {
    /// Name used in policy text, e.g. `get` in `get(Passphrase)`.
    pub name: String,
    /// Nonzero id the caller passes to `check`.
    pub id: u32,
    /// Number of arguments, 0 or 1.
    pub arity: u8,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, id: u32, arity: u8) -> Self {
        Self {
            name: name.into(),
            id,
            arity,
        }
    }
}
