//! Top-level facade crate for busaccess.
//!
//! Re-exports the policy/credential core and the peer runtime so users can
//! depend on a single crate.

pub mod core {
    pub use busaccess_core::*;
}

pub mod peer {
    pub use busaccess_peer::*;
}
