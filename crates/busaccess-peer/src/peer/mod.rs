//! Peer credential cache.
//!
//! `PeerCache` maps bus names to the credentials of the processes that own
//! them, one table per bus. Entries leave the table when they sit idle, when
//! the name loses its owner, or when flushed.

mod cache;
mod lifecycle;

pub use cache::PeerCache;
pub use lifecycle::Eviction;

use busaccess_core::Credential;

use crate::bus::BusType;

/// A resolved bus peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub bus: BusType,
    pub name: String,
    pub pid: u32,
    pub cred: Credential,
}
