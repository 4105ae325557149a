//! busaccess peer runtime.
//!
//! Wires the policy core to a running bus: resolves bus names to the
//! credentials of their owning processes (cached per bus), reads the
//! credential of the calling process, loads the YAML config and compiles the
//! configured policies. The bus itself stays behind the `bus` traits so the
//! embedding service picks the transport.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod bus;
pub mod config;
pub mod peer;
pub mod proc;
pub mod self_cred;

pub use app_state::AccessState;
pub use bus::{BusConnection, BusConnector, BusType, BusValue, MethodCall, NameWatch};
pub use peer::{Eviction, Peer, PeerCache};
pub use proc::{read_process, ProcFs, ProcessCredential, StatusSource};
pub use self_cred::SelfContext;
