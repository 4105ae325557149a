//! Bus collaborator boundary.
//!
//! The peer cache never talks to a bus directly; it goes through
//! `BusConnector`/`BusConnection`, which the embedding service implements on
//! top of its bus library (and tests implement with mocks).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use busaccess_core::error::{AccessError, Result};

/// Well-known name of the bus daemon itself.
pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
/// Daemon method mapping a bus name to the owner's process id.
pub const GET_PID_METHOD: &str = "GetConnectionUnixProcessID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    System,
    Session,
}

impl BusType {
    pub(crate) fn index(self) -> usize {
        match self {
            BusType::System => 0,
            BusType::Session => 1,
        }
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusType::System => "system",
            BusType::Session => "session",
        })
    }
}

/// Argument/reply values the core needs to exchange with the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusValue {
    Str(String),
    U32(u32),
}

/// A synchronous (request/reply) method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<BusValue>,
}

impl MethodCall {
    /// `GetConnectionUnixProcessID(name)` on the bus daemon.
    pub fn get_connection_pid(name: &str) -> Self {
        Self {
            destination: DBUS_SERVICE.into(),
            path: DBUS_PATH.into(),
            interface: DBUS_INTERFACE.into(),
            member: GET_PID_METHOD.into(),
            args: vec![BusValue::Str(name.into())],
        }
    }
}

/// Completes when the watched name loses its owner.
///
/// Dropping the watch cancels it.
pub struct NameWatch {
    vanished: BoxFuture<'static, ()>,
}

impl NameWatch {
    pub fn new(vanished: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            vanished: vanished.boxed(),
        }
    }

    /// A watch that never fires.
    pub fn pending() -> Self {
        Self::new(std::future::pending())
    }
}

impl Future for NameWatch {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.vanished.as_mut().poll(cx)
    }
}

impl fmt::Debug for NameWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameWatch").finish_non_exhaustive()
    }
}

/// An established bus connection.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Blocking round trip; must give up after `timeout`.
    async fn call_method(&self, call: MethodCall, timeout: Duration) -> Result<Vec<BusValue>>;

    /// Start watching `name`'s owner.
    fn watch_name_owner(&self, name: &str) -> Result<NameWatch>;
}

/// Opens connections on demand.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self, bus: BusType) -> Result<Arc<dyn BusConnection>>;
}

/// Ask the bus daemon which process owns `name`.
pub async fn resolve_pid(conn: &dyn BusConnection, name: &str, timeout: Duration) -> Result<u32> {
    let reply = conn
        .call_method(MethodCall::get_connection_pid(name), timeout)
        .await
        .map_err(|e| AccessError::PeerResolution(format!("{name}: {e}")))?;
    match reply.as_slice() {
        [BusValue::U32(pid)] => Ok(*pid),
        other => Err(AccessError::PeerResolution(format!(
            "{name}: unexpected {GET_PID_METHOD} reply {other:?}"
        ))),
    }
}
