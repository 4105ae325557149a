//! Per-entry lifecycle: idle deadline, owner watch, cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep, Instant};

use crate::bus::NameWatch;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    IdleTimeout,
    NameVanished,
    Flushed,
}

impl Eviction {
    pub fn as_str(self) -> &'static str {
        match self {
            Eviction::IdleTimeout => "idle_timeout",
            Eviction::NameVanished => "name_vanished",
            Eviction::Flushed => "flushed",
        }
    }
}

/// Wait until the entry should go.
///
/// Each `touch` notification pushes the deadline out by `idle`. Returns
/// `None` once `cancel` resolves, i.e. the entry was already removed and its
/// sender dropped.
pub(super) async fn run(
    idle: Duration,
    touch: Arc<Notify>,
    mut watch: NameWatch,
    mut cancel: oneshot::Receiver<()>,
) -> Option<Eviction> {
    let deadline = sleep(idle);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut cancel => return None,
            _ = &mut watch => return Some(Eviction::NameVanished),
            _ = touch.notified() => deadline.as_mut().reset(Instant::now() + idle),
            _ = &mut deadline => return Some(Eviction::IdleTimeout),
        }
    }
}
