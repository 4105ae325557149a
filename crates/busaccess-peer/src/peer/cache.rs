use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

use busaccess_core::error::{AccessError, Result};
use busaccess_core::Credential;

use super::lifecycle::{self, Eviction};
use super::Peer;
use crate::bus::{self, BusConnection, BusConnector, BusType};
use crate::config::PeerSection;
use crate::proc::StatusSource;

struct PeerEntry {
    /// Generation; lifecycle tasks only remove the entry they were spawned for.
    id: u64,
    peer: Arc<Peer>,
    touch: Arc<Notify>,
    /// Dropping this stops the lifecycle task and its name watch.
    _cancel: oneshot::Sender<()>,
}

/// Peers and the connection of one bus.
struct PeerBus {
    bus: BusType,
    peers: DashMap<String, PeerEntry>,
    connection: Mutex<Option<Arc<dyn BusConnection>>>,
}

impl PeerBus {
    fn new(bus: BusType) -> Self {
        Self {
            bus,
            peers: DashMap::new(),
            connection: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn BusConnection>>> {
        // The slot holds plain data; a poisoned lock is still usable.
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connection(&self, connector: &dyn BusConnector) -> Result<Arc<dyn BusConnection>> {
        let cached = self.slot().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = connector.connect(self.bus).await?;
        debug!(bus = %self.bus, "bus connection acquired");
        let mut slot = self.slot();
        Ok(Arc::clone(slot.get_or_insert(conn)))
    }

    fn release_if_idle(&self) {
        if !self.peers.is_empty() {
            return;
        }
        if self.slot().take().is_some() {
            debug!(bus = %self.bus, "bus connection released");
        }
    }

    /// Remove `name`. With `id`, only if it is still that generation.
    fn remove(&self, name: &str, id: Option<u64>, reason: Eviction) -> bool {
        let removed = match id {
            Some(id) => self.peers.remove_if(name, |_, e| e.id == id),
            None => self.peers.remove(name),
        };
        let Some((_, entry)) = removed else {
            return false;
        };
        debug!(
            bus = %self.bus,
            name,
            pid = entry.peer.pid,
            reason = reason.as_str(),
            "peer evicted"
        );
        drop(entry);
        self.release_if_idle();
        true
    }
}

/// Bus name -> peer credential cache.
pub struct PeerCache {
    connector: Arc<dyn BusConnector>,
    source: Arc<dyn StatusSource>,
    idle_timeout: Duration,
    call_timeout: Duration,
    buses: [Arc<PeerBus>; 2],
    next_id: AtomicU64,
}

impl PeerCache {
    pub fn new(
        connector: Arc<dyn BusConnector>,
        source: Arc<dyn StatusSource>,
        cfg: &PeerSection,
    ) -> Self {
        Self {
            connector,
            source,
            idle_timeout: cfg.idle_timeout(),
            call_timeout: cfg.call_timeout(),
            buses: [
                Arc::new(PeerBus::new(BusType::System)),
                Arc::new(PeerBus::new(BusType::Session)),
            ],
            next_id: AtomicU64::new(1),
        }
    }

    fn table(&self, bus: BusType) -> &Arc<PeerBus> {
        &self.buses[bus.index()]
    }

    /// Look up `name`, resolving it through the bus on a miss.
    ///
    /// A hit restarts the entry's idle timer. On failure the cache is left
    /// as it was.
    pub async fn get(&self, bus: BusType, name: &str) -> Result<Arc<Peer>> {
        let table = self.table(bus);
        if let Some(entry) = table.peers.get(name) {
            entry.touch.notify_one();
            debug!(%bus, name, pid = entry.peer.pid, "peer cache hit");
            return Ok(Arc::clone(&entry.peer));
        }

        debug!(%bus, name, "peer cache miss");
        let resolved = self.resolve(table, name).await;
        if let Err(e) = &resolved {
            debug!(%bus, name, error = %e, "peer lookup failed");
            table.release_if_idle();
        }
        resolved
    }

    async fn resolve(&self, table: &Arc<PeerBus>, name: &str) -> Result<Arc<Peer>> {
        let conn = table.connection(&*self.connector).await?;
        let pid = bus::resolve_pid(&*conn, name, self.call_timeout).await?;
        let text = self.source.read_status(pid).await.map_err(|e| {
            AccessError::PeerResolution(format!("{name}: pid {pid} vanished: {e}"))
        })?;
        let cred = Credential::parse(&text)?;
        let watch = conn.watch_name_owner(name)?;

        let peer = Arc::new(Peer {
            bus: table.bus,
            name: name.to_string(),
            pid,
            cred,
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let touch = Arc::new(Notify::new());
        let (cancel_tx, cancel_rx) = oneshot::channel();
        table.peers.insert(
            name.to_string(),
            PeerEntry {
                id,
                peer: Arc::clone(&peer),
                touch: Arc::clone(&touch),
                _cancel: cancel_tx,
            },
        );
        debug!(bus = %table.bus, name, pid, "peer cached");

        let weak = Arc::downgrade(table);
        let idle = self.idle_timeout;
        let key = name.to_string();
        tokio::spawn(async move {
            if let Some(reason) = lifecycle::run(idle, touch, watch, cancel_rx).await {
                if let Some(table) = weak.upgrade() {
                    table.remove(&key, Some(id), reason);
                }
            }
        });
        Ok(peer)
    }

    /// Drop `name`, or every peer of `bus` when `name` is `None`.
    pub fn flush(&self, bus: BusType, name: Option<&str>) {
        let table = self.table(bus);
        match name {
            Some(name) => {
                table.remove(name, None, Eviction::Flushed);
            }
            None => {
                let count = table.peers.len();
                table.peers.clear();
                debug!(%bus, count, reason = Eviction::Flushed.as_str(), "peers evicted");
                table.release_if_idle();
            }
        }
    }

    pub fn len(&self, bus: BusType) -> usize {
        self.table(bus).peers.len()
    }

    pub fn is_empty(&self, bus: BusType) -> bool {
        self.table(bus).peers.is_empty()
    }

    /// Whether a connection to `bus` is currently held.
    pub fn is_connected(&self, bus: BusType) -> bool {
        self.table(bus).slot().is_some()
    }
}
