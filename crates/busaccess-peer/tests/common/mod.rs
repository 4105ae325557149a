//! Test doubles for the bus and the process table.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use busaccess_core::error::{AccessError, Result};
use busaccess_peer::{
    BusConnection, BusConnector, BusType, BusValue, MethodCall, NameWatch, StatusSource,
};

pub fn status(uid: u32, gid: u32, groups: &[u32]) -> String {
    let groups: Vec<String> = groups.iter().map(u32::to_string).collect();
    format!(
        concat!(
            "Name:\ttest\n",
            "Uid:\t{uid}\t{uid}\t{uid}\t{uid}\n",
            "Gid:\t{gid}\t{gid}\t{gid}\t{gid}\n",
            "Groups:\t{groups}\n",
            "CapEff:\t0000000000000000\n",
        ),
        uid = uid,
        gid = gid,
        groups = groups.join(" "),
    )
}

/// In-memory process table.
#[derive(Default)]
pub struct MemStatus {
    records: Mutex<HashMap<u32, String>>,
}

impl MemStatus {
    pub fn insert(&self, pid: u32, text: impl Into<String>) {
        self.records.lock().unwrap().insert(pid, text.into());
    }

    pub fn kill(&self, pid: u32) {
        self.records.lock().unwrap().remove(&pid);
    }
}

#[async_trait]
impl StatusSource for MemStatus {
    async fn read_status(&self, pid: u32) -> io::Result<String> {
        self.records
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// Fake bus daemon: names map to pids, watches can be fired by hand.
#[derive(Default)]
pub struct MockBus {
    owners: Mutex<HashMap<String, u32>>,
    watches: Mutex<HashMap<String, oneshot::Sender<()>>>,
    pub connects: AtomicUsize,
    pub pid_calls: AtomicUsize,
}

impl MockBus {
    pub fn own(&self, name: &str, pid: u32) {
        self.owners.lock().unwrap().insert(name.into(), pid);
    }

    /// Drop the owner of `name` and fire its watch.
    pub fn vanish(&self, name: &str) {
        self.owners.lock().unwrap().remove(name);
        if let Some(tx) = self.watches.lock().unwrap().remove(name) {
            let _ = tx.send(());
        }
    }

    /// Whether someone still holds the watch for `name`.
    pub fn watching(&self, name: &str) -> bool {
        self.watches
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn pid_calls(&self) -> usize {
        self.pid_calls.load(Ordering::SeqCst)
    }
}

pub struct MockConnector(pub Arc<MockBus>);

#[async_trait]
impl BusConnector for MockConnector {
    async fn connect(&self, _bus: BusType) -> Result<Arc<dyn BusConnection>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection(Arc::clone(&self.0))))
    }
}

struct MockConnection(Arc<MockBus>);

#[async_trait]
impl BusConnection for MockConnection {
    async fn call_method(&self, call: MethodCall, _timeout: Duration) -> Result<Vec<BusValue>> {
        assert_eq!(call.member, "GetConnectionUnixProcessID");
        self.0.pid_calls.fetch_add(1, Ordering::SeqCst);
        let Some(BusValue::Str(name)) = call.args.first() else {
            return Err(AccessError::Internal("bad args".into()));
        };
        match self.0.owners.lock().unwrap().get(name) {
            Some(pid) => Ok(vec![BusValue::U32(*pid)]),
            None => Err(AccessError::Internal(format!("name has no owner: {name}"))),
        }
    }

    fn watch_name_owner(&self, name: &str) -> Result<NameWatch> {
        let (tx, rx) = oneshot::channel();
        self.0.watches.lock().unwrap().insert(name.into(), tx);
        Ok(NameWatch::new(async move {
            let _ = rx.await;
        }))
    }
}

pub struct Harness {
    pub bus: Arc<MockBus>,
    pub procs: Arc<MemStatus>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(MockBus::default()),
            procs: Arc::new(MemStatus::default()),
        }
    }

    pub fn connector(&self) -> Arc<dyn BusConnector> {
        Arc::new(MockConnector(Arc::clone(&self.bus)))
    }

    pub fn source(&self) -> Arc<dyn StatusSource> {
        self.procs.clone()
    }

    /// Register `name` as owned by a live process.
    pub fn spawn_peer(&self, name: &str, pid: u32, uid: u32, gid: u32) {
        self.procs.insert(pid, status(uid, gid, &[]));
        self.bus.own(name, pid);
    }
}
