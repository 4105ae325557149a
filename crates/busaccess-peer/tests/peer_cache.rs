#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use tokio::time::sleep;

use busaccess_peer::config::PeerSection;
use busaccess_peer::{BusType, PeerCache};
use common::Harness;

const SYS: BusType = BusType::System;

fn cache(h: &Harness) -> PeerCache {
    PeerCache::new(h.connector(), h.source(), &PeerSection::default())
}

/// Let lifecycle tasks observe what just happened.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn miss_then_hit() {
    let h = Harness::new();
    h.spawn_peer(":1.7", 700, 1000, 1000);
    let cache = cache(&h);

    assert!(!cache.is_connected(SYS));
    let p = cache.get(SYS, ":1.7").await.unwrap();
    assert_eq!((p.pid, p.cred.euid, p.cred.egid), (700, 1000, 1000));
    assert_eq!(p.bus, SYS);
    assert_eq!(p.name, ":1.7");
    assert!(cache.is_connected(SYS));

    let again = cache.get(SYS, ":1.7").await.unwrap();
    assert_eq!(again.pid, 700);
    assert_eq!(h.bus.pid_calls(), 1);
    assert_eq!(h.bus.connects(), 1);
    assert_eq!(cache.len(SYS), 1);
    assert!(cache.is_empty(BusType::Session));
}

#[tokio::test(start_paused = true)]
async fn hits_push_out_idle_eviction() {
    let h = Harness::new();
    h.spawn_peer("a.b", 10, 5, 5);
    let cache = cache(&h);

    cache.get(SYS, "a.b").await.unwrap();
    sleep(Duration::from_secs(20)).await;
    cache.get(SYS, "a.b").await.unwrap();
    sleep(Duration::from_secs(20)).await;

    // 40s since insert but only 20s since the last hit.
    cache.get(SYS, "a.b").await.unwrap();
    assert_eq!(h.bus.pid_calls(), 1);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(cache.len(SYS), 0);
    assert!(!cache.is_connected(SYS));
    assert!(!h.bus.watching("a.b"));

    cache.get(SYS, "a.b").await.unwrap();
    assert_eq!(h.bus.pid_calls(), 2);
    assert_eq!(h.bus.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn vanished_owner_is_evicted() {
    let h = Harness::new();
    h.spawn_peer(":1.1", 11, 1, 1);
    h.spawn_peer(":1.2", 12, 2, 2);
    let cache = cache(&h);

    cache.get(SYS, ":1.1").await.unwrap();
    cache.get(SYS, ":1.2").await.unwrap();
    assert!(h.bus.watching(":1.1"));

    h.bus.vanish(":1.1");
    settle().await;

    assert_eq!(cache.len(SYS), 1);
    assert!(cache.is_connected(SYS));
    let err = cache.get(SYS, ":1.1").await.unwrap_err();
    assert_eq!(err.code().as_str(), "PEER_RESOLUTION");
    assert_eq!(cache.len(SYS), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_one_and_all() {
    let h = Harness::new();
    h.spawn_peer("x", 1, 1, 1);
    h.spawn_peer("y", 2, 2, 2);
    let cache = cache(&h);

    cache.get(SYS, "x").await.unwrap();
    cache.get(SYS, "y").await.unwrap();

    cache.flush(SYS, Some("x"));
    settle().await;
    assert_eq!(cache.len(SYS), 1);
    assert!(!h.bus.watching("x"));
    assert!(h.bus.watching("y"));
    assert!(cache.is_connected(SYS));

    // Absent names are fine.
    cache.flush(SYS, Some("x"));
    cache.flush(SYS, Some("nobody"));

    cache.flush(SYS, None);
    settle().await;
    assert_eq!(cache.len(SYS), 0);
    assert!(!h.bus.watching("y"));
    assert!(!cache.is_connected(SYS));

    cache.get(SYS, "x").await.unwrap();
    assert_eq!(h.bus.pid_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn stale_timer_spares_recreated_entry() {
    let h = Harness::new();
    h.spawn_peer("n", 3, 3, 3);
    let cache = cache(&h);

    cache.get(SYS, "n").await.unwrap();
    sleep(Duration::from_secs(25)).await;
    cache.flush(SYS, Some("n"));
    cache.get(SYS, "n").await.unwrap();

    // The first entry's deadline would have been at 30s.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(cache.len(SYS), 1);
    assert_eq!(h.bus.pid_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_leave_cache_unchanged() {
    let h = Harness::new();
    let cache = cache(&h);

    // No owner on the bus.
    let err = cache.get(SYS, "ghost").await.unwrap_err();
    assert_eq!(err.code().as_str(), "PEER_RESOLUTION");
    assert_eq!(cache.len(SYS), 0);
    assert!(!cache.is_connected(SYS));

    // Owner resolved, but the process is already gone.
    h.bus.own("late", 40);
    let err = cache.get(SYS, "late").await.unwrap_err();
    assert_eq!(err.code().as_str(), "PEER_RESOLUTION");

    // Status record without Uid.
    h.bus.own("odd", 41);
    h.procs.insert(41, "Gid:\t1\t1\t1\t1\n");
    let err = cache.get(SYS, "odd").await.unwrap_err();
    assert_eq!(err.code().as_str(), "EXTRACT");

    assert_eq!(cache.len(SYS), 0);
    assert!(!cache.is_connected(SYS));
    assert!(!h.bus.watching("late"));
    assert!(!h.bus.watching("odd"));
}

#[tokio::test(start_paused = true)]
async fn buses_are_independent() {
    let h = Harness::new();
    h.spawn_peer("svc", 9, 9, 9);
    let cache = cache(&h);

    cache.get(SYS, "svc").await.unwrap();
    cache.get(BusType::Session, "svc").await.unwrap();
    assert_eq!(h.bus.connects(), 2);

    cache.flush(BusType::Session, None);
    assert_eq!(cache.len(SYS), 1);
    assert!(cache.is_connected(SYS));
    assert!(!cache.is_connected(BusType::Session));
}

#[tokio::test(start_paused = true)]
async fn dropping_cache_stops_watches() {
    let h = Harness::new();
    h.spawn_peer("w", 5, 5, 5);
    let cache = cache(&h);
    cache.get(SYS, "w").await.unwrap();
    assert!(h.bus.watching("w"));

    drop(cache);
    settle().await;
    assert!(!h.bus.watching("w"));
}
