#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use busaccess_core::Access;
use busaccess_peer::config::{load_from_file, load_from_str};

#[test]
fn full_config() {
    let cfg = load_from_str(
        r#"
version: 1
peer:
  idle_timeout_sec: 10
  call_timeout_ms: 500
  proc_root: "/tmp/proc"
self_cred:
  idle_timeout_sec: 0
policies:
  - name: secrets
    spec: "1;group(privileged)&get(Passphrase)=allow"
    default: deny
    actions:
      - { name: get, id: 1, arity: 1 }
  - name: open
    spec: "1;*=allow"
"#,
    )
    .unwrap();

    assert_eq!(cfg.peer.idle_timeout(), Duration::from_secs(10));
    assert_eq!(cfg.peer.call_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.peer.proc_root, "/tmp/proc");
    assert_eq!(cfg.self_cred.idle_timeout_sec, 0);
    assert_eq!(cfg.policies.len(), 2);
    assert_eq!(cfg.policies[0].actions[0].name, "get");
    assert_eq!(cfg.policies[1].default, Access::Deny);
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_from_str("version: 1\n").unwrap();
    assert_eq!(cfg.peer.idle_timeout_sec, 30);
    assert_eq!(cfg.peer.call_timeout_ms, 25000);
    assert_eq!(cfg.peer.proc_root, "/proc");
    assert_eq!(cfg.self_cred.idle_timeout_sec, 30);
    assert!(cfg.policies.is_empty());
}

fn rejected(yaml: &str) {
    let err = load_from_str(yaml).unwrap_err();
    assert_eq!(err.code().as_str(), "BAD_CONFIG", "{yaml}");
}

#[test]
fn rejects_bad_configs() {
    rejected("version: 2\n");
    rejected("version: 1\nextra: true\n");
    rejected("version: 1\npeer:\n  idle_timeout_sec: 0\n");
    rejected("version: 1\npeer:\n  idle_timeout_sec: 3601\n");
    rejected("version: 1\npeer:\n  call_timeout_ms: 50\n");
    rejected("version: 1\npeer:\n  proc_root: \"\"\n");
    rejected("version: 1\nself_cred:\n  idle_timeout_sec: 4000\n");
    rejected("version: 1\npolicies:\n  - { name: a, spec: \"1\", default: maybe }\n");
    rejected("version: 1\npolicies:\n  - { name: a, spec: \"1\", colour: red }\n");
    rejected("version: 1\npolicies:\n  - { name: a, spec: \"1\" }\n  - { name: a, spec: \"1\" }\n");
    rejected("version: 1\npolicies:\n  - { name: \" \", spec: \"1\" }\n");
    rejected("version: [\n");
}

#[test]
fn missing_file() {
    let err = load_from_file("/nonexistent/busaccess.yaml").unwrap_err();
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}
