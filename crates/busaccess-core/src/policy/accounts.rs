//! User and group name lookup for identity predicates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Resolves account names used in `user(...)` and `group(...)`.
pub trait IdentityResolver {
    fn uid(&self, name: &str) -> Option<u32>;
    fn gid(&self, name: &str) -> Option<u32>;
}

/// Reads the system account database (`/etc/passwd`, `/etc/group`).
///
/// Files are read on every lookup; compilation is rare.
#[derive(Debug, Clone)]
pub struct SystemAccounts {
    passwd: PathBuf,
    group: PathBuf,
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            group: PathBuf::from("/etc/group"),
        }
    }
}

impl SystemAccounts {
    /// Use alternative database files (chroots, tests).
    pub fn with_files(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
        }
    }

    fn lookup(path: &Path, name: &str) -> Option<u32> {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "account database unreadable");
                return None;
            }
        };
        find_id(&data, name)
    }
}

impl IdentityResolver for SystemAccounts {
    fn uid(&self, name: &str) -> Option<u32> {
        Self::lookup(&self.passwd, name)
    }

    fn gid(&self, name: &str) -> Option<u32> {
        Self::lookup(&self.group, name)
    }
}

/// `name:password:id:...`; passwd and group both keep the id third.
fn find_id(data: &str, name: &str) -> Option<u32> {
    data.lines()
        .filter(|l| !l.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split(':');
            if fields.next()? != name {
                return None;
            }
            fields.nth(1)?.trim().parse().ok()
        })
}

/// Fixed name tables, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    users: HashMap<String, u32>,
    groups: HashMap<String, u32>,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, name: impl Into<String>, uid: u32) -> Self {
        self.users.insert(name.into(), uid);
        self
    }

    pub fn group(mut self, name: impl Into<String>, gid: u32) -> Self {
        self.groups.insert(name.into(), gid);
        self
    }
}

impl IdentityResolver for StaticAccounts {
    fn uid(&self, name: &str) -> Option<u32> {
        self.users.get(name).copied()
    }

    fn gid(&self, name: &str) -> Option<u32> {
        self.groups.get(name).copied()
    }
}
