use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use busaccess_core::error::{AccessError, Result};
use busaccess_core::{Access, ActionDescriptor};

/// Seconds the shared self credential stays alive; overrides `self_cred`.
pub const SELF_TIMEOUT_ENV: &str = "BUSACCESS_SELF_TIMEOUT_SEC";

const MAX_SELF_TIMEOUT_SEC: u64 = 3600;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    pub version: u32,

    #[serde(default)]
    pub peer: PeerSection,

    #[serde(default)]
    pub self_cred: SelfSection,

    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            version: 1,
            peer: PeerSection::default(),
            self_cred: SelfSection::default(),
            policies: Vec::new(),
        }
    }
}

impl AccessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AccessError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.peer.validate()?;
        self.self_cred.validate()?;

        let mut names = HashSet::new();
        for p in &self.policies {
            if p.name.trim().is_empty() {
                return Err(AccessError::BadConfig("policies[].name must not be empty".into()));
            }
            if !names.insert(p.name.as_str()) {
                return Err(AccessError::BadConfig(format!(
                    "duplicate policy name: {}",
                    p.name
                )));
            }
        }
        Ok(())
    }

    /// Apply `BUSACCESS_SELF_TIMEOUT_SEC` from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        let value = std::env::var(SELF_TIMEOUT_ENV).ok();
        self.self_cred.apply_override(value.as_deref());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerSection {
    #[serde(default = "default_idle_timeout_sec")]
    pub idle_timeout_sec: u64,

    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_proc_root")]
    pub proc_root: String,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            idle_timeout_sec: default_idle_timeout_sec(),
            call_timeout_ms: default_call_timeout_ms(),
            proc_root: default_proc_root(),
        }
    }
}

impl PeerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=3600).contains(&self.idle_timeout_sec) {
            return Err(AccessError::BadConfig(
                "peer.idle_timeout_sec must be between 1 and 3600".into(),
            ));
        }
        if !(100..=120000).contains(&self.call_timeout_ms) {
            return Err(AccessError::BadConfig(
                "peer.call_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if self.proc_root.is_empty() {
            return Err(AccessError::BadConfig("peer.proc_root must not be empty".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfSection {
    #[serde(default = "default_idle_timeout_sec")]
    pub idle_timeout_sec: u64,
}

impl Default for SelfSection {
    fn default() -> Self {
        Self {
            idle_timeout_sec: default_idle_timeout_sec(),
        }
    }
}

impl SelfSection {
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_sec > MAX_SELF_TIMEOUT_SEC {
            return Err(AccessError::BadConfig(
                "self_cred.idle_timeout_sec must be between 0 and 3600".into(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec)
    }

    /// Take the timeout from an override value. Negative or unparseable
    /// values keep the current setting; larger ones are capped at 3600.
    pub fn apply_override(&mut self, value: Option<&str>) {
        let Some(raw) = value else {
            return;
        };
        match raw.trim().parse::<i64>() {
            Ok(sec) if sec >= 0 => {
                let sec = sec.unsigned_abs().min(MAX_SELF_TIMEOUT_SEC);
                debug!(sec, "self credential timeout overridden");
                self.idle_timeout_sec = sec;
            }
            _ => warn!(value = raw, "ignoring {SELF_TIMEOUT_ENV}"),
        }
    }
}

fn default_idle_timeout_sec() -> u64 {
    30
}
fn default_call_timeout_ms() -> u64 {
    25000
}
fn default_proc_root() -> String {
    "/proc".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub name: String,
    pub spec: String,
    #[serde(default = "default_access")]
    pub default: Access,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
}

fn default_access() -> Access {
    Access::Deny
}
