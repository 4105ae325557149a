//! Runtime config loader (strict parsing).

pub mod schema;

use std::fs;

use busaccess_core::error::{AccessError, Result};

pub use schema::{AccessConfig, PeerSection, PolicyConfig, SelfSection, SELF_TIMEOUT_ENV};

/// Environment overrides are applied later, by `AccessState` or
/// `AccessConfig::with_env_overrides`.
pub fn load_from_file(path: &str) -> Result<AccessConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| AccessError::BadConfig(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<AccessConfig> {
    let cfg: AccessConfig = serde_yaml::from_str(s)
        .map_err(|e| AccessError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
