//! Process-status records and per-process credentials.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use busaccess_core::error::{AccessError, Result};
use busaccess_core::Credential;

/// Where process-status records come from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn read_status(&self, pid: u32) -> io::Result<String>;
}

/// Reads `<root>/<pid>/status`.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

#[async_trait]
impl StatusSource for ProcFs {
    async fn read_status(&self, pid: u32) -> io::Result<String> {
        let path = self.root.join(pid.to_string()).join("status");
        let data = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), "read status record");
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}

/// Credential of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCredential {
    pub pid: u32,
    pub cred: Credential,
}

/// Read and parse the status record of `pid`.
pub async fn read_process(source: &dyn StatusSource, pid: u32) -> Result<ProcessCredential> {
    if pid == 0 {
        return Err(AccessError::Extract("pid 0".into()));
    }
    let text = source.read_status(pid).await.map_err(|e| {
        debug!(pid, error = %e, "status record unavailable");
        AccessError::Extract(format!("pid {pid}: {e}"))
    })?;
    let cred = Credential::parse(&text)?;
    Ok(ProcessCredential { pid, cred })
}
