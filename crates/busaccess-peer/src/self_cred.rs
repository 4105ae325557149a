//! Credentials of the running process.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use busaccess_core::error::Result;

use crate::config::SelfSection;
use crate::proc::{read_process, ProcessCredential, StatusSource};

#[derive(Default)]
struct SharedSlot {
    current: Option<Arc<ProcessCredential>>,
    /// Bumped on every (re)build and flush so stale expiry timers do nothing.
    generation: u64,
}

/// Builds and shares the credential of this process.
pub struct SelfContext {
    source: Arc<dyn StatusSource>,
    timeout: Duration,
    shared: Arc<Mutex<SharedSlot>>,
}

fn lock(shared: &Mutex<SharedSlot>) -> MutexGuard<'_, SharedSlot> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SelfContext {
    pub fn new(source: Arc<dyn StatusSource>, cfg: &SelfSection) -> Self {
        Self {
            source,
            timeout: cfg.idle_timeout(),
            shared: Arc::default(),
        }
    }

    /// A newly read credential, never cached.
    pub async fn fresh(&self) -> Result<ProcessCredential> {
        read_process(&*self.source, std::process::id()).await
    }

    /// The shared credential, rebuilt once it has expired or been flushed.
    ///
    /// The instance lives for the idle timeout counted from when it was
    /// built; hits do not extend it.
    pub async fn shared(&self) -> Result<Arc<ProcessCredential>> {
        let cached = lock(&self.shared).current.clone();
        if let Some(cred) = cached {
            return Ok(cred);
        }

        let built = Arc::new(self.fresh().await?);
        let generation = {
            let mut slot = lock(&self.shared);
            if let Some(cred) = &slot.current {
                // Another caller won the race.
                return Ok(Arc::clone(cred));
            }
            slot.generation += 1;
            slot.current = Some(Arc::clone(&built));
            slot.generation
        };
        debug!(pid = built.pid, timeout_sec = self.timeout.as_secs(), "self credential built");

        let weak = Arc::downgrade(&self.shared);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                let mut slot = lock(&shared);
                if slot.generation == generation {
                    slot.current = None;
                    trace!("self credential expired");
                }
            }
        });
        Ok(built)
    }

    /// Forget the shared credential.
    pub fn flush(&self) {
        let mut slot = lock(&self.shared);
        slot.generation += 1;
        if slot.current.take().is_some() {
            debug!("self credential flushed");
        }
    }
}
