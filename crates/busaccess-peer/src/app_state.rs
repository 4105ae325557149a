//! Shared application state.
//!
//! Owns the compiled policies, the peer cache and the self context, and runs
//! the full per-call path: peer lookup, then policy check.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use busaccess_core::error::{AccessError, Result};
use busaccess_core::policy::{IdentityResolver, SystemAccounts};
use busaccess_core::{check, compile_with, Access, Policy};

use crate::bus::{BusConnector, BusType};
use crate::config::AccessConfig;
use crate::peer::PeerCache;
use crate::proc::StatusSource;
use crate::self_cred::SelfContext;

#[derive(Clone)]
pub struct AccessState {
    inner: Arc<AccessStateInner>,
}

struct AccessStateInner {
    cfg: AccessConfig,
    policies: HashMap<String, PolicyRuntime>,
    peers: PeerCache,
    self_ctx: SelfContext,
}

struct PolicyRuntime {
    policy: Policy,
    default: Access,
}

impl AccessState {
    /// Build state, resolving account names from the system database.
    ///
    /// `BUSACCESS_SELF_TIMEOUT_SEC` is applied on top of `cfg`.
    pub fn new(
        cfg: AccessConfig,
        connector: Arc<dyn BusConnector>,
        source: Arc<dyn StatusSource>,
    ) -> Result<Self> {
        Self::with_resolver(cfg, connector, source, &SystemAccounts::default())
    }

    pub fn with_resolver(
        cfg: AccessConfig,
        connector: Arc<dyn BusConnector>,
        source: Arc<dyn StatusSource>,
        resolver: &dyn IdentityResolver,
    ) -> Result<Self> {
        let cfg = cfg.with_env_overrides();
        let mut policies = HashMap::new();
        for p in &cfg.policies {
            let policy = compile_with(&p.spec, &p.actions, resolver).map_err(|e| {
                AccessError::BadConfig(format!("policy compile failed (policy={}): {e}", p.name))
            })?;
            policies.insert(
                p.name.clone(),
                PolicyRuntime {
                    policy,
                    default: p.default,
                },
            );
        }

        let peers = PeerCache::new(connector, Arc::clone(&source), &cfg.peer);
        let self_ctx = SelfContext::new(source, &cfg.self_cred);

        Ok(Self {
            inner: Arc::new(AccessStateInner {
                cfg,
                policies,
                peers,
                self_ctx,
            }),
        })
    }

    pub fn cfg(&self) -> &AccessConfig {
        &self.inner.cfg
    }

    pub fn policy(&self, name: &str) -> Option<Policy> {
        self.inner.policies.get(name).map(|p| p.policy.clone())
    }

    pub fn peers(&self) -> &PeerCache {
        &self.inner.peers
    }

    pub fn self_context(&self) -> &SelfContext {
        &self.inner.self_ctx
    }

    /// Decide whether `peer_name` on `bus` may perform `action`.
    ///
    /// A peer that cannot be resolved is checked without a credential.
    pub async fn check_peer(
        &self,
        bus: BusType,
        peer_name: &str,
        policy_name: &str,
        action: u32,
        arg: Option<&str>,
    ) -> Result<Access> {
        let runtime = self
            .inner
            .policies
            .get(policy_name)
            .ok_or_else(|| AccessError::BadConfig(format!("unknown policy: {policy_name}")))?;

        let peer = match self.inner.peers.get(bus, peer_name).await {
            Ok(peer) => Some(peer),
            Err(e) => {
                debug!(%bus, peer = peer_name, error = %e, "checking unresolved peer");
                None
            }
        };
        let cred = peer.as_ref().map(|p| &p.cred);
        let access = check(Some(&runtime.policy), cred, action, arg, runtime.default);
        debug!(
            %bus,
            peer = peer_name,
            policy = policy_name,
            action,
            access = access.as_str(),
            "access decided"
        );
        Ok(access)
    }
}
