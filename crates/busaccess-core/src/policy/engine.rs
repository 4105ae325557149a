//! Compiled policy and the access check.
//!
//! Construct once (via `compile`), then share: `Policy` is immutable and
//! cloning it only bumps a reference count.

use std::sync::Arc;

use tracing::{debug, warn};

use super::accounts::{IdentityResolver, SystemAccounts};
use super::expr::Expr;
use super::grammar::{self, ParsedEntry};
use super::{Access, ActionDescriptor};
use crate::cred::Credential;
use crate::error::Result;

/// One compiled rule. `expr: None` matches every request.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub expr: Option<Expr>,
    pub access: Access,
}

impl Entry {
    fn matches(&self, cred: Option<&Credential>, action: u32, arg: Option<&str>) -> bool {
        self.expr
            .as_ref()
            .map_or(true, |x| x.matches(cred, action, arg))
    }
}

/// Ordered, immutable rule list.
#[derive(Debug, Clone)]
pub struct Policy {
    entries: Arc<[Entry]>,
}

impl Policy {
    /// Build the final tree from parser output.
    pub fn from_parsed(parsed: &[ParsedEntry]) -> Result<Self> {
        let entries = parsed
            .iter()
            .map(|e| -> Result<Entry> {
                Ok(Entry {
                    expr: e.expr.as_ref().map(Expr::compile).transpose()?,
                    access: e.access,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            entries: entries.into(),
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Walk all entries in order; the last matching one decides.
    pub fn check(
        &self,
        cred: Option<&Credential>,
        action: u32,
        arg: Option<&str>,
        default: Access,
    ) -> Access {
        check(Some(self), cred, action, arg, default)
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || self.entries[..] == other.entries[..]
    }
}

/// Compile `spec`, resolving account names from the system database.
pub fn compile(spec: &str, actions: &[ActionDescriptor]) -> Result<Policy> {
    compile_with(spec, actions, &SystemAccounts::default())
}

/// Compile `spec` with an explicit account resolver.
pub fn compile_with(
    spec: &str,
    actions: &[ActionDescriptor],
    resolver: &dyn IdentityResolver,
) -> Result<Policy> {
    debug!(spec, "compiling policy");
    let compiled =
        grammar::parse(spec, actions, resolver).and_then(|parsed| Policy::from_parsed(&parsed));
    match &compiled {
        Ok(p) => debug!(entries = p.entries.len(), "policy compiled"),
        Err(e) => warn!(spec, error = %e, "policy rejected"),
    }
    compiled
}

/// Decide access for one call.
///
/// Root (euid 0) is always allowed, even without a policy. Otherwise the
/// result starts at `default` and every matching entry overrides it.
pub fn check(
    policy: Option<&Policy>,
    cred: Option<&Credential>,
    action: u32,
    arg: Option<&str>,
    default: Access,
) -> Access {
    if cred.is_some_and(Credential::is_root) {
        return Access::Allow;
    }
    let Some(policy) = policy else {
        return default;
    };
    policy
        .entries
        .iter()
        .filter(|e| e.matches(cred, action, arg))
        .fold(default, |_, e| e.access)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::policy::accounts::StaticAccounts;

    fn policy(spec: &str, actions: &[ActionDescriptor]) -> Policy {
        compile_with(spec, actions, &StaticAccounts::new()).unwrap()
    }

    #[test]
    fn absent_policy_uses_default_except_for_root() {
        let root = Credential::new(0, 0);
        let user = Credential::new(1, 1);
        assert_eq!(check(None, None, 0, None, Access::Allow), Access::Allow);
        assert_eq!(check(None, None, 0, None, Access::Deny), Access::Deny);
        assert_eq!(check(None, Some(&user), 0, None, Access::Allow), Access::Allow);
        assert_eq!(check(None, Some(&user), 0, None, Access::Deny), Access::Deny);
        assert_eq!(check(None, Some(&root), 0, None, Access::Deny), Access::Allow);
    }

    #[test]
    fn empty_policy_uses_default() {
        let p = policy("1", &[]);
        assert!(p.entries().is_empty());
        let user = Credential::new(100, 100);
        assert_eq!(p.check(Some(&user), 0, None, Access::Deny), Access::Deny);
    }

    #[test]
    fn later_entries_override_earlier() {
        let p = policy("1;user(1)=deny;*=allow", &[]);
        let user = Credential::new(1, 1);
        assert_eq!(p.check(Some(&user), 0, None, Access::Deny), Access::Allow);

        let p = policy("1;*=allow;user(1)=deny", &[]);
        assert_eq!(p.check(Some(&user), 0, None, Access::Allow), Access::Deny);
    }

    #[test]
    fn missing_credential_only_matches_wildcards() {
        let p = policy("1;user(1)=deny", &[]);
        assert_eq!(p.check(None, 0, None, Access::Allow), Access::Allow);
        let p = policy("1;*=deny", &[]);
        assert_eq!(p.check(None, 0, None, Access::Allow), Access::Deny);
    }

    #[test]
    fn shell_style_argument_patterns() {
        let actions = [ActionDescriptor::new("foo", 1, 1)];
        let p = policy("1;foo(a**)=deny;foo(x**y)=deny", &actions);
        let user = Credential::new(100, 100);
        assert_eq!(p.check(Some(&user), 1, Some("abc"), Access::Allow), Access::Deny);
        assert_eq!(p.check(Some(&user), 1, Some("x-y"), Access::Allow), Access::Deny);
        assert_eq!(p.check(Some(&user), 1, Some("zzz"), Access::Allow), Access::Allow);
    }

    #[test]
    fn clones_share_entries() {
        let p = policy("1;user(1)=deny", &[]);
        let q = p.clone();
        assert!(Arc::ptr_eq(&p.entries, &q.entries));
        assert_eq!(p, q);
    }

    #[test]
    fn equality() {
        let actions = [ActionDescriptor::new("foo", 1, 1)];
        let a = policy("1;user(1)&foo(x*)=deny", &actions);
        let b = policy("1; foo('x*') & user(1) = deny", &actions);
        assert_eq!(a, b);

        let c = policy("1;user(1)&foo(x*)=allow", &actions);
        assert_ne!(a, c);

        let longer = policy("1;user(1)&foo(x*)=deny;*", &actions);
        assert_ne!(a, longer);

        assert_eq!(Some(&a), Some(&b));
        assert_ne!(Some(&a), None);
        assert_eq!(None::<&Policy>, None);
    }
}
