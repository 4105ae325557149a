//! Compiled policy expressions.
//!
//! Matching never fails: every node answers `true`/`false` for a
//! (credential, action, argument) triple. Equality is structural, with
//! `And`/`Or` compared commutatively.

use glob::{Pattern, PatternError};
use tracing::trace;

use super::grammar::ParsedExpr;
use crate::cred::Credential;
use crate::error::{AccessError, Result};

/// One side of an identity predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSpec {
    /// `*`
    Any,
    Exact(u32),
}

/// Compiled expression tree. Operands are never absent; the wildcard entry is
/// represented one level up as `Entry { expr: None, .. }`.
#[derive(Debug, Clone)]
pub enum Expr {
    Identity { uid: IdSpec, gid: IdSpec },
    /// `pattern: None` accepts any argument, and also no argument.
    Custom { action: u32, pattern: Option<Pattern> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Compile a parsed expression. Fails only on an invalid glob; the parser
    /// already rejects those with their spec offset, so here `pos` is 0.
    pub fn compile(parsed: &ParsedExpr) -> Result<Self> {
        Ok(match parsed {
            ParsedExpr::Identity { uid, gid } => Expr::Identity {
                uid: *uid,
                gid: *gid,
            },
            ParsedExpr::Custom { action, param } => {
                let pattern = match param.as_deref() {
                    None => None,
                    Some(p) => compile_pattern(p).map_err(|e| {
                        AccessError::compile(0, format!("bad pattern {p:?}: {}", e.msg))
                    })?,
                };
                Expr::Custom {
                    action: *action,
                    pattern,
                }
            }
            ParsedExpr::Not(x) => Expr::Not(Box::new(Expr::compile(x)?)),
            ParsedExpr::And(l, r) => {
                Expr::And(Box::new(Expr::compile(l)?), Box::new(Expr::compile(r)?))
            }
            ParsedExpr::Or(l, r) => {
                Expr::Or(Box::new(Expr::compile(l)?), Box::new(Expr::compile(r)?))
            }
        })
    }

    pub fn matches(&self, cred: Option<&Credential>, action: u32, arg: Option<&str>) -> bool {
        match self {
            Expr::Identity { uid, gid } => match_user(*uid, cred) && match_group(*gid, cred),
            Expr::Custom {
                action: want,
                pattern,
            } => {
                if *want != action {
                    return false;
                }
                match (arg, pattern) {
                    (Some(arg), Some(p)) => {
                        let hit = p.matches(arg);
                        trace!(pattern = %p, arg, hit, "custom pattern");
                        hit
                    }
                    (Some(_), None) => true,
                    (None, p) => p.is_none(),
                }
            }
            Expr::Not(x) => !x.matches(cred, action, arg),
            // Both sides are always evaluated; matching has no side effects.
            Expr::And(l, r) => {
                let l = l.matches(cred, action, arg);
                let r = r.matches(cred, action, arg);
                l && r
            }
            Expr::Or(l, r) => {
                let l = l.matches(cred, action, arg);
                let r = r.matches(cred, action, arg);
                l || r
            }
        }
    }
}

/// Compile a custom-predicate argument; `None` accepts anything.
///
/// Arguments are plain strings, not paths: runs of `*` collapse to one, so
/// `a**` means `a*`, and `*` also matches `/`.
pub(crate) fn compile_pattern(src: &str) -> std::result::Result<Option<Pattern>, PatternError> {
    let mut text = String::with_capacity(src.len());
    for c in src.chars() {
        if c == '*' && text.ends_with('*') {
            continue;
        }
        text.push(c);
    }
    if text == "*" {
        return Ok(None);
    }
    Pattern::new(&text).map(Some)
}

fn match_user(uid: IdSpec, cred: Option<&Credential>) -> bool {
    match (uid, cred) {
        (IdSpec::Any, _) => true,
        (IdSpec::Exact(uid), Some(c)) => c.euid == uid,
        (IdSpec::Exact(_), None) => false,
    }
}

fn match_group(gid: IdSpec, cred: Option<&Credential>) -> bool {
    match (gid, cred) {
        (IdSpec::Any, _) => true,
        (IdSpec::Exact(gid), Some(c)) => c.has_group(gid),
        (IdSpec::Exact(_), None) => false,
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Expr::Identity { uid: u1, gid: g1 },
                Expr::Identity { uid: u2, gid: g2 },
            ) => u1 == u2 && g1 == g2,
            (
                Expr::Custom {
                    action: a1,
                    pattern: p1,
                },
                Expr::Custom {
                    action: a2,
                    pattern: p2,
                },
            ) => a1 == a2 && p1.as_ref().map(Pattern::as_str) == p2.as_ref().map(Pattern::as_str),
            (Expr::Not(x1), Expr::Not(x2)) => x1 == x2,
            (Expr::And(l1, r1), Expr::And(l2, r2)) | (Expr::Or(l1, r1), Expr::Or(l2, r2)) => {
                (l1 == l2 && r1 == r2) || (l1 == r2 && r1 == l2)
            }
            _ => false,
        }
    }
}
