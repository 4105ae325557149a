//! Policy spec parsing (panic-free).
//!
//! ```text
//! policy    := version (";" rule?)*
//! rule      := "*" ["=" access] | expr ["=" access]
//! expr      := and_expr ("|" and_expr)*
//! and_expr  := unary ("&" unary)*
//! unary     := "!" unary | primary
//! primary   := "(" expr ")" | "*" | ident "(" [arg] ")"
//! arg       := 'quoted' | "quoted" | bare-token
//! ```
//!
//! Parsing rules:
//! - Never index by char boundary guesswork; every slice comes from `find`
//!   or from positions produced by `char_indices`.
//! - Tree depth is bounded so hostile specs cannot exhaust the stack; every
//!   `!`, `(` and each extra `&`/`|` operand counts one level.
//! - The first error aborts the whole parse; no partial result escapes.

use super::accounts::IdentityResolver;
use super::expr::{self, IdSpec};
use super::{Access, ActionDescriptor, POLICY_VERSION};
use crate::error::{AccessError, Result};

/// Deepest allowed expression tree. Chains like `a&b&c` build one level per
/// operand, so this also caps their length.
const MAX_DEPTH: usize = 256;

/// Parsed (not yet compiled) expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedExpr {
    Identity { uid: IdSpec, gid: IdSpec },
    /// `param` is the raw argument text; `*` means "any".
    Custom { action: u32, param: Option<String> },
    Not(Box<ParsedExpr>),
    And(Box<ParsedExpr>, Box<ParsedExpr>),
    Or(Box<ParsedExpr>, Box<ParsedExpr>),
}

/// One rule as written in the policy text. `expr: None` is the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub expr: Option<ParsedExpr>,
    pub access: Access,
}

/// Parse a full policy spec into its entries, in source order.
pub fn parse(
    spec: &str,
    actions: &[ActionDescriptor],
    resolver: &dyn IdentityResolver,
) -> Result<Vec<ParsedEntry>> {
    validate_actions(actions)?;

    let (version, body_start) = match spec.find(';') {
        Some(i) => (&spec[..i], Some(i + 1)),
        None => (spec, None),
    };
    if version.trim() != POLICY_VERSION {
        return Err(AccessError::UnsupportedVersion(version.trim().to_string()));
    }

    let Some(start) = body_start else {
        return Ok(Vec::new());
    };

    let mut p = Parser {
        src: spec,
        pos: start,
        actions,
        resolver,
        depth: 0,
    };
    p.rules()
}

fn validate_actions(actions: &[ActionDescriptor]) -> Result<()> {
    for (i, a) in actions.iter().enumerate() {
        if a.id == 0 {
            return Err(AccessError::compile(0, format!("action {:?} has id 0", a.name)));
        }
        if a.arity > 1 {
            return Err(AccessError::compile(
                0,
                format!("action {:?} has unsupported arity {}", a.name, a.arity),
            ));
        }
        if !is_ident(&a.name) || a.name == "user" || a.name == "group" {
            return Err(AccessError::compile(0, format!("invalid action name {:?}", a.name)));
        }
        if let Some(dup) = actions[..i].iter().find(|b| b.id == a.id || b.name == a.name) {
            return Err(AccessError::compile(
                0,
                format!("action {:?} clashes with {:?}", a.name, dup.name),
            ));
        }
    }
    Ok(())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if is_ident_start(c)) && chars.all(is_ident_char)
}

fn ends_bare_arg(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    actions: &'a [ActionDescriptor],
    resolver: &'a dyn IdentityResolver,
    depth: usize,
}

impl<'a> Parser<'a> {
    // --------------------
    // Scanner
    // --------------------

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    /// Skip whitespace, then consume `c` if it is next.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    fn err(&self, msg: impl Into<String>) -> AccessError {
        AccessError::compile(self.pos, msg)
    }

    fn unexpected(&self, wanted: &str) -> AccessError {
        match self.peek() {
            Some(c) => self.err(format!("expected {wanted}, found '{c}'")),
            None => self.err(format!("expected {wanted}, found end of input")),
        }
    }

    /// Consume the run of characters accepted by `pred`.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        match self.peek() {
            Some(c) if is_ident_start(c) => Ok(self.take_while(is_ident_char)),
            _ => Err(self.unexpected("identifier")),
        }
    }

    // --------------------
    // Rules
    // --------------------

    fn rules(&mut self) -> Result<Vec<ParsedEntry>> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(';') => {
                    // empty rule
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            entries.push(self.rule()?);

            self.skip_ws();
            match self.peek() {
                None => break,
                Some(';') => self.pos += 1,
                Some(_) => return Err(self.unexpected("';'")),
            }
        }
        Ok(entries)
    }

    fn rule(&mut self) -> Result<ParsedEntry> {
        let expr = if self.lone_star() {
            None
        } else {
            Some(self.expr()?)
        };

        let access = if self.eat('=') {
            let at = self.pos;
            match self.ident()? {
                "allow" => Access::Allow,
                "deny" => Access::Deny,
                other => {
                    return Err(AccessError::compile(
                        at,
                        format!("expected 'allow' or 'deny', found {other:?}"),
                    ))
                }
            }
        } else {
            Access::Allow
        };

        Ok(ParsedEntry { expr, access })
    }

    /// A rule consisting of nothing but `*` is the wildcard entry.
    fn lone_star(&mut self) -> bool {
        let save = self.pos;
        if self.eat('*') {
            self.skip_ws();
            if matches!(self.peek(), None | Some(';') | Some('=')) {
                return true;
            }
        }
        self.pos = save;
        false
    }

    // --------------------
    // Expressions
    // --------------------

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.err("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expr(&mut self) -> Result<ParsedExpr> {
        self.enter()?;
        let mut left = self.and_expr()?;
        let mut levels = 0;
        while self.eat('|') {
            self.enter()?;
            levels += 1;
            let right = self.and_expr()?;
            left = ParsedExpr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= levels;
        self.leave();
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<ParsedExpr> {
        let mut left = self.unary()?;
        let mut levels = 0;
        while self.eat('&') {
            self.enter()?;
            levels += 1;
            let right = self.unary()?;
            left = ParsedExpr::And(Box::new(left), Box::new(right));
        }
        self.depth -= levels;
        Ok(left)
    }

    fn unary(&mut self) -> Result<ParsedExpr> {
        if self.eat('!') {
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            Ok(ParsedExpr::Not(Box::new(operand)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<ParsedExpr> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            // Nested `*` matches everything, like a wildcard identity.
            Some('*') => {
                self.pos += 1;
                Ok(ParsedExpr::Identity {
                    uid: IdSpec::Any,
                    gid: IdSpec::Any,
                })
            }
            Some(c) if is_ident_start(c) => self.call(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn call(&mut self) -> Result<ParsedExpr> {
        let at = self.pos;
        let name = self.ident()?;
        self.expect('(')?;
        self.skip_ws();
        let arg_at = self.pos;
        let arg = self.arg()?;
        self.expect(')')?;

        match name {
            "user" => {
                let arg = arg
                    .ok_or_else(|| AccessError::compile(arg_at, "user() needs an argument"))?;
                let (u, g) = match arg.split_once(':') {
                    Some((u, g)) => (u, Some(g)),
                    None => (arg.as_str(), None),
                };
                let uid = self.user_id(u, arg_at)?;
                let gid = match g {
                    Some(g) => self.group_id(g, arg_at)?,
                    None => IdSpec::Any,
                };
                Ok(ParsedExpr::Identity { uid, gid })
            }
            "group" => {
                let arg = arg
                    .ok_or_else(|| AccessError::compile(arg_at, "group() needs an argument"))?;
                let gid = self.group_id(&arg, arg_at)?;
                Ok(ParsedExpr::Identity {
                    uid: IdSpec::Any,
                    gid,
                })
            }
            _ => {
                let action = self
                    .actions
                    .iter()
                    .find(|a| a.name == name)
                    .ok_or_else(|| AccessError::compile(at, format!("unknown action {name:?}")))?;
                match (arg, action.arity) {
                    (Some(a), 0) => Err(AccessError::compile(
                        arg_at,
                        format!("unexpected argument {a:?} for {name:?}"),
                    )),
                    (None, 1) => Err(AccessError::compile(
                        arg_at,
                        format!("missing argument for {name:?}"),
                    )),
                    (param, _) => {
                        if let Some(p) = &param {
                            expr::compile_pattern(p).map_err(|e| {
                                let msg = format!("bad pattern {p:?}: {}", e.msg);
                                AccessError::compile(arg_at, msg)
                            })?;
                        }
                        Ok(ParsedExpr::Custom {
                            action: action.id,
                            param,
                        })
                    }
                }
            }
        }
    }

    /// Zero or one argument, up to (not including) the closing `)`.
    fn arg(&mut self) -> Result<Option<String>> {
        self.skip_ws();
        match self.peek() {
            Some(')') => Ok(None),
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                self.quoted(q).map(Some)
            }
            Some(_) => {
                let tok = self.take_while(|c| !ends_bare_arg(c));
                if tok.is_empty() {
                    Err(self.unexpected("argument"))
                } else {
                    Ok(Some(tok.to_string()))
                }
            }
            None => Err(self.unexpected("argument or ')'")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(AccessError::compile(start, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(AccessError::compile(start, "unterminated string")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn user_id(&self, s: &str, at: usize) -> Result<IdSpec> {
        self.identity(s, at, "user", |name| self.resolver.uid(name))
    }

    fn group_id(&self, s: &str, at: usize) -> Result<IdSpec> {
        self.identity(s, at, "group", |name| self.resolver.gid(name))
    }

    fn identity(
        &self,
        s: &str,
        at: usize,
        kind: &str,
        lookup: impl Fn(&str) -> Option<u32>,
    ) -> Result<IdSpec> {
        if s == "*" {
            return Ok(IdSpec::Any);
        }
        if s.is_empty() {
            return Err(AccessError::compile(at, format!("empty {kind}")));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(IdSpec::Exact)
                .map_err(|_| AccessError::compile(at, format!("{kind} id {s} out of range")));
        }
        lookup(s)
            .map(IdSpec::Exact)
            .ok_or_else(|| AccessError::compile(at, format!("unknown {kind} {s:?}")))
    }
}
