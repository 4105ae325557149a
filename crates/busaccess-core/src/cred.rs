//! Process credentials and the process-status record parser (panic-free).
//!
//! Input is the line-oriented `Key:\tvalue ...` text of `/proc/<pid>/status`.
//! Parsing rules:
//! - Only `Uid`, `Gid`, `Groups` and `CapEff` are read; keys are compared
//!   case-insensitively against the whole token before the first `:`.
//! - Each key is honoured once; parsing stops when all four were seen.
//! - `Uid`/`Gid` are mandatory, `Groups`/`CapEff` are optional.

use tracing::trace;

use crate::error::{AccessError, Result};

const KEY_UID: u8 = 0x01;
const KEY_GID: u8 = 0x02;
const KEY_GROUPS: u8 = 0x04;
const KEY_CAP_EFF: u8 = 0x08;
const KEY_ALL: u8 = KEY_UID | KEY_GID | KEY_GROUPS | KEY_CAP_EFF;

/// Effective identity of a process.
///
/// `groups` and `caps` are `None` when the status record did not carry
/// them; `Some(vec![])` means the `Groups` line was present but empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Effective uid.
    pub euid: u32,
    /// Effective gid.
    pub egid: u32,
    /// Supplementary groups.
    pub groups: Option<Vec<u32>>,
    /// Effective capability set.
    pub caps: Option<u64>,
}

impl Credential {
    pub fn new(euid: u32, egid: u32) -> Self {
        Self {
            euid,
            egid,
            groups: None,
            caps: None,
        }
    }

    pub fn with_groups(mut self, groups: impl Into<Vec<u32>>) -> Self {
        self.groups = Some(groups.into());
        self
    }

    pub fn with_caps(mut self, caps: u64) -> Self {
        self.caps = Some(caps);
        self
    }

    pub fn is_root(&self) -> bool {
        self.euid == 0
    }

    /// Supplementary groups, empty if unknown.
    pub fn groups(&self) -> &[u32] {
        self.groups.as_deref().unwrap_or(&[])
    }

    /// True if `gid` is the effective gid or one of the supplementary groups.
    pub fn has_group(&self, gid: u32) -> bool {
        self.egid == gid || self.groups().contains(&gid)
    }

    /// Extract a credential from a process-status record.
    ///
    /// Fails unless both the effective uid and gid were captured; no partial
    /// credential is ever returned.
    pub fn parse(text: &str) -> Result<Self> {
        let mut seen = 0u8;
        let mut euid = None;
        let mut egid = None;
        let mut groups = None;
        let mut caps = None;

        for line in text.split('\n') {
            if seen & KEY_ALL == KEY_ALL {
                break;
            }
            let Some((key, values)) = split_key(line) else { continue };

            if seen & KEY_UID == 0 && key.eq_ignore_ascii_case("Uid") {
                // real, effective, saved set, filesystem
                seen |= KEY_UID;
                euid = second_of_four(values);
            } else if seen & KEY_GID == 0 && key.eq_ignore_ascii_case("Gid") {
                seen |= KEY_GID;
                egid = second_of_four(values);
            } else if seen & KEY_GROUPS == 0 && key.eq_ignore_ascii_case("Groups") {
                seen |= KEY_GROUPS;
                groups = Some(
                    values
                        .split_ascii_whitespace()
                        .filter_map(parse_id)
                        .collect::<Vec<_>>(),
                );
            } else if seen & KEY_CAP_EFF == 0 && key.eq_ignore_ascii_case("CapEff") {
                seen |= KEY_CAP_EFF;
                let mut it = values.split_ascii_whitespace();
                caps = match (it.next(), it.next()) {
                    (Some(tok), None) => parse_caps(tok),
                    _ => None,
                };
            }
        }

        match (euid, egid) {
            (Some(euid), Some(egid)) => {
                trace!(euid, egid, "credential extracted");
                Ok(Self {
                    euid,
                    egid,
                    groups,
                    caps,
                })
            }
            (None, _) => Err(AccessError::Extract("no usable Uid line".into())),
            (_, None) => Err(AccessError::Extract("no usable Gid line".into())),
        }
    }
}

/// Split `  Key:\tvalues` into `("Key", "\tvalues")`.
///
/// A key that ends in whitespace rather than `:` is not a key.
fn split_key(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let end = line.find(|c: char| c == ':' || c.is_ascii_whitespace())?;
    if line[end..].starts_with(':') {
        Some((&line[..end], &line[end + 1..]))
    } else {
        None
    }
}

fn second_of_four(values: &str) -> Option<u32> {
    let toks: Vec<&str> = values.split_ascii_whitespace().collect();
    match toks.as_slice() {
        [_, effective, _, _] => parse_id(effective),
        _ => None,
    }
}

/// Parse an id the way `strtoul(s, &end, 0)` does: `0x` hex, leading `0`
/// octal, decimal otherwise. The whole token must be consumed and fit in u32.
fn parse_id(tok: &str) -> Option<u32> {
    let hex = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X"));
    let (digits, radix) = if let Some(hex) = hex {
        (hex, 16)
    } else if tok.len() > 1 && tok.starts_with('0') {
        (&tok[1..], 8)
    } else {
        (tok, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

fn parse_caps(tok: &str) -> Option<u64> {
    let digits = tok
        .strip_prefix("0x")
        .or_else(|| tok.strip_prefix("0X"))
        .unwrap_or(tok);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}
