//! Shared error type across busaccess crates.

use thiserror::Error;

/// Stable error categories (safe to match on, unlike messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Policy spec could not be compiled.
    Compile,
    /// Process-status record lacked a usable Uid or Gid.
    Extract,
    /// Bus name could not be resolved to a live process.
    PeerResolution,
    /// Configuration rejected.
    BadConfig,
    /// Internal invariant violation.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Compile => "COMPILE",
            ErrorCode::Extract => "EXTRACT",
            ErrorCode::PeerResolution => "PEER_RESOLUTION",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Unified error type used by core and peer runtime.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("policy compile error at {pos}: {msg}")]
    Compile { pos: usize, msg: String },
    #[error("unsupported policy version: {0:?}")]
    UnsupportedVersion(String),
    #[error("credential extract failed: {0}")]
    Extract(String),
    #[error("peer resolution failed: {0}")]
    PeerResolution(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AccessError {
    pub(crate) fn compile(pos: usize, msg: impl Into<String>) -> Self {
        AccessError::Compile {
            pos,
            msg: msg.into(),
        }
    }

    /// Map an error to its stable category.
    pub fn code(&self) -> ErrorCode {
        match self {
            AccessError::Compile { .. } | AccessError::UnsupportedVersion(_) => ErrorCode::Compile,
            AccessError::Extract(_) => ErrorCode::Extract,
            AccessError::PeerResolution(_) => ErrorCode::PeerResolution,
            AccessError::BadConfig(_) => ErrorCode::BadConfig,
            AccessError::Internal(_) => ErrorCode::Internal,
        }
    }
}
