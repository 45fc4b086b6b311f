//! Per-item results of a protocol run.

use std::fmt;

use crate::member::Member;

/// Anything the dispatcher can fan out: keyed by a stable sequence number and
/// owned by one member.
pub trait DispatchItem: Clone + Send + Sync + 'static {
    fn sequence_no(&self) -> u32;
    fn member(&self) -> &Member;
}

/// Terminal result of one item in one pass.
///
/// `LoginFailed` is a normal outcome (the site rejected the credentials), kept
/// apart from `Error`, which carries the detail of whatever went wrong mid-flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    LoginFailed,
    Error(String),
}

impl<T> Outcome<T> {
    /// Whether this item belongs in the retry pass.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    /// Short status label used in logs and CSV exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::LoginFailed => "login-failed",
            Self::Error(_) => "error",
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(v) => write!(f, "success ({v:?})"),
            Self::LoginFailed => f.write_str("login failed"),
            Self::Error(detail) => write!(f, "error: {detail}"),
        }
    }
}
