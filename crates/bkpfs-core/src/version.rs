//! Version selectors and their wire forms.
//!
//! The control protocol carries a tagged [`VersionArg`]. Older clients send a
//! bare integer where `-2` means oldest, `-1` newest and `0` all; that form
//! is decoded per operation by [`VersionArg::from_legacy`], since `0` is a
//! valid ordinal for view and restore.

use crate::error::{BkpError, BkpResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Legacy integer for "oldest".
pub const LEGACY_OLDEST: i64 = -2;
/// Legacy integer for "newest".
pub const LEGACY_NEWEST: i64 = -1;
/// Legacy integer for "all" (delete only).
pub const LEGACY_ALL: i64 = 0;

/// Control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Delete,
    View,
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Delete => "delete",
            Operation::View => "view",
            Operation::Restore => "restore",
        };
        f.write_str(name)
    }
}

/// Selects one retained version for view or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSpec {
    Literal(u64),
    Oldest,
    Newest,
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Literal(n) => write!(f, "{n}"),
            VersionSpec::Oldest => f.write_str("oldest"),
            VersionSpec::Newest => f.write_str("newest"),
        }
    }
}

/// Selects what a delete removes. Literal ordinals are not deletable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSpec {
    Oldest,
    Newest,
    All,
}

impl fmt::Display for DeleteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteSpec::Oldest => f.write_str("oldest"),
            DeleteSpec::Newest => f.write_str("newest"),
            DeleteSpec::All => f.write_str("all"),
        }
    }
}

/// Tagged version argument, e.g. `{"kind":"literal","value":3}` or
/// `{"kind":"newest"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum VersionArg {
    Literal(u64),
    Oldest,
    Newest,
    All,
}

impl VersionArg {
    /// Decode a legacy integer argument for `op`.
    pub fn from_legacy(op: Operation, raw: i64) -> BkpResult<Self> {
        match (op, raw) {
            (_, LEGACY_OLDEST) => Ok(Self::Oldest),
            (_, LEGACY_NEWEST) => Ok(Self::Newest),
            (Operation::Delete, LEGACY_ALL) => Ok(Self::All),
            (Operation::View | Operation::Restore, n) if n >= 0 => Ok(Self::Literal(n as u64)),
            (op, n) => Err(BkpError::invalid_argument(format!(
                "{n} is not a valid {op} argument"
            ))),
        }
    }

    /// Encode as the legacy integer for `op`.
    pub fn to_legacy(self, op: Operation) -> BkpResult<i64> {
        match (op, self) {
            (_, Self::Oldest) => Ok(LEGACY_OLDEST),
            (_, Self::Newest) => Ok(LEGACY_NEWEST),
            (Operation::Delete, Self::All) => Ok(LEGACY_ALL),
            (Operation::View | Operation::Restore, Self::Literal(n)) => i64::try_from(n)
                .map_err(|_| BkpError::invalid_argument(format!("ordinal {n} too large"))),
            (op, arg) => Err(BkpError::invalid_argument(format!(
                "{arg} is not a valid {op} argument"
            ))),
        }
    }

    /// Narrow to a view/restore selector. `All` is rejected.
    pub fn into_version_spec(self) -> BkpResult<VersionSpec> {
        match self {
            Self::Literal(n) => Ok(VersionSpec::Literal(n)),
            Self::Oldest => Ok(VersionSpec::Oldest),
            Self::Newest => Ok(VersionSpec::Newest),
            Self::All => Err(BkpError::invalid_argument(
                "'all' selects no single version",
            )),
        }
    }

    /// Narrow to a delete selector. Literal ordinals are rejected.
    pub fn into_delete_spec(self) -> BkpResult<DeleteSpec> {
        match self {
            Self::Oldest => Ok(DeleteSpec::Oldest),
            Self::Newest => Ok(DeleteSpec::Newest),
            Self::All => Ok(DeleteSpec::All),
            Self::Literal(n) => Err(BkpError::invalid_argument(format!(
                "cannot delete version {n}; use newest, oldest or all"
            ))),
        }
    }
}

impl fmt::Display for VersionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionArg::Literal(n) => write!(f, "{n}"),
            VersionArg::Oldest => f.write_str("oldest"),
            VersionArg::Newest => f.write_str("newest"),
            VersionArg::All => f.write_str("all"),
        }
    }
}

impl From<VersionSpec> for VersionArg {
    fn from(spec: VersionSpec) -> Self {
        match spec {
            VersionSpec::Literal(n) => Self::Literal(n),
            VersionSpec::Oldest => Self::Oldest,
            VersionSpec::Newest => Self::Newest,
        }
    }
}

impl From<DeleteSpec> for VersionArg {
    fn from(spec: DeleteSpec) -> Self {
        match spec {
            DeleteSpec::Oldest => Self::Oldest,
            DeleteSpec::Newest => Self::Newest,
            DeleteSpec::All => Self::All,
        }
    }
}

/// Parses the command-line form: `newest`, `oldest`, `all` or a decimal
/// ordinal.
impl FromStr for VersionArg {
    type Err = BkpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "all" => Ok(Self::All),
            digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
                .parse()
                .map(Self::Literal)
                .map_err(|_| BkpError::invalid_argument(format!("ordinal '{s}' too large"))),
            _ => Err(BkpError::invalid_argument(format!(
                "'{s}' is not newest, oldest, all or a version number"
            ))),
        }
    }
}
