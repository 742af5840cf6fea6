//! Control requests and responses.

use crate::dispatcher::{DeleteReport, VersionListing};
use crate::error::{BkpError, BkpResult};
use crate::retrieval::Materialized;
use crate::version::{DeleteSpec, Operation, VersionArg, VersionSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A versioning command against one tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub op: Operation,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<VersionArg>,
}

impl ControlRequest {
    pub fn list(file: impl Into<PathBuf>) -> Self {
        Self {
            op: Operation::List,
            file: file.into(),
            arg: None,
        }
    }

    pub fn delete(file: impl Into<PathBuf>, spec: DeleteSpec) -> Self {
        Self {
            op: Operation::Delete,
            file: file.into(),
            arg: Some(spec.into()),
        }
    }

    pub fn view(file: impl Into<PathBuf>, spec: VersionSpec) -> Self {
        Self {
            op: Operation::View,
            file: file.into(),
            arg: Some(spec.into()),
        }
    }

    pub fn restore(file: impl Into<PathBuf>, spec: VersionSpec) -> Self {
        Self {
            op: Operation::Restore,
            file: file.into(),
            arg: Some(spec.into()),
        }
    }

    /// Build a request from the legacy integer argument.
    pub fn from_legacy(op: Operation, file: impl Into<PathBuf>, raw: i64) -> BkpResult<Self> {
        let arg = match op {
            Operation::List => None,
            _ => Some(VersionArg::from_legacy(op, raw)?),
        };
        Ok(Self {
            op,
            file: file.into(),
            arg,
        })
    }

    /// Build a request from a command-line argument such as `newest` or `3`.
    pub fn parse(op: Operation, file: impl Into<PathBuf>, arg: Option<&str>) -> BkpResult<Self> {
        let arg = arg.map(str::parse::<VersionArg>).transpose()?;
        let request = Self {
            op,
            file: file.into(),
            arg,
        };
        request.check()?;
        Ok(request)
    }

    /// Reject argument shapes the operation cannot take.
    pub fn check(&self) -> BkpResult<()> {
        match (self.op, self.arg) {
            (Operation::List, None) => Ok(()),
            (Operation::List, Some(_)) => {
                Err(BkpError::invalid_argument("list takes no argument"))
            }
            (op, None) => Err(BkpError::invalid_argument(format!(
                "{op} needs a version argument"
            ))),
            (Operation::Delete, Some(arg)) => arg.into_delete_spec().map(|_| ()),
            (Operation::View | Operation::Restore, Some(arg)) => {
                arg.into_version_spec().map(|_| ())
            }
        }
    }

    pub(crate) fn version_spec(&self) -> BkpResult<VersionSpec> {
        self.arg
            .ok_or_else(|| {
                BkpError::invalid_argument(format!("{} needs a version argument", self.op))
            })?
            .into_version_spec()
    }

    pub(crate) fn delete_spec(&self) -> BkpResult<DeleteSpec> {
        self.arg
            .ok_or_else(|| BkpError::invalid_argument("delete needs a version argument"))?
            .into_delete_spec()
    }
}

/// Outcome of a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlResponse {
    List(VersionListing),
    Delete(DeleteReport),
    /// Content went to the caller's sink.
    View { bytes: u64 },
    Restore(Materialized),
}
