//! Error taxonomy for binpin.
//!
//! Library functions return [`anyhow::Result`] and wrap failures with context at
//! every layer. The variants below are the failures callers may want to tell
//! apart; they stay reachable through [`anyhow::Error::downcast_ref`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinpinError {
    #[error("malformed target {target:?}: {reason}")]
    MalformedTarget { target: String, reason: String },

    #[error("{path}: expected {expected:?} comment on the module line, found {found}")]
    MissingMarker {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    #[error("{path}:{line}: {reason}")]
    UnparsableManifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("no indirect module found in {0}")]
    NoIndirectModule(PathBuf),

    #[error("no module was cached matching given package {0}")]
    NoCachedModule(String),

    #[error("package {package} is not a main package (reported kind {kind:?}), nothing to build")]
    NotInstallable { package: String, kind: String },

    #[error("name {name:?} is already used by {existing:?}")]
    NameCollision { name: String, existing: Vec<PathBuf> },

    #[error("tool name {0:?} is reserved; choose a different one with -n")]
    ReservedName(String),

    #[error("`{command}` failed: {output}")]
    Toolchain { command: String, output: String },

    #[error("`{0}` did not finish before the deadline")]
    DeadlineExceeded(String),

    #[error("environment: {0}")]
    Environment(String),
}

impl BinpinError {
    pub(crate) fn malformed_target(target: &str, reason: impl Into<String>) -> Self {
        BinpinError::MalformedTarget {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}
