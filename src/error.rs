// src/error.rs
//! Error taxonomy for the plan gate.
//!
//! Every failure here is fatal to a run. A version mismatch is deliberately
//! absent: it is a recognised outcome, see [`crate::runtime::RenderOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
    // =========================================================================
    // INPUT ERRORS
    // =========================================================================
    /// The caller's path could not be turned into an absolute path.
    #[error("cannot resolve plan path '{path}': {source}")]
    PathResolution {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The path resolved but nothing exists there.
    #[error("No such file {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON was readable but is not a plan export.
    #[error("malformed plan: {0}")]
    MalformedPlan(#[from] serde_json::Error),

    #[error(
        "{} is not a JSON plan; rendering binary plans is disabled (pass --allow-binary-plan)",
        .0.display()
    )]
    BinaryPlanDisabled(PathBuf),

    // =========================================================================
    // TOOLCHAIN ERRORS
    // =========================================================================
    #[error("no '{0}' binary found on the search path")]
    ToolchainNotFound(String),

    #[error("invalid toolchain version '{0}'")]
    InvalidVersion(String),

    #[error("toolchain install failed: {0}")]
    Install(String),

    #[error("no toolchain release for platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    // =========================================================================
    // RENDERER ERRORS
    // =========================================================================
    #[error("toolchain init in {} failed: {message}", dir.display())]
    Init { dir: PathBuf, message: String },

    #[error("rendering plan failed: {0}")]
    Render(String),

    /// The corrected toolchain still did not match the plan.
    #[error("plan still requires toolchain {required} after installing it")]
    RepeatedVersionMismatch { required: String },

    // =========================================================================
    // CONFIGURATION
    // =========================================================================
    #[error("failed to load policy file {}: {message}", path.display())]
    Policy { path: PathBuf, message: String },
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::Install(err.to_string())
    }
}

impl From<zip::result::ZipError> for GateError {
    fn from(err: zip::result::ZipError) -> Self {
        GateError::Install(format!("bad release archive: {}", err))
    }
}
