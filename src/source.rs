// src/source.rs
//! Turning the user's `--tfplan` argument into a checked, absolute path.

use crate::error::{GateError, Result};
use std::path::{Path, PathBuf};

/// An absolute path to a plan file that existed when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSource {
    path: PathBuf,
}

impl PlanSource {
    /// Resolve `raw` against the current directory and check the file exists.
    pub fn resolve(raw: impl AsRef<Path>) -> Result<Self> {
        let raw = raw.as_ref();
        let path = std::path::absolute(raw).map_err(|source| GateError::PathResolution {
            path: raw.display().to_string(),
            source,
        })?;

        match path.try_exists() {
            Ok(true) if path.is_file() => Ok(Self { path }),
            Ok(_) => Err(GateError::FileNotFound(path)),
            Err(source) => Err(GateError::PathResolution {
                path: raw.display().to_string(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the renderer runs in.
    pub fn working_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }
}
