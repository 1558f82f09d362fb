// src/toolchain/mod.rs
//! Finding or installing the `terraform` binary that renders binary plans.

pub mod release;
pub mod version;

use crate::error::{GateError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use release::ReleaseInstaller;
pub use version::Version;

/// Name we look up on the search path.
pub const TOOLCHAIN_BINARY: &str = "terraform";

// --- 1. WHICH BINARY ARE WE USING ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainOrigin {
    /// Whatever `terraform` the search path gave us. Version unknown up front.
    SearchPath,
    /// A specific release we installed this run.
    Installed(Version),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainReference {
    pub binary: PathBuf,
    pub origin: ToolchainOrigin,
}

impl ToolchainReference {
    pub fn on_search_path(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), origin: ToolchainOrigin::SearchPath }
    }

    pub fn installed(binary: impl Into<PathBuf>, version: Version) -> Self {
        Self { binary: binary.into(), origin: ToolchainOrigin::Installed(version) }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn version(&self) -> Option<&Version> {
        match &self.origin {
            ToolchainOrigin::Installed(v) => Some(v),
            ToolchainOrigin::SearchPath => None,
        }
    }
}

// --- 2. THE INSTALLER SEAM ---
// Downloading and unpacking lives behind this trait so the provider can be
// exercised without the network.

#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the newest stable release. Returns the binary path and its version.
    async fn install_latest(&self) -> Result<(PathBuf, Version)>;

    /// Install exactly `version`. Returns the binary path.
    async fn install_exact(&self, version: &Version) -> Result<PathBuf>;
}

// --- 3. THE PROVIDER ---

pub struct ToolchainProvider {
    installer: Box<dyn Installer>,
    // None means the process PATH.
    search_path: Option<OsString>,
}

impl ToolchainProvider {
    pub fn new(installer: Box<dyn Installer>) -> Self {
        Self { installer, search_path: None }
    }

    /// Look in `paths` instead of `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    /// Find `terraform` on the search path.
    pub fn locate(&self) -> Result<ToolchainReference> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().map_err(|e| GateError::Io {
                    path: PathBuf::from("."),
                    source: e,
                })?;
                which::which_in(TOOLCHAIN_BINARY, Some(paths), cwd)
            }
            None => which::which(TOOLCHAIN_BINARY),
        };

        match found {
            Ok(binary) => {
                debug!(binary = %binary.display(), "toolchain found on search path");
                Ok(ToolchainReference::on_search_path(binary))
            }
            Err(_) => Err(GateError::ToolchainNotFound(TOOLCHAIN_BINARY.to_string())),
        }
    }

    pub async fn install_latest(&self) -> Result<ToolchainReference> {
        let (binary, version) = self.installer.install_latest().await?;
        info!(%version, binary = %binary.display(), "installed latest toolchain");
        Ok(ToolchainReference::installed(binary, version))
    }

    /// Install a specific release. Failures here are not retried.
    pub async fn install_exact(&self, version: &str) -> Result<ToolchainReference> {
        let version: Version = version.parse()?;
        let binary = self.installer.install_exact(&version).await?;
        info!(%version, binary = %binary.display(), "installed toolchain");
        Ok(ToolchainReference::installed(binary, version))
    }

    /// Locate first, install the latest release if nothing is there.
    pub async fn acquire(&self) -> Result<ToolchainReference> {
        match self.locate() {
            Ok(found) => Ok(found),
            Err(GateError::ToolchainNotFound(_)) => {
                info!("no {} on search path, installing latest release", TOOLCHAIN_BINARY);
                self.install_latest().await
            }
            Err(e) => Err(e),
        }
    }
}
