// src/toolchain/release.rs
use super::{Installer, Version, TOOLCHAIN_BINARY};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_RELEASES_URL: &str = "https://releases.hashicorp.com";

// --- 1. THE RELEASE INDEX SHAPE ---
// {base}/terraform/index.json -> { "versions": { "1.5.0": {...}, ... } }
#[derive(Deserialize)]
struct ReleaseIndex {
    versions: HashMap<String, serde_json::Value>,
}

// --- 2. THE CLIENT ---

pub struct ReleaseInstaller {
    client: reqwest::Client,
    base_url: String,
    install_dir: PathBuf,
    os: String,
    arch: String,
}

impl ReleaseInstaller {
    /// Installer for the platform we are running on.
    pub fn new(base_url: &str, install_dir: impl Into<PathBuf>) -> Result<Self> {
        let (os, arch) = release_platform(std::env::consts::OS, std::env::consts::ARCH)?;
        Ok(Self::for_platform(base_url, install_dir, os, arch))
    }

    pub fn for_platform(
        base_url: &str,
        install_dir: impl Into<PathBuf>,
        os: &str,
        arch: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            install_dir: install_dir.into(),
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "fetching");
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Err(GateError::Install(format!("GET {} returned {}", url, res.status())));
        }
        Ok(res.bytes().await?.to_vec())
    }

    async fn latest_version(&self) -> Result<Version> {
        let url = format!("{}/{}/index.json", self.base_url, TOOLCHAIN_BINARY);
        let body = self.get_bytes(&url).await?;
        let index: ReleaseIndex = serde_json::from_slice(&body)
            .map_err(|e| GateError::Install(format!("bad release index: {}", e)))?;

        // Entries we can't parse (odd historical tags) are skipped.
        index
            .versions
            .keys()
            .filter_map(|raw| raw.parse::<Version>().ok())
            .filter(|v| !v.is_prerelease())
            .max()
            .ok_or_else(|| GateError::Install("release index lists no stable versions".into()))
    }
}

#[async_trait]
impl Installer for ReleaseInstaller {
    async fn install_latest(&self) -> Result<(PathBuf, Version)> {
        let version = self.latest_version().await?;
        let binary = self.install_exact(&version).await?;
        Ok((binary, version))
    }

    async fn install_exact(&self, version: &Version) -> Result<PathBuf> {
        let archive_name = format!(
            "{}_{}_{}_{}.zip",
            TOOLCHAIN_BINARY, version, self.os, self.arch
        );
        let release_url = format!("{}/{}/{}", self.base_url, TOOLCHAIN_BINARY, version);

        // A. Download archive + checksums
        let archive = self
            .get_bytes(&format!("{}/{}", release_url, archive_name))
            .await?;
        let sums = self
            .get_bytes(&format!(
                "{}/{}_{}_SHA256SUMS",
                release_url, TOOLCHAIN_BINARY, version
            ))
            .await?;

        // B. Verify
        let sums = String::from_utf8_lossy(&sums);
        verify_checksum(&archive, &archive_name, &sums)?;

        // C. Unpack into {install_dir}/{version}/
        let target_dir = self.install_dir.join(version.to_string());
        let binary = extract_binary(&archive, &target_dir)?;
        debug!(binary = %binary.display(), "toolchain unpacked");
        Ok(binary)
    }
}

// --- 3. HELPERS ---

/// Map Rust's platform names onto the release naming scheme.
pub fn release_platform(os: &str, arch: &str) -> Result<(&'static str, &'static str)> {
    let unsupported = || GateError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };
    let os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        "freebsd" => "freebsd",
        "openbsd" => "openbsd",
        _ => return Err(unsupported()),
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        _ => return Err(unsupported()),
    };
    Ok((os, arch))
}

fn verify_checksum(archive: &[u8], file: &str, sums: &str) -> Result<()> {
    // Lines look like "<hex>  terraform_1.5.0_linux_amd64.zip"
    let expected = sums
        .lines()
        .filter_map(|line| line.split_once(char::is_whitespace))
        .find(|(_, name)| name.trim() == file)
        .map(|(hash, _)| hash.to_lowercase())
        .ok_or_else(|| GateError::Install(format!("no checksum listed for {}", file)))?;

    let actual = hex::encode(Sha256::digest(archive));
    if actual != expected {
        return Err(GateError::ChecksumMismatch {
            file: file.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn extract_binary(archive: &[u8], target_dir: &Path) -> Result<PathBuf> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| GateError::Io { path, source }
    };

    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let entry_name = if cfg!(windows) {
        format!("{}.exe", TOOLCHAIN_BINARY)
    } else {
        TOOLCHAIN_BINARY.to_string()
    };
    let mut entry = zip.by_name(&entry_name)?;

    std::fs::create_dir_all(target_dir).map_err(io_err(target_dir))?;
    let binary = target_dir.join(&entry_name);
    let mut out = std::fs::File::create(&binary).map_err(io_err(&binary))?;
    std::io::copy(&mut entry, &mut out).map_err(io_err(&binary))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))
            .map_err(io_err(&binary))?;
    }

    Ok(binary)
}
