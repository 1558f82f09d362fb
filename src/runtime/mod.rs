// src/runtime/mod.rs
use crate::error::{GateError, Result};
use crate::protocol::Plan;
use crate::toolchain::{ToolchainReference, Version};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

/// What one rendering attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(Plan),
    /// The toolchain can't read this plan. Carries the version it needs.
    VersionMismatch(Version),
}

// The renderer seam: the materializer only talks to this trait.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Prepare `working_dir` so plans in it can be rendered.
    /// `Some(version)` means the configuration pins a toolchain we don't have.
    async fn init(&self, toolchain: &ToolchainReference, working_dir: &Path) -> Result<Option<Version>>;

    /// Convert the binary plan at `plan` into its JSON export.
    async fn show(&self, toolchain: &ToolchainReference, plan: &Path) -> Result<RenderOutcome>;

    /// Ask the binary what version it is.
    async fn version(&self, toolchain: &ToolchainReference) -> Result<Version>;
}

// --- 1. THE PROCESS RENDERER ---

/// Runs the real toolchain binary as a child process.
#[derive(Debug, Default, Clone)]
pub struct TerraformRenderer;

#[derive(Deserialize)]
struct VersionOutput {
    terraform_version: String,
}

impl TerraformRenderer {
    pub fn new() -> Self {
        Self
    }

    // Spawn, wait, collect everything. No timeout here: the caller owns that.
    async fn run(&self, toolchain: &ToolchainReference, dir: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(toolchain.binary());
        cmd.args(args);
        cmd.env("TF_IN_AUTOMATION", "1");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        // Pipe everything: the child must not write into our stdout.
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!(binary = %toolchain.binary().display(), ?args, "running toolchain");
        cmd.output().await.map_err(|e| {
            GateError::Render(format!(
                "failed to launch {}: {}",
                toolchain.binary().display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Renderer for TerraformRenderer {
    async fn init(&self, toolchain: &ToolchainReference, working_dir: &Path) -> Result<Option<Version>> {
        let out = self
            .run(
                toolchain,
                Some(working_dir),
                &["init", "-input=false", "-no-color", "-backend=false"],
            )
            .await?;

        if out.status.success() {
            return Ok(None);
        }

        let stderr = String::from_utf8_lossy(&out.stderr);
        if let Some(required) = detect_version_mismatch(&stderr) {
            return Ok(Some(required));
        }
        Err(GateError::Init {
            dir: working_dir.to_path_buf(),
            message: stderr.trim().to_string(),
        })
    }

    async fn show(&self, toolchain: &ToolchainReference, plan: &Path) -> Result<RenderOutcome> {
        let plan_arg = plan.to_string_lossy();
        let dir = plan.parent();
        let out = self
            .run(toolchain, dir, &["show", "-json", "-no-color", plan_arg.as_ref()])
            .await?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if let Some(required) = detect_version_mismatch(&stderr) {
                return Ok(RenderOutcome::VersionMismatch(required));
            }
            return Err(GateError::Render(format!(
                "show exited with {}: {}",
                out.status,
                stderr.trim()
            )));
        }

        let plan = Plan::from_slice(&out.stdout)
            .map_err(|e| GateError::Render(format!("renderer printed an unreadable plan: {}", e)))?;
        Ok(RenderOutcome::Rendered(plan))
    }

    async fn version(&self, toolchain: &ToolchainReference) -> Result<Version> {
        let out = self.run(toolchain, None, &["version", "-json"]).await?;
        if !out.status.success() {
            return Err(GateError::Render(format!(
                "version query exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let parsed: VersionOutput = serde_json::from_slice(&out.stdout)
            .map_err(|e| GateError::Render(format!("unreadable version output: {}", e)))?;
        parsed.terraform_version.parse()
    }
}

// --- 2. MISMATCH DETECTION ---

fn plan_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"plan file was created by Terraform (v?\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?), but this is")
            .expect("static regex")
    })
}

fn required_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"required_version\s*=\s*"\s*(?:>=|~>|=)?\s*v?(\d+)\.(\d+)(?:\.(\d+))?(?:-([0-9A-Za-z.]+))?"#)
            .expect("static regex")
    })
}

/// Pull the version a plan or configuration demands out of toolchain stderr.
pub fn detect_version_mismatch(stderr: &str) -> Option<Version> {
    if let Some(caps) = plan_version_re().captures(stderr) {
        return caps[1].parse().ok();
    }
    if stderr.contains("Unsupported Terraform Core version") {
        if let Some(caps) = required_version_re().captures(stderr) {
            // ">= 1.5" pins 1.5.0
            let patch = caps.get(3).map_or("0", |m| m.as_str());
            let raw = match caps.get(4) {
                Some(pre) => format!("{}.{}.{}-{}", &caps[1], &caps[2], patch, pre.as_str()),
                None => format!("{}.{}.{}", &caps[1], &caps[2], patch),
            };
            return raw.parse().ok();
        }
    }
    None
}
