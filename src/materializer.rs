// src/materializer.rs
//! Getting a [`Plan`] out of whatever file the user handed us.
//!
//! JSON exports are decoded directly. Anything else is a binary plan and has
//! to go through the toolchain, which is only allowed when the materializer
//! was built with [`PlanMaterializer::with_binary_plans`].

use crate::error::{GateError, Result};
use crate::protocol::Plan;
use crate::runtime::{RenderOutcome, Renderer};
use crate::source::PlanSource;
use crate::toolchain::{ToolchainProvider, ToolchainReference, Version};
use tracing::{debug, info, warn};

/// Result of one materialization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Plan(Plan),
    /// The toolchain didn't match the plan. A matching one has already been
    /// installed into the caller's toolchain slot; calling again will use it.
    VersionMismatch { required: Version },
}

struct BinaryRendering {
    provider: ToolchainProvider,
    renderer: Box<dyn Renderer>,
}

pub struct PlanMaterializer {
    binary: Option<BinaryRendering>,
}

impl PlanMaterializer {
    /// Only JSON plan exports are accepted.
    pub fn structured_only() -> Self {
        Self { binary: None }
    }

    /// Binary plans are rendered through `renderer`, using a toolchain from `provider`.
    pub fn with_binary_plans(provider: ToolchainProvider, renderer: Box<dyn Renderer>) -> Self {
        Self {
            binary: Some(BinaryRendering { provider, renderer }),
        }
    }

    pub fn renders_binary_plans(&self) -> bool {
        self.binary.is_some()
    }

    /// Produce the structured plan for `source`.
    ///
    /// `toolchain` is the run's toolchain slot. It is filled on first use and
    /// replaced when a mismatch triggers a corrective install.
    pub async fn materialize(
        &self,
        source: &PlanSource,
        toolchain: &mut Option<ToolchainReference>,
    ) -> Result<Materialized> {
        let bytes = tokio::fs::read(source.path())
            .await
            .map_err(|e| GateError::Io {
                path: source.path().to_path_buf(),
                source: e,
            })?;

        // Fast path: it's already JSON.
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            debug!(path = %source.path().display(), "plan is a JSON export");
            let plan: Plan = serde_json::from_value(value)?;
            return Ok(Materialized::Plan(plan));
        }

        match &self.binary {
            Some(binary) => binary.render(source, toolchain).await,
            None => Err(GateError::BinaryPlanDisabled(source.path().to_path_buf())),
        }
    }
}

impl BinaryRendering {
    async fn render(
        &self,
        source: &PlanSource,
        toolchain: &mut Option<ToolchainReference>,
    ) -> Result<Materialized> {
        // 1. Toolchain: reuse the slot, or locate / install latest.
        let tc = match toolchain.clone() {
            Some(tc) => tc,
            None => {
                let tc = self.provider.acquire().await?;
                *toolchain = Some(tc.clone());
                tc
            }
        };
        match self.renderer.version(&tc).await {
            Ok(version) => info!(%version, binary = %tc.binary().display(), "rendering binary plan"),
            Err(e) => debug!(error = %e, "could not query toolchain version"),
        }

        // 2. Init the working directory
        if let Some(required) = self.renderer.init(&tc, source.working_dir()).await? {
            return self.correct(required, toolchain).await;
        }

        // 3. Render
        match self.renderer.show(&tc, source.path()).await? {
            RenderOutcome::Rendered(plan) => Ok(Materialized::Plan(plan)),
            RenderOutcome::VersionMismatch(required) => self.correct(required, toolchain).await,
        }
    }

    // One corrective install, then hand control back. Install errors are fatal.
    async fn correct(
        &self,
        required: Version,
        toolchain: &mut Option<ToolchainReference>,
    ) -> Result<Materialized> {
        warn!(%required, "toolchain version does not match plan, installing required version");
        let installed = self.provider.install_exact(&required.to_string()).await?;
        *toolchain = Some(installed);
        Ok(Materialized::VersionMismatch { required })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionKind;
    use crate::toolchain::tests::RecordingInstaller;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    const PLAN_JSON: &str = r#"{"resource_changes":[{"address":"null_resource.a","type":"null_resource","name":"a","change":{"actions":["create"]}}]}"#;

    /// Renders anything, but only with toolchain >= `needs`.
    struct VersionedRenderer {
        needs: Version,
        init_fails: bool,
        shows: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Renderer for VersionedRenderer {
        async fn init(&self, _tc: &ToolchainReference, dir: &Path) -> Result<Option<Version>> {
            if self.init_fails {
                return Err(GateError::Init { dir: dir.to_path_buf(), message: "registry unreachable".into() });
            }
            Ok(None)
        }

        async fn show(&self, tc: &ToolchainReference, _plan: &Path) -> Result<RenderOutcome> {
            *self.shows.lock().unwrap() += 1;
            match tc.version() {
                Some(v) if *v >= self.needs => Ok(RenderOutcome::Rendered(Plan::from_slice(PLAN_JSON.as_bytes()).unwrap())),
                _ => Ok(RenderOutcome::VersionMismatch(self.needs.clone())),
            }
        }

        async fn version(&self, tc: &ToolchainReference) -> Result<Version> {
            tc.version().cloned().ok_or_else(|| GateError::Render("unknown".into()))
        }
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PlanSource {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        PlanSource::resolve(path).unwrap()
    }

    fn binary_materializer(installer: RecordingInstaller, init_fails: bool) -> (PlanMaterializer, Arc<Mutex<u32>>) {
        let shows = Arc::new(Mutex::new(0));
        let renderer = VersionedRenderer { needs: Version::new(1, 5, 0), init_fails, shows: shows.clone() };
        let provider = ToolchainProvider::new(Box::new(installer)).with_search_path("/nonexistent/plangate/bin");
        (PlanMaterializer::with_binary_plans(provider, Box::new(renderer)), shows)
    }

    #[tokio::test]
    async fn json_plan_takes_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.json", PLAN_JSON.as_bytes());
        let mut tc = None;

        let out = PlanMaterializer::structured_only().materialize(&source, &mut tc).await.unwrap();
        let Materialized::Plan(plan) = out else { panic!("expected plan") };
        assert_eq!(plan.resource_changes[0].change.actions, vec![ActionKind::Create]);
        assert!(tc.is_none());
    }

    #[tokio::test]
    async fn materializing_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.json", PLAN_JSON.as_bytes());
        let m = PlanMaterializer::structured_only();

        let a = m.materialize(&source, &mut None).await.unwrap();
        let b = m.materialize(&source, &mut None).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn wrong_json_shape_is_malformed_not_binary() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "state.json", br#"{"resource_changes":"nope"}"#);
        let (m, shows) = binary_materializer(RecordingInstaller::default(), false);

        let err = m.materialize(&source, &mut None).await.unwrap_err();
        assert!(matches!(err, GateError::MalformedPlan(_)));
        assert_eq!(*shows.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn json_that_is_not_a_plan_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let (m, shows) = binary_materializer(RecordingInstaller::default(), false);

        for (name, body) in [
            ("empty.json", &br#"{}"#[..]),
            ("terraform.tfstate", &br#"{"version":4,"terraform_version":"1.5.0","resources":[]}"#[..]),
        ] {
            let source = write(dir.path(), name, body);
            let err = m.materialize(&source, &mut None).await.unwrap_err();
            assert!(matches!(err, GateError::MalformedPlan(_)), "{}: {:?}", name, err);
        }
        assert_eq!(*shows.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn binary_plan_rejected_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.tfplan", b"PK\x03\x04binary");

        let err = PlanMaterializer::structured_only().materialize(&source, &mut None).await.unwrap_err();
        assert!(matches!(err, GateError::BinaryPlanDisabled(_)));
    }

    #[tokio::test]
    async fn mismatch_installs_once_and_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.tfplan", b"PK\x03\x04binary");
        let installer = RecordingInstaller::default();
        let (m, _) = binary_materializer(installer.clone(), false);

        // Nothing on the search path: latest (1.9.0) gets installed and renders.
        let mut tc = None;
        let out = m.materialize(&source, &mut tc).await.unwrap();
        assert!(matches!(out, Materialized::Plan(_)));
        assert_eq!(*installer.calls.lock().unwrap(), vec!["latest".to_string()]);

        // An old toolchain in the slot triggers exactly one corrective install.
        let mut tc = Some(ToolchainReference::installed("/opt/tf/1.3.0/terraform", Version::new(1, 3, 0)));
        let out = m.materialize(&source, &mut tc).await.unwrap();
        assert_eq!(out, Materialized::VersionMismatch { required: Version::new(1, 5, 0) });
        assert_eq!(tc.as_ref().and_then(|t| t.version()), Some(&Version::new(1, 5, 0)));
        assert_eq!(installer.calls.lock().unwrap().last().map(String::as_str), Some("1.5.0"));

        let out = m.materialize(&source, &mut tc).await.unwrap();
        assert!(matches!(out, Materialized::Plan(_)));
    }

    #[tokio::test]
    async fn corrective_install_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.tfplan", b"PK\x03\x04binary");
        let installer = RecordingInstaller { fail: true, ..Default::default() };
        let (m, _) = binary_materializer(installer, false);

        let mut tc = Some(ToolchainReference::installed("/opt/tf/1.3.0/terraform", Version::new(1, 3, 0)));
        let err = m.materialize(&source, &mut tc).await.unwrap_err();
        assert!(matches!(err, GateError::Install(_)));
    }

    #[tokio::test]
    async fn init_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(dir.path(), "plan.tfplan", b"PK\x03\x04binary");
        let (m, shows) = binary_materializer(RecordingInstaller::default(), true);

        let err = m.materialize(&source, &mut None).await.unwrap_err();
        assert!(matches!(err, GateError::Init { .. }));
        assert_eq!(*shows.lock().unwrap(), 0);
    }
}
