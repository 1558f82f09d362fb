// src/gate.rs
use crate::error::{GateError, Result};
use crate::materializer::{Materialized, PlanMaterializer};
use crate::policy::{decide, Decision, PermissionPolicy};
use crate::protocol::Plan;
use crate::source::PlanSource;
use crate::toolchain::ToolchainReference;
use std::path::Path;
use tracing::{info, warn};

/// One plan check: resolve, materialize, decide.
pub struct Gate {
    materializer: PlanMaterializer,
    policy: PermissionPolicy,
}

impl Gate {
    pub fn new(materializer: PlanMaterializer, policy: PermissionPolicy) -> Self {
        Self { materializer, policy }
    }

    pub async fn check(&self, plan_path: impl AsRef<Path>) -> Result<Decision> {
        // 1. Where is it?
        let source = PlanSource::resolve(plan_path)?;
        info!(plan = %source.path().display(), "checking plan");

        // 2. What does it say?
        let plan = self.load(&source).await?;

        // 3. Is it allowed?
        let decision = decide(&plan, &self.policy);
        if !decision.is_allowed() {
            for kind in decision.violations() {
                for address in plan.addresses_with(*kind) {
                    warn!(action = %kind, %address, "action not permitted");
                }
            }
        }
        Ok(decision)
    }

    // A mismatch gets one re-run with the toolchain the materializer installed.
    async fn load(&self, source: &PlanSource) -> Result<Plan> {
        let mut toolchain: Option<ToolchainReference> = None;

        match self.materializer.materialize(source, &mut toolchain).await? {
            Materialized::Plan(plan) => Ok(plan),
            Materialized::VersionMismatch { .. } => {
                match self.materializer.materialize(source, &mut toolchain).await? {
                    Materialized::Plan(plan) => Ok(plan),
                    Materialized::VersionMismatch { required } => {
                        Err(GateError::RepeatedVersionMismatch {
                            required: required.to_string(),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_plan_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"resource_changes":[{"address":"aws_s3_bucket.logs","type":"aws_s3_bucket","name":"logs","change":{"actions":["update"]}}]}"#,
        )
        .unwrap();

        let gate = Gate::new(PlanMaterializer::structured_only(), PermissionPolicy::default());
        let decision = gate.check(&path).await.unwrap();
        assert_eq!(decision.violation_names(), vec!["update"]);

        let gate = Gate::new(PlanMaterializer::structured_only(), PermissionPolicy::new(false, true, false));
        assert!(gate.check(&path).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn missing_file_produces_no_decision() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::new(PlanMaterializer::structured_only(), PermissionPolicy::default());
        let err = gate.check(dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, GateError::FileNotFound(_)));
    }
}
