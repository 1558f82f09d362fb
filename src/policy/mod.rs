// src/policy/mod.rs
use crate::error::{GateError, Result};
use crate::protocol::{ActionKind, Plan};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub mod decision;

pub use decision::{decide, Decision};

/// Kinds the gate watches, in the order they are checked and reported.
pub const MONITORED_ACTIONS: [ActionKind; 3] =
    [ActionKind::Delete, ActionKind::Update, ActionKind::Create];

/// Which monitored action kinds may appear in an approved plan.
/// Everything defaults to denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionPolicy {
    pub allow_delete: bool,
    pub allow_update: bool,
    pub allow_create: bool,
}

impl PermissionPolicy {
    pub fn new(allow_delete: bool, allow_update: bool, allow_create: bool) -> Self {
        Self { allow_delete, allow_update, allow_create }
    }

    // 1. Load from Disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GateError::Policy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| GateError::Policy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// A gate is open if either side opens it.
    pub fn merge(self, other: PermissionPolicy) -> Self {
        Self {
            allow_delete: self.allow_delete || other.allow_delete,
            allow_update: self.allow_update || other.allow_update,
            allow_create: self.allow_create || other.allow_create,
        }
    }

    // 2. The Check Logic
    /// Read and no-op are never gated.
    pub fn permits(&self, kind: ActionKind) -> bool {
        match kind {
            ActionKind::Delete => self.allow_delete,
            ActionKind::Update => self.allow_update,
            ActionKind::Create => self.allow_create,
            ActionKind::NoOp | ActionKind::Read => true,
        }
    }
}

/// True if any resource in `plan` is scheduled for `kind`.
pub fn has_action(plan: &Plan, kind: ActionKind) -> bool {
    plan.resource_changes
        .iter()
        .any(|rc| rc.change.actions.iter().any(|a| *a == kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Change, ResourceChange};

    pub(crate) fn plan_of(actions: &[&[ActionKind]]) -> Plan {
        Plan {
            resource_changes: actions
                .iter()
                .enumerate()
                .map(|(i, acts)| ResourceChange {
                    address: format!("null_resource.r{}", i),
                    mode: Some("managed".into()),
                    resource_type: "null_resource".into(),
                    name: format!("r{}", i),
                    change: Change { actions: acts.to_vec() },
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_plan_has_nothing() {
        let plan = plan_of(&[]);
        for kind in MONITORED_ACTIONS {
            assert!(!has_action(&plan, kind));
        }
    }

    #[test]
    fn finds_action_anywhere_in_plan() {
        use ActionKind::*;
        let plan = plan_of(&[&[NoOp], &[], &[Read], &[Delete, Create]]);
        assert!(has_action(&plan, Delete));
        assert!(has_action(&plan, Create));
        assert!(!has_action(&plan, Update));
    }

    #[test]
    fn single_resource() {
        let plan = plan_of(&[&[ActionKind::Update]]);
        assert!(has_action(&plan, ActionKind::Update));
        assert!(!has_action(&plan, ActionKind::Delete));
    }

    #[test]
    fn default_policy_denies_everything_monitored() {
        let policy = PermissionPolicy::default();
        for kind in MONITORED_ACTIONS {
            assert!(!policy.permits(kind));
        }
        assert!(policy.permits(ActionKind::Read));
        assert!(policy.permits(ActionKind::NoOp));
    }

    #[test]
    fn loads_partial_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"allow_update": true}"#).unwrap();

        let policy = PermissionPolicy::load(&path).unwrap();
        assert_eq!(policy, PermissionPolicy::new(false, true, false));
    }

    #[test]
    fn bad_policy_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"allow_everything": true}"#).unwrap();

        assert!(matches!(PermissionPolicy::load(&path), Err(GateError::Policy { .. })));
        assert!(matches!(
            PermissionPolicy::load(&dir.path().join("missing.json")),
            Err(GateError::Policy { .. })
        ));
    }

    #[test]
    fn merge_opens_gate_if_either_does() {
        let file = PermissionPolicy::new(true, false, false);
        let flags = PermissionPolicy::new(false, false, true);
        assert_eq!(file.merge(flags), PermissionPolicy::new(true, false, true));
    }
}
