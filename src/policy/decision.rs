// src/policy/decision.rs
use super::{has_action, PermissionPolicy, MONITORED_ACTIONS};
use crate::protocol::{ActionKind, Plan};
use std::fmt;

/// The gate's verdict. `violations` follows the check order: delete, update, create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    violations: Vec<ActionKind>,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[ActionKind] {
        &self.violations
    }

    pub fn violation_names(&self) -> Vec<&'static str> {
        self.violations.iter().map(ActionKind::as_str).collect()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_allowed() {
            return f.write_str("Allow Changes");
        }
        write!(f, "Deny Changes: [{}]", self.violation_names().join(" "))
    }
}

/// Check every closed gate against the plan.
pub fn decide(plan: &Plan, policy: &PermissionPolicy) -> Decision {
    let violations = MONITORED_ACTIONS
        .into_iter()
        .filter(|kind| !policy.permits(*kind))
        .filter(|kind| has_action(plan, *kind))
        .collect();
    Decision { violations }
}
