// src/protocol/mod.rs
use serde::{Deserialize, Serialize};
use std::fmt;

// --- 1. THE PLAN EXPORT ---
// This is the shape `terraform show -json` prints. We only keep what the
// gate needs; everything else in the document is ignored by serde.

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawPlan")]
pub struct Plan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
    pub resource_changes: Vec<ResourceChange>,
}

// What actually comes off the wire, before we decide it is a plan.
#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    format_version: Option<String>,
    #[serde(default)]
    terraform_version: Option<String>,
    #[serde(default)]
    resource_changes: Option<Vec<ResourceChange>>,
}

impl TryFrom<RawPlan> for Plan {
    type Error = String;

    // A state file or `{}` must not pass as an empty plan.
    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        if raw.format_version.is_none() && raw.resource_changes.is_none() {
            return Err("not a plan export: neither format_version nor resource_changes present".into());
        }
        Ok(Self {
            format_version: raw.format_version,
            terraform_version: raw.terraform_version,
            // Absent when terraform had nothing to say about resources.
            resource_changes: raw.resource_changes.unwrap_or_default(),
        })
    }
}

impl Plan {
    /// Decode a plan export from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Addresses of every resource scheduled for `kind`, in plan order.
    pub fn addresses_with(&self, kind: ActionKind) -> Vec<&str> {
        self.resource_changes
            .iter()
            .filter(|rc| rc.change.actions.contains(&kind))
            .map(|rc| rc.address.as_str())
            .filter(|address| !address.is_empty())
            .collect()
    }
}

// --- 2. ONE RESOURCE ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    // Only `change.actions` is needed to decide; the rest is for log lines.
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub name: String,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    // A replace shows up as ["delete", "create"] (or the reverse).
    pub actions: Vec<ActionKind>,
}

// --- 3. ACTION KINDS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    NoOp,
    Create,
    Read,
    Update,
    Delete,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::NoOp => "no-op",
            ActionKind::Create => "create",
            ActionKind::Read => "read",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
