//! Immutable tool catalog entries (spec §3, §4.3).

use serde::{Deserialize, Serialize};

use super::permission::{RateLimits, RiskLevel};

/// Observable out-of-process consequence a tool invocation may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideEffect {
    SendsEmail,
    SendsMessage,
    SendsSms,
    PostsSocial,
    RunsCode,
    ModifiesFiles,
    DeletesData,
    NetworkRequest,
    ControlsDevice,
    AccessesSecrets,
    Financial,
}

impl SideEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendsEmail => "sends-email",
            Self::SendsMessage => "sends-message",
            Self::SendsSms => "sends-sms",
            Self::PostsSocial => "posts-social",
            Self::RunsCode => "runs-code",
            Self::ModifiesFiles => "modifies-files",
            Self::DeletesData => "deletes-data",
            Self::NetworkRequest => "network-request",
            Self::ControlsDevice => "controls-device",
            Self::AccessesSecrets => "accesses-secrets",
            Self::Financial => "financial",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCatalogEntry {
    pub id: String,
    pub skill_id: String,
    pub category: String,
    pub risk: RiskLevel,
    pub side_effects: Vec<SideEffect>,
}

/// `generateToolPolicy` handoff shape pushed down to the agent runtime
/// (spec §4.3, §4.4): the catalog enumerated once under the same rules
/// `PermissionEngine::evaluate` applies per call, so replaying any tool in
/// `allowed_tools`/`approval_required` against the engine reproduces the
/// same decision (spec §8.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePolicy {
    pub allowed_tools: Vec<String>,
    pub blocked_tools: Vec<String>,
    pub approval_required: Vec<String>,
    pub rate_limits: RateLimits,
}
