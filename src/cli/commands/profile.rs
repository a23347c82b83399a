use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::PermissionProfile;
use crate::services::permission_engine::{PermissionEngine, RateCounters};

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show a permission profile.
    Show { profile_id: String },
    /// Create/replace a permission profile from a built-in preset.
    Set {
        org_id: String,
        profile_id: String,
        #[arg(long, default_value = "restricted")]
        preset: String,
    },
}

#[derive(Serialize)]
pub struct ProfileOutput {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub max_risk_level: String,
    pub blocked_side_effects: Vec<String>,
}

impl From<&PermissionProfile> for ProfileOutput {
    fn from(p: &PermissionProfile) -> Self {
        Self {
            id: p.id.clone(),
            org_id: p.org_id.clone(),
            name: p.name.clone(),
            max_risk_level: p.max_risk_level.as_str().to_string(),
            blocked_side_effects: p.blocked_side_effects.clone(),
        }
    }
}

impl CommandOutput for ProfileOutput {
    fn to_human(&self) -> String {
        format!(
            "{} ({})  max_risk={}  blocked={:?}",
            self.name, self.id, self.max_risk_level, self.blocked_side_effects
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: ProfileCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ProfileCommands::Show { profile_id } => {
            let profile = ctx
                .store
                .get_profile(&profile_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("profile not found: {profile_id}"))?;
            output(&ProfileOutput::from(&profile), json);
        }
        ProfileCommands::Set { org_id, profile_id, preset } => {
            let profile = match preset.as_str() {
                "restricted" => PermissionProfile::preset_restricted(profile_id, org_id),
                "standard" => PermissionProfile::preset_standard(profile_id, org_id),
                other => anyhow::bail!("unknown preset: {other} (expected restricted|standard)"),
            };
            ctx.store.upsert_profile(&profile).await?;
            output(&ProfileOutput::from(&profile), json);
        }
    }
    Ok(())
}

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// Evaluate whether a profile permits a tool call right now.
    Check {
        profile_id: String,
        tool_id: String,
        /// Caller IP, checked against the profile's `allowed_ips`.
        #[arg(long)]
        ip: Option<String>,
    },
}

#[derive(Serialize)]
pub struct PermissionCheckOutput {
    pub decision: String,
    pub reason: Option<String>,
    pub sandbox: bool,
}

impl CommandOutput for PermissionCheckOutput {
    fn to_human(&self) -> String {
        let suffix = if self.sandbox { " (sandboxed)" } else { "" };
        match &self.reason {
            Some(reason) => format!("{}: {}{}", self.decision, reason, suffix),
            None => format!("{}{}", self.decision, suffix),
        }
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute_permission(
    ctx: &AppContext,
    command: PermissionCommands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        PermissionCommands::Check { profile_id, tool_id, ip } => {
            let profile = ctx
                .store
                .get_profile(&profile_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("profile not found: {profile_id}"))?;
            let engine = PermissionEngine::new(&ctx.catalog);
            let decision =
                engine.evaluate(&profile, &tool_id, RateCounters::default(), chrono::Utc::now(), ip.as_deref())?;
            let out = match decision {
                crate::services::permission_engine::PermissionDecision::Allowed => {
                    PermissionCheckOutput { decision: "allowed".to_string(), reason: None, sandbox: false }
                }
                crate::services::permission_engine::PermissionDecision::Sandboxed { reason } => {
                    PermissionCheckOutput { decision: "allowed".to_string(), reason: Some(reason), sandbox: true }
                }
                crate::services::permission_engine::PermissionDecision::Denied { reason } => {
                    PermissionCheckOutput { decision: "denied".to_string(), reason: Some(reason), sandbox: false }
                }
                crate::services::permission_engine::PermissionDecision::RequiresApproval { reason } => {
                    PermissionCheckOutput { decision: "requires_approval".to_string(), reason: Some(reason), sandbox: false }
                }
            };
            output(&out, json);
        }
    }
    Ok(())
}
