use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ApprovalAction, ApprovalRequest};

#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// List approval requests for an organization.
    List {
        org_id: String,
        #[arg(long)]
        pending_only: bool,
    },
    /// Approve or deny a pending request.
    Decide {
        approval_id: String,
        #[arg(value_parser = ["approve", "deny"])]
        action: String,
        #[arg(long)]
        decided_by: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Serialize)]
pub struct ApprovalOutput {
    pub id: String,
    pub agent_id: String,
    pub tool_id: String,
    pub status: String,
    pub risk_level: String,
    pub expires_at: String,
}

impl From<&ApprovalRequest> for ApprovalOutput {
    fn from(r: &ApprovalRequest) -> Self {
        Self {
            id: r.id.clone(),
            agent_id: r.agent_id.clone(),
            tool_id: r.tool_id.clone(),
            status: format!("{:?}", r.status).to_lowercase(),
            risk_level: r.risk_level.as_str().to_string(),
            expires_at: r.expires_at.to_rfc3339(),
        }
    }
}

impl CommandOutput for ApprovalOutput {
    fn to_human(&self) -> String {
        format!(
            "{}  agent={}  tool={}  status={}  risk={}  expires={}",
            self.id, self.agent_id, self.tool_id, self.status, self.risk_level, self.expires_at
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
pub struct ApprovalListOutput(pub Vec<ApprovalOutput>);

impl CommandOutput for ApprovalListOutput {
    fn to_human(&self) -> String {
        if self.0.is_empty() {
            return "no approval requests".to_string();
        }
        self.0.iter().map(|a| a.to_human()).collect::<Vec<_>>().join("\n")
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: ApprovalCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ApprovalCommands::List { org_id, pending_only } => {
            let mut requests = ctx.store.list_approvals_by_org(&org_id).await?;
            if pending_only {
                requests.retain(|r| !r.status.is_terminal());
            }
            let rows = requests.iter().map(ApprovalOutput::from).collect();
            output(&ApprovalListOutput(rows), json);
        }
        ApprovalCommands::Decide { approval_id, action, decided_by, reason } => {
            let action = match action.as_str() {
                "approve" => ApprovalAction::Approved,
                "deny" => ApprovalAction::Denied,
                _ => unreachable!("validated by clap value_parser"),
            };
            let request = ctx.approvals.decide(&approval_id, action, &decided_by, reason).await?;
            output(&ApprovalOutput::from(&request), json);
        }
    }
    Ok(())
}
