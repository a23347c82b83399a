use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Organization, Plan};

#[derive(Subcommand)]
pub enum OrgCommands {
    /// Create a new organization on the given plan.
    Create {
        name: String,
        #[arg(long, default_value = "free")]
        plan: String,
    },
    /// List every organization.
    List,
}

#[derive(Serialize)]
pub struct OrgOutput {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub plan: String,
    pub max_agents: u32,
    pub agents_used: u32,
}

impl From<&Organization> for OrgOutput {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id.clone(),
            slug: org.slug.clone(),
            name: org.name.clone(),
            plan: org.plan.as_str().to_string(),
            max_agents: org.limits.max_agents,
            agents_used: org.usage.agents,
        }
    }
}

impl CommandOutput for OrgOutput {
    fn to_human(&self) -> String {
        format!(
            "{} ({})  plan={}  agents={}/{}",
            self.name, self.id, self.plan, self.agents_used, self.max_agents
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
pub struct OrgListOutput(pub Vec<OrgOutput>);

impl CommandOutput for OrgListOutput {
    fn to_human(&self) -> String {
        if self.0.is_empty() {
            return "no organizations".to_string();
        }
        self.0.iter().map(|o| o.to_human()).collect::<Vec<_>>().join("\n")
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: OrgCommands, json: bool) -> anyhow::Result<()> {
    match command {
        OrgCommands::Create { name, plan } => {
            let plan = Plan::parse_str(&plan).ok_or_else(|| anyhow::anyhow!("unknown plan: {plan}"))?;
            let org = ctx.tenants.create_org(name, plan).await?;
            output(&OrgOutput::from(&org), json);
        }
        OrgCommands::List => {
            let orgs = ctx.store.list_orgs().await?;
            let rows = orgs.iter().map(OrgOutput::from).collect();
            output(&OrgListOutput(rows), json);
        }
    }
    Ok(())
}
