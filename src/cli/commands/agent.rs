use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{
    AgentConfigPatch, DeploymentConfig, DeploymentTarget, ManagedAgent, ModelConfig,
};

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Create a draft agent.
    Create {
        org_id: String,
        name: String,
    },
    /// Attach model/deployment/permission-profile config to a draft agent.
    Configure {
        agent_id: String,
        #[command(flatten)]
        config: ConfigureArgs,
    },
    /// Deploy a ready agent.
    Deploy { agent_id: String },
    /// Stop a running agent.
    Stop {
        agent_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Restart a stopped/degraded agent.
    Restart { agent_id: String },
    /// Permanently destroy an agent.
    Destroy { agent_id: String },
    /// List agents for an organization.
    List { org_id: String },
    /// Show one agent's full state.
    Show { agent_id: String },
}

#[derive(Args)]
pub struct ConfigureArgs {
    #[arg(long)]
    pub model_provider: String,
    #[arg(long)]
    pub model_id: String,
    #[arg(long, default_value = "local")]
    pub deployment_target: String,
    #[arg(long)]
    pub permission_profile_id: String,
}

fn parse_target(s: &str) -> anyhow::Result<DeploymentTarget> {
    Ok(match s {
        "docker" => DeploymentTarget::Docker,
        "systemd" => DeploymentTarget::Systemd,
        "vps" => DeploymentTarget::Vps,
        "fly" => DeploymentTarget::Fly,
        "railway" => DeploymentTarget::Railway,
        "aws" => DeploymentTarget::Aws,
        "gcp" => DeploymentTarget::Gcp,
        "azure" => DeploymentTarget::Azure,
        "local" => DeploymentTarget::Local,
        other => anyhow::bail!("unknown deployment target: {other}"),
    })
}

#[derive(Serialize)]
pub struct AgentOutput {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub state: String,
    pub version: u64,
    pub health_status: String,
}

impl From<&ManagedAgent> for AgentOutput {
    fn from(agent: &ManagedAgent) -> Self {
        Self {
            id: agent.id.clone(),
            org_id: agent.org_id.clone(),
            name: agent.config.identity.name.clone(),
            state: agent.state.as_str().to_string(),
            version: agent.version,
            health_status: format!("{:?}", agent.health.status).to_lowercase(),
        }
    }
}

impl CommandOutput for AgentOutput {
    fn to_human(&self) -> String {
        format!(
            "{} ({})  state={}  version={}  health={}",
            self.name, self.id, self.state, self.version, self.health_status
        )
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
pub struct AgentListOutput(pub Vec<AgentOutput>);

impl CommandOutput for AgentListOutput {
    fn to_human(&self) -> String {
        if self.0.is_empty() {
            return "no agents".to_string();
        }
        self.0.iter().map(|a| a.to_human()).collect::<Vec<_>>().join("\n")
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: AgentCommands, json: bool) -> anyhow::Result<()> {
    match command {
        AgentCommands::Create { org_id, name } => {
            let agent = ctx.lifecycle.create_draft(&org_id, &name).await;
            output(&AgentOutput::from(&agent), json);
        }
        AgentCommands::Configure { agent_id, config } => {
            let target = parse_target(&config.deployment_target)?;
            let patch = AgentConfigPatch {
                identity: None,
                model: Some(ModelConfig {
                    provider: config.model_provider,
                    model_id: config.model_id,
                    temperature: None,
                    max_tokens: None,
                }),
                deployment: Some(DeploymentConfig { target, region: None, resources: None }),
                permission_profile_id: Some(config.permission_profile_id),
                email: None,
                date_of_birth: None,
            };
            let agent = ctx.lifecycle.update_config(&agent_id, patch).await?;
            output(&AgentOutput::from(&agent), json);
        }
        AgentCommands::Deploy { agent_id } => {
            let agent = ctx.lifecycle.deploy(&agent_id).await?;
            output(&AgentOutput::from(&agent), json);
        }
        AgentCommands::Stop { agent_id, reason } => {
            let agent = ctx.lifecycle.stop(&agent_id, reason).await?;
            output(&AgentOutput::from(&agent), json);
        }
        AgentCommands::Restart { agent_id } => {
            let agent = ctx.lifecycle.restart(&agent_id).await?;
            output(&AgentOutput::from(&agent), json);
        }
        AgentCommands::Destroy { agent_id } => {
            ctx.lifecycle.destroy(&agent_id).await?;
            println!("agent {agent_id} destroyed");
        }
        AgentCommands::List { org_id } => {
            let agents = ctx.store.list_agents_by_org(&org_id).await?;
            let rows = agents.iter().map(AgentOutput::from).collect();
            output(&AgentListOutput(rows), json);
        }
        AgentCommands::Show { agent_id } => {
            let agent = ctx
                .store
                .get_agent(&agent_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("agent not found: {agent_id}"))?;
            output(&AgentOutput::from(&agent), json);
        }
    }
    Ok(())
}
