use clap::Subcommand;
use serde::Serialize;

use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::services::communication_observer::{ObservedToolCall, TopologyQuery};

#[derive(Subcommand)]
pub enum MessageCommands {
    /// Feed a single observed tool call into the communication observer.
    Observe {
        org_id: String,
        agent_id: String,
        agent_name: String,
        tool_id: String,
        /// JSON object of tool parameters, e.g. '{"to":"a@example.com"}'.
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[derive(Serialize)]
pub struct ObserveOutput {
    pub messages_recorded: usize,
}

impl CommandOutput for ObserveOutput {
    fn to_human(&self) -> String {
        format!("{} message(s) recorded", self.messages_recorded)
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(ctx: &AppContext, command: MessageCommands, json: bool) -> anyhow::Result<()> {
    match command {
        MessageCommands::Observe { org_id, agent_id, agent_name, tool_id, params } => {
            let params: serde_json::Value = serde_json::from_str(&params)?;
            let call = ObservedToolCall {
                org_id: &org_id,
                agent_id: &agent_id,
                agent_name: &agent_name,
                tool_id: &tool_id,
                params: &params,
            };
            let messages = ctx.communication.observe(call).await?;
            output(&ObserveOutput { messages_recorded: messages.len() }, json);
        }
    }
    Ok(())
}

#[derive(Subcommand)]
pub enum TopologyCommands {
    /// Show the agent-to-agent/email communication graph for an organization.
    Show { org_id: String },
}

#[derive(Serialize)]
pub struct TopologyOutput {
    pub node_count: usize,
    pub edge_count: usize,
    pub edges: Vec<EdgeOutput>,
}

#[derive(Serialize)]
pub struct EdgeOutput {
    pub from: String,
    pub to: String,
    pub message_count: u64,
    pub direction: String,
}

impl CommandOutput for TopologyOutput {
    fn to_human(&self) -> String {
        if self.edges.is_empty() {
            return "no communication observed".to_string();
        }
        let mut lines = vec![format!("{} nodes, {} edges", self.node_count, self.edge_count)];
        for edge in &self.edges {
            lines.push(format!("{} -> {}  count={}  {}", edge.from, edge.to, edge.message_count, edge.direction));
        }
        lines.join("\n")
    }
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute_topology(ctx: &AppContext, command: TopologyCommands, json: bool) -> anyhow::Result<()> {
    match command {
        TopologyCommands::Show { org_id } => {
            let topology = ctx
                .communication
                .get_topology(TopologyQuery { org_id: Some(org_id), since: None, agent_id: None })
                .await?;
            let edges = topology
                .edges
                .iter()
                .map(|e| EdgeOutput {
                    from: e.from.clone(),
                    to: e.to.clone(),
                    message_count: e.message_count,
                    direction: format!("{:?}", e.direction).to_lowercase(),
                })
                .collect();
            output(
                &TopologyOutput { node_count: topology.nodes.len(), edge_count: topology.edges.len(), edges },
                json,
            );
        }
    }
    Ok(())
}
